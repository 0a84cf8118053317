//! Shared mock object model for unit tests.

use std::sync::Arc;

use sugar_handle::mock::{MockClass, MockRuntime, World};
use sugar_handle::{ForeignError, Handle, Variant};

/// Lazily created object-valued property.
fn child_object(world: &mut World, this: Handle, name: &str, class: &str) -> Handle {
    if let Some(h) = world.property(this, name).and_then(Variant::as_object) {
        return h;
    }
    let h = world.spawn(class);
    world.set_property(this, name, h);
    h
}

fn count(world: &World, this: Handle) -> Variant {
    Variant::from(i64::try_from(world.items(this).len()).unwrap_or(i64::MAX))
}

/// A small spreadsheet-shaped object model:
///
/// - `App`: getters `Workbooks` (object) and `Version` (string)
/// - `Workbooks`: method `Add` (new `Workbook`, appended), getters `Count`
///   and `Item(i)` (1-based)
/// - `Workbook`: method `Close`; getter `Sheets` (object)
/// - `Sheets`: enumerable, getter `Count`
pub(crate) fn office() -> Arc<MockRuntime> {
    let rt = MockRuntime::new();
    rt.define(
        "App",
        MockClass::new()
            .getter("Workbooks", |world, this, _| {
                Ok(Variant::Object(child_object(world, this, "Workbooks", "Workbooks")))
            })
            .getter("Version", |_, _, _| Ok(Variant::from("16.0"))),
    );
    rt.define(
        "Workbooks",
        MockClass::new()
            .method("Add", |world, this, _| {
                let book = world.spawn("Workbook");
                world.push_item(this, book);
                Ok(Variant::Object(book))
            })
            .getter("Count", |world, this, _| Ok(count(world, this)))
            .getter("Item", |world, this, args| {
                let index = args.first().and_then(Variant::as_int).unwrap_or(0);
                usize::try_from(index - 1)
                    .ok()
                    .and_then(|i| world.items(this).get(i).copied())
                    .map(Variant::Object)
                    .ok_or_else(|| ForeignError::new(-1, format!("no item {index}")))
            }),
    );
    rt.define(
        "Workbook",
        MockClass::new()
            .method("Close", |_, _, _| Ok(Variant::Empty))
            .getter("Sheets", |world, this, _| {
                Ok(Variant::Object(child_object(world, this, "Sheets", "Sheets")))
            }),
    );
    rt.define(
        "Sheets",
        MockClass::new().getter("Count", |world, this, _| Ok(count(world, this))),
    );
    Arc::new(rt)
}

/// An `App` object with `n` sheets reachable as `Workbooks.Item(1).Sheets`.
pub(crate) fn app_with_sheets(rt: &MockRuntime, n: usize) -> Handle {
    rt.with_world(|world| {
        let app = world.spawn("App");
        let books = child_object(world, app, "Workbooks", "Workbooks");
        let book = world.spawn("Workbook");
        world.push_item(books, book);
        let sheets = child_object(world, book, "Sheets", "Sheets");
        for i in 0..n {
            let sheet = world.spawn("Sheet");
            world.set_property(sheet, "Name", format!("Sheet{}", i + 1));
            world.push_item(sheets, sheet);
        }
        app
    })
}
