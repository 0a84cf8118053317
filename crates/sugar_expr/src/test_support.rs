//! Mock object model for expression tests.

use std::sync::Arc;

use sugar::Chain;
use sugar_handle::mock::{MockClass, MockRuntime, World};
use sugar_handle::{ForeignError, Handle, Runtime, Variant};

/// Object stored under `key`, spawned on first access.
fn cached(world: &mut World, this: Handle, key: &str, class: &str) -> Handle {
    if let Some(h) = world.property(this, key).and_then(Variant::as_object) {
        return h;
    }
    let h = world.spawn(class);
    world.set_property(this, key, h);
    h
}

/// - `App`: getters `ActiveSheet` (object) and `Name`; method `Sum(a, b)`
/// - `Sheet`: getter `Name`; method `Range(address)` (object, one per address)
/// - `Range`: stored properties only
/// - `Node`: method `B(args...)` returning a new `Node` whose `C` is the
///   sum of the arguments
pub(crate) fn workbook() -> Arc<MockRuntime> {
    let rt = MockRuntime::new();
    rt.define(
        "App",
        MockClass::new()
            .getter("ActiveSheet", |world, this, _| {
                Ok(Variant::Object(cached(world, this, "ActiveSheet", "Sheet")))
            })
            .getter("Name", |_, _, _| Ok(Variant::from("Sugar")))
            .method("Sum", |_, _, args| {
                Ok(Variant::Int(args.iter().filter_map(Variant::as_int).sum()))
            }),
    );
    rt.define(
        "Sheet",
        MockClass::new()
            .getter("Name", |_, _, _| Ok(Variant::from("Sheet1")))
            .method("Range", |world, this, args| {
                let address = args
                    .first()
                    .and_then(Variant::as_str)
                    .ok_or_else(|| ForeignError::new(-1, "Range expects an address"))?;
                let key = format!("Range {address}");
                Ok(Variant::Object(cached(world, this, &key, "Range")))
            }),
    );
    rt.define("Range", MockClass::new());
    rt.define(
        "Node",
        MockClass::new().method("B", |world, _, args| {
            let node = world.spawn("Node");
            let sum: i64 = args.iter().filter_map(Variant::as_int).sum();
            world.set_property(node, "C", sum);
            Ok(Variant::Object(node))
        }),
    );
    Arc::new(rt)
}

pub(crate) fn runtime(rt: &Arc<MockRuntime>) -> Arc<dyn Runtime> {
    rt.clone()
}

/// A standalone owning chain over a new `App`.
pub(crate) fn app(rt: &Arc<MockRuntime>) -> Chain {
    Chain::create(runtime(rt), "App")
}

/// Handle stored under `key` on `owner`.
pub(crate) fn stored(rt: &MockRuntime, owner: Handle, key: &str) -> Option<Handle> {
    rt.with_world(|world| world.property(owner, key).and_then(Variant::as_object))
}
