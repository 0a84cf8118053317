#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use sugar_handle::mock::{Event, MockRuntime};

use super::*;
use crate::context::Context;
use crate::errors::ErrorKind;
use crate::test_support::{app_with_sheets, office};

fn runtime(rt: &Arc<MockRuntime>) -> Arc<dyn Runtime> {
    rt.clone()
}

// Traversal

#[test]
fn test_add_then_count() {
    let rt = office();
    let ctx = Context::new(runtime(&rt));

    let books = ctx.create("App").get("Workbooks", &[]);
    assert!(books.call("Add", &[]).is_ok());
    assert!(books.call("Add", &[]).is_ok());
    assert_eq!(books.get("Count", &[]).value().unwrap(), Variant::Int(2));

    ctx.release().unwrap();
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_scalar_result_keeps_cursor() {
    let rt = office();
    let ctx = Context::new(runtime(&rt));

    let version = ctx.create("App").get("Version", &[]);
    assert!(!version.is_object());
    let count = version.get("Workbooks", &[]).get("Count", &[]);
    assert_eq!(count.value().unwrap(), Variant::Int(0));
    assert_eq!(version.value().unwrap(), Variant::from("16.0"));

    ctx.release().unwrap();
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_receiver_is_unchanged() {
    let rt = office();
    let ctx = Context::new(runtime(&rt));

    let app = ctx.create("App");
    let failed = app.get("Missing", &[]);
    assert!(!failed.is_ok());
    assert!(app.is_ok());
    assert!(app.is_object());
    assert!(app.get("Workbooks", &[]).is_ok());

    ctx.release().unwrap();
}

#[test]
fn test_put_then_get() {
    let rt = office();
    let ctx = Context::new(runtime(&rt));

    let app = ctx.create("App");
    let after = app.put("Caption", &[Variant::from("Report")]);
    assert!(after.is_ok());
    assert!(!after.is_object());
    assert_eq!(after.value().unwrap(), Variant::Empty);
    assert_eq!(
        app.get("Caption", &[]).value().unwrap(),
        Variant::from("Report")
    );

    ctx.release().unwrap();
}

#[test]
fn test_indexed_get() {
    let rt = office();
    let ctx = Context::new(runtime(&rt));

    let books = ctx.create("App").get("Workbooks", &[]);
    books.call("Add", &[]);
    let first = books.get("Item", &[Variant::from(1)]);
    assert!(first.is_object());
    let missing = books.get("Item", &[Variant::from(5)]);
    assert!(matches!(
        missing.error().unwrap().kind,
        ErrorKind::ForeignCallFailed {
            op: ForeignOp::GetProperty,
            ..
        }
    ));

    ctx.release().unwrap();
    assert_eq!(rt.outstanding(), 0);
}

// Error propagation

#[test]
fn test_failed_create_makes_no_foreign_calls() {
    let rt = office();
    let ctx = Context::new(runtime(&rt));

    let chain = ctx
        .create("NotRegistered")
        .get("Workbooks", &[])
        .call("Add", &[])
        .put("Visible", &[Variant::from(true)]);
    let err = chain.err().unwrap();
    assert!(matches!(
        err.kind,
        ErrorKind::ForeignCallFailed {
            op: ForeignOp::Create,
            ..
        }
    ));
    assert!(rt.events().is_empty());
    assert!(ctx.release().is_err());
}

#[test]
fn test_first_error_wins() {
    let rt = office();
    let ctx = Context::new(runtime(&rt));

    let app = ctx.create("App");
    rt.clear_events();
    let chain = app.get("Missing", &[]).get("Workbooks", &[]).call("Add", &[]);
    let err = chain.error().unwrap();
    assert_eq!(err.to_string(), app.get("Missing", &[]).err().unwrap().to_string());
    assert!(err.message.starts_with("get Missing failed"));

    let gets = rt
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Get { .. } | Event::Call { .. }))
        .count();
    assert_eq!(gets, 2);

    ctx.release().unwrap();
}

#[test]
fn test_nil_handle() {
    let rt = office();
    let chain = Chain::wrap(runtime(&rt), Handle::NULL).get("Workbooks", &[]);
    assert_eq!(chain.err().unwrap().kind, ErrorKind::NilHandle);
    assert!(rt.events().is_empty());
}

// Terminals

#[test]
fn test_value_of_object_is_not_scalar() {
    let rt = office();
    let app = Chain::create(runtime(&rt), "App");
    let books = app.get("Workbooks", &[]);
    assert_eq!(books.value().unwrap_err().kind, ErrorKind::HandleNotScalar);
    assert!(books.is_released());
    assert_eq!(books.value().unwrap_err().kind, ErrorKind::ChainReleased);
    app.release().unwrap();
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_release_is_idempotent() {
    let rt = office();
    let app = Chain::create(runtime(&rt), "App");
    let handle = app.handle().unwrap();

    app.release().unwrap();
    app.release().unwrap();
    assert_eq!(rt.releases(), vec![handle]);
    assert_eq!(app.handle().unwrap_err().kind, ErrorKind::ChainReleased);
}

#[test]
fn test_err_is_terminal() {
    let rt = office();
    let missing = Chain::create(runtime(&rt), "App").get("Missing", &[]);
    assert!(missing.err().is_some());
    assert!(missing.err().is_none());
}

#[test]
fn test_error_observer_does_not_release() {
    let rt = office();
    let app = Chain::create(runtime(&rt), "App");
    assert!(app.error().is_none());
    assert!(app.is_ok());
    assert!(!app.is_released());
    app.release().unwrap();
}

#[test]
fn test_release_failure_is_reported() {
    let rt = office();
    let app = Chain::create(runtime(&rt), "App");
    rt.fail_release_of(app.handle().unwrap());
    let err = app.release().unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::ForeignCallFailed {
            op: ForeignOp::Release,
            ..
        }
    ));
    assert!(app.release().is_ok());
}

#[test]
fn test_drop_releases_owned_handle() {
    let rt = office();
    {
        let app = Chain::create(runtime(&rt), "App");
        let _books = app.get("Workbooks", &[]);
    }
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_wrap_never_releases() {
    let rt = office();
    let app = rt.create("App").unwrap();
    {
        let chain = Chain::wrap(runtime(&rt), app);
        chain.get("Version", &[]).value().unwrap();
        chain.release().unwrap();
    }
    assert_eq!(rt.external_refs(app), 1);
    rt.release(app).unwrap();
}

// Reference duplication

#[test]
fn test_store_hands_out_reference() {
    let rt = office();
    let ctx = Context::new(runtime(&rt));

    let books = ctx.create("App").get("Workbooks", &[]);
    let stored = books.store().unwrap();
    assert_eq!(rt.external_refs(stored), 2);
    ctx.release().unwrap();
    assert_eq!(rt.external_refs(stored), 1);

    let adopted = Chain::adopt(runtime(&rt), stored);
    assert_eq!(adopted.get("Count", &[]).value().unwrap(), Variant::Int(0));
    adopted.release().unwrap();
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_fork_is_tracked_detach_is_not() {
    let rt = office();
    let ctx = Context::new(runtime(&rt));

    let app = ctx.create("App");
    let tracked = ctx.len();
    let fork = app.fork();
    assert!(fork.is_object());
    assert_eq!(ctx.len(), tracked + 1);

    let detached = app.detach();
    assert_eq!(ctx.len(), tracked + 1);
    assert!(!detached.in_arena());

    ctx.release().unwrap();
    assert_eq!(rt.outstanding(), 1);
    detached.release().unwrap();
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_store_of_failed_chain() {
    let rt = office();
    let failed = Chain::create(runtime(&rt), "Nope");
    assert!(matches!(
        failed.store().unwrap_err().kind,
        ErrorKind::ForeignCallFailed { .. }
    ));
    assert!(matches!(
        failed.fork().error().unwrap().kind,
        ErrorKind::ForeignCallFailed { .. }
    ));
}

// Enumeration

#[test]
fn test_for_each_visits_every_element() {
    let rt = office();
    let app = app_with_sheets(&rt, 4);
    let ctx = Context::new(runtime(&rt));

    let sheets = ctx
        .wrap(app)
        .get("Workbooks", &[])
        .get("Item", &[Variant::from(1)])
        .get("Sheets", &[]);
    let mut names = Vec::new();
    let done = sheets.for_each(|sheet| {
        names.push(sheet.get("Name", &[]).value()?);
        Ok(Flow::Continue)
    });
    assert!(done.err().is_none());
    assert_eq!(
        names,
        vec![
            Variant::from("Sheet1"),
            Variant::from("Sheet2"),
            Variant::from("Sheet3"),
            Variant::from("Sheet4"),
        ]
    );

    ctx.release().unwrap();
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_for_each_break_stops_handing_out() {
    let rt = office();
    let app = app_with_sheets(&rt, 5);
    let ctx = Context::new(runtime(&rt));
    let sheets = ctx
        .wrap(app)
        .get("Workbooks", &[])
        .get("Item", &[Variant::from(1)])
        .get("Sheets", &[]);
    rt.clear_events();

    let mut visited = 0;
    let done = sheets.for_each(|_| {
        visited += 1;
        Ok(if visited == 2 { Flow::Break } else { Flow::Continue })
    });
    assert!(done.is_ok());
    assert_eq!(visited, 2);

    ctx.release().unwrap();
    assert_eq!(rt.releases().len(), 2 + 3);
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_for_each_break_with_value() {
    let rt = office();
    let app = app_with_sheets(&rt, 3);
    let ctx = Context::new(runtime(&rt));
    let sheets = ctx
        .wrap(app)
        .get("Workbooks", &[])
        .get("Item", &[Variant::from(1)])
        .get("Sheets", &[]);

    let done = sheets.for_each(|sheet| {
        let name = sheet.get("Name", &[]).value()?;
        if name == Variant::from("Sheet2") {
            return Ok(Flow::BreakWith(name));
        }
        Ok(Flow::Continue)
    });
    let err = done.err().unwrap();
    assert!(err.is_iteration_stopped());
    assert_eq!(err.stopped_value(), Some(&Variant::from("Sheet2")));

    ctx.release().unwrap();
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_for_each_callback_error_is_kept() {
    let rt = office();
    let app = app_with_sheets(&rt, 3);
    let ctx = Context::new(runtime(&rt));
    let sheets = ctx
        .wrap(app)
        .get("Workbooks", &[])
        .get("Item", &[Variant::from(1)])
        .get("Sheets", &[]);

    let done = sheets.for_each(|_| Err(Error::new("boom")));
    assert_eq!(done.err().unwrap(), Error::new("boom"));
    ctx.release().unwrap();
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn test_for_each_without_arena_releases_each_item() {
    let rt = office();
    let app = app_with_sheets(&rt, 3);
    let sheets = Chain::wrap(runtime(&rt), app)
        .get("Workbooks", &[])
        .get("Item", &[Variant::from(1)])
        .get("Sheets", &[]);
    let sheets_handle = sheets.handle().unwrap();

    let mut live = Vec::new();
    let done = sheets.for_each(|sheet| {
        live.push(rt.outstanding());
        assert!(!sheet.in_arena());
        Ok(Flow::Continue)
    });
    assert!(done.err().is_none());
    // Each element is released before the next is handed out.
    assert_eq!(live, vec![live[0]; 3]);

    drop(sheets);
    assert_eq!(rt.outstanding(), 0);
    assert_eq!(rt.external_refs(sheets_handle), 0);
}

#[test]
fn test_for_each_on_failed_chain() {
    let rt = office();
    let mut called = false;
    let done = Chain::create(runtime(&rt), "Nope").for_each(|_| {
        called = true;
        Ok(Flow::Continue)
    });
    assert!(!called);
    assert!(done.err().is_some());
}
