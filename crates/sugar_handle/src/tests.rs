#![allow(clippy::unwrap_used)]

use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_null_handle() {
    assert!(Handle::NULL.is_null());
    assert!(!Handle::from_raw(0x10).is_null());
    assert_eq!(Handle::from_raw(0x10).raw(), 0x10);
}

#[test]
fn test_handle_display() {
    assert_eq!(Handle::from_raw(0xbeef).to_string(), "#beef");
}

#[test]
fn test_variant_conversions() {
    assert_eq!(Variant::from(true), Variant::Bool(true));
    assert_eq!(Variant::from(7), Variant::Int(7));
    assert_eq!(Variant::from(7_i64), Variant::Int(7));
    assert_eq!(Variant::from(1.5), Variant::Float(1.5));
    assert_eq!(Variant::from("a"), Variant::Str("a".to_string()));
    assert_eq!(Variant::from(None::<i64>), Variant::Empty);
    assert_eq!(
        Variant::from(Handle::from_raw(3)),
        Variant::Object(Handle::from_raw(3))
    );
}

#[test]
fn test_variant_accessors() {
    let obj = Variant::Object(Handle::from_raw(9));
    assert!(obj.is_object());
    assert_eq!(obj.as_object(), Some(Handle::from_raw(9)));
    assert_eq!(obj.type_name(), "object");

    assert_eq!(Variant::Int(4).as_int(), Some(4));
    assert_eq!(Variant::Str("x".into()).as_str(), Some("x"));
    assert!(Variant::default().is_empty());
}

#[test]
fn test_variant_display() {
    assert_eq!(Variant::Empty.to_string(), "nil");
    assert_eq!(Variant::Int(-3).to_string(), "-3");
    assert_eq!(Variant::Str("hi".into()).to_string(), "hi");
}

#[test]
fn test_foreign_error_display() {
    assert_eq!(ForeignError::new(0, "boom").to_string(), "boom");
    assert_eq!(ForeignError::new(0x10, "boom").to_string(), "boom (code 0x10)");
}

#[cfg(feature = "mock")]
mod mock_runtime {
    use crate::mock::{Event, MockClass, MockRuntime};
    use crate::{Runtime, Variant};
    use pretty_assertions::assert_eq;

    fn counter_runtime() -> MockRuntime {
        let rt = MockRuntime::new();
        rt.define(
            "Counter",
            MockClass::new().method("Bump", |world, this, _| {
                let n = world.property(this, "N").and_then(Variant::as_int).unwrap_or(0);
                world.set_property(this, "N", n + 1);
                let child = world.spawn("Counter");
                Ok(Variant::Object(child))
            }),
        );
        rt
    }

    #[test]
    fn create_hands_out_one_reference() {
        let rt = counter_runtime();
        let h = rt.create("Counter").unwrap();
        assert_eq!(rt.external_refs(h), 1);
        rt.release(h).unwrap();
        assert_eq!(rt.outstanding(), 0);
    }

    #[test]
    fn double_release_is_reported() {
        let rt = counter_runtime();
        let h = rt.create("Counter").unwrap();
        rt.release(h).unwrap();
        assert!(rt.release(h).is_err());
    }

    #[test]
    fn unknown_class_fails() {
        let rt = counter_runtime();
        assert!(rt.create("Nope").is_err());
    }

    #[test]
    fn method_results_are_handed_out() {
        let rt = counter_runtime();
        let h = rt.create("Counter").unwrap();
        let child = rt.call_method(h, "Bump", &[]).unwrap().as_object().unwrap();
        assert_eq!(rt.external_refs(child), 1);
        assert_eq!(rt.get_property(h, "N", &[]).unwrap(), Variant::Int(1));
        rt.release(child).unwrap();
        rt.release(h).unwrap();
        assert_eq!(rt.outstanding(), 0);
    }

    #[test]
    fn put_then_get() {
        let rt = counter_runtime();
        let h = rt.create("Counter").unwrap();
        rt.put_property(h, "Label", &[Variant::from("x")]).unwrap();
        assert_eq!(rt.get_property(h, "Label", &[]).unwrap(), Variant::from("x"));
        assert!(rt.get_property(h, "Missing", &[]).is_err());
        rt.release(h).unwrap();
    }

    #[test]
    fn enumeration_counts_only_consumed_items() {
        let rt = counter_runtime();
        let h = rt.create("Counter").unwrap();
        let a = rt.spawn("Counter");
        let b = rt.spawn("Counter");
        rt.push_item(h, a);
        rt.push_item(h, b);

        let first = rt.enumerate(h).unwrap().next().unwrap().unwrap();
        assert_eq!(first, a);
        assert_eq!(rt.external_refs(a), 1);
        assert_eq!(rt.external_refs(b), 0);
    }

    #[test]
    fn events_are_logged_in_order() {
        let rt = counter_runtime();
        let h = rt.create("Counter").unwrap();
        rt.add_ref(h).unwrap();
        rt.release(h).unwrap();
        rt.release(h).unwrap();
        assert_eq!(
            rt.events(),
            vec![
                Event::Create {
                    name: "Counter".into(),
                    handle: h
                },
                Event::AddRef(h),
                Event::Release(h),
                Event::Release(h),
            ]
        );
    }

    #[test]
    fn attach_active_requires_registration() {
        let rt = counter_runtime();
        assert!(rt.attach_active("Counter").is_err());
        let h = rt.spawn("Counter");
        rt.register_active("Counter", h);
        assert_eq!(rt.attach_active("Counter").unwrap(), h);
        assert_eq!(rt.external_refs(h), 1);
    }

    #[test]
    fn init_failure_is_injectable() {
        let rt = counter_runtime();
        assert!(rt.initialize().is_ok());
        rt.set_fail_init(true);
        assert!(rt.initialize().is_err());
        assert_eq!(rt.init_count(), 1);
    }
}
