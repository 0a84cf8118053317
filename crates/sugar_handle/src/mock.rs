//! In-memory foreign runtime for tests.
//!
//! `MockRuntime` simulates a graph of reference-counted objects:
//!
//! - Classes are scripted with [`MockClass`]: named getters and methods are
//!   closures over the [`World`] and the receiving handle.
//! - Objects carry stored properties and enumerable items.
//! - Every handle handed to the caller is counted as an *external*
//!   reference; `release` of a handle with no external references fails, so
//!   double releases are observable.
//! - Every operation is appended to an event log for order assertions.
//!
//! Internal references (an object stored in another object's property) are
//! not counted; `outstanding()` therefore reports exactly the references the
//! caller still owes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::{Elements, ForeignError, Handle, Runtime, Variant};

/// `DISP_E_UNKNOWNNAME`: unknown property or method.
pub const UNKNOWN_NAME: i32 = -2_147_352_570;
/// `E_FAIL`: unspecified failure.
pub const FAILED: i32 = -2_147_467_259;
/// `REGDB_E_CLASSNOTREG`: class not registered.
pub const CLASS_NOT_REGISTERED: i32 = -2_147_221_164;
/// `E_POINTER`: invalid (unknown or null) handle.
pub const INVALID_HANDLE: i32 = -2_147_467_261;

/// Scripted getter or method body.
pub type MockFn =
    Arc<dyn Fn(&mut World, Handle, &[Variant]) -> Result<Variant, ForeignError> + Send + Sync>;

/// One observable runtime operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Create { name: String, handle: Handle },
    Attach { name: String, handle: Handle },
    AddRef(Handle),
    Release(Handle),
    Get { handle: Handle, name: String },
    Put { handle: Handle, name: String, value: Variant },
    Call { handle: Handle, name: String, args: Vec<Variant> },
    Enumerate(Handle),
}

/// Behavior shared by every object of one class.
#[derive(Default)]
pub struct MockClass {
    getters: FxHashMap<String, MockFn>,
    methods: FxHashMap<String, MockFn>,
}

impl MockClass {
    pub fn new() -> Self {
        MockClass::default()
    }

    /// Script a computed (possibly indexed) property.
    #[must_use]
    pub fn getter<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut World, Handle, &[Variant]) -> Result<Variant, ForeignError>
            + Send
            + Sync
            + 'static,
    {
        self.getters.insert(name.to_string(), Arc::new(f));
        self
    }

    /// Script a method.
    #[must_use]
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut World, Handle, &[Variant]) -> Result<Variant, ForeignError>
            + Send
            + Sync
            + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(f));
        self
    }
}

#[derive(Debug)]
struct Object {
    class: String,
    external_refs: usize,
    properties: FxHashMap<String, Variant>,
    items: Vec<Handle>,
    fail_release: bool,
}

/// The simulated object graph.
///
/// Scripted closures receive `&mut World` to read and mutate state and to
/// spawn new objects. Objects spawned here start with no external
/// references; returning one from a getter or method hands one out.
#[derive(Debug, Default)]
pub struct World {
    next_id: usize,
    objects: FxHashMap<Handle, Object>,
    active: FxHashMap<String, Handle>,
}

impl World {
    /// Create an object of `class`.
    pub fn spawn(&mut self, class: &str) -> Handle {
        self.next_id += 1;
        let handle = Handle::from_raw(0x1000 + self.next_id);
        self.objects.insert(
            handle,
            Object {
                class: class.to_string(),
                external_refs: 0,
                properties: FxHashMap::default(),
                items: Vec::new(),
                fail_release: false,
            },
        );
        handle
    }

    /// Class name of a live object.
    pub fn class_of(&self, handle: Handle) -> Option<&str> {
        self.objects.get(&handle).map(|o| o.class.as_str())
    }

    /// Stored property value.
    pub fn property(&self, handle: Handle, name: &str) -> Option<&Variant> {
        self.objects.get(&handle)?.properties.get(name)
    }

    /// Store a property value. Unknown handles are ignored.
    pub fn set_property(&mut self, handle: Handle, name: &str, value: impl Into<Variant>) {
        if let Some(obj) = self.objects.get_mut(&handle) {
            obj.properties.insert(name.to_string(), value.into());
        }
    }

    /// Append an enumerable element.
    pub fn push_item(&mut self, handle: Handle, item: Handle) {
        if let Some(obj) = self.objects.get_mut(&handle) {
            obj.items.push(item);
        }
    }

    /// Enumerable elements of an object.
    pub fn items(&self, handle: Handle) -> &[Handle] {
        self.objects.get(&handle).map_or(&[], |o| o.items.as_slice())
    }

    fn object(&self, handle: Handle) -> Result<&Object, ForeignError> {
        self.objects
            .get(&handle)
            .ok_or_else(|| ForeignError::new(INVALID_HANDLE, format!("invalid handle {handle}")))
    }

    fn object_mut(&mut self, handle: Handle) -> Result<&mut Object, ForeignError> {
        self.objects
            .get_mut(&handle)
            .ok_or_else(|| ForeignError::new(INVALID_HANDLE, format!("invalid handle {handle}")))
    }

    /// Count one reference as handed to the caller.
    fn hand_out(&mut self, handle: Handle) -> Result<(), ForeignError> {
        self.object_mut(handle)?.external_refs += 1;
        Ok(())
    }
}

/// Scriptable in-memory [`Runtime`].
#[derive(Default)]
pub struct MockRuntime {
    classes: RwLock<FxHashMap<String, Arc<MockClass>>>,
    world: Mutex<World>,
    events: Mutex<Vec<Event>>,
    init_threads: Mutex<Vec<ThreadId>>,
    uninit_count: AtomicUsize,
    fail_init: AtomicBool,
}

impl MockRuntime {
    pub fn new() -> Self {
        MockRuntime::default()
    }

    /// Register a class so `create(name)` can instantiate it.
    pub fn define(&self, name: &str, class: MockClass) {
        self.classes.write().insert(name.to_string(), Arc::new(class));
    }

    /// Run `f` against the object graph.
    pub fn with_world<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut self.world.lock())
    }

    /// Spawn an object without handing out a reference.
    pub fn spawn(&self, class: &str) -> Handle {
        self.world.lock().spawn(class)
    }

    pub fn set_property(&self, handle: Handle, name: &str, value: impl Into<Variant>) {
        self.world.lock().set_property(handle, name, value);
    }

    pub fn push_item(&self, handle: Handle, item: Handle) {
        self.world.lock().push_item(handle, item);
    }

    /// Make `handle` reachable through `attach_active(name)`.
    pub fn register_active(&self, name: &str, handle: Handle) {
        self.world.lock().active.insert(name.to_string(), handle);
    }

    /// References to `handle` currently owed by the caller.
    pub fn external_refs(&self, handle: Handle) -> usize {
        self.world
            .lock()
            .objects
            .get(&handle)
            .map_or(0, |o| o.external_refs)
    }

    /// Total references owed by the caller across all objects.
    pub fn outstanding(&self) -> usize {
        self.world
            .lock()
            .objects
            .values()
            .map(|o| o.external_refs)
            .sum()
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Handles released so far, in order.
    pub fn releases(&self) -> Vec<Handle> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Release(h) => Some(*h),
                _ => None,
            })
            .collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Make every subsequent `initialize` fail.
    pub fn set_fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    /// Make every `release` of `handle` fail (without dropping the reference).
    pub fn fail_release_of(&self, handle: Handle) {
        if let Some(obj) = self.world.lock().objects.get_mut(&handle) {
            obj.fail_release = true;
        }
    }

    /// Threads on which `initialize` succeeded, in call order.
    pub fn init_threads(&self) -> Vec<ThreadId> {
        self.init_threads.lock().clone()
    }

    pub fn init_count(&self) -> usize {
        self.init_threads.lock().len()
    }

    pub fn uninit_count(&self) -> usize {
        self.uninit_count.load(Ordering::SeqCst)
    }

    fn log(&self, event: Event) {
        self.events.lock().push(event);
    }

    fn class_for(&self, handle: Handle) -> Result<Option<Arc<MockClass>>, ForeignError> {
        let class = self.world.lock().object(handle)?.class.clone();
        Ok(self.classes.read().get(&class).cloned())
    }

    /// Hand out the object reference carried by `result`, if any.
    fn hand_out_result(&self, result: Variant) -> Result<Variant, ForeignError> {
        if let Variant::Object(h) = result {
            self.world.lock().hand_out(h)?;
        }
        Ok(result)
    }
}

fn unknown_name(name: &str) -> ForeignError {
    ForeignError::new(UNKNOWN_NAME, format!("unknown name: {name}"))
}

impl Runtime for MockRuntime {
    fn initialize(&self) -> Result<(), ForeignError> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(ForeignError::new(FAILED, "runtime unavailable"));
        }
        self.init_threads.lock().push(thread::current().id());
        Ok(())
    }

    fn uninitialize(&self) {
        self.uninit_count.fetch_add(1, Ordering::SeqCst);
    }

    fn create(&self, name: &str) -> Result<Handle, ForeignError> {
        if !self.classes.read().contains_key(name) {
            return Err(ForeignError::new(
                CLASS_NOT_REGISTERED,
                format!("class not registered: {name}"),
            ));
        }
        let handle = {
            let mut world = self.world.lock();
            let handle = world.spawn(name);
            world.hand_out(handle)?;
            handle
        };
        self.log(Event::Create {
            name: name.to_string(),
            handle,
        });
        Ok(handle)
    }

    fn attach_active(&self, name: &str) -> Result<Handle, ForeignError> {
        let handle = {
            let mut world = self.world.lock();
            let handle = *world
                .active
                .get(name)
                .ok_or_else(|| ForeignError::new(FAILED, format!("no active object: {name}")))?;
            world.hand_out(handle)?;
            handle
        };
        self.log(Event::Attach {
            name: name.to_string(),
            handle,
        });
        Ok(handle)
    }

    fn add_ref(&self, handle: Handle) -> Result<(), ForeignError> {
        self.log(Event::AddRef(handle));
        self.world.lock().hand_out(handle)
    }

    fn release(&self, handle: Handle) -> Result<(), ForeignError> {
        self.log(Event::Release(handle));
        let mut world = self.world.lock();
        let obj = world.object_mut(handle)?;
        if obj.fail_release {
            return Err(ForeignError::new(FAILED, format!("release of {handle} failed")));
        }
        if obj.external_refs == 0 {
            return Err(ForeignError::new(
                FAILED,
                format!("release of unreferenced handle {handle}"),
            ));
        }
        obj.external_refs -= 1;
        Ok(())
    }

    fn get_property(
        &self,
        handle: Handle,
        name: &str,
        args: &[Variant],
    ) -> Result<Variant, ForeignError> {
        self.log(Event::Get {
            handle,
            name: name.to_string(),
        });
        let class = self.class_for(handle)?;
        let result = match class.as_ref().and_then(|c| c.getters.get(name)) {
            Some(getter) => getter(&mut self.world.lock(), handle, args)?,
            None => self
                .world
                .lock()
                .property(handle, name)
                .cloned()
                .ok_or_else(|| unknown_name(name))?,
        };
        self.hand_out_result(result)
    }

    fn put_property(
        &self,
        handle: Handle,
        name: &str,
        args: &[Variant],
    ) -> Result<(), ForeignError> {
        let value = args
            .last()
            .cloned()
            .ok_or_else(|| ForeignError::new(FAILED, format!("no value to assign to {name}")))?;
        self.log(Event::Put {
            handle,
            name: name.to_string(),
            value: value.clone(),
        });
        let mut world = self.world.lock();
        world.object(handle)?;
        world.set_property(handle, name, value);
        Ok(())
    }

    fn call_method(
        &self,
        handle: Handle,
        name: &str,
        args: &[Variant],
    ) -> Result<Variant, ForeignError> {
        self.log(Event::Call {
            handle,
            name: name.to_string(),
            args: args.to_vec(),
        });
        let method = self
            .class_for(handle)?
            .and_then(|c| c.methods.get(name).cloned())
            .ok_or_else(|| unknown_name(name))?;
        let result = method(&mut self.world.lock(), handle, args)?;
        self.hand_out_result(result)
    }

    fn enumerate(&self, handle: Handle) -> Result<Elements<'_>, ForeignError> {
        self.log(Event::Enumerate(handle));
        let items = self.world.lock().object(handle)?.items.clone();
        Ok(Box::new(items.into_iter().map(move |item| {
            self.world.lock().hand_out(item)?;
            Ok(item)
        })))
    }
}
