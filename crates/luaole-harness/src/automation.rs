//! MemoryAutomation - an in-memory `Automation` host
//!
//! Classes are registered up front with their methods and properties.
//! Every object keeps a reference count, and every dispatch is written to a
//! journal, so tests can check which receiver a call reached and that each
//! reference was given back exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use luaole_sdk::{Automation, GenericValue, NativeError, NativeHandle, NativeResult};

/// Status code reported for unknown member names
pub const DISP_E_UNKNOWNNAME: i32 = 0x8002_0006_u32 as i32;
/// Status code reported for unknown class identifiers
pub const CO_E_CLASSSTRING: i32 = 0x8004_01F3_u32 as i32;
/// Status code reported when an object has no dispatch interface
pub const E_NOINTERFACE: i32 = 0x8000_4002_u32 as i32;

/// Method implementation
pub type MethodFn =
    Arc<dyn Fn(&mut CallScope<'_>, &[GenericValue]) -> NativeResult<GenericValue> + Send + Sync>;

// ============================================================================
// Classes
// ============================================================================

/// Class definition, built with the builder methods.
#[derive(Clone)]
pub struct ClassDef {
    name: String,
    methods: HashMap<String, MethodFn>,
    properties: HashMap<String, GenericValue>,
    dispatch: bool,
}

impl ClassDef {
    /// Start a class definition
    pub fn new(name: &str) -> Self {
        ClassDef {
            name: name.to_string(),
            methods: HashMap::new(),
            properties: HashMap::new(),
            dispatch: true,
        }
    }

    /// Add a method
    pub fn method(
        mut self,
        name: &str,
        f: impl Fn(&mut CallScope<'_>, &[GenericValue]) -> NativeResult<GenericValue>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.methods.insert(name.to_string(), Arc::new(f));
        self
    }

    /// Add a property with its initial value
    pub fn property(mut self, name: &str, initial: GenericValue) -> Self {
        self.properties.insert(name.to_string(), initial);
        self
    }

    /// Instances of this class refuse the dispatch interface
    pub fn without_dispatch(mut self) -> Self {
        self.dispatch = false;
        self
    }
}

// ============================================================================
// Journal
// ============================================================================

/// Kind of a journaled dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Method call
    Method,
    /// Property read
    Get,
    /// Property write
    Put,
}

/// One journaled dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    /// Receiver the call reached
    pub receiver: NativeHandle,
    /// Dispatch kind
    pub kind: CallKind,
    /// Member name
    pub name: String,
    /// Arguments as received
    pub args: Vec<GenericValue>,
}

// ============================================================================
// Objects
// ============================================================================

struct ObjectRecord {
    class: String,
    refs: usize,
    properties: HashMap<String, GenericValue>,
}

#[derive(Default)]
struct Inner {
    classes: HashMap<String, ClassDef>,
    objects: HashMap<u64, ObjectRecord>,
    next_id: u64,
    init_count: usize,
    init_error: Option<NativeError>,
    over_releases: usize,
    journal: Vec<CallRecord>,
}

impl Inner {
    fn spawn(&mut self, class: &str) -> NativeResult<NativeHandle> {
        let def = self
            .classes
            .get(class)
            .ok_or_else(|| NativeError::with_code("Invalid class string", CO_E_CLASSSTRING))?;
        let properties = def.properties.clone();
        self.next_id += 1;
        let id = self.next_id;
        self.objects.insert(
            id,
            ObjectRecord {
                class: class.to_string(),
                refs: 1,
                properties,
            },
        );
        Ok(NativeHandle::from_raw(id))
    }

    fn live(&mut self, handle: NativeHandle) -> NativeResult<&mut ObjectRecord> {
        match self.objects.get_mut(&handle.as_raw()) {
            Some(record) if record.refs > 0 => Ok(record),
            _ => Err(NativeError::new(format!(
                "object {:#x} has been released",
                handle.as_raw()
            ))),
        }
    }
}

/// Access to the host from inside a method implementation
pub struct CallScope<'a> {
    inner: &'a mut Inner,
    receiver: NativeHandle,
}

impl CallScope<'_> {
    /// Object the method was called on
    pub fn receiver(&self) -> NativeHandle {
        self.receiver
    }

    /// Instantiate another registered class. The caller owns one reference.
    pub fn create(&mut self, class: &str) -> NativeResult<NativeHandle> {
        self.inner.spawn(class)
    }

    /// Take an extra reference on a live object
    pub fn add_ref(&mut self, handle: NativeHandle) -> NativeResult<NativeHandle> {
        self.inner.live(handle)?.refs += 1;
        Ok(handle)
    }

    /// Read a property of the receiver
    pub fn property(&mut self, name: &str) -> GenericValue {
        let receiver = self.receiver;
        self.inner
            .live(receiver)
            .ok()
            .and_then(|record| record.properties.get(name).cloned())
            .unwrap_or_default()
    }

    /// Write a property of the receiver
    pub fn set_property(&mut self, name: &str, value: GenericValue) {
        let receiver = self.receiver;
        if let Ok(record) = self.inner.live(receiver) {
            record.properties.insert(name.to_string(), value);
        }
    }
}

// ============================================================================
// MemoryAutomation
// ============================================================================

/// In-memory automation host.
#[derive(Default)]
pub struct MemoryAutomation {
    inner: Mutex<Inner>,
}

impl MemoryAutomation {
    /// Create a host with no classes
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class under its identifier
    pub fn register(&self, class: ClassDef) {
        self.inner.lock().classes.insert(class.name.clone(), class);
    }

    /// Make every `initialize` call fail with `error`
    pub fn fail_initialization(&self, error: NativeError) {
        self.inner.lock().init_error = Some(error);
    }

    /// Number of `initialize` calls seen
    pub fn init_count(&self) -> usize {
        self.inner.lock().init_count
    }

    /// Current reference count of an object (0 once fully released)
    pub fn ref_count(&self, handle: NativeHandle) -> usize {
        self.inner
            .lock()
            .objects
            .get(&handle.as_raw())
            .map_or(0, |record| record.refs)
    }

    /// Number of objects with at least one outstanding reference
    pub fn live_objects(&self) -> usize {
        self.inner
            .lock()
            .objects
            .values()
            .filter(|record| record.refs > 0)
            .count()
    }

    /// Number of `release` calls on objects that had no references left
    pub fn over_releases(&self) -> usize {
        self.inner.lock().over_releases
    }

    /// Class identifier of an object
    pub fn class_of(&self, handle: NativeHandle) -> Option<String> {
        self.inner
            .lock()
            .objects
            .get(&handle.as_raw())
            .map(|record| record.class.clone())
    }

    /// Read a property directly, bypassing the journal
    pub fn property(&self, handle: NativeHandle, name: &str) -> Option<GenericValue> {
        self.inner
            .lock()
            .objects
            .get(&handle.as_raw())
            .and_then(|record| record.properties.get(name).cloned())
    }

    /// Journaled dispatches, oldest first
    pub fn calls(&self) -> Vec<CallRecord> {
        self.inner.lock().journal.clone()
    }

    fn journal(
        inner: &mut Inner,
        receiver: NativeHandle,
        kind: CallKind,
        name: &str,
        args: &[GenericValue],
    ) {
        inner.journal.push(CallRecord {
            receiver,
            kind,
            name: name.to_string(),
            args: args.to_vec(),
        });
    }
}

fn unknown_name() -> NativeError {
    NativeError::with_code("Unknown name.", DISP_E_UNKNOWNNAME)
}

fn index_key(arg: &GenericValue) -> Vec<u8> {
    match arg {
        GenericValue::StringBlob(bytes) => bytes.clone(),
        GenericValue::Integer(i) => i.to_string().into_bytes(),
        _ => Vec::new(),
    }
}

impl Automation for MemoryAutomation {
    fn initialize(&self) -> NativeResult<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.init_count += 1;
        match &inner.init_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn create_instance(&self, identifier: &str) -> NativeResult<NativeHandle> {
        self.inner.lock().spawn(identifier)
    }

    fn query_dispatch(&self, instance: NativeHandle) -> NativeResult<NativeHandle> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let class = inner.live(instance)?.class.clone();
        let dispatch = inner.classes.get(&class).is_some_and(|def| def.dispatch);
        if !dispatch {
            return Err(NativeError::with_code(
                "No such interface supported",
                E_NOINTERFACE,
            ));
        }
        inner.live(instance)?.refs += 1;
        Ok(instance)
    }

    fn release(&self, handle: NativeHandle) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.objects.get_mut(&handle.as_raw()) {
            Some(record) if record.refs > 0 => record.refs -= 1,
            _ => inner.over_releases += 1,
        }
    }

    fn call_method(
        &self,
        receiver: NativeHandle,
        name: &str,
        args: &[GenericValue],
    ) -> NativeResult<GenericValue> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        Self::journal(inner, receiver, CallKind::Method, name, args);
        let class = inner.live(receiver)?.class.clone();
        let method = inner
            .classes
            .get(&class)
            .and_then(|def| def.methods.get(name).cloned())
            .ok_or_else(unknown_name)?;
        let mut scope = CallScope { inner, receiver };
        method(&mut scope, args)
    }

    fn get_property(
        &self,
        receiver: NativeHandle,
        name: &str,
        index_args: &[GenericValue],
    ) -> NativeResult<GenericValue> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        Self::journal(inner, receiver, CallKind::Get, name, index_args);
        let record = inner.live(receiver)?;
        let value = record.properties.get(name).ok_or_else(unknown_name)?;
        let value = match index_args.first() {
            None => value.clone(),
            Some(key) => match value {
                GenericValue::Table(entries) => {
                    entries.get(&index_key(key)).cloned().unwrap_or_default()
                }
                _ => return Err(NativeError::new("Property is not indexed")),
            },
        };
        // The caller owns any object reference it receives
        if let GenericValue::NativeHandle(h) = value {
            inner.live(h)?.refs += 1;
        }
        Ok(value)
    }

    fn put_property(
        &self,
        receiver: NativeHandle,
        name: &str,
        value_args: &[GenericValue],
    ) -> NativeResult<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        Self::journal(inner, receiver, CallKind::Put, name, value_args);
        let record = inner.live(receiver)?;
        let Some((value, index)) = value_args.split_last() else {
            return Err(NativeError::new("Invalid number of parameters."));
        };
        let slot = record.properties.get_mut(name).ok_or_else(unknown_name)?;
        match index.first() {
            None => *slot = value.clone(),
            Some(key) => match slot {
                GenericValue::Table(entries) => {
                    entries.insert(index_key(key), value.clone());
                }
                _ => return Err(NativeError::new("Property is not indexed")),
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> MemoryAutomation {
        let host = MemoryAutomation::new();
        host.register(
            ClassDef::new("Test.Counter")
                .property("Count", GenericValue::Integer(0))
                .method("Increment", |scope, _args| {
                    let next = scope.property("Count").as_integer().unwrap_or(0) + 1;
                    scope.set_property("Count", GenericValue::Integer(next));
                    Ok(GenericValue::Integer(next))
                }),
        );
        host
    }

    #[test]
    fn test_instance_reference_counting() {
        let host = host();
        let instance = host.create_instance("Test.Counter").unwrap();
        let dispatch = host.query_dispatch(instance).unwrap();
        assert_eq!(host.ref_count(dispatch), 2);
        host.release(instance);
        host.release(dispatch);
        assert_eq!(host.ref_count(dispatch), 0);
        assert_eq!(host.live_objects(), 0);
        host.release(dispatch);
        assert_eq!(host.over_releases(), 1);
    }

    #[test]
    fn test_unknown_class() {
        let host = host();
        let err = host.create_instance("No.Such").unwrap_err();
        assert_eq!(err.code, Some(CO_E_CLASSSTRING));
    }

    #[test]
    fn test_methods_and_journal() {
        let host = host();
        let h = host.create_instance("Test.Counter").unwrap();
        assert_eq!(
            host.call_method(h, "Increment", &[]).unwrap(),
            GenericValue::Integer(1)
        );
        assert_eq!(
            host.get_property(h, "Count", &[]).unwrap(),
            GenericValue::Integer(1)
        );
        let err = host.call_method(h, "Missing", &[]).unwrap_err();
        assert_eq!(err.code, Some(DISP_E_UNKNOWNNAME));

        let calls = host.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].kind, CallKind::Method);
        assert_eq!(calls[0].receiver, h);
    }

    #[test]
    fn test_calls_on_released_object_fail() {
        let host = host();
        let h = host.create_instance("Test.Counter").unwrap();
        host.release(h);
        assert!(host.call_method(h, "Increment", &[]).is_err());
    }
}
