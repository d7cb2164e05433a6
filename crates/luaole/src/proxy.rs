//! Object and method proxies
//!
//! An [`ObjectProxy`] is the script-side face of one native dispatch handle.
//! Member lookup on it never talks to the native side: any name other than
//! the control names `_call`, `_set` and `_get` yields a [`MethodProxy`] that
//! only remembers the name. The receiver is supplied again when the method
//! is called, which is what makes `obj:Method(...)` work and also lets a
//! method looked up on one object be invoked against another.

use std::any::Any;
use std::sync::Arc;

use once_cell::sync::Lazy;

use luaole_sdk::{host_cell, HostFn, HostObject, Member, NativeHandle, ScriptStack, SlotType};

use crate::error::{BridgeError, BridgeResult, ConversionError};
use crate::invoke;
use crate::session::Session;

/// Type tag of object proxies
pub const OBJECT_TYPE: &str = "OLE_OBJECT";

/// Type tag of method proxies
pub const METHOD_TYPE: &str = "OLE_METHOD";

/// Control name for a name-directed method call
pub const CALL_NAME: &str = "_call";

/// Control name for a property write
pub const SET_NAME: &str = "_set";

/// Control name for a property read
pub const GET_NAME: &str = "_get";

// ============================================================================
// Hook singletons
// ============================================================================

static CALL_BY_NAME: Lazy<HostFn> = Lazy::new(|| Arc::new(invoke::call_by_name));
static PROPERTY_SET: Lazy<HostFn> = Lazy::new(|| Arc::new(invoke::property_set));
static PROPERTY_GET: Lazy<HostFn> = Lazy::new(|| Arc::new(invoke::property_get));
static CALL_BOUND_METHOD: Lazy<HostFn> = Lazy::new(|| Arc::new(invoke::call_bound_method));

/// Callable installed for `_call`
pub fn call_by_name_fn() -> HostFn {
    CALL_BY_NAME.clone()
}

/// Callable installed for `_set`
pub fn property_set_fn() -> HostFn {
    PROPERTY_SET.clone()
}

/// Callable installed for `_get`
pub fn property_get_fn() -> HostFn {
    PROPERTY_GET.clone()
}

// ============================================================================
// ObjectProxy
// ============================================================================

/// Owner of one native dispatch handle.
///
/// The handle is given back to the automation runtime exactly once, by
/// whichever of `finalize`, [`ObjectProxy::release`] or `Drop` runs first.
#[derive(Debug)]
pub struct ObjectProxy {
    handle: Option<NativeHandle>,
    session: Arc<Session>,
}

impl ObjectProxy {
    /// Take ownership of `handle`
    pub fn new(session: Arc<Session>, handle: NativeHandle) -> Self {
        ObjectProxy {
            handle: Some(handle),
            session,
        }
    }

    /// The owned handle, `None` once released
    pub fn handle(&self) -> Option<NativeHandle> {
        self.handle
    }

    /// Session the proxy belongs to
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Whether the handle has been given back
    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Give the handle back to the automation runtime. No-op when already
    /// released.
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("releasing automation object {:#x}", handle.as_raw());
            self.session.automation().release(handle);
        }
    }

    /// Install the proxy on the stack as a host object. Returns 1.
    pub fn push(self, stack: &mut dyn ScriptStack) -> usize {
        stack.push_host_object(host_cell(self));
        1
    }
}

impl HostObject for ObjectProxy {
    fn type_name(&self) -> &'static str {
        OBJECT_TYPE
    }

    fn index(&self, name: &str) -> Member {
        match name {
            CALL_NAME => Member::Function(call_by_name_fn()),
            SET_NAME => Member::Function(property_set_fn()),
            GET_NAME => Member::Function(property_get_fn()),
            _ => Member::Object(host_cell(MethodProxy::new(name))),
        }
    }

    fn finalize(&mut self) {
        self.release();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for ObjectProxy {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// MethodProxy
// ============================================================================

/// A method name waiting for its receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodProxy {
    name: String,
}

impl MethodProxy {
    /// Bind a method name
    pub fn new(name: impl Into<String>) -> Self {
        MethodProxy { name: name.into() }
    }

    /// The method name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl HostObject for MethodProxy {
    fn type_name(&self) -> &'static str {
        METHOD_TYPE
    }

    fn call_hook(&self) -> Option<HostFn> {
        Some(CALL_BOUND_METHOD.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Stack lookups
// ============================================================================

/// Session and live handle of the object proxy at `index`.
///
/// Anything other than an unreleased object proxy, including an absent
/// slot, is a null receiver. The proxy's lock is dropped before returning.
pub(crate) fn receiver_at(
    stack: &dyn ScriptStack,
    index: i32,
) -> BridgeResult<(Arc<Session>, NativeHandle)> {
    if stack.slot_type(index) == SlotType::None {
        return Err(BridgeError::NullReceiver);
    }
    let cell = stack
        .test_host_object(index, OBJECT_TYPE)
        .map_err(ConversionError::TypeCheck)?
        .ok_or(BridgeError::NullReceiver)?;
    let obj = cell.lock();
    let proxy = obj
        .as_any()
        .downcast_ref::<ObjectProxy>()
        .ok_or(BridgeError::NullReceiver)?;
    let handle = proxy.handle().ok_or(BridgeError::NullReceiver)?;
    Ok((proxy.session().clone(), handle))
}

/// Name carried by the method proxy at `index`, if any
pub(crate) fn method_name_at(stack: &dyn ScriptStack, index: i32) -> Option<String> {
    let cell = stack.test_host_object(index, METHOD_TYPE).ok()??;
    let obj = cell.lock();
    obj.as_any()
        .downcast_ref::<MethodProxy>()
        .map(|method| method.name().to_string())
}
