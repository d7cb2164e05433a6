//! Dispatch invoker and the scripting-facing call hooks
//!
//! Every hook follows the same frame layout: the receiver (or the method
//! proxy followed by the receiver) sits at the bottom, the member name next
//! when it is not bound already, and the call arguments fill the rest of the
//! frame. Hooks never raise into the script: a failure is returned as the
//! pair `(nil, message)`.

use std::sync::Arc;

use luaole_sdk::{Automation, GenericValue, NativeHandle, ScriptStack, SlotType};

use crate::error::{BridgeError, BridgeResult};
use crate::proxy::{method_name_at, receiver_at, ObjectProxy};
use crate::session::Session;

/// What a dispatch does with the member name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// Call a method
    Method,
    /// Read a property, optionally indexed
    PropertyGet,
    /// Write a property; the last argument is the new value
    PropertyPut,
}

/// Performs named calls against a receiver handle
pub struct Invoker<'a> {
    session: &'a Arc<Session>,
}

impl<'a> Invoker<'a> {
    /// Create an invoker for a session
    pub fn new(session: &'a Arc<Session>) -> Self {
        Invoker { session }
    }

    /// Dispatch `name` against `receiver` with the arguments at
    /// `first_arg..=top`, then push the result.
    ///
    /// A native handle result is pushed as a new object proxy. A property
    /// put pushes `true`. Returns the number of values pushed.
    pub fn invoke(
        &self,
        stack: &mut dyn ScriptStack,
        receiver: NativeHandle,
        name: &str,
        kind: DispatchKind,
        first_arg: i32,
    ) -> BridgeResult<usize> {
        let top = stack.top();
        let args = self.session.converter().pull_args(stack, first_arg, top)?;
        let automation = self.session.automation();

        match kind {
            DispatchKind::Method => {
                let result = automation.call_method(receiver, name, &args)?;
                self.push_result(stack, result)
            }
            DispatchKind::PropertyGet => {
                let result = automation.get_property(receiver, name, &args)?;
                self.push_result(stack, result)
            }
            DispatchKind::PropertyPut => {
                automation.put_property(receiver, name, &args)?;
                stack.push_bool(true);
                Ok(1)
            }
        }
    }

    fn push_result(&self, stack: &mut dyn ScriptStack, result: GenericValue) -> BridgeResult<usize> {
        match result {
            GenericValue::NativeHandle(handle) => {
                Ok(ObjectProxy::new(self.session.clone(), handle).push(stack))
            }
            other => {
                release_nested(self.session.automation(), &other);
                Ok(self.session.converter().push_value(stack, &other)?)
            }
        }
    }
}

/// Give back every handle nested in a table result. The converter omits them
/// from the pushed table, and each one carries a reference the caller owns.
fn release_nested(automation: &dyn Automation, value: &GenericValue) {
    let GenericValue::Table(entries) = value else {
        return;
    };
    for entry in entries.values() {
        match entry {
            GenericValue::NativeHandle(handle) => {
                log::debug!(
                    "releasing automation object {:#x} nested in a table result",
                    handle.as_raw()
                );
                automation.release(*handle);
            }
            nested => release_nested(automation, nested),
        }
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// `_call` hook: `receiver, name, args...`
pub(crate) fn call_by_name(stack: &mut dyn ScriptStack) -> usize {
    let result = named_dispatch(stack, DispatchKind::Method);
    finish(stack, "_call", result)
}

/// `_get` hook: `receiver, name, index...`
pub(crate) fn property_get(stack: &mut dyn ScriptStack) -> usize {
    let result = named_dispatch(stack, DispatchKind::PropertyGet);
    finish(stack, "_get", result)
}

/// `_set` hook: `receiver, name, index..., value`
pub(crate) fn property_set(stack: &mut dyn ScriptStack) -> usize {
    let result = named_dispatch(stack, DispatchKind::PropertyPut);
    finish(stack, "_set", result)
}

/// Method proxy call hook: `method, receiver, args...`
pub(crate) fn call_bound_method(stack: &mut dyn ScriptStack) -> usize {
    let result = bound_dispatch(stack);
    finish(stack, "method call", result)
}

fn named_dispatch(stack: &mut dyn ScriptStack, kind: DispatchKind) -> BridgeResult<usize> {
    let (session, receiver) = receiver_at(stack, 1)?;
    let name = string_arg(stack, 2)?;
    Invoker::new(&session).invoke(stack, receiver, &name, kind, 3)
}

fn bound_dispatch(stack: &mut dyn ScriptStack) -> BridgeResult<usize> {
    let name = method_name_at(stack, 1)
        .filter(|name| !name.is_empty())
        .ok_or(BridgeError::NullMethod)?;
    let (session, receiver) = receiver_at(stack, 2)?;
    Invoker::new(&session).invoke(stack, receiver, &name, DispatchKind::Method, 3)
}

/// String argument at `index`
pub(crate) fn string_arg(stack: &dyn ScriptStack, index: i32) -> BridgeResult<String> {
    if stack.slot_type(index) != SlotType::String {
        return Err(BridgeError::MissingName(index));
    }
    stack
        .to_bytes(index)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .ok_or(BridgeError::MissingName(index))
}

/// Turn a hook outcome into its result count, pushing `(nil, message)` on
/// failure.
pub(crate) fn finish(
    stack: &mut dyn ScriptStack,
    context: &str,
    result: BridgeResult<usize>,
) -> usize {
    match result {
        Ok(n) => n,
        Err(err) => {
            log::debug!("{} failed: {}", context, err);
            stack.push_nil();
            stack.push_bytes(err.to_string().as_bytes());
            2
        }
    }
}
