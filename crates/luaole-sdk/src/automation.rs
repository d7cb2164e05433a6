//! Automation trait - the native late-bound object runtime
//!
//! Defines the calls the bridge makes into the native side: subsystem
//! initialization, object instantiation, reference management and
//! name-based member invocation. Results are `GenericValue`s; a
//! `GenericValue::NativeHandle` result marks a dispatch-capable object that
//! the bridge wraps in a new proxy.

use crate::error::NativeResult;
use crate::value::{GenericValue, NativeHandle};

/// Abstract automation runtime.
///
/// Every handle returned by `create_instance`, `query_dispatch`, or inside a
/// call result carries one reference owned by the caller, which must give it
/// back through `release` exactly once.
pub trait Automation: Send + Sync {
    /// Initialize the automation subsystem for the calling process
    fn initialize(&self) -> NativeResult<()>;

    /// Instantiate an object by class/program identifier
    fn create_instance(&self, identifier: &str) -> NativeResult<NativeHandle>;

    /// Acquire the dispatch-capable reference of an instantiated object
    fn query_dispatch(&self, instance: NativeHandle) -> NativeResult<NativeHandle>;

    /// Give back one reference
    fn release(&self, handle: NativeHandle);

    /// Call a named method with positional arguments
    fn call_method(
        &self,
        receiver: NativeHandle,
        name: &str,
        args: &[GenericValue],
    ) -> NativeResult<GenericValue>;

    /// Read a named property, with optional index arguments
    fn get_property(
        &self,
        receiver: NativeHandle,
        name: &str,
        index_args: &[GenericValue],
    ) -> NativeResult<GenericValue>;

    /// Write a named property. The last value is the assigned value; any
    /// before it are index arguments.
    fn put_property(
        &self,
        receiver: NativeHandle,
        name: &str,
        value_args: &[GenericValue],
    ) -> NativeResult<()>;
}
