//! luaole SDK - collaborator interfaces for the dispatch bridge
//!
//! This crate provides the minimal types and traits shared by the bridge and
//! the runtimes it connects, without depending on either side's internals:
//!
//! - [`ScriptStack`]: the scripting runtime, seen as a stack machine
//! - [`Automation`]: the native late-bound object runtime
//! - [`HostObject`]: opaque scripting values backed by Rust data
//! - [`GenericValue`]: the tagged value moved across the boundary

#![warn(missing_docs)]

pub mod automation;
pub mod error;
pub mod host;
pub mod stack;
pub mod value;

pub use automation::Automation;
pub use error::{NativeError, NativeResult, StackError, StackResult};
pub use host::{host_cell, host_fn_addr, HostCell, HostFn, HostFunctionRegistry, HostObject, Member};
pub use stack::{ScriptStack, SlotType};
pub use value::{FunctionValue, GenericValue, LightRef, NativeFnAddr, NativeHandle, Table};
