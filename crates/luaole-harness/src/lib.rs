//! In-memory collaborators for the luaole bridge
//!
//! [`MemoryState`] stands in for the scripting runtime and
//! [`MemoryAutomation`] for the native automation runtime. Together they let
//! the bridge run without an embedded interpreter or a native object system,
//! which is how the bridge's own tests drive it.

pub mod automation;
pub mod state;

pub use automation::{
    CallKind, CallRecord, CallScope, ClassDef, MemoryAutomation, MethodFn, CO_E_CLASSSTRING,
    DISP_E_UNKNOWNNAME, E_NOINTERFACE,
};
pub use state::{MemoryState, CHUNK_SIGNATURE};
