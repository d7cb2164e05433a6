//! Host objects and host functions - the metaprotocol seen by the runtime
//!
//! A host object is an opaque scripting value backed by Rust data. The
//! scripting runtime drives it through three hooks:
//!
//! - `index`: member lookup when script code writes `obj.Name` or `obj["Name"]`
//! - `call_hook`: invoked when script code calls the value
//! - `finalize`: run by the collector before the value is freed
//!
//! Member lookup answers with a [`Member`] instead of manipulating the stack,
//! so the runtime stays in charge of how results are installed.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::stack::ScriptStack;
use crate::value::NativeFnAddr;

// ============================================================================
// Host functions
// ============================================================================

/// A host function callable from script code.
///
/// Arguments occupy positions `1..=top` of a fresh frame. The function pushes
/// its results and returns how many it pushed.
pub type HostFn = Arc<dyn Fn(&mut dyn ScriptStack) -> usize + Send + Sync>;

/// Shared cell holding a host object.
pub type HostCell = Arc<Mutex<dyn HostObject>>;

/// Stable address of a host function, used as its identity by the runtime
pub fn host_fn_addr(f: &HostFn) -> NativeFnAddr {
    NativeFnAddr::from_addr(Arc::as_ptr(f) as *const () as usize)
}

/// Box a host object into a shareable cell
pub fn host_cell<T: HostObject>(obj: T) -> HostCell {
    Arc::new(Mutex::new(obj))
}

// ============================================================================
// Host objects
// ============================================================================

/// Result of a member lookup on a host object
pub enum Member {
    /// No such member
    Nil,
    /// A callable member
    Function(HostFn),
    /// A member that is itself a host object
    Object(HostCell),
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Member::Nil => write!(f, "Member::Nil"),
            Member::Function(func) => write!(f, "Member::Function({:#x})", host_fn_addr(func).addr()),
            Member::Object(cell) => write!(f, "Member::Object({})", cell.lock().type_name()),
        }
    }
}

/// Opaque scripting value backed by Rust data.
pub trait HostObject: Any + Send {
    /// Type tag checked by `ScriptStack::test_host_object`
    fn type_name(&self) -> &'static str;

    /// Member lookup hook
    fn index(&self, _name: &str) -> Member {
        Member::Nil
    }

    /// Call hook. When present, calling the value runs this function with the
    /// value itself at position 1 followed by the call arguments.
    fn call_hook(&self) -> Option<HostFn> {
        None
    }

    /// Collector hook. May run more than once; implementations must tolerate it.
    fn finalize(&mut self) {}

    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// Host function registry (address-based lookup)
// ============================================================================

/// Registry of host functions indexed by address.
///
/// Runtimes use it to turn a `NativeFnAddr` captured from a function value
/// back into something callable.
#[derive(Default)]
pub struct HostFunctionRegistry {
    handlers: HashMap<NativeFnAddr, HostFn>,
}

impl HostFunctionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host function, returning its address. Registering the same
    /// function twice yields the same address.
    pub fn register(&mut self, func: HostFn) -> NativeFnAddr {
        let addr = host_fn_addr(&func);
        self.handlers.entry(addr).or_insert(func);
        addr
    }

    /// Get a host function by address
    pub fn get(&self, addr: NativeFnAddr) -> Option<HostFn> {
        self.handlers.get(&addr).cloned()
    }

    /// Check if an address is registered
    pub fn contains(&self, addr: NativeFnAddr) -> bool {
        self.handlers.contains_key(&addr)
    }

    /// Get the number of registered functions
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
