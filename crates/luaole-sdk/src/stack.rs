//! ScriptStack trait - the scripting runtime as a capability interface
//!
//! The bridge never touches the runtime's internals. Everything it needs
//! (pushing and reading values, table iteration, chunk loading, raw blocks,
//! host objects) goes through this trait, which the embedding runtime
//! implements.
//!
//! # Indices
//!
//! Positive indices are 1-based from the bottom of the current frame.
//! Negative indices count down from the top (`-1` is the top slot).

use crate::error::StackResult;
use crate::host::{HostCell, HostFn};
use crate::value::{LightRef, NativeFnAddr};

/// Type tag of a stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotType {
    /// Index does not name a slot
    None,
    /// Nil
    Nil,
    /// Boolean
    Boolean,
    /// Light reference
    LightUserData,
    /// Number (integer or float)
    Number,
    /// String
    String,
    /// Table
    Table,
    /// Function (host or script)
    Function,
    /// Managed userdata (raw block or host object)
    UserData,
    /// Coroutine
    Thread,
}

impl SlotType {
    /// Get type name for diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            SlotType::None => "no value",
            SlotType::Nil => "nil",
            SlotType::Boolean => "boolean",
            SlotType::LightUserData => "light userdata",
            SlotType::Number => "number",
            SlotType::String => "string",
            SlotType::Table => "table",
            SlotType::Function => "function",
            SlotType::UserData => "userdata",
            SlotType::Thread => "thread",
        }
    }
}

/// Abstract scripting stack.
pub trait ScriptStack {
    // ========================================================================
    // Depth
    // ========================================================================

    /// Number of slots in the current frame
    fn top(&self) -> i32;

    /// Set the number of slots in the current frame, filling with nil when
    /// growing. Negative values count from the top as with any index.
    fn set_top(&mut self, index: i32);

    /// Pop `n` values
    fn pop(&mut self, n: i32) {
        self.set_top(-n - 1);
    }

    /// Type tag of the slot at `index`
    fn slot_type(&self, index: i32) -> SlotType;

    // ========================================================================
    // Push
    // ========================================================================

    /// Push nil
    fn push_nil(&mut self);

    /// Push a boolean
    fn push_bool(&mut self, b: bool);

    /// Push an integer
    fn push_integer(&mut self, i: i64);

    /// Push a string made of raw bytes
    fn push_bytes(&mut self, bytes: &[u8]);

    /// Push a light reference
    fn push_light(&mut self, light: LightRef);

    /// Push a host function captured earlier by address
    fn push_native_function(&mut self, addr: NativeFnAddr);

    /// Push a host function
    fn push_host_function(&mut self, func: HostFn);

    /// Push a host object. The runtime takes shared ownership and calls
    /// `HostObject::finalize` when it collects the value.
    fn push_host_object(&mut self, obj: HostCell);

    /// Push a new empty table
    fn new_table(&mut self);

    /// Pop a key and a value (value on top) and store them raw into the table
    /// at `table`
    fn raw_set(&mut self, table: i32) -> StackResult<()>;

    /// Allocate a managed block of `len` bytes, let `fill` write it, and push it
    fn new_block(&mut self, len: usize, fill: &mut dyn FnMut(&mut [u8]));

    /// Load a chunk and push the resulting function
    fn load_chunk(&mut self, name: &str, chunk: &[u8]) -> StackResult<()>;

    // ========================================================================
    // Read
    // ========================================================================

    /// Read an integer. `None` if the value is not representable as one.
    fn to_integer(&self, index: i32) -> Option<i64>;

    /// Read string bytes. `None` if the value is not a string.
    fn to_bytes(&self, index: i32) -> Option<Vec<u8>>;

    /// Truthiness of the value
    fn to_bool(&self, index: i32) -> bool;

    /// Read a light reference
    fn to_light(&self, index: i32) -> Option<LightRef>;

    /// Address of a host function. `None` for script functions.
    fn to_native_function(&self, index: i32) -> Option<NativeFnAddr>;

    /// Serialize the script function at `index` into a bytecode chunk
    fn dump_function(&self, index: i32) -> StackResult<Vec<u8>>;

    /// Runtime-reported length of the value (string length, block size,
    /// table border)
    fn raw_len(&self, index: i32) -> usize;

    /// Bytes of a raw managed block. `None` for anything else.
    fn block_bytes(&self, index: i32) -> Option<Vec<u8>>;

    /// Test whether the slot holds a host object tagged `type_name`.
    ///
    /// Returns `Ok(None)` for any other value and `Err` when the check cannot
    /// be performed at all.
    fn test_host_object(&self, index: i32, type_name: &str) -> StackResult<Option<HostCell>>;

    // ========================================================================
    // Tables and globals
    // ========================================================================

    /// Table iteration step. Pops a key and pushes the next key and value of
    /// the table at `table`; returns `false` (pushing nothing) at the end.
    fn next(&mut self, table: i32) -> bool;

    /// Pop the top value and store it as the global `name`
    fn set_global(&mut self, name: &str);
}
