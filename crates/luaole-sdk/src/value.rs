//! GenericValue - the tagged value moved across the scripting/native boundary
//!
//! Script values are pulled into a `GenericValue` before they reach the
//! automation runtime, and automation results come back as a `GenericValue`
//! before they are pushed onto the script stack.
//!
//! # Variants
//!
//! ```text
//! Nil             absent value
//! Bool            boolean
//! Integer         signed 64-bit integer (no floating semantics)
//! StringBlob      script string, raw bytes (not guaranteed UTF-8)
//! Function        host function address, or a dumped script chunk
//! LightReference  unmanaged pointer-sized value
//! RawBlob         bytes of an opaque managed block
//! Table           ordered map, keys coerced to byte strings
//! NativeHandle    dispatch-capable native object (proxy boundary only)
//! ```

use indexmap::IndexMap;

// ============================================================================
// Handles
// ============================================================================

/// Opaque reference to a native automation object.
///
/// The bridge never interprets the bits. Ownership is tracked by whoever
/// holds the handle: the object proxy that wraps it, or the automation call
/// that borrows it as an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// Create from the collaborator's raw reference bits
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw reference bits
    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// Unmanaged pointer-sized reference. No ownership is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct LightRef(usize);

impl LightRef {
    /// Wrap a raw address
    #[inline]
    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address
    #[inline]
    pub const fn addr(self) -> usize {
        self.0
    }
}

/// Address of a host (non-script) function known to the scripting runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NativeFnAddr(usize);

impl NativeFnAddr {
    /// Wrap a raw function address
    #[inline]
    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw function address
    #[inline]
    pub const fn addr(self) -> usize {
        self.0
    }
}

// ============================================================================
// GenericValue
// ============================================================================

/// A captured function value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionValue {
    /// Host function, reinstalled by address
    Native(NativeFnAddr),
    /// Script function, serialized as a bytecode chunk
    Bytecode(Vec<u8>),
}

/// Ordered table representation. Keys are byte strings.
pub type Table = IndexMap<Vec<u8>, GenericValue>;

/// Tagged value shared by the converter and the dispatch invoker.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GenericValue {
    /// Absent value
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer
    Integer(i64),
    /// Script string bytes
    StringBlob(Vec<u8>),
    /// Captured function
    Function(FunctionValue),
    /// Unmanaged reference
    LightReference(LightRef),
    /// Bytes of an opaque managed block
    RawBlob(Vec<u8>),
    /// Recursively captured table
    Table(Table),
    /// Dispatch-capable native object
    NativeHandle(NativeHandle),
}

impl GenericValue {
    /// Create a string blob from anything byte-like
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        GenericValue::StringBlob(bytes.into())
    }

    /// Check if this is `Nil`
    pub fn is_nil(&self) -> bool {
        matches!(self, GenericValue::Nil)
    }

    /// Get as boolean if this is a `Bool`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GenericValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer if this is an `Integer`
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            GenericValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the bytes of a `StringBlob`
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            GenericValue::StringBlob(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Get the handle of a `NativeHandle`
    pub fn as_handle(&self) -> Option<NativeHandle> {
        match self {
            GenericValue::NativeHandle(h) => Some(*h),
            _ => None,
        }
    }

    /// Get the entries of a `Table`
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            GenericValue::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Look up a table entry by its string key
    pub fn get(&self, key: &str) -> Option<&GenericValue> {
        self.as_table()?.get(key.as_bytes())
    }

    /// Get type name for diagnostics
    pub const fn type_name(&self) -> &'static str {
        match self {
            GenericValue::Nil => "nil",
            GenericValue::Bool(_) => "boolean",
            GenericValue::Integer(_) => "integer",
            GenericValue::StringBlob(_) => "string",
            GenericValue::Function(_) => "function",
            GenericValue::LightReference(_) => "light reference",
            GenericValue::RawBlob(_) => "raw blob",
            GenericValue::Table(_) => "table",
            GenericValue::NativeHandle(_) => "native handle",
        }
    }
}

impl From<bool> for GenericValue {
    fn from(b: bool) -> Self {
        GenericValue::Bool(b)
    }
}

impl From<i64> for GenericValue {
    fn from(i: i64) -> Self {
        GenericValue::Integer(i)
    }
}

impl From<&str> for GenericValue {
    fn from(s: &str) -> Self {
        GenericValue::StringBlob(s.as_bytes().to_vec())
    }
}

impl From<NativeHandle> for GenericValue {
    fn from(h: NativeHandle) -> Self {
        GenericValue::NativeHandle(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_nil() {
        assert!(GenericValue::default().is_nil());
        assert!(!GenericValue::Bool(false).is_nil());
    }

    #[test]
    fn test_extractors() {
        assert_eq!(GenericValue::from(42i64).as_integer(), Some(42));
        assert_eq!(GenericValue::from(true).as_bool(), Some(true));
        assert_eq!(GenericValue::from("x").as_bytes(), Some(&b"x"[..]));
        assert_eq!(GenericValue::from(1i64).as_bool(), None);

        let h = NativeHandle::from_raw(7);
        assert_eq!(GenericValue::from(h).as_handle(), Some(h));
    }

    #[test]
    fn test_table_lookup_by_str() {
        let mut inner = Table::new();
        inner.insert(b"b".to_vec(), GenericValue::Integer(1));
        let mut outer = Table::new();
        outer.insert(b"a".to_vec(), GenericValue::Table(inner));
        let value = GenericValue::Table(outer);

        assert_eq!(
            value.get("a").and_then(|a| a.get("b")),
            Some(&GenericValue::Integer(1))
        );
        assert!(value.get("missing").is_none());
        assert!(GenericValue::Nil.get("a").is_none());
    }

    #[test]
    fn test_string_blob_keeps_invalid_utf8() {
        let v = GenericValue::string(vec![0xff, 0x00, 0xfe]);
        assert_eq!(v.as_bytes(), Some(&[0xff, 0x00, 0xfe][..]));
        assert_eq!(v.type_name(), "string");
    }
}
