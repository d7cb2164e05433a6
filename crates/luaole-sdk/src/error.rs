//! Error types reported by the bridge collaborators

/// Result type for scripting-stack operations
pub type StackResult<T> = Result<T, StackError>;

/// Result type for automation calls
pub type NativeResult<T> = Result<T, NativeError>;

/// Failure reported by the scripting runtime
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    /// Stack index does not name a slot in the current frame
    #[error("invalid stack index {0}")]
    InvalidIndex(i32),

    /// Value at the index has the wrong type for the operation
    #[error("expected {expected} at index {index}, got {got}")]
    WrongType {
        /// Stack index
        index: i32,
        /// Expected type name
        expected: &'static str,
        /// Actual type name
        got: &'static str,
    },

    /// Chunk could not be loaded
    #[error("cannot load chunk '{name}': {reason}")]
    Load {
        /// Chunk name
        name: String,
        /// Loader message
        reason: String,
    },

    /// Function could not be serialized
    #[error("unable to dump function: {0}")]
    Dump(String),

    /// Runtime-level failure
    #[error("{0}")]
    Runtime(String),
}

/// Failure reported by the native automation runtime.
///
/// The message is kept verbatim so scripts see what the native side said.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NativeError {
    /// Native message
    pub message: String,
    /// Native status code, when the runtime reports one
    pub code: Option<i32>,
}

impl NativeError {
    /// Create an error from a message with no status code
    pub fn new(message: impl Into<String>) -> Self {
        NativeError {
            message: message.into(),
            code: None,
        }
    }

    /// Create an error carrying a native status code
    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        NativeError {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        NativeError::new(s)
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        NativeError::new(s)
    }
}
