//! Error types for the dispatch bridge

use luaole_sdk::{NativeError, StackError};

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// A value could not be pulled from or pushed onto the script stack
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// Number is not representable as an integer
    #[error("the value is not an integer")]
    NotInteger,

    /// Userdata is tagged with a different opaque type
    #[error("not an automation object")]
    NotAnObject,

    /// The tag check itself could not be performed
    #[error("type check failed: {0}")]
    TypeCheck(StackError),

    /// No conversion exists for the value's type
    #[error("unsupported type: {0}")]
    UnsupportedType(&'static str),

    /// Automation object whose handle was already released
    #[error("the automation object has been released")]
    ReleasedObject,

    /// The scripting runtime refused a stack operation
    #[error("stack operation failed: {0}")]
    Stack(StackError),

    /// Table nesting is deeper than the configured bound
    #[error("table nesting exceeds {0} levels")]
    DepthExceeded(usize),
}

/// Any failure of a bridge operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Argument or result conversion failed
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Method value carries no name
    #[error("the method is null")]
    NullMethod,

    /// Receiver is absent, not an automation object, or released
    #[error("the receiver is null")]
    NullReceiver,

    /// Member or identifier argument is not a string
    #[error("argument {0} must be a string")]
    MissingName(i32),

    /// The automation call failed
    #[error("{0}")]
    NativeCall(#[from] NativeError),

    /// Subsystem initialization failed
    #[error("initialization failed: {0}")]
    Initialization(NativeError),

    /// Object instantiation failed
    #[error("instantiation failed: {0}")]
    Instantiation(NativeError),

    /// The dispatch reference could not be acquired
    #[error("interface acquisition failed: {0}")]
    InterfaceAcquisition(NativeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_message_is_verbatim() {
        let err = BridgeError::from(NativeError::new("Unknown name."));
        assert_eq!(err.to_string(), "Unknown name.");
    }

    #[test]
    fn test_stage_prefixes() {
        let err = BridgeError::Instantiation(NativeError::new("Invalid class string"));
        assert_eq!(err.to_string(), "instantiation failed: Invalid class string");

        let err = BridgeError::InterfaceAcquisition(NativeError::new("No such interface"));
        assert!(err.to_string().starts_with("interface acquisition failed: "));
    }

    #[test]
    fn test_conversion_is_transparent() {
        let err = BridgeError::from(ConversionError::NotInteger);
        assert_eq!(err.to_string(), "the value is not an integer");
    }
}
