//! Session - the context every proxy carries
//!
//! A session owns the automation runtime handle, the converter and the
//! init-once gate. Proxies hold an `Arc<Session>`, so hooks find their
//! collaborators through the receiver instead of through process globals.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use luaole_sdk::{Automation, NativeError};

use crate::config::BridgeOptions;
use crate::convert::Converter;
use crate::error::{BridgeError, BridgeResult};

/// Shared bridge context
pub struct Session {
    automation: Arc<dyn Automation>,
    converter: Converter,
    options: BridgeOptions,
    init: OnceCell<Result<(), NativeError>>,
}

impl Session {
    /// Create a session over an automation runtime
    pub fn new(automation: Arc<dyn Automation>, options: BridgeOptions) -> Arc<Self> {
        Arc::new(Session {
            automation,
            converter: Converter::new(&options),
            options,
            init: OnceCell::new(),
        })
    }

    /// The automation runtime
    pub fn automation(&self) -> &dyn Automation {
        self.automation.as_ref()
    }

    /// Value converter configured from the session options
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Options the session was created with
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Initialize the automation subsystem on first use.
    ///
    /// The outcome is cached: a failed initialization is reported again on
    /// every later call without retrying.
    pub fn ensure_initialized(&self) -> BridgeResult<()> {
        let outcome = self.init.get_or_init(|| {
            let outcome = self.automation.initialize();
            match &outcome {
                Ok(()) => log::debug!("automation subsystem initialized"),
                Err(err) => log::warn!("automation subsystem failed to initialize: {}", err),
            }
            outcome
        });
        outcome.clone().map_err(BridgeError::Initialization)
    }

    /// Whether initialization has run (successfully or not)
    pub fn is_initialized(&self) -> bool {
        self.init.get().is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luaole_harness::MemoryAutomation;

    #[test]
    fn test_initializes_once() {
        let automation = Arc::new(MemoryAutomation::new());
        let session = Session::new(automation.clone(), BridgeOptions::default());
        assert!(!session.is_initialized());

        session.ensure_initialized().unwrap();
        session.ensure_initialized().unwrap();
        assert!(session.is_initialized());
        assert_eq!(automation.init_count(), 1);
    }

    #[test]
    fn test_failed_initialization_is_sticky() {
        let automation = Arc::new(MemoryAutomation::new());
        automation.fail_initialization(NativeError::new("CoInitialize failed"));
        let session = Session::new(automation.clone(), BridgeOptions::default());

        let err = session.ensure_initialized().unwrap_err();
        assert_eq!(err.to_string(), "initialization failed: CoInitialize failed");
        assert!(session.ensure_initialized().is_err());
        assert_eq!(automation.init_count(), 1);
    }
}
