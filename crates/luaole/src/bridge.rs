//! Bridge - the object-creation entry point
//!
//! ```text
//! local excel, err = CreateObject("Excel.Application")
//! ```
//!
//! Creation initializes the automation subsystem on first use, instantiates
//! the class, acquires the dispatch reference and hands it to a new object
//! proxy. The instance reference obtained along the way is always given back.

use std::sync::Arc;

use luaole_sdk::{Automation, HostFn, ScriptStack};

use crate::config::BridgeOptions;
use crate::error::{BridgeError, BridgeResult};
use crate::invoke::{finish, string_arg};
use crate::proxy::ObjectProxy;
use crate::session::Session;

/// Entry point into the bridge for one scripting state
#[derive(Debug, Clone)]
pub struct Bridge {
    session: Arc<Session>,
}

impl Bridge {
    /// Create a bridge with default options
    pub fn new(automation: Arc<dyn Automation>) -> Self {
        Self::with_options(automation, BridgeOptions::default())
    }

    /// Create a bridge with explicit options
    pub fn with_options(automation: Arc<dyn Automation>, options: BridgeOptions) -> Self {
        Bridge {
            session: Session::new(automation, options),
        }
    }

    /// The bridge session
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// The creation entry point as a host function bound to this session
    pub fn entry_point(&self) -> HostFn {
        let session = self.session.clone();
        Arc::new(move |stack: &mut dyn ScriptStack| {
            let result = create_object(&session, stack);
            finish(stack, "CreateObject", result)
        })
    }

    /// Register the creation entry point as a script global
    pub fn install(&self, stack: &mut dyn ScriptStack) {
        stack.push_host_function(self.entry_point());
        stack.set_global(&self.session.options().global_name);
        log::debug!(
            "installed object creation as '{}'",
            self.session.options().global_name
        );
    }

    /// Create the object named at position 1 and push its proxy
    pub fn create_object(&self, stack: &mut dyn ScriptStack) -> BridgeResult<usize> {
        create_object(&self.session, stack)
    }
}

/// Create the object named at position 1 and push its proxy
pub fn create_object(session: &Arc<Session>, stack: &mut dyn ScriptStack) -> BridgeResult<usize> {
    session.ensure_initialized()?;
    let identifier = string_arg(stack, 1)?;

    let automation = session.automation();
    let instance = automation
        .create_instance(&identifier)
        .map_err(BridgeError::Instantiation)?;
    let dispatch = automation.query_dispatch(instance);
    automation.release(instance);
    let dispatch = dispatch.map_err(BridgeError::InterfaceAcquisition)?;

    log::debug!(
        "created '{}' as automation object {:#x}",
        identifier,
        dispatch.as_raw()
    );
    Ok(ObjectProxy::new(session.clone(), dispatch).push(stack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use luaole_harness::{ClassDef, MemoryAutomation, MemoryState};
    use luaole_sdk::SlotType;

    #[test]
    fn test_install_uses_configured_name() {
        let automation = Arc::new(MemoryAutomation::new());
        let options = BridgeOptions {
            global_name: "NewObject".to_string(),
            ..BridgeOptions::default()
        };
        let bridge = Bridge::with_options(automation, options);
        let mut state = MemoryState::new();
        bridge.install(&mut state);

        assert_eq!(state.top(), 0);
        assert_eq!(state.get_global("NewObject"), SlotType::Function);
        assert_eq!(state.get_global("CreateObject"), SlotType::Nil);
    }

    #[test]
    fn test_create_object_direct() {
        let automation = Arc::new(MemoryAutomation::new());
        automation.register(ClassDef::new("Test.Object"));
        let bridge = Bridge::new(automation.clone());
        let mut state = MemoryState::new();
        state.push_str("Test.Object");

        assert_eq!(bridge.create_object(&mut state).unwrap(), 1);
        assert_eq!(state.top(), 2);
        assert_eq!(automation.live_objects(), 1);
        assert!(bridge.session().is_initialized());
    }

    #[test]
    fn test_identifier_must_be_a_string() {
        let automation = Arc::new(MemoryAutomation::new());
        let bridge = Bridge::new(automation);
        let mut state = MemoryState::new();
        state.push_bool(true);

        assert_eq!(
            bridge.create_object(&mut state),
            Err(BridgeError::MissingName(1))
        );
    }
}
