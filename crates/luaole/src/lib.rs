//! luaole - late-bound automation objects for an embedded scripting runtime
//!
//! The bridge sits between two capability interfaces from `luaole-sdk`:
//! [`ScriptStack`](luaole_sdk::ScriptStack), the scripting runtime's value
//! stack, and [`Automation`](luaole_sdk::Automation), a native object system
//! that dispatches calls by member name at run time.
//!
//! # Script-side surface
//!
//! ```text
//! local obj = CreateObject("Some.Class")   -- object proxy
//! local r = obj:Method(1, "x", true)        -- method call
//! obj:_set("Visible", true)                 -- property write
//! local v = obj:_get("Items", 3)            -- indexed property read
//! obj:_call("Method", 1)                    -- call by computed name
//! ```
//!
//! Every call returns `(nil, message)` on failure instead of raising.
//!
//! # Modules
//!
//! - [`convert`]: script values to and from `GenericValue`
//! - [`proxy`]: object and method proxies
//! - [`invoke`]: the dispatch invoker
//! - [`bridge`]: object creation
//! - [`session`]: shared context carried by every proxy
//! - [`config`]: options, loadable from TOML

#![warn(missing_docs)]

pub mod bridge;
pub mod config;
pub mod convert;
pub mod error;
pub mod invoke;
pub mod proxy;
pub mod session;

pub use bridge::{create_object, Bridge};
pub use config::{BridgeOptions, ConfigError};
pub use convert::Converter;
pub use error::{BridgeError, BridgeResult, ConversionError};
pub use invoke::{DispatchKind, Invoker};
pub use proxy::{MethodProxy, ObjectProxy, METHOD_TYPE, OBJECT_TYPE};
pub use session::Session;
