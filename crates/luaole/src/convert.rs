//! Value conversion between the script stack and `GenericValue`
//!
//! Two pull flavours exist:
//!
//! - **argument pull** (`pull_arg`, `pull_args`): what a native call can take.
//!   Automation objects unwrap to their raw handle; types with no argument
//!   meaning become `Nil`.
//! - **full pull** (`pull_value`): recursive introspection. Tables are walked,
//!   functions captured, raw blocks copied; unknown types are an error.
//!
//! `push_value` is the inverse of the full pull for everything except native
//! handles, which only the invoker may push (wrapped in a new proxy).

use luaole_sdk::{FunctionValue, GenericValue, NativeHandle, ScriptStack, SlotType, Table};

use crate::config::BridgeOptions;
use crate::error::ConversionError;
use crate::proxy::{ObjectProxy, OBJECT_TYPE};

/// Converts between script stack slots and `GenericValue`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converter {
    chunk_name: String,
    max_table_depth: usize,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(&BridgeOptions::default())
    }
}

impl Converter {
    /// Create a converter from bridge options
    pub fn new(options: &BridgeOptions) -> Self {
        Converter {
            chunk_name: options.chunk_name.clone(),
            max_table_depth: options.max_table_depth,
        }
    }

    // ========================================================================
    // Argument pull
    // ========================================================================

    /// Pull one call argument
    pub fn pull_arg(
        &self,
        stack: &dyn ScriptStack,
        index: i32,
    ) -> Result<GenericValue, ConversionError> {
        match stack.slot_type(index) {
            SlotType::String => Ok(GenericValue::StringBlob(
                stack.to_bytes(index).unwrap_or_default(),
            )),
            SlotType::Number => stack
                .to_integer(index)
                .map(GenericValue::Integer)
                .ok_or(ConversionError::NotInteger),
            SlotType::Boolean => Ok(GenericValue::Bool(stack.to_bool(index))),
            SlotType::UserData => self.pull_handle(stack, index).map(GenericValue::NativeHandle),
            SlotType::None
            | SlotType::Nil
            | SlotType::LightUserData
            | SlotType::Table
            | SlotType::Function
            | SlotType::Thread => Ok(GenericValue::Nil),
        }
    }

    /// Pull the arguments at `start..=end`, in order. Stops at the first
    /// failure without returning a partial list.
    pub fn pull_args(
        &self,
        stack: &dyn ScriptStack,
        start: i32,
        end: i32,
    ) -> Result<Vec<GenericValue>, ConversionError> {
        (start..=end).map(|i| self.pull_arg(stack, i)).collect()
    }

    fn pull_handle(
        &self,
        stack: &dyn ScriptStack,
        index: i32,
    ) -> Result<NativeHandle, ConversionError> {
        let cell = stack
            .test_host_object(index, OBJECT_TYPE)
            .map_err(ConversionError::TypeCheck)?
            .ok_or(ConversionError::NotAnObject)?;
        let obj = cell.lock();
        let proxy = obj
            .as_any()
            .downcast_ref::<ObjectProxy>()
            .ok_or(ConversionError::NotAnObject)?;
        proxy.handle().ok_or(ConversionError::ReleasedObject)
    }

    // ========================================================================
    // Full pull
    // ========================================================================

    /// Pull any value, following tables recursively.
    ///
    /// The stack depth on return equals the depth on entry.
    pub fn pull_value(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
    ) -> Result<GenericValue, ConversionError> {
        self.pull_nested(stack, index, 0)
    }

    fn pull_nested(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
        depth: usize,
    ) -> Result<GenericValue, ConversionError> {
        match stack.slot_type(index) {
            SlotType::Nil => Ok(GenericValue::Nil),
            SlotType::Boolean => Ok(GenericValue::Bool(stack.to_bool(index))),
            SlotType::Number => stack
                .to_integer(index)
                .map(GenericValue::Integer)
                .ok_or(ConversionError::NotInteger),
            SlotType::String => Ok(GenericValue::StringBlob(
                stack.to_bytes(index).unwrap_or_default(),
            )),
            SlotType::LightUserData => stack
                .to_light(index)
                .map(GenericValue::LightReference)
                .ok_or(ConversionError::UnsupportedType("light userdata")),
            SlotType::Function => self.pull_function(stack, index),
            SlotType::Table => self.pull_table(stack, index, depth),
            SlotType::UserData => match stack.block_bytes(index) {
                Some(mut bytes) => {
                    bytes.truncate(stack.raw_len(index));
                    Ok(GenericValue::RawBlob(bytes))
                }
                None => Err(ConversionError::UnsupportedType("host object")),
            },
            SlotType::Thread | SlotType::None => {
                Err(ConversionError::UnsupportedType(stack.slot_type(index).name()))
            }
        }
    }

    fn pull_function(
        &self,
        stack: &dyn ScriptStack,
        index: i32,
    ) -> Result<GenericValue, ConversionError> {
        let captured = match stack.to_native_function(index) {
            Some(addr) => FunctionValue::Native(addr),
            None => FunctionValue::Bytecode(
                stack
                    .dump_function(index)
                    .map_err(ConversionError::Stack)?,
            ),
        };
        Ok(GenericValue::Function(captured))
    }

    fn pull_table(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
        depth: usize,
    ) -> Result<GenericValue, ConversionError> {
        if depth >= self.max_table_depth {
            return Err(ConversionError::DepthExceeded(self.max_table_depth));
        }

        let top = stack.top();
        // A relative index moves down by one once the iteration key is pushed
        let table = if index < 0 { index - 1 } else { index };
        let mut entries = Table::new();

        stack.push_nil();
        while stack.next(table) {
            let pair = self
                .pull_nested(stack, -2, depth + 1)
                .and_then(|key| Ok((key, self.pull_nested(stack, -1, depth + 1)?)));
            match pair {
                Ok((key, value)) => {
                    let key = table_key(key);
                    if entries.contains_key(&key) {
                        log::debug!(
                            "table key '{}' collides after coercion; keeping the later value",
                            String::from_utf8_lossy(&key)
                        );
                    }
                    entries.insert(key, value);
                }
                Err(err) => log::debug!("skipping table entry: {}", err),
            }
            stack.pop(1);
        }

        stack.set_top(top);
        Ok(GenericValue::Table(entries))
    }

    // ========================================================================
    // Push
    // ========================================================================

    /// Push a value. Returns how many values were pushed: 1, or 0 when a
    /// captured chunk cannot be reloaded.
    pub fn push_value(
        &self,
        stack: &mut dyn ScriptStack,
        value: &GenericValue,
    ) -> Result<usize, ConversionError> {
        match value {
            GenericValue::Nil => stack.push_nil(),
            GenericValue::Bool(b) => stack.push_bool(*b),
            GenericValue::Integer(i) => stack.push_integer(*i),
            GenericValue::StringBlob(bytes) => stack.push_bytes(bytes),
            GenericValue::LightReference(light) => stack.push_light(*light),
            GenericValue::RawBlob(bytes) => {
                stack.new_block(bytes.len(), &mut |block| block.copy_from_slice(bytes))
            }
            GenericValue::Function(FunctionValue::Native(addr)) => {
                stack.push_native_function(*addr)
            }
            GenericValue::Function(FunctionValue::Bytecode(chunk)) => {
                if let Err(err) = stack.load_chunk(&self.chunk_name, chunk) {
                    log::debug!("captured function not reloaded: {}", err);
                    return Ok(0);
                }
            }
            GenericValue::Table(entries) => self.push_table(stack, entries),
            GenericValue::NativeHandle(_) => {
                return Err(ConversionError::UnsupportedType("native handle"))
            }
        }
        Ok(1)
    }

    fn push_table(&self, stack: &mut dyn ScriptStack, entries: &Table) {
        stack.new_table();
        for (key, value) in entries {
            let mark = stack.top();
            stack.push_bytes(key);
            let stored = match self.push_value(stack, value) {
                Ok(1) => stack.raw_set(-3).is_ok(),
                _ => false,
            };
            if !stored {
                log::debug!(
                    "table entry '{}' not pushed",
                    String::from_utf8_lossy(key)
                );
                stack.set_top(mark);
            }
        }
    }
}

/// Coerce a pulled key to its string form. Integer keys become base-10
/// digits; any key that is neither a string nor an integer becomes `""`.
/// Distinct keys can therefore collide (`3` and `"3"`).
fn table_key(key: GenericValue) -> Vec<u8> {
    match key {
        GenericValue::StringBlob(bytes) => bytes,
        GenericValue::Integer(i) => i.to_string().into_bytes(),
        _ => Vec::new(),
    }
}
