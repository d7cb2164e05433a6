//! MemoryState - an in-memory `ScriptStack`
//!
//! A small stack machine with the value model of an embedded scripting
//! runtime: nil, booleans, integer and float numbers, byte strings, ordered
//! tables, light references, raw blocks, host objects, host functions and
//! script functions (opaque chunks that are carried around but never run).
//!
//! Host functions run in their own frame: positions `1..=top` are their
//! arguments, and the values they report as results are moved back into the
//! caller's frame. Host objects are tracked on a heap list so the collector
//! pass can finalize the ones nothing else refers to.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use luaole_sdk::{
    HostCell, HostFn, HostFunctionRegistry, LightRef, Member, NativeFnAddr, ScriptStack,
    SlotType, StackError, StackResult,
};

/// Leading bytes of every chunk this state can load.
pub const CHUNK_SIGNATURE: &[u8] = b"\x1bMem";

// ============================================================================
// Values
// ============================================================================

#[derive(Clone)]
enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Str(Arc<[u8]>),
    Table(TableRef),
    Function(Function),
    LightUserData(LightRef),
    UserData(UserData),
    Thread,
}

#[derive(Clone)]
enum Function {
    Host(NativeFnAddr),
    Script(Arc<ScriptFunction>),
}

struct ScriptFunction {
    name: String,
    chunk: Vec<u8>,
}

#[derive(Clone)]
enum UserData {
    Block(Arc<Mutex<Vec<u8>>>),
    Host(HostCell),
}

type TableRef = Arc<Mutex<TableData>>;

#[derive(Default)]
struct TableData {
    entries: Vec<(Value, Value)>,
}

impl TableData {
    fn position(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| raw_equal(k, key))
    }

    fn get(&self, key: &Value) -> Value {
        self.position(key)
            .map(|i| self.entries[i].1.clone())
            .unwrap_or(Value::Nil)
    }

    fn set(&mut self, key: Value, value: Value) {
        match (self.position(&key), value) {
            (Some(i), Value::Nil) => {
                self.entries.remove(i);
            }
            (Some(i), value) => self.entries[i].1 = value,
            (None, Value::Nil) => {}
            (None, value) => self.entries.push((key, value)),
        }
    }

    fn border(&self) -> usize {
        let mut n = 0;
        while self.position(&Value::Integer(n as i64 + 1)).is_some() {
            n += 1;
        }
        n
    }
}

impl Value {
    fn slot_type(&self) -> SlotType {
        match self {
            Value::Nil => SlotType::Nil,
            Value::Boolean(_) => SlotType::Boolean,
            Value::Integer(_) | Value::Number(_) => SlotType::Number,
            Value::Str(_) => SlotType::String,
            Value::Table(_) => SlotType::Table,
            Value::Function(_) => SlotType::Function,
            Value::LightUserData(_) => SlotType::LightUserData,
            Value::UserData(_) => SlotType::UserData,
            Value::Thread => SlotType::Thread,
        }
    }

    /// Float keys with an integral value are stored as integers
    fn normalize_key(self) -> StackResult<Value> {
        match self {
            Value::Nil => Err(StackError::Runtime("table index is nil".to_string())),
            Value::Number(f) if f.is_nan() => {
                Err(StackError::Runtime("table index is NaN".to_string()))
            }
            Value::Number(f) => Ok(float_to_integer(f).map_or(Value::Number(f), Value::Integer)),
            other => Ok(other),
        }
    }
}

fn float_to_integer(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn raw_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Integer(i), Value::Number(f)) | (Value::Number(f), Value::Integer(i)) => {
            float_to_integer(*f) == Some(*i)
        }
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Table(x), Value::Table(y)) => Arc::ptr_eq(x, y),
        (Value::Function(Function::Host(x)), Value::Function(Function::Host(y))) => x == y,
        (Value::Function(Function::Script(x)), Value::Function(Function::Script(y))) => {
            Arc::ptr_eq(x, y)
        }
        (Value::LightUserData(x), Value::LightUserData(y)) => x == y,
        (Value::UserData(UserData::Block(x)), Value::UserData(UserData::Block(y))) => {
            Arc::ptr_eq(x, y)
        }
        (Value::UserData(UserData::Host(x)), Value::UserData(UserData::Host(y))) => {
            std::ptr::addr_eq(Arc::as_ptr(x), Arc::as_ptr(y))
        }
        _ => false,
    }
}

// ============================================================================
// MemoryState
// ============================================================================

/// In-memory scripting state.
pub struct MemoryState {
    stack: Vec<Value>,
    base: usize,
    globals: HashMap<Vec<u8>, Value>,
    functions: HostFunctionRegistry,
    heap: Vec<HostCell>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    /// Create an empty state
    pub fn new() -> Self {
        MemoryState {
            stack: Vec::new(),
            base: 0,
            globals: HashMap::new(),
            functions: HostFunctionRegistry::new(),
            heap: Vec::new(),
        }
    }

    fn abs_index(&self, index: i32) -> Option<usize> {
        let depth = self.stack.len() - self.base;
        if index > 0 {
            let offset = index as usize - 1;
            (offset < depth).then(|| self.base + offset)
        } else if index < 0 {
            let back = index.unsigned_abs() as usize;
            (back <= depth).then(|| self.stack.len() - back)
        } else {
            None
        }
    }

    fn value_at(&self, index: i32) -> Option<&Value> {
        self.abs_index(index).map(|pos| &self.stack[pos])
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop_value(&mut self) -> Value {
        if self.stack.len() > self.base {
            self.stack.pop().unwrap_or(Value::Nil)
        } else {
            Value::Nil
        }
    }

    fn track(&mut self, cell: HostCell) -> Value {
        self.heap.push(cell.clone());
        Value::UserData(UserData::Host(cell))
    }

    fn member_value(&mut self, member: Member) -> Value {
        match member {
            Member::Nil => Value::Nil,
            Member::Function(func) => Value::Function(Function::Host(self.functions.register(func))),
            Member::Object(cell) => self.track(cell),
        }
    }

    // ========================================================================
    // Convenience pushes
    // ========================================================================

    /// Push a float number
    pub fn push_number(&mut self, f: f64) {
        self.push(Value::Number(f));
    }

    /// Push a UTF-8 string
    pub fn push_str(&mut self, s: &str) {
        self.push_bytes(s.as_bytes());
    }

    /// Push a coroutine placeholder
    pub fn push_thread(&mut self) {
        self.push(Value::Thread);
    }

    /// Push a script function whose chunk is the signature followed by `body`
    pub fn push_script_function(&mut self, body: &[u8]) {
        let mut chunk = CHUNK_SIGNATURE.to_vec();
        chunk.extend_from_slice(body);
        self.push(Value::Function(Function::Script(Arc::new(ScriptFunction {
            name: "=script".to_string(),
            chunk,
        }))));
    }

    /// Push a copy of the value at `index` (same identity for reference types)
    pub fn push_copy(&mut self, index: i32) -> StackResult<()> {
        let value = self
            .value_at(index)
            .cloned()
            .ok_or(StackError::InvalidIndex(index))?;
        self.push(value);
        Ok(())
    }

    /// Push the global `name` (nil when unset)
    pub fn get_global(&mut self, name: &str) -> SlotType {
        let value = self
            .globals
            .get(name.as_bytes())
            .cloned()
            .unwrap_or(Value::Nil);
        let ty = value.slot_type();
        self.push(value);
        ty
    }

    /// Pop a value and store it under a string key in the table at `table`
    pub fn set_field(&mut self, table: i32, key: &str) -> StackResult<()> {
        let pos = self.abs_index(table).ok_or(StackError::InvalidIndex(table))?;
        let value = self.pop_value();
        match &self.stack[pos] {
            Value::Table(t) => {
                t.lock().set(Value::Str(Arc::from(key.as_bytes())), value);
                Ok(())
            }
            other => Err(StackError::WrongType {
                index: table,
                expected: "table",
                got: other.slot_type().name(),
            }),
        }
    }

    // ========================================================================
    // Indexing and calls
    // ========================================================================

    /// Push `t[name]` for the value at `index`. Host objects answer through
    /// their member lookup hook; tables through a raw lookup.
    pub fn get_field(&mut self, index: i32, name: &str) -> StackResult<SlotType> {
        let target = self
            .value_at(index)
            .cloned()
            .ok_or(StackError::InvalidIndex(index))?;
        let value = match target {
            Value::Table(t) => t.lock().get(&Value::Str(Arc::from(name.as_bytes()))),
            Value::UserData(UserData::Host(cell)) => {
                let member = cell.lock().index(name);
                self.member_value(member)
            }
            other => {
                return Err(StackError::Runtime(format!(
                    "attempt to index a {} value",
                    other.slot_type().name()
                )))
            }
        };
        let ty = value.slot_type();
        self.push(value);
        Ok(ty)
    }

    /// Call the value below the top `nargs` values with those arguments.
    ///
    /// The callee and its arguments are replaced by its results; returns the
    /// number of results.
    pub fn call(&mut self, nargs: i32) -> StackResult<usize> {
        let nargs = usize::try_from(nargs).map_err(|_| StackError::InvalidIndex(nargs))?;
        let len = self.stack.len();
        if nargs + 1 > len - self.base {
            return Err(StackError::Runtime("not enough values to call".to_string()));
        }
        let func_pos = len - nargs - 1;

        let (func, frame_base) = match self.stack[func_pos].clone() {
            Value::Function(Function::Host(addr)) => {
                let func = self.functions.get(addr).ok_or_else(|| {
                    StackError::Runtime(format!("unknown host function {:#x}", addr.addr()))
                })?;
                (func, func_pos + 1)
            }
            Value::Function(Function::Script(script)) => {
                return Err(StackError::Runtime(format!(
                    "script function '{}' cannot run in a memory state",
                    script.name
                )))
            }
            Value::UserData(UserData::Host(cell)) => {
                let hook = cell.lock().call_hook();
                let hook = hook.ok_or_else(|| {
                    StackError::Runtime("attempt to call a userdata value".to_string())
                })?;
                (hook, func_pos)
            }
            other => {
                return Err(StackError::Runtime(format!(
                    "attempt to call a {} value",
                    other.slot_type().name()
                )))
            }
        };

        let saved_base = self.base;
        self.base = frame_base;
        let reported = {
            let stack: &mut dyn ScriptStack = self;
            func(stack)
        };
        self.base = saved_base;

        let end = self.stack.len();
        let nresults = reported.min(end.saturating_sub(frame_base));
        let results: Vec<Value> = self.stack.drain(end - nresults..).collect();
        self.stack.truncate(func_pos);
        self.stack.extend(results);
        Ok(nresults)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Check whether two slots hold the same value (identity for reference types)
    pub fn raw_equal(&self, a: i32, b: i32) -> bool {
        match (self.value_at(a), self.value_at(b)) {
            (Some(x), Some(y)) => raw_equal(x, y),
            _ => false,
        }
    }

    /// Host object at `index`, whatever its tag
    pub fn to_host_object(&self, index: i32) -> Option<HostCell> {
        match self.value_at(index) {
            Some(Value::UserData(UserData::Host(cell))) => Some(cell.clone()),
            _ => None,
        }
    }

    /// Chunk name of the script function at `index`
    pub fn chunk_name(&self, index: i32) -> Option<String> {
        match self.value_at(index) {
            Some(Value::Function(Function::Script(script))) => Some(script.name.clone()),
            _ => None,
        }
    }

    /// Type name of the value at `index`
    pub fn type_name(&self, index: i32) -> &'static str {
        self.slot_type(index).name()
    }

    /// Number of host objects the heap still tracks
    pub fn host_object_count(&self) -> usize {
        self.heap.len()
    }

    /// Collector pass: finalize and drop every host object that is referenced
    /// only by the heap list. Returns how many were collected.
    pub fn collect_garbage(&mut self) -> usize {
        let mut collected = Vec::new();
        self.heap.retain(|cell| {
            if Arc::strong_count(cell) == 1 {
                collected.push(cell.clone());
                false
            } else {
                true
            }
        });
        for cell in &collected {
            cell.lock().finalize();
        }
        collected.len()
    }
}

impl Drop for MemoryState {
    fn drop(&mut self) {
        self.stack.clear();
        self.globals.clear();
        for cell in self.heap.drain(..) {
            cell.lock().finalize();
        }
    }
}

// ============================================================================
// ScriptStack implementation
// ============================================================================

impl ScriptStack for MemoryState {
    fn top(&self) -> i32 {
        (self.stack.len() - self.base) as i32
    }

    fn set_top(&mut self, index: i32) {
        let new_len = if index >= 0 {
            self.base + index as usize
        } else {
            let drop_count = (index.unsigned_abs() as usize).saturating_sub(1);
            self.stack.len().saturating_sub(drop_count).max(self.base)
        };
        self.stack.resize(new_len, Value::Nil);
    }

    fn slot_type(&self, index: i32) -> SlotType {
        self.value_at(index)
            .map(Value::slot_type)
            .unwrap_or(SlotType::None)
    }

    fn push_nil(&mut self) {
        self.push(Value::Nil);
    }

    fn push_bool(&mut self, b: bool) {
        self.push(Value::Boolean(b));
    }

    fn push_integer(&mut self, i: i64) {
        self.push(Value::Integer(i));
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.push(Value::Str(Arc::from(bytes)));
    }

    fn push_light(&mut self, light: LightRef) {
        self.push(Value::LightUserData(light));
    }

    fn push_native_function(&mut self, addr: NativeFnAddr) {
        self.push(Value::Function(Function::Host(addr)));
    }

    fn push_host_function(&mut self, func: HostFn) {
        let addr = self.functions.register(func);
        self.push(Value::Function(Function::Host(addr)));
    }

    fn push_host_object(&mut self, obj: HostCell) {
        let value = self.track(obj);
        self.push(value);
    }

    fn new_table(&mut self) {
        self.push(Value::Table(Arc::new(Mutex::new(TableData::default()))));
    }

    fn raw_set(&mut self, table: i32) -> StackResult<()> {
        let pos = self.abs_index(table).ok_or(StackError::InvalidIndex(table))?;
        let Value::Table(t) = self.stack[pos].clone() else {
            return Err(StackError::WrongType {
                index: table,
                expected: "table",
                got: self.stack[pos].slot_type().name(),
            });
        };
        let value = self.pop_value();
        let key = self.pop_value().normalize_key()?;
        t.lock().set(key, value);
        Ok(())
    }

    fn new_block(&mut self, len: usize, fill: &mut dyn FnMut(&mut [u8])) {
        let mut block = vec![0u8; len];
        fill(&mut block);
        self.push(Value::UserData(UserData::Block(Arc::new(Mutex::new(block)))));
    }

    fn load_chunk(&mut self, name: &str, chunk: &[u8]) -> StackResult<()> {
        if !chunk.starts_with(CHUNK_SIGNATURE) {
            return Err(StackError::Load {
                name: name.to_string(),
                reason: "bad binary format (not a precompiled chunk)".to_string(),
            });
        }
        self.push(Value::Function(Function::Script(Arc::new(ScriptFunction {
            name: name.to_string(),
            chunk: chunk.to_vec(),
        }))));
        Ok(())
    }

    fn to_integer(&self, index: i32) -> Option<i64> {
        match self.value_at(index)? {
            Value::Integer(i) => Some(*i),
            Value::Number(f) => float_to_integer(*f),
            Value::Str(s) => std::str::from_utf8(s).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    fn to_bytes(&self, index: i32) -> Option<Vec<u8>> {
        match self.value_at(index)? {
            Value::Str(s) => Some(s.to_vec()),
            Value::Integer(i) => Some(i.to_string().into_bytes()),
            Value::Number(f) => Some(f.to_string().into_bytes()),
            _ => None,
        }
    }

    fn to_bool(&self, index: i32) -> bool {
        !matches!(
            self.value_at(index),
            None | Some(Value::Nil) | Some(Value::Boolean(false))
        )
    }

    fn to_light(&self, index: i32) -> Option<LightRef> {
        match self.value_at(index)? {
            Value::LightUserData(light) => Some(*light),
            _ => None,
        }
    }

    fn to_native_function(&self, index: i32) -> Option<NativeFnAddr> {
        match self.value_at(index)? {
            Value::Function(Function::Host(addr)) => Some(*addr),
            _ => None,
        }
    }

    fn dump_function(&self, index: i32) -> StackResult<Vec<u8>> {
        match self.value_at(index) {
            Some(Value::Function(Function::Script(script))) => Ok(script.chunk.clone()),
            Some(Value::Function(Function::Host(_))) => {
                Err(StackError::Dump("host functions have no bytecode".to_string()))
            }
            Some(other) => Err(StackError::WrongType {
                index,
                expected: "function",
                got: other.slot_type().name(),
            }),
            None => Err(StackError::InvalidIndex(index)),
        }
    }

    fn raw_len(&self, index: i32) -> usize {
        match self.value_at(index) {
            Some(Value::Str(s)) => s.len(),
            Some(Value::UserData(UserData::Block(block))) => block.lock().len(),
            Some(Value::Table(t)) => t.lock().border(),
            _ => 0,
        }
    }

    fn block_bytes(&self, index: i32) -> Option<Vec<u8>> {
        match self.value_at(index)? {
            Value::UserData(UserData::Block(block)) => Some(block.lock().clone()),
            _ => None,
        }
    }

    fn test_host_object(&self, index: i32, type_name: &str) -> StackResult<Option<HostCell>> {
        let Some(Value::UserData(UserData::Host(cell))) = self.value_at(index) else {
            return Ok(None);
        };
        let obj = cell
            .try_lock()
            .ok_or_else(|| StackError::Runtime("host object is in use".to_string()))?;
        Ok((obj.type_name() == type_name).then(|| cell.clone()))
    }

    fn next(&mut self, table: i32) -> bool {
        let Some(pos) = self.abs_index(table) else {
            return false;
        };
        let Value::Table(t) = self.stack[pos].clone() else {
            return false;
        };
        let key = self.pop_value();
        let data = t.lock();
        let start = match key {
            Value::Nil => 0,
            key => match data.position(&key) {
                Some(i) => i + 1,
                None => return false,
            },
        };
        let Some((k, v)) = data.entries.get(start).cloned() else {
            return false;
        };
        drop(data);
        self.push(k);
        self.push(v);
        true
    }

    fn set_global(&mut self, name: &str) {
        let value = self.pop_value();
        self.globals.insert(name.as_bytes().to_vec(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_frame_relative() {
        let mut state = MemoryState::new();
        state.push_integer(10);
        state.push_integer(20);
        assert_eq!(state.top(), 2);
        assert_eq!(state.to_integer(1), Some(10));
        assert_eq!(state.to_integer(-1), Some(20));
        assert_eq!(state.slot_type(3), SlotType::None);
        assert_eq!(state.slot_type(-3), SlotType::None);
        assert_eq!(state.slot_type(0), SlotType::None);
    }

    #[test]
    fn test_set_top_and_pop() {
        let mut state = MemoryState::new();
        state.set_top(3);
        assert_eq!(state.top(), 3);
        assert_eq!(state.slot_type(3), SlotType::Nil);
        state.pop(2);
        assert_eq!(state.top(), 1);
        state.set_top(-1);
        assert_eq!(state.top(), 1);
        state.set_top(0);
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_float_integer_conversion() {
        let mut state = MemoryState::new();
        state.push_number(3.0);
        state.push_number(3.5);
        assert_eq!(state.to_integer(1), Some(3));
        assert_eq!(state.to_integer(2), None);
    }

    #[test]
    fn test_table_iteration_in_insertion_order() {
        let mut state = MemoryState::new();
        state.new_table();
        state.push_integer(1);
        state.set_field(1, "a").unwrap();
        state.push_integer(2);
        state.set_field(1, "b").unwrap();

        let mut keys = Vec::new();
        state.push_nil();
        while state.next(1) {
            keys.push(state.to_bytes(-2).unwrap());
            state.pop(1);
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn test_float_keys_normalize_to_integers() {
        let mut state = MemoryState::new();
        state.new_table();
        state.push_number(1.0);
        state.push_str("x");
        state.raw_set(1).unwrap();
        assert_eq!(state.raw_len(1), 1);

        state.push_nil();
        state.push_str("y");
        assert!(state.raw_set(1).is_err());
    }

    #[test]
    fn test_chunk_signature_is_checked() {
        let mut state = MemoryState::new();
        assert!(state.load_chunk("bad", b"plain text").is_err());
        assert_eq!(state.top(), 0);

        let mut chunk = CHUNK_SIGNATURE.to_vec();
        chunk.push(7);
        state.load_chunk("good", &chunk).unwrap();
        assert_eq!(state.chunk_name(-1).as_deref(), Some("good"));
        assert_eq!(state.dump_function(-1).unwrap(), chunk);
    }

    #[test]
    fn test_host_function_call_frame() {
        let mut state = MemoryState::new();
        let sum: HostFn = Arc::new(|stack: &mut dyn ScriptStack| {
            let total: i64 = (1..=stack.top()).filter_map(|i| stack.to_integer(i)).sum();
            stack.push_integer(total);
            1
        });
        state.push_integer(99);
        state.push_host_function(sum);
        state.push_integer(1);
        state.push_integer(2);
        state.push_integer(3);
        assert_eq!(state.call(3).unwrap(), 1);
        assert_eq!(state.top(), 2);
        assert_eq!(state.to_integer(-1), Some(6));
        assert_eq!(state.to_integer(1), Some(99));
    }

    #[test]
    fn test_calling_non_function_fails() {
        let mut state = MemoryState::new();
        state.push_integer(1);
        assert!(state.call(0).is_err());
    }

    #[test]
    fn test_blocks_keep_bytes() {
        let mut state = MemoryState::new();
        state.new_block(3, &mut |block| block.copy_from_slice(&[1, 2, 3]));
        assert_eq!(state.slot_type(-1), SlotType::UserData);
        assert_eq!(state.raw_len(-1), 3);
        assert_eq!(state.block_bytes(-1), Some(vec![1, 2, 3]));
        assert!(state.test_host_object(-1, "ANY").unwrap().is_none());
    }

    #[test]
    fn test_tag_check_on_absent_slot() {
        let state = MemoryState::new();
        assert!(state.test_host_object(1, "ANY").unwrap().is_none());
        assert!(state.test_host_object(-1, "ANY").unwrap().is_none());
    }

    #[test]
    fn test_globals() {
        let mut state = MemoryState::new();
        state.push_str("value");
        state.set_global("name");
        assert_eq!(state.top(), 0);
        assert_eq!(state.get_global("name"), SlotType::String);
        assert_eq!(state.get_global("missing"), SlotType::Nil);
    }
}
