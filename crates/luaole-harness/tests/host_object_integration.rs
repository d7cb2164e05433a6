//! Integration tests for host objects in the memory state
//!
//! Tests cover:
//! - Member lookup through the index hook
//! - The call hook frame layout
//! - Collector and close-time finalization

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use luaole_harness::MemoryState;
use luaole_sdk::{host_cell, HostFn, HostObject, Member, ScriptStack, SlotType};

struct Counter {
    finalized: Arc<AtomicUsize>,
}

impl HostObject for Counter {
    fn type_name(&self) -> &'static str {
        "COUNTER"
    }

    fn index(&self, name: &str) -> Member {
        match name {
            "count" => Member::Function(Arc::new(|stack: &mut dyn ScriptStack| {
                stack.push_integer(stack.top() as i64);
                1
            })),
            "child" => Member::Object(host_cell(Counter {
                finalized: self.finalized.clone(),
            })),
            _ => Member::Nil,
        }
    }

    fn call_hook(&self) -> Option<HostFn> {
        Some(Arc::new(|stack: &mut dyn ScriptStack| {
            let tagged = stack.test_host_object(1, "COUNTER").ok().flatten().is_some();
            stack.push_bool(tagged);
            stack.push_integer(stack.top() as i64 - 2);
            2
        }))
    }

    fn finalize(&mut self) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn counter(finalized: &Arc<AtomicUsize>) -> Counter {
    Counter {
        finalized: finalized.clone(),
    }
}

#[test]
fn test_member_lookup() {
    let finalized = Arc::new(AtomicUsize::new(0));
    let mut state = MemoryState::new();
    state.push_host_object(host_cell(counter(&finalized)));

    assert_eq!(state.get_field(1, "count").unwrap(), SlotType::Function);
    state.push_integer(10);
    state.push_integer(20);
    assert_eq!(state.call(2).unwrap(), 1);
    assert_eq!(state.to_integer(-1), Some(2));

    assert_eq!(state.get_field(1, "child").unwrap(), SlotType::UserData);
    assert_eq!(state.get_field(1, "missing").unwrap(), SlotType::Nil);
}

#[test]
fn test_call_hook_sees_object_first() {
    let finalized = Arc::new(AtomicUsize::new(0));
    let mut state = MemoryState::new();
    state.push_host_object(host_cell(counter(&finalized)));
    state.push_copy(1).unwrap();
    state.push_str("a");
    state.push_str("b");

    assert_eq!(state.call(2).unwrap(), 2);
    assert_eq!(state.top(), 3);
    assert!(state.to_bool(2));
    assert_eq!(state.to_integer(3), Some(2));
}

#[test]
fn test_collector_finalizes_unreachable_objects() {
    let finalized = Arc::new(AtomicUsize::new(0));
    let mut state = MemoryState::new();
    state.push_host_object(host_cell(counter(&finalized)));
    state.push_host_object(host_cell(counter(&finalized)));
    assert_eq!(state.host_object_count(), 2);

    state.set_top(1);
    assert_eq!(state.collect_garbage(), 1);
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
    assert_eq!(state.host_object_count(), 1);

    drop(state);
    assert_eq!(finalized.load(Ordering::SeqCst), 2);
}

#[test]
fn test_tables_keep_objects_alive() {
    let finalized = Arc::new(AtomicUsize::new(0));
    let mut state = MemoryState::new();
    state.new_table();
    state.push_host_object(host_cell(counter(&finalized)));
    state.set_field(1, "obj").unwrap();

    assert_eq!(state.collect_garbage(), 0);
    state.set_top(0);
    assert_eq!(state.collect_garbage(), 1);
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
}
