//! Property tests for value conversion
//!
//! Primitive values survive a push followed by a pull, and a pulled slot of
//! any primitive kind pushes back to an equal slot.

use luaole::Converter;
use luaole_harness::MemoryState;
use luaole_sdk::{GenericValue, LightRef, ScriptStack, SlotType};
use proptest::prelude::*;

fn primitive() -> impl Strategy<Value = GenericValue> {
    prop_oneof![
        Just(GenericValue::Nil),
        any::<bool>().prop_map(GenericValue::Bool),
        any::<i64>().prop_map(GenericValue::Integer),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(GenericValue::StringBlob),
        any::<usize>().prop_map(|addr| GenericValue::LightReference(LightRef::from_addr(addr))),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(GenericValue::RawBlob),
    ]
}

proptest! {
    #[test]
    fn test_push_then_pull_is_identity(value in primitive()) {
        let converter = Converter::default();
        let mut state = MemoryState::new();

        prop_assert_eq!(converter.push_value(&mut state, &value).unwrap(), 1);
        prop_assert_eq!(state.top(), 1);
        let pulled = converter.pull_value(&mut state, -1).unwrap();
        prop_assert_eq!(pulled, value);
        prop_assert_eq!(state.top(), 1);
    }
}

proptest! {
    #[test]
    fn test_pull_then_push_is_identity(
        i in any::<i64>(),
        bytes in prop::collection::vec(any::<u8>(), 0..64),
        b in any::<bool>(),
        addr in any::<usize>(),
        blob in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let converter = Converter::default();
        let mut state = MemoryState::new();
        state.push_integer(i);
        state.push_bytes(&bytes);
        state.push_bool(b);
        state.push_light(LightRef::from_addr(addr));
        state.new_block(blob.len(), &mut |block| block.copy_from_slice(&blob));

        for index in 1..=5 {
            let pulled = converter.pull_value(&mut state, index).unwrap();
            prop_assert_eq!(converter.push_value(&mut state, &pulled).unwrap(), 1);
            prop_assert_eq!(state.slot_type(-1), state.slot_type(index));
            prop_assert_eq!(converter.pull_value(&mut state, -1).unwrap(), pulled);
            // A pushed block is a fresh allocation, so only compare it by content
            if state.slot_type(index) != SlotType::UserData {
                prop_assert!(state.raw_equal(index, -1));
            }
            state.pop(1);
        }
        prop_assert_eq!(state.top(), 5);
    }
}

proptest! {
    #[test]
    fn test_argument_pull_matches_full_pull(i in any::<i64>(), b in any::<bool>()) {
        let converter = Converter::default();
        let mut state = MemoryState::new();
        state.push_integer(i);
        state.push_bool(b);

        let args = converter.pull_args(&state, 1, 2).unwrap();
        prop_assert_eq!(&args[0], &converter.pull_value(&mut state, 1).unwrap());
        prop_assert_eq!(&args[1], &converter.pull_value(&mut state, 2).unwrap());
    }
}
