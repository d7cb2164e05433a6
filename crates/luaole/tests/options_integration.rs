//! Integration tests for loading bridge options from disk

use std::sync::Arc;

use luaole::{Bridge, BridgeOptions, ConfigError, Converter};
use luaole_harness::{ClassDef, MemoryAutomation, MemoryState};
use luaole_sdk::{FunctionValue, GenericValue, ScriptStack, SlotType};

fn write_options(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("luaole.toml");
    std::fs::write(&path, contents).unwrap();
    (temp, path)
}

#[test]
fn test_load_options_file() {
    let (_temp, path) = write_options(
        r#"
global_name = "NewObject"
chunk_name = "=captured"
max_table_depth = 8
"#,
    );

    let options = BridgeOptions::from_file(&path).unwrap();
    assert_eq!(options.global_name, "NewObject");
    assert_eq!(options.chunk_name, "=captured");
    assert_eq!(options.max_table_depth, 8);
}

#[test]
fn test_missing_file() {
    let temp = tempfile::tempdir().unwrap();
    let err = BridgeOptions::from_file(temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::IoError(_)));
}

#[test]
fn test_malformed_file() {
    let (_temp, path) = write_options("global_name = \n");
    let err = BridgeOptions::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_empty_global_name_is_rejected() {
    let (_temp, path) = write_options("global_name = \"\"\n");
    let err = BridgeOptions::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[test]
fn test_loaded_options_drive_the_bridge() {
    let (_temp, path) = write_options("global_name = \"NewObject\"\nchunk_name = \"=captured\"\n");
    let options = BridgeOptions::from_file(&path).unwrap();

    let automation = Arc::new(MemoryAutomation::new());
    automation.register(ClassDef::new("Test.Object"));
    let mut state = MemoryState::new();
    Bridge::with_options(automation.clone(), options.clone()).install(&mut state);

    assert_eq!(state.get_global("NewObject"), SlotType::Function);
    state.push_str("Test.Object");
    assert_eq!(state.call(1).unwrap(), 1);
    assert_eq!(automation.live_objects(), 1);

    // Reloaded chunks carry the configured name
    let converter = Converter::new(&options);
    state.push_script_function(b"body");
    let captured = converter.pull_value(&mut state, -1).unwrap();
    assert!(matches!(
        captured,
        GenericValue::Function(FunctionValue::Bytecode(_))
    ));
    assert_eq!(converter.push_value(&mut state, &captured).unwrap(), 1);
    assert_eq!(state.chunk_name(-1).as_deref(), Some("=captured"));
}
