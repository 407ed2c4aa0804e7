//! Unit tests for persisted launcher state.

use cellar::models::BinaryType;
use cellar::state::{BinaryState, State};
use cellar::AppError;

#[test]
fn missing_state_file_is_empty_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = State::load(&dir.path().join("state.json")).unwrap();
    assert_eq!(state, State::default());
}

#[test]
fn saved_state_is_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");

    let mut state = State::default();
    *state.binary_mut(BinaryType::Studio) = BinaryState {
        version: Some("version-0123456789abcdef".into()),
        channel: Some("zstudio".into()),
    };
    state.save(&path).unwrap();

    let loaded = State::load(&path).unwrap();
    assert_eq!(loaded, state);
    assert_eq!(loaded.binary(BinaryType::Player), &BinaryState::default());
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn corrupt_state_file_is_a_state_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = State::load(&path).unwrap_err();
    assert!(matches!(err, AppError::State(_)), "{err}");
}
