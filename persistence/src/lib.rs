//! Sheet Persistence Module
//!
//! Handles saving and loading sheet state as JSON. The on-disk shape is the
//! engine's `SheetState`: cell contents keyed by identifier, geometry as
//! index/size pairs, per-cell display formats, and the current selection.
//! Loading validates identifiers as part of deserialization, so a corrupt
//! file surfaces as an error rather than a half-imported sheet.

mod error;

pub use error::PersistenceError;

use engine::SheetState;
use std::fs;
use std::path::Path;

/// Serializes a sheet state to its JSON text form.
pub fn to_json(state: &SheetState) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string_pretty(state)?)
}

/// Parses a sheet state from JSON text.
pub fn from_json(json: &str) -> Result<SheetState, PersistenceError> {
    Ok(serde_json::from_str(json)?)
}

/// Writes a sheet state to a file.
pub fn save_sheet(path: impl AsRef<Path>, state: &SheetState) -> Result<(), PersistenceError> {
    fs::write(path, to_json(state)?)?;
    Ok(())
}

/// Reads a sheet state back from a file.
pub fn load_sheet(path: impl AsRef<Path>) -> Result<SheetState, PersistenceError> {
    from_json(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{CellFormat, CellId, Engine};

    fn id(s: &str) -> CellId {
        CellId::parse(s).unwrap()
    }

    fn sample_state() -> SheetState {
        let mut engine = Engine::new(100, 26);
        engine.set_content(id("A1"), "10");
        engine.set_content(id("B1"), "=A1*2");
        engine.set_content(id("C3"), "label");
        engine.set_format(id("A1"), CellFormat::Currency);
        engine.set_column_width(0, 130.0);
        engine.set_row_height(2, 36.0);
        engine.set_selected(Some(id("A1")));
        engine.export_state()
    }

    #[test]
    fn test_json_round_trip_is_lossless() {
        let state = sample_state();
        let json = to_json(&state).unwrap();
        let restored = from_json(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_json_uses_the_documented_shape() {
        let json = to_json(&sample_state()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["cells"]["B1"]["content"], "=A1*2");
        assert_eq!(value["columnWidths"][0][0], 0);
        assert_eq!(value["columnWidths"][0][1], 130.0);
        assert_eq!(value["rowHeights"][0][0], 2);
        assert_eq!(value["cellFormats"][0][0], "A1");
        assert_eq!(value["cellFormats"][0][1], "Currency");
        assert_eq!(value["selectedCell"], "A1");
    }

    #[test]
    fn test_null_selection_round_trips() {
        let mut engine = Engine::new(10, 10);
        engine.set_content(id("A1"), "x");
        let state = engine.export_state();
        assert_eq!(state.selected_cell, None);

        let json = to_json(&state).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["selectedCell"].is_null());
        assert_eq!(from_json(&json).unwrap().selected_cell, None);
    }

    #[test]
    fn test_invalid_cell_keys_are_rejected() {
        let json = r#"{
            "cells": {"NOT A CELL": {"content": "1"}},
            "columnWidths": [],
            "rowHeights": [],
            "cellFormats": [],
            "selectedCell": null
        }"#;
        assert!(matches!(
            from_json(json),
            Err(PersistenceError::Json(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let state = sample_state();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.json");

        save_sheet(&path, &state).unwrap();
        let restored = load_sheet(&path).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = load_sheet("/definitely/not/here.json");
        assert!(matches!(result, Err(PersistenceError::Io(_))));
    }
}
