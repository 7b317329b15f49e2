//! FILENAME: engine/src/model.rs
//! PURPOSE: Passive storage for cell content, formats, geometry, and clipboard.
//! CONTEXT: This file defines the `Model` struct which acts as the container
//! for all sheet data. It uses a sparse storage strategy (HashMap) so large
//! sheets where most cells are empty stay cheap. The model never parses or
//! evaluates anything; the engine reads raw content out of it and owns the
//! results. Grid dimensions are fixed at construction.

use crate::addr::{CellId, GridBounds};
use crate::cell::CellFormat;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_COLUMN_WIDTH: f64 = 100.0;
pub const DEFAULT_ROW_HEIGHT: f64 = 24.0;

/// The single-slot clipboard: a snapshot of one cell's content and format,
/// remembering where it was taken so fills can compute their offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Clipboard {
    pub content: String,
    pub format: CellFormat,
    pub source: CellId,
}

/// The Model holds the raw state of the sheet.
#[derive(Debug, Clone)]
pub struct Model {
    bounds: GridBounds,

    /// Sparse storage: only cells that have content appear here.
    contents: HashMap<CellId, String>,

    /// Display formats; cells missing here render Raw.
    formats: HashMap<CellId, CellFormat>,

    /// Column widths / row heights in pixels, sparse over the defaults.
    column_widths: HashMap<u32, f64>,
    row_heights: HashMap<u32, f64>,

    selected: Option<CellId>,
    clipboard: Option<Clipboard>,
}

impl Model {
    /// Creates an empty model with the given fixed dimensions.
    pub fn new(rows: u32, cols: u32) -> Self {
        Model {
            bounds: GridBounds::new(rows, cols),
            contents: HashMap::new(),
            formats: HashMap::new(),
            column_widths: HashMap::new(),
            row_heights: HashMap::new(),
            selected: None,
            clipboard: None,
        }
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    // ========================================================================
    // CONTENT
    // ========================================================================

    pub fn get_content(&self, id: CellId) -> Option<&str> {
        self.contents.get(&id).map(|s| s.as_str())
    }

    /// Stores raw content for a cell. Writes outside the grid are dropped.
    pub fn set_content(&mut self, id: CellId, content: impl Into<String>) {
        if !self.bounds.contains(id) {
            warn!("ignoring content write outside the sheet: {}", id);
            return;
        }
        self.contents.insert(id, content.into());
    }

    /// Removes a cell's content. The format tag survives a clear.
    pub fn clear(&mut self, id: CellId) {
        self.contents.remove(&id);
    }

    pub fn has_content(&self, id: CellId) -> bool {
        self.contents.contains_key(&id)
    }

    /// Iterates every cell that currently has content, in no particular order.
    pub fn cells_with_content(&self) -> impl Iterator<Item = (CellId, &str)> {
        self.contents.iter().map(|(&id, s)| (id, s.as_str()))
    }

    // ========================================================================
    // FORMATS & GEOMETRY
    // ========================================================================

    pub fn get_format(&self, id: CellId) -> CellFormat {
        self.formats.get(&id).copied().unwrap_or_default()
    }

    pub fn set_format(&mut self, id: CellId, format: CellFormat) {
        if !self.bounds.contains(id) {
            warn!("ignoring format write outside the sheet: {}", id);
            return;
        }
        if format == CellFormat::Raw {
            self.formats.remove(&id);
        } else {
            self.formats.insert(id, format);
        }
    }

    pub fn column_width(&self, col: u32) -> f64 {
        self.column_widths
            .get(&col)
            .copied()
            .unwrap_or(DEFAULT_COLUMN_WIDTH)
    }

    pub fn set_column_width(&mut self, col: u32, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn row_height(&self, row: u32) -> f64 {
        self.row_heights
            .get(&row)
            .copied()
            .unwrap_or(DEFAULT_ROW_HEIGHT)
    }

    pub fn set_row_height(&mut self, row: u32, height: f64) {
        self.row_heights.insert(row, height);
    }

    // ========================================================================
    // SELECTION & CLIPBOARD
    // ========================================================================

    pub fn selected(&self) -> Option<CellId> {
        self.selected
    }

    pub fn set_selected(&mut self, id: Option<CellId>) {
        match id {
            Some(cell) if !self.bounds.contains(cell) => {
                warn!("ignoring selection outside the sheet: {}", cell);
            }
            other => self.selected = other,
        }
    }

    /// Snapshots a cell into the single-slot clipboard.
    pub fn copy_cell(&mut self, id: CellId) {
        self.clipboard = Some(Clipboard {
            content: self.get_content(id).unwrap_or_default().to_string(),
            format: self.get_format(id),
            source: id,
        });
    }

    pub fn clipboard(&self) -> Option<&Clipboard> {
        self.clipboard.as_ref()
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Search cell contents for the query string.
    /// Returns matches sorted by row then column (reading order).
    pub fn find_all(&self, query: &str, case_sensitive: bool, match_entire_cell: bool) -> Vec<CellId> {
        if query.is_empty() {
            return Vec::new();
        }

        let query_normalized = if case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };

        let mut matches: Vec<CellId> = self
            .contents
            .iter()
            .filter(|(_, content)| {
                let normalized = if case_sensitive {
                    (*content).clone()
                } else {
                    content.to_lowercase()
                };
                if match_entire_cell {
                    normalized == query_normalized
                } else {
                    normalized.contains(&query_normalized)
                }
            })
            .map(|(&id, _)| id)
            .collect();

        matches.sort_by_key(|id| (id.row, id.col));
        matches
    }

    // ========================================================================
    // STATE IMPORT / EXPORT
    // ========================================================================

    /// Snapshots everything a load/save round-trip must preserve.
    pub fn export_state(&self) -> SheetState {
        let cells = self
            .contents
            .iter()
            .map(|(&id, content)| {
                (
                    id,
                    CellContent {
                        content: content.clone(),
                    },
                )
            })
            .collect();

        let mut column_widths: Vec<(u32, f64)> =
            self.column_widths.iter().map(|(&c, &w)| (c, w)).collect();
        column_widths.sort_by_key(|&(c, _)| c);

        let mut row_heights: Vec<(u32, f64)> =
            self.row_heights.iter().map(|(&r, &h)| (r, h)).collect();
        row_heights.sort_by_key(|&(r, _)| r);

        let mut cell_formats: Vec<(CellId, CellFormat)> =
            self.formats.iter().map(|(&id, &f)| (id, f)).collect();
        cell_formats.sort_by_key(|&(id, _)| id);

        SheetState {
            cells,
            column_widths,
            row_heights,
            cell_formats,
            selected_cell: self.selected,
        }
    }

    /// Replaces the model's state wholesale. Entries that fall outside this
    /// model's grid are dropped with a warning rather than aborting the load.
    pub fn import_state(&mut self, state: SheetState) {
        self.contents.clear();
        self.formats.clear();
        self.column_widths.clear();
        self.row_heights.clear();
        self.clipboard = None;

        for (id, cell) in state.cells {
            if self.bounds.contains(id) {
                self.contents.insert(id, cell.content);
            } else {
                warn!("dropping out-of-bounds cell {} on import", id);
            }
        }

        for (id, format) in state.cell_formats {
            if self.bounds.contains(id) {
                self.set_format(id, format);
            }
        }

        for (col, width) in state.column_widths {
            self.column_widths.insert(col, width);
        }
        for (row, height) in state.row_heights {
            self.row_heights.insert(row, height);
        }

        self.selected = state.selected_cell.filter(|&id| self.bounds.contains(id));
    }
}

/// The serialized form of a single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellContent {
    pub content: String,
}

/// The load/save blob: everything needed to reconstruct a sheet.
/// Serializes to the JSON shape the application's files use, with cell
/// identifiers as textual keys and geometry as [index, size] pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetState {
    pub cells: BTreeMap<CellId, CellContent>,
    pub column_widths: Vec<(u32, f64)>,
    pub row_heights: Vec<(u32, f64)>,
    pub cell_formats: Vec<(CellId, CellFormat)>,
    pub selected_cell: Option<CellId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CellId {
        CellId::parse(s).unwrap()
    }

    #[test]
    fn test_content_roundtrip() {
        let mut model = Model::new(100, 26);
        model.set_content(id("A1"), "hello");
        assert_eq!(model.get_content(id("A1")), Some("hello"));
        assert_eq!(model.get_content(id("B1")), None);

        model.clear(id("A1"));
        assert_eq!(model.get_content(id("A1")), None);
    }

    #[test]
    fn test_out_of_bounds_writes_are_dropped() {
        let mut model = Model::new(10, 10);
        model.set_content(id("Z99"), "nope");
        assert_eq!(model.get_content(id("Z99")), None);
    }

    #[test]
    fn test_formats_default_to_raw() {
        let mut model = Model::new(100, 26);
        assert_eq!(model.get_format(id("A1")), CellFormat::Raw);
        model.set_format(id("A1"), CellFormat::Currency);
        assert_eq!(model.get_format(id("A1")), CellFormat::Currency);
    }

    #[test]
    fn test_geometry_defaults() {
        let mut model = Model::new(100, 26);
        assert_eq!(model.column_width(3), DEFAULT_COLUMN_WIDTH);
        assert_eq!(model.row_height(3), DEFAULT_ROW_HEIGHT);

        model.set_column_width(3, 150.0);
        model.set_row_height(3, 40.0);
        assert_eq!(model.column_width(3), 150.0);
        assert_eq!(model.row_height(3), 40.0);
    }

    #[test]
    fn test_clipboard_snapshot() {
        let mut model = Model::new(100, 26);
        model.set_content(id("B2"), "=A1*2");
        model.set_format(id("B2"), CellFormat::Percentage);
        model.copy_cell(id("B2"));

        // Later edits must not bleed into the snapshot.
        model.set_content(id("B2"), "changed");

        let clip = model.clipboard().unwrap();
        assert_eq!(clip.content, "=A1*2");
        assert_eq!(clip.format, CellFormat::Percentage);
        assert_eq!(clip.source, id("B2"));
    }

    #[test]
    fn test_find_all_reading_order() {
        let mut model = Model::new(100, 26);
        model.set_content(id("B2"), "hello world");
        model.set_content(id("A1"), "hello");
        model.set_content(id("C1"), "HELLO");

        let matches = model.find_all("hello", false, false);
        assert_eq!(matches, vec![id("A1"), id("C1"), id("B2")]);

        let exact = model.find_all("hello", true, true);
        assert_eq!(exact, vec![id("A1")]);
    }

    #[test]
    fn test_state_export_import_roundtrip() {
        let mut model = Model::new(100, 26);
        model.set_content(id("A1"), "10");
        model.set_content(id("B1"), "=A1*2");
        model.set_format(id("B1"), CellFormat::Number);
        model.set_column_width(0, 120.0);
        model.set_row_height(4, 32.0);
        model.set_selected(Some(id("B1")));

        let state = model.export_state();

        let mut restored = Model::new(100, 26);
        restored.import_state(state.clone());

        assert_eq!(restored.get_content(id("A1")), Some("10"));
        assert_eq!(restored.get_content(id("B1")), Some("=A1*2"));
        assert_eq!(restored.get_format(id("B1")), CellFormat::Number);
        assert_eq!(restored.column_width(0), 120.0);
        assert_eq!(restored.row_height(4), 32.0);
        assert_eq!(restored.selected(), Some(id("B1")));
        assert_eq!(restored.export_state(), state);
    }

    #[test]
    fn test_state_json_shape() {
        let mut model = Model::new(100, 26);
        model.set_content(id("A1"), "hi");
        model.set_format(id("A1"), CellFormat::Date);
        model.set_column_width(2, 80.0);
        model.set_selected(Some(id("A1")));

        let json = serde_json::to_value(model.export_state()).unwrap();
        assert_eq!(json["cells"]["A1"]["content"], "hi");
        assert_eq!(json["columnWidths"][0][0], 2);
        assert_eq!(json["columnWidths"][0][1], 80.0);
        assert_eq!(json["cellFormats"][0][0], "A1");
        assert_eq!(json["cellFormats"][0][1], "Date");
        assert_eq!(json["selectedCell"], "A1");
    }

    #[test]
    fn test_import_drops_out_of_bounds_entries() {
        let mut big = Model::new(1000, 100);
        big.set_content(id("AZ500"), "far away");
        big.set_content(id("A1"), "near");
        let state = big.export_state();

        let mut small = Model::new(10, 10);
        small.import_state(state);
        assert_eq!(small.get_content(id("A1")), Some("near"));
        assert_eq!(small.get_content(id("AZ500")), None);
    }
}
