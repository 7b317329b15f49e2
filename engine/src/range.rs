//! FILENAME: engine/src/range.rs
//! PURPOSE: Range membership expansion and the 2-D value matrix.
//! CONTEXT: A range like A1:C3 plays two roles. For dependency tracking it
//! expands into a flat, column-major list of member cells (this order is
//! observable and must not change). For evaluation it becomes a row-major
//! `RangeValues` matrix, the shape lookup functions like VLOOKUP and INDEX
//! expect. Both layouts are kept; conversion happens where a range is
//! evaluated.

use crate::addr::CellId;
use crate::cell::{CellValue, EvalError};

/// Expands a range into the ordered list of its member cells, column-major:
/// A1:B2 -> [A1, A2, B1, B2].
///
/// The corners must already be ordered (start at the top-left); reversed
/// ranges are rejected rather than silently normalized.
pub fn expand(start: CellId, end: CellId) -> Result<Vec<CellId>, EvalError> {
    if start.row > end.row || start.col > end.col {
        return Err(EvalError::Argument(format!(
            "Reversed range {}:{}",
            start, end
        )));
    }

    let rows = (end.row - start.row + 1) as usize;
    let cols = (end.col - start.col + 1) as usize;
    let mut cells = Vec::with_capacity(rows * cols);

    for col in start.col..=end.col {
        for row in start.row..=end.row {
            cells.push(CellId::new(row, col));
        }
    }

    Ok(cells)
}

/// A rectangular matrix of cell values produced by evaluating a Range node.
/// Stored row-major: `values[r][c]` addresses row r, column c of the range,
/// both 0-based relative to the range's top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeValues {
    values: Vec<Vec<CellValue>>,
}

impl RangeValues {
    pub fn new(values: Vec<Vec<CellValue>>) -> Self {
        RangeValues { values }
    }

    pub fn rows(&self) -> usize {
        self.values.len()
    }

    pub fn cols(&self) -> usize {
        self.values.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.values.get(row).and_then(|r| r.get(col))
    }

    pub fn row(&self, row: usize) -> Option<&[CellValue]> {
        self.values.get(row).map(|r| r.as_slice())
    }

    /// Iterates every value in reading order (row by row).
    pub fn iter(&self) -> impl Iterator<Item = &CellValue> {
        self.values.iter().flat_map(|r| r.iter())
    }

    /// Flattens a single-row or single-column range into a vector.
    /// Returns None for genuinely two-dimensional ranges.
    pub fn as_vector(&self) -> Option<Vec<&CellValue>> {
        if self.rows() == 1 {
            Some(self.values[0].iter().collect())
        } else if self.cols() == 1 {
            Some(self.values.iter().map(|r| &r[0]).collect())
        } else {
            None
        }
    }
}
