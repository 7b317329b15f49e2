//! FILENAME: engine/src/cell.rs
//! PURPOSE: Defines the fundamental value and error types for a single cell.
//! CONTEXT: This file contains the `CellValue` enum (the calculated result of
//! a cell), the `EvalError` enum (every way evaluation can fail), and the
//! `CellFormat` display tag carried alongside cell content. It is designed
//! to be lightweight as millions of these instances may exist.

use crate::addr::CellId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents the calculated result or raw data within a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Attempts to coerce the value to a number.
    /// Text is parsed after trimming; empty cells do not coerce (aggregate
    /// functions decide for themselves whether to skip or zero them).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            CellValue::Empty => None,
        }
    }

    /// Returns the display text of the value.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                // Format without unnecessary decimal places
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{:.0}", n)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// Everything that can go wrong while parsing or evaluating a formula.
/// Failures never panic; they are stored per cell and cascade to dependents
/// as `ReferencedError`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid reference: {0}")]
    Reference(String),

    #[error("Cell {0} is empty")]
    EmptyCell(CellId),

    /// A cell transitively refers to another cell whose cached result is an
    /// error. The message carries the source cell's own error text.
    #[error("Cell {cell} has an error: {message}")]
    ReferencedError { cell: CellId, message: String },

    #[error("Circular dependency detected: {}", format_cycle_path(.0))]
    Cycle(Vec<CellId>),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("{0}")]
    Argument(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

/// Renders a cycle path as "A1 -> B1 -> A1".
fn format_cycle_path(path: &[CellId]) -> String {
    path.iter()
        .map(CellId::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// The stored outcome of evaluating a cell.
pub type CellResult = Result<CellValue, EvalError>;

/// Display-format tag attached to a cell. Pure metadata for the rendering
/// layer; evaluation never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellFormat {
    #[default]
    Raw,
    Number,
    Currency,
    Percentage,
    Date,
    Time,
    Boolean,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_coercion() {
        assert_eq!(CellValue::Number(42.0).as_number(), Some(42.0));
        assert_eq!(CellValue::Text(" 3.5 ".to_string()).as_number(), Some(3.5));
        assert_eq!(CellValue::Text("abc".to_string()).as_number(), None);
        assert_eq!(CellValue::Empty.as_number(), None);
    }

    #[test]
    fn test_value_display_text() {
        assert_eq!(CellValue::Number(42.0).as_text(), "42");
        assert_eq!(CellValue::Number(3.14).as_text(), "3.14");
        assert_eq!(CellValue::Text("hi".to_string()).as_text(), "hi");
        assert_eq!(CellValue::Empty.as_text(), "");
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = EvalError::Cycle(vec![
            CellId::new(0, 0),
            CellId::new(0, 1),
            CellId::new(0, 0),
        ]);
        assert_eq!(
            err.to_string(),
            "Circular dependency detected: A1 -> B1 -> A1"
        );
    }

    #[test]
    fn test_referenced_error_names_source() {
        let err = EvalError::ReferencedError {
            cell: CellId::new(0, 0),
            message: "Division by zero".to_string(),
        };
        assert_eq!(err.to_string(), "Cell A1 has an error: Division by zero");
    }
}
