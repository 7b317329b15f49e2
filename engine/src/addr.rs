//! FILENAME: engine/src/addr.rs
//! PURPOSE: Cell identifiers and conversion between coordinate formats.
//! CONTEXT: This module provides the `CellId` type and functions to convert
//! between A1-style notation (e.g., "A1", "AA100") and 0-based (row, col)
//! numeric indices used internally.
//! Column "A" = 0, "B" = 1, ..., "Z" = 25, "AA" = 26, etc.
//! Row 1 in A1 notation = row 0 internally.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Pattern every textual cell identifier must match: column letters then row digits.
static CELL_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]+)([0-9]+)$").unwrap());

/// Converts a column string (e.g., "A", "AA", "ABC") to a 0-based column index.
/// "A" -> 0, "B" -> 1, ..., "Z" -> 25, "AA" -> 26, "AB" -> 27, etc.
pub fn letters_to_col(col_str: &str) -> u32 {
    let mut result: u32 = 0;
    for c in col_str.chars() {
        let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        result = result * 26 + digit;
    }
    result - 1 // Convert to 0-based
}

/// Converts a 0-based column index to a column string.
/// 0 -> "A", 1 -> "B", ..., 25 -> "Z", 26 -> "AA", 27 -> "AB", etc.
pub fn col_to_letters(mut col_index: u32) -> String {
    let mut result = String::new();
    loop {
        let remainder = col_index % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if col_index < 26 {
            break;
        }
        col_index = col_index / 26 - 1;
    }
    result
}

/// Identifies a single cell by 0-based row and column indices.
///
/// The textual form is the familiar A1 notation; `parse` and the `Display`
/// impl round-trip exactly: `CellId::parse(&id.to_string()) == Some(id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    pub row: u32,
    pub col: u32,
}

impl CellId {
    pub fn new(row: u32, col: u32) -> Self {
        CellId { row, col }
    }

    /// Parses an A1-style identifier. Returns None unless the string matches
    /// `^[A-Z]+[0-9]+$` with a 1-based row number.
    pub fn parse(id: &str) -> Option<Self> {
        let caps = CELL_ID_RE.captures(id)?;
        let col = letters_to_col(caps.get(1)?.as_str());
        let row: u32 = caps.get(2)?.as_str().parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(CellId { row: row - 1, col })
    }

    /// Builds a CellId from the column-letters / 1-based-row form the
    /// parser's AST carries.
    pub fn from_a1_parts(col: &str, row: u32) -> Self {
        CellId {
            row: row - 1,
            col: letters_to_col(col),
        }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_to_letters(self.col), self.row + 1)
    }
}

impl FromStr for CellId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellId::parse(s).ok_or_else(|| format!("invalid cell identifier: {}", s))
    }
}

// Cell identifiers serialize as their textual form so the state blob keys
// read "A1" rather than nested row/col objects.
impl Serialize for CellId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CellId::parse(&s).ok_or_else(|| D::Error::custom(format!("invalid cell identifier: {}", s)))
    }
}

/// The fixed dimensions of a sheet, supplied at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridBounds {
    pub rows: u32,
    pub cols: u32,
}

impl GridBounds {
    pub fn new(rows: u32, cols: u32) -> Self {
        GridBounds { rows, cols }
    }

    pub fn contains(&self, id: CellId) -> bool {
        id.row < self.rows && id.col < self.cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_to_col() {
        assert_eq!(letters_to_col("A"), 0);
        assert_eq!(letters_to_col("B"), 1);
        assert_eq!(letters_to_col("Z"), 25);
        assert_eq!(letters_to_col("AA"), 26);
        assert_eq!(letters_to_col("AB"), 27);
        assert_eq!(letters_to_col("AZ"), 51);
        assert_eq!(letters_to_col("BA"), 52);
        assert_eq!(letters_to_col("ZZ"), 701);
        assert_eq!(letters_to_col("AAA"), 702);
    }

    #[test]
    fn test_col_to_letters() {
        assert_eq!(col_to_letters(0), "A");
        assert_eq!(col_to_letters(1), "B");
        assert_eq!(col_to_letters(25), "Z");
        assert_eq!(col_to_letters(26), "AA");
        assert_eq!(col_to_letters(27), "AB");
        assert_eq!(col_to_letters(51), "AZ");
        assert_eq!(col_to_letters(52), "BA");
        assert_eq!(col_to_letters(701), "ZZ");
        assert_eq!(col_to_letters(702), "AAA");
    }

    #[test]
    fn test_column_roundtrip() {
        for i in 0..1000 {
            let col_str = col_to_letters(i);
            let back = letters_to_col(&col_str);
            assert_eq!(back, i, "Roundtrip failed for index {}", i);
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(CellId::parse("A1"), Some(CellId::new(0, 0)));
        assert_eq!(CellId::parse("B2"), Some(CellId::new(1, 1)));
        assert_eq!(CellId::parse("AA100"), Some(CellId::new(99, 26)));
        assert_eq!(CellId::parse("Z50"), Some(CellId::new(49, 25)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(CellId::parse(""), None);
        assert_eq!(CellId::parse("A"), None);
        assert_eq!(CellId::parse("1"), None);
        assert_eq!(CellId::parse("A0"), None);
        assert_eq!(CellId::parse("a1"), None);
        assert_eq!(CellId::parse("A1B"), None);
        assert_eq!(CellId::parse("$A$1"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(CellId::new(0, 0).to_string(), "A1");
        assert_eq!(CellId::new(1, 1).to_string(), "B2");
        assert_eq!(CellId::new(99, 26).to_string(), "AA100");
        assert_eq!(CellId::new(49, 25).to_string(), "Z50");
    }

    #[test]
    fn test_id_roundtrip() {
        for row in [0u32, 1, 9, 99, 1023] {
            for col in [0u32, 1, 25, 26, 51, 52, 701, 702] {
                let id = CellId::new(row, col);
                assert_eq!(CellId::parse(&id.to_string()), Some(id));
            }
        }
    }

    #[test]
    fn test_serde_as_text() {
        let id = CellId::new(99, 26);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"AA100\"");
        let back: CellId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_bounds() {
        let bounds = GridBounds::new(100, 26);
        assert!(bounds.contains(CellId::new(0, 0)));
        assert!(bounds.contains(CellId::new(99, 25)));
        assert!(!bounds.contains(CellId::new(100, 0)));
        assert!(!bounds.contains(CellId::new(0, 26)));
    }
}
