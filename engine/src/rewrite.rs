//! FILENAME: engine/src/rewrite.rs
//! PURPOSE: Rewrites cell references in formula text under structural edits.
//! CONTEXT: When an editor inserts or deletes a row/column, or fills a
//! formula from one cell to another, every reference in the affected
//! formulas must shift. The rewrite works directly on the formula string,
//! splicing new references over the old spans, so spacing and everything
//! else in the text survive byte-for-byte. A reference destroyed by the
//! edit becomes the #REF! sentinel, which parses into a node that
//! evaluates to a reference error.

use crate::addr::{CellId, GridBounds};

/// A structural edit applied to every reference in a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefEdit {
    /// Uniform translation, used when filling or pasting a formula from a
    /// source cell to a destination cell.
    Offset { rows: i64, cols: i64 },
    /// A row was inserted before 0-based index k: rows >= k shift down.
    InsertRow(u32),
    /// Row k was deleted: references to it die, rows > k shift up.
    DeleteRow(u32),
    /// A column was inserted before 0-based index k: columns >= k shift right.
    InsertCol(u32),
    /// Column k was deleted: references to it die, columns > k shift left.
    DeleteCol(u32),
}

impl RefEdit {
    /// The translation a fill from `source` to `dest` applies to references.
    pub fn fill(source: CellId, dest: CellId) -> Self {
        RefEdit::Offset {
            rows: dest.row as i64 - source.row as i64,
            cols: dest.col as i64 - source.col as i64,
        }
    }

    /// Applies the edit to one reference. None means the reference no
    /// longer exists (deleted, or pushed outside the sheet).
    fn apply(&self, id: CellId, bounds: GridBounds) -> Option<CellId> {
        let (row, col) = match *self {
            RefEdit::Offset { rows, cols } => {
                (id.row as i64 + rows, id.col as i64 + cols)
            }
            RefEdit::InsertRow(k) => {
                let row = if id.row >= k { id.row as i64 + 1 } else { id.row as i64 };
                (row, id.col as i64)
            }
            RefEdit::DeleteRow(k) => {
                if id.row == k {
                    return None;
                }
                let row = if id.row > k { id.row as i64 - 1 } else { id.row as i64 };
                (row, id.col as i64)
            }
            RefEdit::InsertCol(k) => {
                let col = if id.col >= k { id.col as i64 + 1 } else { id.col as i64 };
                (id.row as i64, col)
            }
            RefEdit::DeleteCol(k) => {
                if id.col == k {
                    return None;
                }
                let col = if id.col > k { id.col as i64 - 1 } else { id.col as i64 };
                (id.row as i64, col)
            }
        };

        if row < 0 || col < 0 {
            return None;
        }
        let shifted = CellId::new(row as u32, col as u32);
        if bounds.contains(shifted) {
            Some(shifted)
        } else {
            None
        }
    }
}

/// Rewrites every cell reference in `formula` under `edit`, leaving all
/// other text (operators, spacing, string literals, function names) intact.
pub fn rewrite_references(formula: &str, edit: RefEdit, bounds: GridBounds) -> String {
    let chars: Vec<char> = formula.chars().collect();
    let mut out = String::with_capacity(formula.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        // String literals are opaque; "A1" inside quotes is text, not a reference.
        if ch == '"' {
            out.push(ch);
            i += 1;
            while i < chars.len() {
                out.push(chars[i]);
                i += 1;
                if chars[i - 1] == '"' {
                    break;
                }
            }
            continue;
        }

        if ch.is_ascii_alphabetic() {
            // Collect the whole identifier run.
            let start = i;
            while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();

            // A name followed by '(' is a function call, not a reference.
            let is_call = chars.get(i) == Some(&'(');

            match (is_call, parse_ref_ident(&ident)) {
                (false, Some(id)) => match edit.apply(id, bounds) {
                    Some(shifted) => out.push_str(&shifted.to_string()),
                    None => out.push_str("#REF!"),
                },
                _ => out.push_str(&ident),
            }
            continue;
        }

        out.push(ch);
        i += 1;
    }

    out
}

/// Recognizes an identifier of the exact shape LETTERS then DIGITS as a
/// cell reference (case-insensitive, rows 1-based).
fn parse_ref_ident(ident: &str) -> Option<CellId> {
    let upper = ident.to_ascii_uppercase();
    CellId::parse(&upper)
}
