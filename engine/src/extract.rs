//! FILENAME: engine/src/extract.rs
//! PURPOSE: Extracts cell references from raw formula text.
//! CONTEXT: Dependency edges are rebuilt every time a cell's content
//! changes. Extraction runs over the token stream rather than the AST so a
//! formula that fails to parse still contributes whatever references lex
//! out — its dependents stay wired up while the user is mid-edit.
//! Ranges (e.g., A1:B10) are expanded to include all cells within the range.

use crate::addr::CellId;
use crate::range;
use parser::lexer::Lexer;
use parser::token::Token;
use std::collections::HashSet;

/// Collects every cell a formula reads: each bare reference plus every
/// member of each range. Non-formula content (no leading '=') has no
/// references by definition.
pub fn extract_references(raw: &str) -> HashSet<CellId> {
    let mut refs = HashSet::new();

    let Some(body) = raw.strip_prefix('=') else {
        return refs;
    };

    let tokens = Lexer::new(body).tokenize();
    let mut i = 0;
    while i < tokens.len() {
        if let Token::CellRef { col, row } = &tokens[i] {
            let start = CellId::from_a1_parts(col, *row);

            // CellRef Colon CellRef is a range; expand its membership.
            if let (Some(Token::Colon), Some(Token::CellRef { col: ec, row: er })) =
                (tokens.get(i + 1), tokens.get(i + 2))
            {
                let end = CellId::from_a1_parts(ec, *er);
                if let Ok(cells) = range::expand(start, end) {
                    refs.extend(cells);
                }
                // A reversed range contributes nothing; evaluation will
                // surface the error.
                i += 3;
                continue;
            }

            refs.insert(start);
        }
        i += 1;
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CellId {
        CellId::parse(s).unwrap()
    }

    fn set_of(ids: &[&str]) -> HashSet<CellId> {
        ids.iter().map(|s| id(s)).collect()
    }

    #[test]
    fn test_non_formula_has_no_references() {
        assert!(extract_references("42").is_empty());
        assert!(extract_references("A1 + B1").is_empty());
        assert!(extract_references("").is_empty());
    }

    #[test]
    fn test_extracts_bare_references() {
        assert_eq!(extract_references("=A1 + B2 * C3"), set_of(&["A1", "B2", "C3"]));
    }

    #[test]
    fn test_deduplicates_repeats() {
        assert_eq!(extract_references("=A1 + A1"), set_of(&["A1"]));
    }

    #[test]
    fn test_expands_ranges() {
        assert_eq!(
            extract_references("=SUM(A1:B2)"),
            set_of(&["A1", "A2", "B1", "B2"])
        );
    }

    #[test]
    fn test_mixes_ranges_and_cells() {
        assert_eq!(
            extract_references("=SUM(A1:A3) + D4"),
            set_of(&["A1", "A2", "A3", "D4"])
        );
    }

    #[test]
    fn test_reversed_range_contributes_nothing() {
        assert!(extract_references("=SUM(B2:A1)").is_empty());
    }

    #[test]
    fn test_unparseable_formula_still_yields_references() {
        // Trailing operator: the parser would reject this, the lexer does not.
        assert_eq!(extract_references("=A1 +"), set_of(&["A1"]));
    }

    #[test]
    fn test_string_literals_are_not_references() {
        assert_eq!(extract_references("=CONCAT(\"A1\", B1)"), set_of(&["B1"]));
    }
}
