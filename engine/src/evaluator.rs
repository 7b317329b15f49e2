//! FILENAME: engine/src/evaluator.rs
//! PURPOSE: Evaluates AST expressions to compute cell values.
//! CONTEXT: After a formula is parsed into an AST, this module traverses
//! the tree and computes the final result. Cell references are resolved
//! through a lookup callback into the engine's cached-result store, so the
//! evaluator never touches the model directly and can be driven from tests
//! with a plain closure over a map.
//!
//! SUPPORTED FEATURES:
//! - Literal evaluation: numbers, strings
//! - Cell reference lookup with bounds checking and error cascading
//! - Range expansion into 2-D matrices for aggregate and lookup functions
//! - Binary operations: +, -, *, /, =, <>, <, >, <=, >=
//! - Unary negation
//! - Function dispatch through the registry in functions.rs

use crate::addr::{CellId, GridBounds};
use crate::cell::{CellResult, CellValue, EvalError};
use crate::functions::{self, Operand};
use crate::range::RangeValues;
use parser::ast::{BinaryOperator, Expression, UnaryOperator, Value};

/// Resolves a cell to its cached evaluation result.
/// None means the cell has never been evaluated at all.
pub type LookupFn<'a> = dyn Fn(CellId) -> Option<CellResult> + 'a;

/// The formula evaluator.
/// Holds the result-store callback and the sheet bounds for reference checks.
pub struct Evaluator<'a> {
    lookup: &'a LookupFn<'a>,
    bounds: GridBounds,
}

impl<'a> Evaluator<'a> {
    pub fn new(lookup: &'a LookupFn<'a>, bounds: GridBounds) -> Self {
        Evaluator { lookup, bounds }
    }

    /// Evaluates an expression to a single cell value.
    /// A bare range is not a value; it only makes sense as a function argument.
    pub fn evaluate(&self, expr: &Expression) -> CellResult {
        match self.eval(expr)? {
            Operand::Scalar(value) => Ok(value),
            Operand::Range(_) => Err(EvalError::TypeMismatch(
                "a range cannot be used as a single value".to_string(),
            )),
        }
    }

    fn eval(&self, expr: &Expression) -> Result<Operand, EvalError> {
        match expr {
            Expression::Literal(Value::Number(n)) => Ok(Operand::Scalar(CellValue::Number(*n))),
            Expression::Literal(Value::String(s)) => {
                Ok(Operand::Scalar(CellValue::Text(s.clone())))
            }
            Expression::CellRef { col, row } => {
                let id = CellId::from_a1_parts(col, *row);
                Ok(Operand::Scalar(self.cell_value(id)?))
            }
            Expression::Range { start, end } => self.eval_range(start, end),
            Expression::RefError => Err(EvalError::Reference(
                "formula contains #REF!".to_string(),
            )),
            Expression::UnaryOp { op, operand } => self.eval_unary_op(*op, operand),
            Expression::BinaryOp { left, op, right } => self.eval_binary_op(left, *op, right),
            Expression::FunctionCall { name, args } => self.eval_function(name, args),
        }
    }

    /// Resolves a single cell reference against the cached-result store.
    fn cell_value(&self, id: CellId) -> Result<CellValue, EvalError> {
        if !self.bounds.contains(id) {
            return Err(EvalError::Reference(format!(
                "{} is outside the sheet",
                id
            )));
        }

        match (self.lookup)(id) {
            None => Err(EvalError::EmptyCell(id)),
            Some(Ok(value)) => Ok(value),
            Some(Err(source)) => Err(EvalError::ReferencedError {
                cell: id,
                message: source.to_string(),
            }),
        }
    }

    /// Evaluates a range into a row-major matrix of member values.
    /// Absent and empty member cells contribute Empty; a member cached as an
    /// error poisons the whole range.
    fn eval_range(&self, start: &Expression, end: &Expression) -> Result<Operand, EvalError> {
        let (start_id, end_id) = match (start, end) {
            (
                Expression::CellRef { col: sc, row: sr },
                Expression::CellRef { col: ec, row: er },
            ) => (
                CellId::from_a1_parts(sc, *sr),
                CellId::from_a1_parts(ec, *er),
            ),
            _ => {
                return Err(EvalError::Reference(
                    "range corners must be cell references".to_string(),
                ))
            }
        };

        if start_id.row > end_id.row || start_id.col > end_id.col {
            return Err(EvalError::Argument(format!(
                "Reversed range {}:{}",
                start_id, end_id
            )));
        }
        if !self.bounds.contains(start_id) || !self.bounds.contains(end_id) {
            return Err(EvalError::Reference(format!(
                "range {}:{} extends outside the sheet",
                start_id, end_id
            )));
        }

        let mut rows = Vec::with_capacity((end_id.row - start_id.row + 1) as usize);
        for row in start_id.row..=end_id.row {
            let mut cells = Vec::with_capacity((end_id.col - start_id.col + 1) as usize);
            for col in start_id.col..=end_id.col {
                let id = CellId::new(row, col);
                let value = match (self.lookup)(id) {
                    None => CellValue::Empty,
                    Some(Ok(value)) => value,
                    Some(Err(source)) => {
                        return Err(EvalError::ReferencedError {
                            cell: id,
                            message: source.to_string(),
                        })
                    }
                };
                cells.push(value);
            }
            rows.push(cells);
        }

        Ok(Operand::Range(RangeValues::new(rows)))
    }

    fn eval_unary_op(
        &self,
        op: UnaryOperator,
        operand: &Expression,
    ) -> Result<Operand, EvalError> {
        let value = self.eval(operand)?;
        match op {
            UnaryOperator::Negate => {
                let n = value.to_number()?;
                Ok(Operand::Scalar(CellValue::Number(-n)))
            }
        }
    }

    fn eval_binary_op(
        &self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
    ) -> Result<Operand, EvalError> {
        let lhs = self.eval(left)?;
        let rhs = self.eval(right)?;

        let result = match op {
            BinaryOperator::Add => CellValue::Number(lhs.to_number()? + rhs.to_number()?),
            BinaryOperator::Subtract => CellValue::Number(lhs.to_number()? - rhs.to_number()?),
            BinaryOperator::Multiply => CellValue::Number(lhs.to_number()? * rhs.to_number()?),
            BinaryOperator::Divide => {
                let divisor = rhs.to_number()?;
                if divisor == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                CellValue::Number(lhs.to_number()? / divisor)
            }

            BinaryOperator::Equal => bool_value(equality(lhs.as_scalar()?, rhs.as_scalar()?)),
            BinaryOperator::NotEqual => {
                bool_value(!equality(lhs.as_scalar()?, rhs.as_scalar()?))
            }

            // Ordering always compares numerically.
            BinaryOperator::LessThan => bool_value(lhs.to_number()? < rhs.to_number()?),
            BinaryOperator::GreaterThan => bool_value(lhs.to_number()? > rhs.to_number()?),
            BinaryOperator::LessEqual => bool_value(lhs.to_number()? <= rhs.to_number()?),
            BinaryOperator::GreaterEqual => bool_value(lhs.to_number()? >= rhs.to_number()?),
        };

        Ok(Operand::Scalar(result))
    }

    fn eval_function(&self, name: &str, args: &[Expression]) -> Result<Operand, EvalError> {
        let def = functions::lookup(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;

        if !def.arity.accepts(args.len()) {
            return Err(EvalError::Argument(format!(
                "{} expects {} arguments, got {}",
                def.name,
                def.arity,
                args.len()
            )));
        }

        // Arguments are evaluated eagerly; any errored argument propagates
        // before the handler runs.
        let operands = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Operand::Scalar((def.handler)(&operands)?))
    }
}

/// Comparison results are plain numbers so they chain into arithmetic.
fn bool_value(b: bool) -> CellValue {
    CellValue::Number(if b { 1.0 } else { 0.0 })
}

/// Equality for = and <>: numeric when both sides coerce to numbers,
/// otherwise case-sensitive text comparison.
fn equality(a: &CellValue, b: &CellValue) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_text() == b.as_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::parse;
    use std::collections::HashMap;

    fn id(s: &str) -> CellId {
        CellId::parse(s).unwrap()
    }

    fn store(entries: &[(&str, CellResult)]) -> HashMap<CellId, CellResult> {
        entries
            .iter()
            .map(|(k, v)| (id(k), v.clone()))
            .collect()
    }

    fn eval_with(store: &HashMap<CellId, CellResult>, formula: &str) -> CellResult {
        let lookup = |cell: CellId| store.get(&cell).cloned();
        let evaluator = Evaluator::new(&lookup, GridBounds::new(100, 26));
        evaluator.evaluate(&parse(formula).unwrap())
    }

    fn eval(formula: &str) -> CellResult {
        eval_with(&HashMap::new(), formula)
    }

    #[test]
    fn evaluates_literals_and_arithmetic() {
        assert_eq!(eval("42"), Ok(CellValue::Number(42.0)));
        assert_eq!(eval("2 + 3 * 4"), Ok(CellValue::Number(14.0)));
        assert_eq!(eval("(2 + 3) * 4"), Ok(CellValue::Number(20.0)));
        assert_eq!(eval("10 - 5 - 2"), Ok(CellValue::Number(3.0)));
        assert_eq!(eval("--5"), Ok(CellValue::Number(5.0)));
        assert_eq!(eval("\"hi\""), Ok(CellValue::Text("hi".to_string())));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(eval("10/0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("10/4"), Ok(CellValue::Number(2.5)));
    }

    #[test]
    fn resolves_cell_references() {
        let cells = store(&[("A1", Ok(CellValue::Number(10.0)))]);
        assert_eq!(eval_with(&cells, "A1 * 2"), Ok(CellValue::Number(20.0)));
    }

    #[test]
    fn unevaluated_reference_is_empty_cell_error() {
        assert_eq!(eval("B1 + 5"), Err(EvalError::EmptyCell(id("B1"))));
    }

    #[test]
    fn empty_value_does_not_coerce_in_arithmetic() {
        let cells = store(&[("A1", Ok(CellValue::Empty))]);
        assert!(matches!(
            eval_with(&cells, "A1 + 5"),
            Err(EvalError::TypeMismatch(_))
        ));
    }

    #[test]
    fn errored_reference_cascades_with_source() {
        let cells = store(&[("A1", Err(EvalError::DivisionByZero))]);
        match eval_with(&cells, "A1 + 5") {
            Err(EvalError::ReferencedError { cell, message }) => {
                assert_eq!(cell, id("A1"));
                assert!(message.contains("Division by zero"));
            }
            other => panic!("expected ReferencedError, got {:?}", other),
        }
    }

    #[test]
    fn reference_outside_bounds_is_reference_error() {
        let lookup = |_c: CellId| None;
        let evaluator = Evaluator::new(&lookup, GridBounds::new(10, 10));
        let result = evaluator.evaluate(&parse("Z99").unwrap());
        assert!(matches!(result, Err(EvalError::Reference(_))));
    }

    #[test]
    fn ref_error_sentinel_evaluates_to_reference_error() {
        assert!(matches!(eval("#REF!"), Err(EvalError::Reference(_))));
        assert!(matches!(eval("#REF! + 1"), Err(EvalError::Reference(_))));
    }

    #[test]
    fn string_numbers_coerce_in_arithmetic() {
        let cells = store(&[("A1", Ok(CellValue::Text("4".to_string())))]);
        assert_eq!(eval_with(&cells, "A1 * 2"), Ok(CellValue::Number(8.0)));

        let cells = store(&[("A1", Ok(CellValue::Text("four".to_string())))]);
        assert!(matches!(
            eval_with(&cells, "A1 * 2"),
            Err(EvalError::TypeMismatch(_))
        ));
    }

    #[test]
    fn comparisons_yield_numeric_booleans() {
        assert_eq!(eval("2 < 3"), Ok(CellValue::Number(1.0)));
        assert_eq!(eval("2 > 3"), Ok(CellValue::Number(0.0)));
        assert_eq!(eval("2 <= 2"), Ok(CellValue::Number(1.0)));
        assert_eq!(eval("2 >= 3"), Ok(CellValue::Number(0.0)));
        assert_eq!(eval("2 = 2"), Ok(CellValue::Number(1.0)));
        assert_eq!(eval("2 <> 2"), Ok(CellValue::Number(0.0)));

        // Comparison results are plain numbers and chain into arithmetic.
        assert_eq!(eval("(2 < 3) + (1 = 1)"), Ok(CellValue::Number(2.0)));
    }

    #[test]
    fn equality_mixes_numbers_and_numeric_strings() {
        assert_eq!(eval("\"5\" = 5"), Ok(CellValue::Number(1.0)));
        assert_eq!(eval("\"x\" = 5"), Ok(CellValue::Number(0.0)));
        // Case-sensitive text equality
        assert_eq!(eval("\"abc\" = \"abc\""), Ok(CellValue::Number(1.0)));
        assert_eq!(eval("\"abc\" = \"ABC\""), Ok(CellValue::Number(0.0)));
    }

    #[test]
    fn ordering_requires_numbers() {
        assert!(matches!(
            eval("\"abc\" < 5"),
            Err(EvalError::TypeMismatch(_))
        ));
    }

    #[test]
    fn function_dispatch_and_arity() {
        let cells = store(&[
            ("A1", Ok(CellValue::Number(1.0))),
            ("A2", Ok(CellValue::Number(2.0))),
            ("A3", Ok(CellValue::Number(3.0))),
            ("A4", Ok(CellValue::Number(4.0))),
        ]);
        assert_eq!(
            eval_with(&cells, "SUM(A1:A4)"),
            Ok(CellValue::Number(10.0))
        );

        assert!(matches!(
            eval("NOPE(1)"),
            Err(EvalError::UnknownFunction(_))
        ));
        assert!(matches!(eval("IF(1, 2)"), Err(EvalError::Argument(_))));
    }

    #[test]
    fn ranges_skip_absent_members_but_propagate_errors() {
        let cells = store(&[
            ("A1", Ok(CellValue::Number(1.0))),
            ("A3", Ok(CellValue::Number(3.0))),
        ]);
        assert_eq!(
            eval_with(&cells, "SUM(A1:A3)"),
            Ok(CellValue::Number(4.0))
        );

        let cells = store(&[
            ("A1", Ok(CellValue::Number(1.0))),
            ("A2", Err(EvalError::DivisionByZero)),
        ]);
        assert!(matches!(
            eval_with(&cells, "SUM(A1:A2)"),
            Err(EvalError::ReferencedError { .. })
        ));
    }

    #[test]
    fn bare_range_is_not_a_value() {
        assert!(matches!(
            eval("A1:B2"),
            Err(EvalError::TypeMismatch(_))
        ));
        assert!(matches!(
            eval("A1:B2 + 1"),
            Err(EvalError::TypeMismatch(_))
        ));
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(matches!(eval("B2:A1"), Err(EvalError::Argument(_))));
    }

    #[test]
    fn if_selects_branch_by_truthiness() {
        let cells = store(&[("A1", Ok(CellValue::Number(100.0)))]);
        assert_eq!(
            eval_with(&cells, "IF(A1 > 50, A1 * 2, A1 / 2)"),
            Ok(CellValue::Number(200.0))
        );
        let cells = store(&[("A1", Ok(CellValue::Number(10.0)))]);
        assert_eq!(
            eval_with(&cells, "IF(A1 > 50, A1 * 2, A1 / 2)"),
            Ok(CellValue::Number(5.0))
        );
    }
}
