//! FILENAME: engine/src/functions.rs
//! PURPOSE: The registry and implementations of built-in spreadsheet functions.
//! CONTEXT: The evaluator resolves every FunctionCall node against the
//! registry table below: a dispatch record with the canonical name, its
//! aliases, an arity predicate, and the handler. Handlers receive already
//! evaluated operands — scalars or 2-D range matrices — and return a value
//! or an evaluation error. Nothing here touches cells directly.
//!
//! FUNCTION GROUPS:
//! - Aggregates: SUM, AVERAGE, MIN, MAX, COUNT, COUNTA
//! - Arithmetic: ADD, SUB, MUL, DIV, ABS, ROUND, SQRT, POWER, MOD, INT, SIGN
//! - Logical: IF, AND, OR, NOT
//! - Text: CONCATENATE, LEFT, RIGHT, MID, TRIM, UPPER, LOWER, LEN
//! - Date: NOW, TODAY, DATE, DATEDIF
//! - Conditional aggregates: COUNTIF, SUMIF, SUMIFS
//! - Lookup: VLOOKUP, HLOOKUP, MATCH, INDEX

use crate::cell::{CellValue, EvalError};
use crate::range::RangeValues;
use chrono::{Datelike, Local, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::collections::HashMap;

/// An evaluated function argument: either a single value or a range matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(CellValue),
    Range(RangeValues),
}

impl Operand {
    /// Unwraps a scalar; a range where a single value is required is a type error.
    pub fn as_scalar(&self) -> Result<&CellValue, EvalError> {
        match self {
            Operand::Scalar(v) => Ok(v),
            Operand::Range(_) => Err(EvalError::TypeMismatch(
                "expected a single value, found a range".to_string(),
            )),
        }
    }

    /// Unwraps a range matrix; a scalar where a range is required is an argument error.
    pub fn as_range(&self) -> Result<&RangeValues, EvalError> {
        match self {
            Operand::Range(m) => Ok(m),
            Operand::Scalar(_) => Err(EvalError::Argument(
                "expected a range argument".to_string(),
            )),
        }
    }

    /// Coerces a scalar operand to a number.
    pub fn to_number(&self) -> Result<f64, EvalError> {
        scalar_number(self.as_scalar()?)
    }

    /// Coerces a scalar operand to text.
    pub fn to_text(&self) -> Result<String, EvalError> {
        Ok(self.as_scalar()?.as_text())
    }
}

/// Strict numeric coercion for direct (non-range) values.
pub fn scalar_number(value: &CellValue) -> Result<f64, EvalError> {
    match value {
        CellValue::Number(n) => Ok(*n),
        CellValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
            EvalError::TypeMismatch(format!("cannot use \"{}\" as a number", s))
        }),
        CellValue::Empty => Err(EvalError::TypeMismatch(
            "cannot use an empty value as a number".to_string(),
        )),
    }
}

/// The condition predicate used by IF, AND, OR, and NOT.
/// Numbers are true when non-zero. Strings: "true"/"1" are true, ""/"false"/"0"
/// are false, any other non-empty string is true. Empty cells are false.
pub fn is_truthy(value: &CellValue) -> bool {
    match value {
        CellValue::Number(n) => *n != 0.0,
        CellValue::Text(s) => {
            let lower = s.trim().to_lowercase();
            !(lower.is_empty() || lower == "false" || lower == "0")
        }
        CellValue::Empty => false,
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// How many arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Between(usize, usize),
    /// An odd count of at least n (SUMIFS: sum range plus criteria pairs).
    OddAtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
            Arity::Between(lo, hi) => n >= lo && n <= hi,
            Arity::OddAtLeast(k) => n >= k && n % 2 == 1,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Arity::Exact(k) => write!(f, "exactly {}", k),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
            Arity::Between(lo, hi) => write!(f, "between {} and {}", lo, hi),
            Arity::OddAtLeast(k) => write!(f, "an odd count of at least {}", k),
        }
    }
}

pub type Handler = fn(&[Operand]) -> Result<CellValue, EvalError>;

/// Dispatch record for one built-in function.
pub struct FunctionDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub arity: Arity,
    pub handler: Handler,
}

static FUNCTIONS: &[FunctionDef] = &[
    // Aggregates
    FunctionDef { name: "SUM", aliases: &[], arity: Arity::AtLeast(1), handler: fn_sum },
    FunctionDef { name: "AVERAGE", aliases: &["AVG"], arity: Arity::AtLeast(1), handler: fn_average },
    FunctionDef { name: "MIN", aliases: &[], arity: Arity::AtLeast(1), handler: fn_min },
    FunctionDef { name: "MAX", aliases: &[], arity: Arity::AtLeast(1), handler: fn_max },
    FunctionDef { name: "COUNT", aliases: &[], arity: Arity::AtLeast(1), handler: fn_count },
    FunctionDef { name: "COUNTA", aliases: &[], arity: Arity::AtLeast(1), handler: fn_counta },

    // Binary arithmetic
    FunctionDef { name: "ADD", aliases: &[], arity: Arity::Exact(2), handler: fn_add },
    FunctionDef { name: "SUB", aliases: &[], arity: Arity::Exact(2), handler: fn_sub },
    FunctionDef { name: "MUL", aliases: &["MULTIPLY"], arity: Arity::Exact(2), handler: fn_mul },
    FunctionDef { name: "DIV", aliases: &["DIVIDE"], arity: Arity::Exact(2), handler: fn_div },

    // Math
    FunctionDef { name: "ABS", aliases: &[], arity: Arity::Exact(1), handler: fn_abs },
    FunctionDef { name: "ROUND", aliases: &[], arity: Arity::Between(1, 2), handler: fn_round },
    FunctionDef { name: "SQRT", aliases: &[], arity: Arity::Exact(1), handler: fn_sqrt },
    FunctionDef { name: "POWER", aliases: &["POW"], arity: Arity::Exact(2), handler: fn_power },
    FunctionDef { name: "MOD", aliases: &[], arity: Arity::Exact(2), handler: fn_mod },
    FunctionDef { name: "INT", aliases: &[], arity: Arity::Exact(1), handler: fn_int },
    FunctionDef { name: "SIGN", aliases: &[], arity: Arity::Exact(1), handler: fn_sign },

    // Logical
    FunctionDef { name: "IF", aliases: &[], arity: Arity::Exact(3), handler: fn_if },
    FunctionDef { name: "AND", aliases: &[], arity: Arity::AtLeast(1), handler: fn_and },
    FunctionDef { name: "OR", aliases: &[], arity: Arity::AtLeast(1), handler: fn_or },
    FunctionDef { name: "NOT", aliases: &[], arity: Arity::Exact(1), handler: fn_not },

    // Text
    FunctionDef { name: "CONCATENATE", aliases: &["CONCAT"], arity: Arity::AtLeast(1), handler: fn_concatenate },
    FunctionDef { name: "LEFT", aliases: &[], arity: Arity::Exact(2), handler: fn_left },
    FunctionDef { name: "RIGHT", aliases: &[], arity: Arity::Exact(2), handler: fn_right },
    FunctionDef { name: "MID", aliases: &[], arity: Arity::Exact(3), handler: fn_mid },
    FunctionDef { name: "TRIM", aliases: &[], arity: Arity::Exact(1), handler: fn_trim },
    FunctionDef { name: "UPPER", aliases: &[], arity: Arity::Exact(1), handler: fn_upper },
    FunctionDef { name: "LOWER", aliases: &[], arity: Arity::Exact(1), handler: fn_lower },
    FunctionDef { name: "LEN", aliases: &[], arity: Arity::Exact(1), handler: fn_len },

    // Date & time (millisecond epoch values)
    FunctionDef { name: "NOW", aliases: &[], arity: Arity::Exact(0), handler: fn_now },
    FunctionDef { name: "TODAY", aliases: &[], arity: Arity::Exact(0), handler: fn_today },
    FunctionDef { name: "DATE", aliases: &[], arity: Arity::Exact(3), handler: fn_date },
    FunctionDef { name: "DATEDIF", aliases: &[], arity: Arity::Exact(3), handler: fn_datedif },

    // Conditional aggregates
    FunctionDef { name: "COUNTIF", aliases: &[], arity: Arity::Exact(2), handler: fn_countif },
    FunctionDef { name: "SUMIF", aliases: &[], arity: Arity::Between(2, 3), handler: fn_sumif },
    FunctionDef { name: "SUMIFS", aliases: &[], arity: Arity::OddAtLeast(3), handler: fn_sumifs },

    // Lookup & reference
    FunctionDef { name: "VLOOKUP", aliases: &[], arity: Arity::Between(3, 4), handler: fn_vlookup },
    FunctionDef { name: "HLOOKUP", aliases: &[], arity: Arity::Between(3, 4), handler: fn_hlookup },
    FunctionDef { name: "MATCH", aliases: &[], arity: Arity::Between(2, 3), handler: fn_match },
    FunctionDef { name: "INDEX", aliases: &[], arity: Arity::Between(2, 3), handler: fn_index },
];

static REGISTRY: Lazy<HashMap<&'static str, &'static FunctionDef>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for def in FUNCTIONS {
        map.insert(def.name, def);
        for alias in def.aliases {
            map.insert(*alias, def);
        }
    }
    map
});

/// Resolves an uppercase function name (or alias) to its dispatch record.
pub fn lookup(name: &str) -> Option<&'static FunctionDef> {
    REGISTRY.get(name).copied()
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Collects the numeric values reachable through the arguments.
/// Direct scalars coerce strictly (a non-numeric string is an error);
/// range members are filtered: numbers and numeric strings are taken,
/// everything else is skipped. Empties are skipped everywhere.
fn numeric_values(args: &[Operand]) -> Result<Vec<f64>, EvalError> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Operand::Scalar(CellValue::Empty) => {}
            Operand::Scalar(v) => out.push(scalar_number(v)?),
            Operand::Range(matrix) => {
                for v in matrix.iter() {
                    if let Some(n) = v.as_number() {
                        out.push(n);
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Equality used by criteria matching and exact lookups.
/// Numbers compare numerically (strings are parsed); text compares
/// case-insensitively; a non-parseable string never equals a number.
fn values_equal(a: &CellValue, b: &CellValue) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_text().eq_ignore_ascii_case(&b.as_text()),
    }
}

/// Ordering used by approximate lookups: numeric when both sides coerce,
/// otherwise case-insensitive text order.
fn compare_values(a: &CellValue, b: &CellValue) -> Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.as_text().to_lowercase().cmp(&b.as_text().to_lowercase()),
    }
}

/// A parsed COUNTIF/SUMIF criteria: an optional comparison operator prefix
/// followed by a literal, e.g. ">=10", "<>done", or a bare exact-match value.
struct Criteria {
    op: CriteriaOp,
    value: CellValue,
}

#[derive(Clone, Copy, PartialEq)]
enum CriteriaOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Criteria {
    fn parse(raw: &CellValue) -> Criteria {
        let text = match raw {
            CellValue::Text(s) => s.as_str(),
            // A bare number (or empty) criteria is an exact match.
            other => {
                return Criteria {
                    op: CriteriaOp::Eq,
                    value: other.clone(),
                }
            }
        };

        // Two-character operators are matched greedily before one-character ones.
        let (op, rest) = if let Some(rest) = text.strip_prefix(">=") {
            (CriteriaOp::Ge, rest)
        } else if let Some(rest) = text.strip_prefix("<=") {
            (CriteriaOp::Le, rest)
        } else if let Some(rest) = text.strip_prefix("<>") {
            (CriteriaOp::Ne, rest)
        } else if let Some(rest) = text.strip_prefix('>') {
            (CriteriaOp::Gt, rest)
        } else if let Some(rest) = text.strip_prefix('<') {
            (CriteriaOp::Lt, rest)
        } else if let Some(rest) = text.strip_prefix('=') {
            (CriteriaOp::Eq, rest)
        } else {
            (CriteriaOp::Eq, text)
        };

        let value = match rest.trim().parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::Text(rest.to_string()),
        };

        Criteria { op, value }
    }

    fn matches(&self, candidate: &CellValue) -> bool {
        match self.op {
            CriteriaOp::Eq => values_equal(candidate, &self.value),
            CriteriaOp::Ne => !values_equal(candidate, &self.value),
            CriteriaOp::Lt | CriteriaOp::Gt | CriteriaOp::Le | CriteriaOp::Ge => {
                // Ordering against a numeric bound requires a numeric candidate.
                if let CellValue::Number(bound) = self.value {
                    match candidate.as_number() {
                        Some(n) => match self.op {
                            CriteriaOp::Lt => n < bound,
                            CriteriaOp::Gt => n > bound,
                            CriteriaOp::Le => n <= bound,
                            CriteriaOp::Ge => n >= bound,
                            _ => unreachable!(),
                        },
                        None => false,
                    }
                } else {
                    let ord = compare_values(candidate, &self.value);
                    match self.op {
                        CriteriaOp::Lt => ord == Ordering::Less,
                        CriteriaOp::Gt => ord == Ordering::Greater,
                        CriteriaOp::Le => ord != Ordering::Greater,
                        CriteriaOp::Ge => ord != Ordering::Less,
                        _ => unreachable!(),
                    }
                }
            }
        }
    }
}

// ============================================================================
// AGGREGATES
// ============================================================================

fn fn_sum(args: &[Operand]) -> Result<CellValue, EvalError> {
    let values = numeric_values(args)?;
    Ok(CellValue::Number(values.iter().sum()))
}

fn fn_average(args: &[Operand]) -> Result<CellValue, EvalError> {
    let values = numeric_values(args)?;
    if values.is_empty() {
        return Err(EvalError::DivisionByZero);
    }
    Ok(CellValue::Number(
        values.iter().sum::<f64>() / values.len() as f64,
    ))
}

fn fn_min(args: &[Operand]) -> Result<CellValue, EvalError> {
    let values = numeric_values(args)?;
    if values.is_empty() {
        return Ok(CellValue::Number(0.0));
    }
    Ok(CellValue::Number(
        values.iter().cloned().fold(f64::INFINITY, f64::min),
    ))
}

fn fn_max(args: &[Operand]) -> Result<CellValue, EvalError> {
    let values = numeric_values(args)?;
    if values.is_empty() {
        return Ok(CellValue::Number(0.0));
    }
    Ok(CellValue::Number(
        values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    ))
}

/// Counts values that parse as numeric, across scalars and range members.
fn fn_count(args: &[Operand]) -> Result<CellValue, EvalError> {
    let mut count = 0usize;
    for arg in args {
        match arg {
            Operand::Scalar(v) => {
                if v.as_number().is_some() {
                    count += 1;
                }
            }
            Operand::Range(matrix) => {
                count += matrix.iter().filter(|v| v.as_number().is_some()).count();
            }
        }
    }
    Ok(CellValue::Number(count as f64))
}

/// Counts non-empty values.
fn fn_counta(args: &[Operand]) -> Result<CellValue, EvalError> {
    let mut count = 0usize;
    for arg in args {
        match arg {
            Operand::Scalar(v) => {
                if !v.is_empty() {
                    count += 1;
                }
            }
            Operand::Range(matrix) => {
                count += matrix.iter().filter(|v| !v.is_empty()).count();
            }
        }
    }
    Ok(CellValue::Number(count as f64))
}

// ============================================================================
// ARITHMETIC
// ============================================================================

fn fn_add(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Number(args[0].to_number()? + args[1].to_number()?))
}

fn fn_sub(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Number(args[0].to_number()? - args[1].to_number()?))
}

fn fn_mul(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Number(args[0].to_number()? * args[1].to_number()?))
}

fn fn_div(args: &[Operand]) -> Result<CellValue, EvalError> {
    let divisor = args[1].to_number()?;
    if divisor == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    Ok(CellValue::Number(args[0].to_number()? / divisor))
}

fn fn_abs(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Number(args[0].to_number()?.abs()))
}

fn fn_round(args: &[Operand]) -> Result<CellValue, EvalError> {
    let n = args[0].to_number()?;
    let digits = match args.get(1) {
        Some(arg) => arg.to_number()?.trunc() as i32,
        None => 0,
    };
    let factor = 10f64.powi(digits);
    Ok(CellValue::Number((n * factor).round() / factor))
}

fn fn_sqrt(args: &[Operand]) -> Result<CellValue, EvalError> {
    let n = args[0].to_number()?;
    if n < 0.0 {
        return Err(EvalError::Argument(
            "SQRT of a negative number".to_string(),
        ));
    }
    Ok(CellValue::Number(n.sqrt()))
}

fn fn_power(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Number(
        args[0].to_number()?.powf(args[1].to_number()?),
    ))
}

fn fn_mod(args: &[Operand]) -> Result<CellValue, EvalError> {
    let divisor = args[1].to_number()?;
    if divisor == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    // Excel-style MOD: the result takes the divisor's sign.
    let n = args[0].to_number()?;
    Ok(CellValue::Number(n - divisor * (n / divisor).floor()))
}

fn fn_int(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Number(args[0].to_number()?.floor()))
}

fn fn_sign(args: &[Operand]) -> Result<CellValue, EvalError> {
    let n = args[0].to_number()?;
    Ok(CellValue::Number(if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        0.0
    }))
}

// ============================================================================
// LOGICAL
// ============================================================================

fn fn_if(args: &[Operand]) -> Result<CellValue, EvalError> {
    let condition = args[0].as_scalar()?;
    if is_truthy(condition) {
        Ok(args[1].as_scalar()?.clone())
    } else {
        Ok(args[2].as_scalar()?.clone())
    }
}

/// Gathers the truth values of the arguments; range members that are empty
/// are skipped, matching how aggregates treat them.
fn truth_values(args: &[Operand]) -> Vec<bool> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Operand::Scalar(v) => out.push(is_truthy(v)),
            Operand::Range(matrix) => {
                out.extend(matrix.iter().filter(|v| !v.is_empty()).map(is_truthy));
            }
        }
    }
    out
}

fn fn_and(args: &[Operand]) -> Result<CellValue, EvalError> {
    let values = truth_values(args);
    Ok(CellValue::Number(if values.iter().all(|&b| b) { 1.0 } else { 0.0 }))
}

fn fn_or(args: &[Operand]) -> Result<CellValue, EvalError> {
    let values = truth_values(args);
    Ok(CellValue::Number(if values.iter().any(|&b| b) { 1.0 } else { 0.0 }))
}

fn fn_not(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Number(if is_truthy(args[0].as_scalar()?) {
        0.0
    } else {
        1.0
    }))
}

// ============================================================================
// TEXT
// ============================================================================

fn fn_concatenate(args: &[Operand]) -> Result<CellValue, EvalError> {
    let mut out = String::new();
    for arg in args {
        match arg {
            Operand::Scalar(v) => out.push_str(&v.as_text()),
            Operand::Range(matrix) => {
                for v in matrix.iter() {
                    out.push_str(&v.as_text());
                }
            }
        }
    }
    Ok(CellValue::Text(out))
}

/// Coerces the character-count argument of LEFT/RIGHT/MID.
fn char_count(arg: &Operand, what: &str) -> Result<usize, EvalError> {
    let n = arg.to_number()?.trunc();
    if n < 0.0 {
        return Err(EvalError::Argument(format!("{} cannot be negative", what)));
    }
    Ok(n as usize)
}

fn fn_left(args: &[Operand]) -> Result<CellValue, EvalError> {
    let text = args[0].to_text()?;
    let count = char_count(&args[1], "character count")?;
    Ok(CellValue::Text(text.chars().take(count).collect()))
}

fn fn_right(args: &[Operand]) -> Result<CellValue, EvalError> {
    let text = args[0].to_text()?;
    let count = char_count(&args[1], "character count")?;
    let len = text.chars().count();
    Ok(CellValue::Text(
        text.chars().skip(len.saturating_sub(count)).collect(),
    ))
}

fn fn_mid(args: &[Operand]) -> Result<CellValue, EvalError> {
    let text = args[0].to_text()?;
    let start = args[1].to_number()?.trunc();
    if start < 1.0 {
        return Err(EvalError::Argument(
            "MID start position must be at least 1".to_string(),
        ));
    }
    let count = char_count(&args[2], "character count")?;
    Ok(CellValue::Text(
        text.chars().skip(start as usize - 1).take(count).collect(),
    ))
}

fn fn_trim(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Text(args[0].to_text()?.trim().to_string()))
}

fn fn_upper(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Text(args[0].to_text()?.to_uppercase()))
}

fn fn_lower(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Text(args[0].to_text()?.to_lowercase()))
}

fn fn_len(args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Number(args[0].to_text()?.chars().count() as f64))
}

// ============================================================================
// DATE & TIME
// ============================================================================

fn fn_now(_args: &[Operand]) -> Result<CellValue, EvalError> {
    Ok(CellValue::Number(Local::now().timestamp_millis() as f64))
}

fn fn_today(_args: &[Operand]) -> Result<CellValue, EvalError> {
    let midnight = Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .ok_or_else(|| EvalError::Argument("cannot resolve local midnight".to_string()))?;
    Ok(CellValue::Number(midnight.timestamp_millis() as f64))
}

fn fn_date(args: &[Operand]) -> Result<CellValue, EvalError> {
    let year = args[0].to_number()?.trunc() as i32;
    let month = args[1].to_number()?.trunc();
    let day = args[2].to_number()?.trunc();
    if !(1.0..=12.0).contains(&month) {
        return Err(EvalError::Argument(format!("invalid month {}", month)));
    }

    let midnight = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .ok_or_else(|| {
            EvalError::Argument(format!("invalid date {}-{}-{}", year, month, day))
        })?;
    Ok(CellValue::Number(midnight.timestamp_millis() as f64))
}

fn fn_datedif(args: &[Operand]) -> Result<CellValue, EvalError> {
    let start_ms = args[0].to_number()?;
    let end_ms = args[1].to_number()?;
    let unit = args[2].to_text()?.trim().to_uppercase();

    if end_ms < start_ms {
        return Err(EvalError::Argument(
            "DATEDIF start date is after the end date".to_string(),
        ));
    }

    match unit.as_str() {
        "D" => {
            const MS_PER_DAY: f64 = 86_400_000.0;
            Ok(CellValue::Number(((end_ms - start_ms) / MS_PER_DAY).floor()))
        }
        "M" | "Y" => {
            let start = local_date_from_ms(start_ms)?;
            let end = local_date_from_ms(end_ms)?;

            let mut months = (end.year() - start.year()) * 12 + (end.month() as i32 - start.month() as i32);
            if end.day() < start.day() {
                months -= 1;
            }

            if unit == "M" {
                Ok(CellValue::Number(months as f64))
            } else {
                Ok(CellValue::Number((months / 12) as f64))
            }
        }
        other => Err(EvalError::Argument(format!(
            "DATEDIF unit must be D, M or Y, got \"{}\"",
            other
        ))),
    }
}

fn local_date_from_ms(ms: f64) -> Result<NaiveDate, EvalError> {
    Local
        .timestamp_millis_opt(ms as i64)
        .earliest()
        .map(|dt| dt.date_naive())
        .ok_or_else(|| EvalError::Argument(format!("invalid timestamp {}", ms)))
}

// ============================================================================
// CONDITIONAL AGGREGATES
// ============================================================================

fn fn_countif(args: &[Operand]) -> Result<CellValue, EvalError> {
    let matrix = args[0].as_range()?;
    let criteria = Criteria::parse(args[1].as_scalar()?);
    let count = matrix.iter().filter(|v| criteria.matches(v)).count();
    Ok(CellValue::Number(count as f64))
}

fn fn_sumif(args: &[Operand]) -> Result<CellValue, EvalError> {
    let matrix = args[0].as_range()?;
    let criteria = Criteria::parse(args[1].as_scalar()?);
    let sum_matrix = match args.get(2) {
        Some(arg) => arg.as_range()?,
        None => matrix,
    };

    // Positional correspondence between the criteria range and the sum range,
    // both walked in reading order.
    let sum_values: Vec<&CellValue> = sum_matrix.iter().collect();
    let mut total = 0.0;
    for (i, v) in matrix.iter().enumerate() {
        if criteria.matches(v) {
            if let Some(n) = sum_values.get(i).and_then(|s| s.as_number()) {
                total += n;
            }
        }
    }
    Ok(CellValue::Number(total))
}

fn fn_sumifs(args: &[Operand]) -> Result<CellValue, EvalError> {
    let sum_matrix = args[0].as_range()?;
    let sum_values: Vec<&CellValue> = sum_matrix.iter().collect();

    let mut tests: Vec<(Vec<&CellValue>, Criteria)> = Vec::new();
    for pair in args[1..].chunks(2) {
        let matrix = pair[0].as_range()?;
        if matrix.rows() != sum_matrix.rows() || matrix.cols() != sum_matrix.cols() {
            return Err(EvalError::Argument(
                "SUMIFS criteria ranges must match the sum range's shape".to_string(),
            ));
        }
        let criteria = Criteria::parse(pair[1].as_scalar()?);
        tests.push((matrix.iter().collect(), criteria));
    }

    let mut total = 0.0;
    for (i, sum_value) in sum_values.iter().enumerate() {
        let all_match = tests
            .iter()
            .all(|(values, criteria)| criteria.matches(values[i]));
        if all_match {
            if let Some(n) = sum_value.as_number() {
                total += n;
            }
        }
    }
    Ok(CellValue::Number(total))
}

// ============================================================================
// LOOKUP & REFERENCE
// ============================================================================

fn fn_vlookup(args: &[Operand]) -> Result<CellValue, EvalError> {
    let lookup_value = args[0].as_scalar()?;
    let table = args[1].as_range()?;
    let col_index = args[2].to_number()?.trunc();
    if col_index < 1.0 || col_index as usize > table.cols() {
        return Err(EvalError::Argument(format!(
            "VLOOKUP column index {} is outside the table",
            col_index
        )));
    }
    let col = col_index as usize - 1;
    let approximate = match args.get(3) {
        Some(arg) => is_truthy(arg.as_scalar()?),
        None => true,
    };

    let matched_row = if approximate {
        // Assumes the first column is sorted ascending; takes the last row
        // whose key does not exceed the lookup value.
        let mut best: Option<usize> = None;
        for r in 0..table.rows() {
            if let Some(key) = table.get(r, 0) {
                if compare_values(key, lookup_value) != Ordering::Greater {
                    best = Some(r);
                }
            }
        }
        best
    } else {
        (0..table.rows()).find(|&r| {
            table
                .get(r, 0)
                .is_some_and(|key| values_equal(key, lookup_value))
        })
    };

    matched_row
        .and_then(|r| table.get(r, col).cloned())
        .ok_or_else(|| {
            EvalError::Argument(format!(
                "VLOOKUP found no match for {}",
                lookup_value.as_text()
            ))
        })
}

fn fn_hlookup(args: &[Operand]) -> Result<CellValue, EvalError> {
    let lookup_value = args[0].as_scalar()?;
    let table = args[1].as_range()?;
    let row_index = args[2].to_number()?.trunc();
    if row_index < 1.0 || row_index as usize > table.rows() {
        return Err(EvalError::Argument(format!(
            "HLOOKUP row index {} is outside the table",
            row_index
        )));
    }
    let row = row_index as usize - 1;
    let approximate = match args.get(3) {
        Some(arg) => is_truthy(arg.as_scalar()?),
        None => true,
    };

    let matched_col = if approximate {
        let mut best: Option<usize> = None;
        for c in 0..table.cols() {
            if let Some(key) = table.get(0, c) {
                if compare_values(key, lookup_value) != Ordering::Greater {
                    best = Some(c);
                }
            }
        }
        best
    } else {
        (0..table.cols()).find(|&c| {
            table
                .get(0, c)
                .is_some_and(|key| values_equal(key, lookup_value))
        })
    };

    matched_col
        .and_then(|c| table.get(row, c).cloned())
        .ok_or_else(|| {
            EvalError::Argument(format!(
                "HLOOKUP found no match for {}",
                lookup_value.as_text()
            ))
        })
}

fn fn_match(args: &[Operand]) -> Result<CellValue, EvalError> {
    let lookup_value = args[0].as_scalar()?;
    let matrix = args[1].as_range()?;
    let values = matrix.as_vector().ok_or_else(|| {
        EvalError::Argument("MATCH requires a single row or column".to_string())
    })?;
    let match_type = match args.get(2) {
        Some(arg) => arg.to_number()?.trunc() as i32,
        None => 1,
    };

    let position = match match_type {
        0 => values.iter().position(|v| values_equal(v, lookup_value)),
        // 1: largest value <= lookup, assuming ascending order.
        1 => {
            let mut best = None;
            for (i, v) in values.iter().enumerate() {
                if compare_values(v, lookup_value) != Ordering::Greater {
                    best = Some(i);
                }
            }
            best
        }
        // -1: smallest value >= lookup, assuming descending order.
        -1 => {
            let mut best = None;
            for (i, v) in values.iter().enumerate() {
                if compare_values(v, lookup_value) != Ordering::Less {
                    best = Some(i);
                }
            }
            best
        }
        other => {
            return Err(EvalError::Argument(format!(
                "MATCH type must be -1, 0 or 1, got {}",
                other
            )))
        }
    };

    match position {
        Some(i) => Ok(CellValue::Number((i + 1) as f64)),
        None => Err(EvalError::Argument(format!(
            "MATCH found no match for {}",
            lookup_value.as_text()
        ))),
    }
}

fn fn_index(args: &[Operand]) -> Result<CellValue, EvalError> {
    let matrix = args[0].as_range()?;

    let first = args[1].to_number()?.trunc();
    if first < 1.0 {
        return Err(EvalError::Argument(
            "INDEX positions are 1-based".to_string(),
        ));
    }

    let (row, col) = match args.get(2) {
        Some(arg) => {
            let second = arg.to_number()?.trunc();
            if second < 1.0 {
                return Err(EvalError::Argument(
                    "INDEX positions are 1-based".to_string(),
                ));
            }
            (first as usize - 1, second as usize - 1)
        }
        // With two arguments the position walks the array's long axis.
        None if matrix.rows() == 1 => (0, first as usize - 1),
        None => (first as usize - 1, 0),
    };

    matrix.get(row, col).cloned().ok_or_else(|| {
        EvalError::Argument(format!(
            "INDEX position ({}, {}) is outside the array",
            row + 1,
            col + 1
        ))
    })
}
