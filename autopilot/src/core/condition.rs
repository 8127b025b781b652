//! Typed trigger conditions for reflex rules.
//!
//! Rule files carry conditions as loose values (`"< 30"`, `true`, `"town"`,
//! `["<", 30]`). They are parsed once into a [`Condition`] when rules are
//! loaded; evaluation never re-parses and never fails.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scalar value observed in the per-cycle state map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view: numbers as-is, text if it parses as a float.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(value) => Some(*value),
            Scalar::Text(text) => parse_number(text),
            Scalar::Bool(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Number(value) => write!(f, "{value}"),
            Scalar::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Condition as written in a rule file, before parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    /// Explicit `[operator, operand]` pair.
    Pair(String, Scalar),
    /// Literal, or text with an embedded operator prefix.
    Value(Scalar),
}

impl From<&str> for ConditionSpec {
    fn from(value: &str) -> Self {
        ConditionSpec::Value(Scalar::from(value))
    }
}

impl From<bool> for ConditionSpec {
    fn from(value: bool) -> Self {
        ConditionSpec::Value(Scalar::Bool(value))
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Equals,
    NotEquals,
    Less,
    Greater,
    LessEq,
    GreaterEq,
}

impl Op {
    /// Two-character operators first so `<=` is not read as `<` + `=...`.
    const PREFIXES: [(&'static str, Op); 6] = [
        ("<=", Op::LessEq),
        (">=", Op::GreaterEq),
        ("==", Op::Equals),
        ("!=", Op::NotEquals),
        ("<", Op::Less),
        (">", Op::Greater),
    ];

    pub fn parse(symbol: &str) -> Option<Op> {
        Self::PREFIXES
            .iter()
            .find(|(prefix, _)| *prefix == symbol)
            .map(|(_, op)| *op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Equals => "==",
            Op::NotEquals => "!=",
            Op::Less => "<",
            Op::Greater => ">",
            Op::LessEq => "<=",
            Op::GreaterEq => ">=",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Op::Equals => ordering == Ordering::Equal,
            Op::NotEquals => ordering != Ordering::Equal,
            Op::Less => ordering == Ordering::Less,
            Op::Greater => ordering == Ordering::Greater,
            Op::LessEq => ordering != Ordering::Greater,
            Op::GreaterEq => ordering != Ordering::Less,
        }
    }

    /// Result when the two sides cannot be compared at all.
    fn on_mismatch(&self) -> bool {
        matches!(self, Op::NotEquals)
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Text(String),
}

/// Parsed condition, built once at rule-load time.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Exact equality: boolean when both sides are booleans, otherwise by
    /// rendered string.
    Literal(Scalar),
    Compare { op: Op, operand: Operand },
}

/// A condition that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("operator '{0}' has no operand")]
    MissingOperand(String),
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("operand for '{0}' must be a number or text")]
    BooleanOperand(String),
}

impl Condition {
    pub fn parse(spec: &ConditionSpec) -> Result<Condition, ConditionError> {
        match spec {
            ConditionSpec::Pair(symbol, operand) => {
                let symbol = symbol.trim();
                let op = Op::parse(symbol)
                    .ok_or_else(|| ConditionError::UnknownOperator(symbol.to_string()))?;
                let operand = match operand {
                    Scalar::Number(value) => Operand::Number(*value),
                    Scalar::Text(text) => text_operand(op, text)?,
                    Scalar::Bool(_) => {
                        return Err(ConditionError::BooleanOperand(op.as_str().to_string()));
                    }
                };
                Ok(Condition::Compare { op, operand })
            }
            ConditionSpec::Value(Scalar::Text(text)) => {
                let trimmed = text.trim_start();
                match Op::PREFIXES
                    .iter()
                    .find(|(prefix, _)| trimmed.starts_with(*prefix))
                {
                    Some((prefix, op)) => {
                        let operand = text_operand(*op, &trimmed[prefix.len()..])?;
                        Ok(Condition::Compare { op: *op, operand })
                    }
                    None => Ok(Condition::Literal(Scalar::Text(text.clone()))),
                }
            }
            ConditionSpec::Value(literal) => Ok(Condition::Literal(literal.clone())),
        }
    }

    /// Evaluate against an observed value.
    ///
    /// Numeric comparison when both sides are numeric; lexicographic string
    /// comparison when the operand is text. Booleans compare as booleans,
    /// reading `true`/`false` text case-insensitively (`"== True"`), and only
    /// through equality. Any other pairing is a type mismatch: only `!=` holds.
    pub fn evaluate(&self, observed: &Scalar) -> bool {
        match (self, observed) {
            (Condition::Literal(Scalar::Bool(expected)), Scalar::Bool(actual)) => {
                actual == expected
            }
            (Condition::Literal(Scalar::Bool(expected)), Scalar::Text(text)) => {
                parse_bool(text) == Some(*expected)
            }
            (Condition::Literal(Scalar::Bool(_)), Scalar::Number(_)) => false,
            (Condition::Literal(Scalar::Text(expected)), Scalar::Bool(actual)) => {
                parse_bool(expected) == Some(*actual)
            }
            (Condition::Literal(expected), _) => observed.to_string() == expected.to_string(),
            (
                Condition::Compare {
                    op,
                    operand: Operand::Text(expected),
                },
                Scalar::Bool(actual),
            ) => match (op, parse_bool(expected)) {
                (Op::Equals, Some(expected)) => *actual == expected,
                (Op::NotEquals, Some(expected)) => *actual != expected,
                _ => op.on_mismatch(),
            },
            (Condition::Compare { op, operand }, _) => match operand {
                Operand::Number(expected) => match observed.as_number() {
                    Some(actual) => actual
                        .partial_cmp(expected)
                        .is_some_and(|ordering| op.accepts(ordering)),
                    None => op.on_mismatch(),
                },
                Operand::Text(expected) => {
                    op.accepts(observed.to_string().as_str().cmp(expected.as_str()))
                }
            },
        }
    }
}

fn text_operand(op: Op, raw: &str) -> Result<Operand, ConditionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConditionError::MissingOperand(op.as_str().to_string()));
    }
    Ok(match parse_number(raw) {
        Some(value) => Operand::Number(value),
        None => Operand::Text(raw.to_string()),
    })
}

fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parse and evaluate in one step; ill-formed conditions evaluate to `false`.
pub fn evaluate(observed: &Scalar, spec: &ConditionSpec) -> bool {
    Condition::parse(spec).is_ok_and(|condition| condition.evaluate(observed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(raw: &str) -> Condition {
        Condition::parse(&ConditionSpec::from(raw)).expect("condition")
    }

    #[test]
    fn operator_prefix_with_or_without_space() {
        assert_eq!(
            cond("<30"),
            Condition::Compare {
                op: Op::Less,
                operand: Operand::Number(30.0)
            }
        );
        assert_eq!(cond("< 30"), cond("<30"));
        assert_eq!(
            cond(">= 5"),
            Condition::Compare {
                op: Op::GreaterEq,
                operand: Operand::Number(5.0)
            }
        );
    }

    #[test]
    fn greater_eq_is_inclusive_and_fails_on_text() {
        let condition = cond(">=50");
        assert!(condition.evaluate(&Scalar::from(50.0)));
        assert!(condition.evaluate(&Scalar::from("50")));
        assert!(!condition.evaluate(&Scalar::from(49.5)));
        assert!(!condition.evaluate(&Scalar::from("fifty")));
    }

    #[test]
    fn text_operand_compares_lexicographically() {
        let condition = cond("< m");
        assert!(condition.evaluate(&Scalar::from("apple")));
        assert!(!condition.evaluate(&Scalar::from("zebra")));
        assert!(cond("!= town").evaluate(&Scalar::from("dungeon")));
    }

    #[test]
    fn literal_is_exact_string_equality() {
        let condition = cond("Town");
        assert!(condition.evaluate(&Scalar::from("Town")));
        assert!(!condition.evaluate(&Scalar::from("town")));
        assert!(!condition.evaluate(&Scalar::from("Town Square")));
    }

    #[test]
    fn boolean_literal_matches_booleans() {
        let condition = Condition::parse(&ConditionSpec::from(true)).expect("condition");
        assert!(condition.evaluate(&Scalar::Bool(true)));
        assert!(!condition.evaluate(&Scalar::Bool(false)));
        assert!(condition.evaluate(&Scalar::from("true")));
    }

    #[test]
    fn boolean_state_matches_capitalized_text() {
        assert!(cond("== True").evaluate(&Scalar::Bool(true)));
        assert!(!cond("== True").evaluate(&Scalar::Bool(false)));
        assert!(cond("!= false").evaluate(&Scalar::Bool(true)));
        assert!(cond("True").evaluate(&Scalar::Bool(true)));
        assert!(!cond("FALSE").evaluate(&Scalar::Bool(true)));
        assert!(!cond("yes").evaluate(&Scalar::Bool(true)));
        assert!(!cond("< true").evaluate(&Scalar::Bool(false)));
        assert!(cond("!= town").evaluate(&Scalar::Bool(false)));
        assert!(evaluate(&Scalar::Bool(true), &ConditionSpec::from("== True")));
    }

    #[test]
    fn numeric_mismatch_only_satisfies_not_equals() {
        assert!(!cond("== 3").evaluate(&Scalar::Bool(true)));
        assert!(cond("!= 3").evaluate(&Scalar::from("three")));
    }

    #[test]
    fn explicit_pair_form() {
        let spec = ConditionSpec::Pair("<=".to_string(), Scalar::from(10.0));
        let condition = Condition::parse(&spec).expect("condition");
        assert!(condition.evaluate(&Scalar::from(10.0)));
        assert!(!condition.evaluate(&Scalar::from(11.0)));
    }

    #[test]
    fn malformed_conditions_fail_closed() {
        assert_eq!(
            Condition::parse(&ConditionSpec::from("<")),
            Err(ConditionError::MissingOperand("<".to_string()))
        );
        let unknown = ConditionSpec::Pair("=~".to_string(), Scalar::from(1.0));
        assert!(matches!(
            Condition::parse(&unknown),
            Err(ConditionError::UnknownOperator(_))
        ));
        assert!(!evaluate(&Scalar::from(1.0), &unknown));
        assert!(!evaluate(&Scalar::from(1.0), &ConditionSpec::from(">=")));
    }
}
