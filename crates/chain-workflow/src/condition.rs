//! Boolean step conditions
//!
//! A condition is a small expression over earlier results, e.g.
//! `RESULT_0.count > 10` or `!LAST_RESULT.data.hasMore`. References are
//! replaced by the JSON text of the value they name, then the expression is
//! evaluated. Anything that cannot be evaluated counts as `false`.

use crate::resolver::lookup_in_result;
use chain_core::json::{as_number, is_truthy, loose_eq, strict_eq};
use chain_core::{HistoryEntry, ResolutionError, ToolResult};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::{debug, warn};

type ConditionResult<T> = std::result::Result<T, ResolutionError>;

const REFERENCE_PATTERN: &str = r"\b(?:LAST_RESULT|RESULT_(\d+))((?:\.[A-Za-z0-9_]+)*)";

/// Operators in scan order; longer spellings first so `>=` is not read as `>`
const OPERATORS: [(&str, Operator); 8] = [
    ("===", Operator::StrictEq),
    ("!==", Operator::StrictNe),
    ("==", Operator::LooseEq),
    ("!=", Operator::LooseNe),
    (">=", Operator::Ge),
    ("<=", Operator::Le),
    (">", Operator::Gt),
    ("<", Operator::Lt),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Gt,
    Lt,
    Ge,
    Le,
}

/// Evaluates step conditions against history
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Create an evaluator
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `condition`; errors are logged and read as `false`
    ///
    /// `LAST_RESULT` names `last_result`, the most recent executed step.
    pub fn evaluate(
        &self,
        condition: &str,
        history: &[HistoryEntry],
        last_result: Option<&ToolResult>,
    ) -> bool {
        match self.try_evaluate(condition, history, last_result) {
            Ok(outcome) => {
                debug!("Condition '{}' evaluated to {}", condition, outcome);
                outcome
            }
            Err(e) => {
                warn!("Condition '{}' treated as false: {}", condition, e);
                false
            }
        }
    }

    /// Evaluate `condition`, reporting why evaluation failed
    pub fn try_evaluate(
        &self,
        condition: &str,
        history: &[HistoryEntry],
        last_result: Option<&ToolResult>,
    ) -> ConditionResult<bool> {
        let expression = substitute_references(condition, history, last_result)?;
        evaluate_expression(&expression)
    }
}

/// Replace every result reference with the JSON text of its value
fn substitute_references(
    condition: &str,
    history: &[HistoryEntry],
    last_result: Option<&ToolResult>,
) -> ConditionResult<String> {
    let pattern =
        Regex::new(REFERENCE_PATTERN).map_err(|e| ResolutionError::Condition(e.to_string()))?;

    let mut expression = String::with_capacity(condition.len());
    let mut cursor = 0;
    for captures in pattern.captures_iter(condition) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let result = match captures.get(1) {
            Some(index) => {
                let index = index
                    .as_str()
                    .parse::<usize>()
                    .map_err(|_| ResolutionError::InvalidNumber(index.as_str().to_string()))?;
                &history
                    .get(index)
                    .ok_or(ResolutionError::HistoryIndex {
                        index,
                        len: history.len(),
                    })?
                    .result
            }
            None => last_result.ok_or(ResolutionError::NoLastResult)?,
        };
        let path = captures.get(2).map_or("", |m| m.as_str());
        let value = reference_value(result, path)?;

        expression.push_str(&condition[cursor..whole.start()]);
        expression.push_str(&value.to_string());
        cursor = whole.end();
    }
    expression.push_str(&condition[cursor..]);
    Ok(expression)
}

/// Value named by a reference; absent fields read as `null`
fn reference_value(result: &ToolResult, path: &str) -> ConditionResult<Value> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Ok(result.to_value());
    }
    match lookup_in_result(result, &segments) {
        Ok(value) => Ok(value),
        Err(
            ResolutionError::MissingField { .. }
            | ResolutionError::IndexOutOfRange { .. }
            | ResolutionError::NotTraversable { .. },
        ) => Ok(Value::Null),
        Err(e) => Err(e),
    }
}

fn evaluate_expression(expression: &str) -> ConditionResult<bool> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(ResolutionError::Condition("empty expression".to_string()));
    }

    if let Some(rest) = expression.strip_prefix('!') {
        if !rest.starts_with('=') {
            return evaluate_expression(rest).map(|outcome| !outcome);
        }
    }

    match expression {
        "true" => return Ok(true),
        "false" => return Ok(false),
        _ => {}
    }

    match find_operator(expression) {
        Some((position, symbol, operator)) => {
            let left = parse_operand(&expression[..position])?;
            let right = parse_operand(&expression[position + symbol.len()..])?;
            compare(&left, operator, &right)
        }
        None => parse_operand(expression).map(|value| is_truthy(&value)),
    }
}

/// First operator outside string literals
fn find_operator(expression: &str) -> Option<(usize, &'static str, Operator)> {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (position, c) in expression.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
            continue;
        }
        let rest = &expression[position..];
        if let Some(&(symbol, operator)) = OPERATORS
            .iter()
            .find(|(symbol, _)| rest.starts_with(*symbol))
        {
            return Some((position, symbol, operator));
        }
    }
    None
}

/// JSON literal, single-quoted string, or bare word
fn parse_operand(text: &str) -> ConditionResult<Value> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ResolutionError::Condition("missing operand".to_string()));
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(Value::String(inner.to_string()));
    }
    Ok(Value::String(text.to_string()))
}

fn compare(left: &Value, operator: Operator, right: &Value) -> ConditionResult<bool> {
    let ordering = || -> ConditionResult<Ordering> {
        if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
            return a
                .partial_cmp(&b)
                .ok_or_else(|| ResolutionError::Condition("NaN comparison".to_string()));
        }
        match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => Err(ResolutionError::Condition(format!(
                "cannot order {left} and {right}"
            ))),
        }
    };

    Ok(match operator {
        Operator::StrictEq => strict_eq(left, right),
        Operator::StrictNe => !strict_eq(left, right),
        Operator::LooseEq => loose_eq(left, right),
        Operator::LooseNe => !loose_eq(left, right),
        Operator::Gt => ordering()? == Ordering::Greater,
        Operator::Lt => ordering()? == Ordering::Less,
        Operator::Ge => ordering()? != Ordering::Less,
        Operator::Le => ordering()? != Ordering::Greater,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::ToolName;
    use serde_json::{Map, json};

    fn history(data: &[Value]) -> Vec<HistoryEntry> {
        data.iter()
            .map(|d| HistoryEntry::executed(ToolName::SearchTrades, Map::new(), ToolResult::ok(d.clone())))
            .collect()
    }

    fn eval(condition: &str, history: &[HistoryEntry]) -> bool {
        let last = history.last().map(|entry| &entry.result);
        ConditionEvaluator::new().evaluate(condition, history, last)
    }

    #[test]
    fn test_numeric_comparisons() {
        let h = history(&[json!({"count": 5})]);
        assert!(!eval("RESULT_0.count > 10", &h));
        assert!(eval("RESULT_0.count <= 5", &h));
        assert!(eval("RESULT_0.count >= 5", &h));
        assert!(eval("LAST_RESULT.count < 6", &h));
        assert!(eval("RESULT_0.count == 5", &h));
        assert!(eval("RESULT_0.count != 4", &h));
    }

    #[test]
    fn test_string_equality() {
        let h = history(&[json!({"status": "open", "size": 2})]);
        assert!(eval("RESULT_0.status == 'open'", &h));
        assert!(eval("RESULT_0.status === \"open\"", &h));
        assert!(eval("RESULT_0.status !== 'closed'", &h));
        assert!(eval("RESULT_0.size == '2'", &h));
        assert!(!eval("RESULT_0.size === '2'", &h));
    }

    #[test]
    fn test_truthiness_and_negation() {
        let h = history(&[json!({"trades": [], "hasMore": false, "note": ""})]);
        assert!(eval("RESULT_0.trades", &h));
        assert!(!eval("RESULT_0.hasMore", &h));
        assert!(eval("!RESULT_0.hasMore", &h));
        assert!(!eval("RESULT_0.note", &h));
        assert!(eval("LAST_RESULT.success", &h));
        assert!(eval("true", &h));
        assert!(!eval("false", &h));
    }

    #[test]
    fn test_array_length() {
        let h = history(&[json!({"trades": [{"id": "a"}, {"id": "b"}]})]);
        assert!(eval("RESULT_0.trades.length === 2", &h));
        assert!(eval("RESULT_0.trades.length > 1", &h));
    }

    #[test]
    fn test_missing_field_reads_as_null() {
        let h = history(&[json!({"count": 5})]);
        assert!(eval("RESULT_0.total === null", &h));
        assert!(!eval("RESULT_0.total", &h));
        assert!(!eval("RESULT_0.total > 1", &h));
    }

    #[test]
    fn test_unknown_reference_is_false() {
        let h = history(&[json!({"count": 5})]);
        assert!(!eval("RESULT_3.count > 0", &h));
        assert!(!eval("LAST_RESULT.count > 0", &[]));
    }

    #[test]
    fn test_try_evaluate_reports_errors() {
        let h = history(&[json!({"count": 5})]);
        let evaluator = ConditionEvaluator::new();
        assert!(matches!(
            evaluator.try_evaluate("RESULT_9.count > 0", &h, None),
            Err(ResolutionError::HistoryIndex { index: 9, len: 1 })
        ));
        assert!(matches!(
            evaluator.try_evaluate("RESULT_0.count >", &h, None),
            Err(ResolutionError::Condition(_))
        ));
    }

    #[test]
    fn test_operators_inside_strings_are_ignored() {
        let h = history(&[json!({"label": "a>b"})]);
        assert!(eval("RESULT_0.label == 'a>b'", &h));
    }

    #[test]
    fn test_last_result_uses_supplied_result() {
        let h = history(&[json!({"count": 1})]);
        let last = ToolResult::ok(json!({"count": 50}));
        assert!(ConditionEvaluator::new().evaluate("LAST_RESULT.count > 10", &h, Some(&last)));
    }
}
