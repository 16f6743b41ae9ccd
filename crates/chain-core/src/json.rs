//! Helpers over opaque JSON tool payloads
//!
//! Tool data stays loosely typed because field paths in directives are
//! chosen at runtime. Everything here is pure and returns
//! [`ResolutionError`] instead of panicking.

use crate::ResolutionError;
use serde_json::Value;

/// Keys recognised as a trade identifier, in lookup order
pub const ID_FIELDS: [&str; 3] = ["id", "tradeId", "trade_id"];

/// Short type name of a JSON value, used in diagnostics
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Split a dot path, ignoring empty segments
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Identifier of a trade-like value, as the JSON it was given as
///
/// Strings and numbers are identifiers themselves; objects are searched for
/// one of [`ID_FIELDS`].
pub fn identifier_of(value: &Value) -> Option<Value> {
    let id = match value {
        Value::Object(map) => ID_FIELDS.iter().find_map(|key| map.get(*key))?,
        other => other,
    };
    match id {
        Value::String(_) | Value::Number(_) => Some(id.clone()),
        _ => None,
    }
}

/// Key under which identifiers match each other: `1` and `"1"` share one
pub fn identity_key(id: &Value) -> String {
    coerce_to_string(id)
}

/// Walk `segments` from `root`
///
/// Objects are indexed by key, arrays by numeric segment or `length`. A
/// final `id` segment applied to an array maps every element to its
/// identifier.
pub fn lookup_path(root: &Value, segments: &[&str]) -> Result<Value, ResolutionError> {
    let mut current = root;

    for (position, segment) in segments.iter().enumerate() {
        let is_last = position + 1 == segments.len();
        current = match current {
            Value::Object(map) => map.get(*segment).ok_or_else(|| ResolutionError::MissingField {
                segment: (*segment).to_string(),
                available: map.keys().cloned().collect(),
            })?,
            Value::Array(items) => {
                if let Ok(index) = segment.parse::<usize>() {
                    items.get(index).ok_or(ResolutionError::IndexOutOfRange {
                        index,
                        len: items.len(),
                    })?
                } else if *segment == "length" && is_last {
                    return Ok(Value::from(items.len()));
                } else if *segment == "id" && is_last {
                    return Ok(Value::Array(
                        items
                            .iter()
                            .filter_map(identifier_of)
                            .collect(),
                    ));
                } else {
                    return Err(ResolutionError::NotTraversable {
                        segment: (*segment).to_string(),
                        kind: "array",
                    });
                }
            }
            other => {
                return Err(ResolutionError::NotTraversable {
                    segment: (*segment).to_string(),
                    kind: kind_of(other),
                });
            }
        };
    }

    Ok(current.clone())
}

/// Record count of a payload: array length, else `.trades.length`, else
/// `.count`
pub fn record_count(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => match map.get("trades") {
            Some(Value::Array(trades)) => Some(trades.len()),
            _ => map
                .get("count")
                .and_then(Value::as_f64)
                .filter(|n| *n >= 0.0)
                .map(|n| n as usize),
        },
        _ => None,
    }
}

/// Trade records carried by a payload, whatever its shape
///
/// Accepts a bare array, `{trades: [...]}`, `{data: {trades: [...]}}`,
/// `{data: [...]}`, or a single identifiable object.
pub fn trade_records(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => {
            if let Some(Value::Array(trades)) = map.get("trades") {
                return Some(trades.clone());
            }
            if let Some(data) = map.get("data") {
                if let Some(records) = trade_records(data) {
                    return Some(records);
                }
            }
            identifier_of(value).map(|_| vec![value.clone()])
        }
        _ => None,
    }
}

/// Trade identifiers carried by a payload, whatever its shape
///
/// Accepts everything [`trade_records`] does plus `{tradeIds: [...]}`.
pub fn trade_ids(value: &Value) -> Option<Vec<Value>> {
    if let Value::Object(map) = value {
        if let Some(Value::Array(ids)) = map.get("tradeIds") {
            return Some(ids.iter().filter_map(identifier_of).collect());
        }
        if let Some(data) = map.get("data") {
            if let Some(ids) = trade_ids(data) {
                return Some(ids);
            }
        }
    }
    trade_records(value).map(|records| records.iter().filter_map(identifier_of).collect())
}

/// Numeric view of a value: numbers, and strings that parse as numbers
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// String view used for loose equality: strings verbatim, everything else
/// as its JSON text
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JavaScript-style truthiness of a JSON value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Loose equality: identical JSON, numerically equal, or equal as strings
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return (a - b).abs() < f64::EPSILON;
    }
    if left.is_null() || right.is_null() {
        return false;
    }
    coerce_to_string(left) == coerce_to_string(right)
}

/// Strict equality: identical JSON, with `1` and `1.0` treated as equal
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .is_some_and(|(a, b)| (a - b).abs() < f64::EPSILON),
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_object() {
        let value = json!({"stats": {"winRate": 0.6}});
        assert_eq!(lookup_path(&value, &["stats", "winRate"]).unwrap(), json!(0.6));
    }

    #[test]
    fn test_lookup_final_id_over_array() {
        let value = json!({"trades": [{"id": "a"}, {"tradeId": "b"}, {"trade_id": 7}, {"x": 1}]});
        assert_eq!(
            lookup_path(&value, &["trades", "id"]).unwrap(),
            json!(["a", "b", 7])
        );
    }

    #[test]
    fn test_lookup_array_index_and_length() {
        let value = json!({"trades": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(lookup_path(&value, &["trades", "1", "id"]).unwrap(), json!("b"));
        assert_eq!(lookup_path(&value, &["trades", "length"]).unwrap(), json!(2));
    }

    #[test]
    fn test_lookup_missing_field_reports_keys() {
        let value = json!({"count": 3, "items": []});
        let err = lookup_path(&value, &["trades"]).unwrap_err();
        match err {
            ResolutionError::MissingField { segment, available } => {
                assert_eq!(segment, "trades");
                assert!(available.contains(&"count".to_string()));
                assert!(available.contains(&"items".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lookup_into_scalar_fails() {
        let value = json!({"count": 3});
        assert!(matches!(
            lookup_path(&value, &["count", "x"]),
            Err(ResolutionError::NotTraversable { kind: "number", .. })
        ));
    }

    #[test]
    fn test_record_count_precedence() {
        assert_eq!(record_count(&json!([1, 2, 3])), Some(3));
        assert_eq!(record_count(&json!({"trades": [1], "count": 9})), Some(1));
        assert_eq!(record_count(&json!({"count": 9})), Some(9));
        assert_eq!(record_count(&json!({"total": 9})), None);
    }

    #[test]
    fn test_trade_records_shapes() {
        let trade = json!({"id": "t1", "amount": 10});
        assert_eq!(trade_records(&json!([trade.clone()])).unwrap().len(), 1);
        assert_eq!(trade_records(&json!({"trades": [trade.clone()]})).unwrap().len(), 1);
        assert_eq!(
            trade_records(&json!({"data": {"trades": [trade.clone(), trade.clone()]}}))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(trade_records(&trade).unwrap(), vec![trade]);
        assert!(trade_records(&json!({"summary": "none"})).is_none());
    }

    #[test]
    fn test_trade_ids_shapes() {
        assert_eq!(trade_ids(&json!(["a", "b"])).unwrap(), vec![json!("a"), json!("b")]);
        assert_eq!(trade_ids(&json!({"tradeIds": ["c"]})).unwrap(), vec![json!("c")]);
        assert_eq!(
            trade_ids(&json!({"trades": [{"id": "x"}, {"tradeId": "y"}]})).unwrap(),
            vec![json!("x"), json!("y")]
        );
    }

    #[test]
    fn test_numeric_ids_keep_their_type() {
        assert_eq!(trade_ids(&json!({"tradeIds": [1, 2]})).unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(
            lookup_path(&json!({"trades": [{"id": 2}, {"id": 3}]}), &["trades", "id"]).unwrap(),
            json!([2, 3])
        );
        assert_eq!(identifier_of(&json!({"tradeId": 42})), Some(json!(42)));
        assert_eq!(identifier_of(&json!({"id": null})), None);
        assert_eq!(identity_key(&json!(7)), identity_key(&json!("7")));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!("x")));
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!(5), &json!("5")));
        assert!(loose_eq(&json!(true), &json!("true")));
        assert!(!loose_eq(&json!(null), &json!("null")));
        assert!(!loose_eq(&json!("a"), &json!("b")));
    }

    #[test]
    fn test_strict_eq() {
        assert!(strict_eq(&json!(1), &json!(1.0)));
        assert!(strict_eq(&json!({"a": [1]}), &json!({"a": [1]})));
        assert!(!strict_eq(&json!(5), &json!("5")));
        assert!(!strict_eq(&json!(null), &json!(false)));
    }
}
