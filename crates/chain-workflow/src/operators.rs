//! Pure array operators behind the set and transform directives

use crate::directive::{FilterPredicate, SetOp, SortOrder};
use chain_core::json::{as_number, identifier_of, identity_key, loose_eq};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Combine id lists from several results
///
/// Ids keep their original JSON type; `1` and `"1"` count as the same id.
pub fn combine_ids(op: SetOp, lists: Vec<Vec<Value>>) -> Vec<Value> {
    match op {
        SetOp::Merge => lists.into_iter().flatten().collect(),
        SetOp::Unique => dedupe_by(lists.into_iter().flatten(), identity_key),
        SetOp::Intersect => intersect_by(lists, identity_key),
    }
}

/// Combine trade record lists from several results, matching records by
/// identifier
pub fn combine_records(op: SetOp, lists: Vec<Vec<Value>>) -> Vec<Value> {
    match op {
        SetOp::Merge => lists.into_iter().flatten().collect(),
        SetOp::Unique => dedupe_by(lists.into_iter().flatten(), record_identity),
        SetOp::Intersect => intersect_by(lists, record_identity),
    }
}

/// Identity of a record: its trade id, or its JSON text when it has none
fn record_identity(record: &Value) -> String {
    identifier_of(record).map_or_else(|| record.to_string(), |id| identity_key(&id))
}

fn dedupe_by<T, F>(items: impl Iterator<Item = T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(key(item))).collect()
}

/// Items of the first list (first occurrence only) present in every other
/// list
fn intersect_by<T, F>(lists: Vec<Vec<T>>, key: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut lists = lists.into_iter();
    let Some(first) = lists.next() else {
        return Vec::new();
    };
    let others: Vec<HashSet<String>> = lists
        .map(|list| list.iter().map(&key).collect())
        .collect();

    dedupe_by(first.into_iter(), &key)
        .into_iter()
        .filter(|item| {
            let id = key(item);
            others.iter().all(|set| set.contains(&id))
        })
        .collect()
}

/// `items[start..end]`, clamped to the array bounds
pub fn slice(items: &[Value], start: usize, end: usize) -> Vec<Value> {
    let end = end.min(items.len());
    let start = start.min(end);
    items[start..end].to_vec()
}

/// Keep elements whose `property` satisfies `predicate`
pub fn filter(items: &[Value], property: &str, predicate: &FilterPredicate) -> Vec<Value> {
    items
        .iter()
        .filter(|item| {
            item.get(property)
                .is_some_and(|value| matches_predicate(value, predicate))
        })
        .cloned()
        .collect()
}

fn matches_predicate(value: &Value, predicate: &FilterPredicate) -> bool {
    match predicate {
        FilterPredicate::Compare(comparison, operand) => {
            as_number(value).is_some_and(|n| comparison.holds(n, *operand))
        }
        FilterPredicate::Win => sign_or_label(value, "win", |n| n > 0.0),
        FilterPredicate::Loss => sign_or_label(value, "loss", |n| n < 0.0),
        FilterPredicate::Equals(expected) => loose_eq(value, &Value::String(expected.clone())),
    }
}

/// Numeric values are tested by sign; textual outcomes by label
fn sign_or_label(value: &Value, label: &str, sign: impl Fn(f64) -> bool) -> bool {
    match as_number(value) {
        Some(n) => sign(n),
        None => value.as_str().is_some_and(|s| s.eq_ignore_ascii_case(label)),
    }
}

/// Stable sort by `property`
///
/// Numbers compare numerically, date strings chronologically, other
/// strings lexicographically. Dates rank before other strings so mixed
/// columns still sort consistently. Elements missing the property sort
/// after the rest in ascending order.
pub fn sort(items: &[Value], property: &str, order: SortOrder) -> Vec<Value> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| {
        let ordering = compare_values(a.get(property), b.get(property));
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    sorted
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|v| !v.is_null());
    let right = right.filter(|v| !v.is_null());

    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => match (parse_date(a), parse_date(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        },
        (Some(a), Some(b)) => kind_rank(a)
            .cmp(&kind_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

/// Numbers, then strings, then everything else
fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        _ => 2,
    }
}

/// Parse the date formats trade records use
fn parse_date(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Comparison;
    use serde_json::json;

    fn ids(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| json!(s)).collect()
    }

    #[test]
    fn test_id_set_operations() {
        let lists = vec![ids(&["a", "b"]), ids(&["b", "c"])];
        assert_eq!(combine_ids(SetOp::Merge, lists.clone()), ids(&["a", "b", "b", "c"]));
        assert_eq!(combine_ids(SetOp::Unique, lists.clone()), ids(&["a", "b", "c"]));
        assert_eq!(combine_ids(SetOp::Intersect, lists), ids(&["b"]));
    }

    #[test]
    fn test_numeric_ids_survive_set_operations() {
        let lists = vec![vec![json!(1), json!(2)], vec![json!(2), json!(3)]];
        assert_eq!(
            combine_ids(SetOp::Merge, lists.clone()),
            vec![json!(1), json!(2), json!(2), json!(3)]
        );
        assert_eq!(
            combine_ids(SetOp::Unique, lists.clone()),
            vec![json!(1), json!(2), json!(3)]
        );
        assert_eq!(combine_ids(SetOp::Intersect, lists), vec![json!(2)]);

        let mixed = vec![vec![json!(5), json!("6")], vec![json!("5")]];
        assert_eq!(combine_ids(SetOp::Intersect, mixed), vec![json!(5)]);
    }

    #[test]
    fn test_unique_is_idempotent() {
        let once = combine_ids(SetOp::Unique, vec![ids(&["x", "y", "x", "z", "y"])]);
        let twice = combine_ids(SetOp::Unique, vec![once.clone()]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_intersect_of_three() {
        let lists = vec![ids(&["a", "b", "c"]), ids(&["c", "b"]), ids(&["b", "d"])];
        assert_eq!(combine_ids(SetOp::Intersect, lists), ids(&["b"]));
        assert!(combine_ids(SetOp::Intersect, Vec::new()).is_empty());
    }

    #[test]
    fn test_record_set_operations_match_by_identifier() {
        let first = vec![json!({"id": "a", "v": 1}), json!({"id": "b", "v": 2})];
        let second = vec![json!({"tradeId": "b", "v": 20}), json!({"id": "c"})];

        let unique = combine_records(SetOp::Unique, vec![first.clone(), second.clone()]);
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[1], json!({"id": "b", "v": 2}));

        let common = combine_records(SetOp::Intersect, vec![first, second]);
        assert_eq!(common, vec![json!({"id": "b", "v": 2})]);
    }

    #[test]
    fn test_slice_clamps() {
        let items = vec![json!(1), json!(2), json!(3)];
        assert_eq!(slice(&items, 0, 2), vec![json!(1), json!(2)]);
        assert_eq!(slice(&items, 1, 10), vec![json!(2), json!(3)]);
        assert!(slice(&items, 5, 10).is_empty());
        assert!(slice(&items, 2, 1).is_empty());
    }

    #[test]
    fn test_filter_numeric_comparison() {
        let items = vec![json!({"amount": 50}), json!({"amount": 150}), json!({"amount": 200})];
        let kept = filter(&items, "amount", &FilterPredicate::Compare(Comparison::Gt, 100.0));
        assert_eq!(kept, vec![json!({"amount": 150}), json!({"amount": 200})]);
    }

    #[test]
    fn test_filter_win_loss() {
        let items = vec![
            json!({"pnl": -20}),
            json!({"pnl": 35.5}),
            json!({"pnl": 0}),
            json!({"pnl": "win"}),
        ];
        assert_eq!(filter(&items, "pnl", &FilterPredicate::Win).len(), 2);
        assert_eq!(filter(&items, "pnl", &FilterPredicate::Loss), vec![json!({"pnl": -20})]);
    }

    #[test]
    fn test_filter_equality_is_string_coerced() {
        let items = vec![
            json!({"session": "london", "size": 2}),
            json!({"session": "asia", "size": "2"}),
            json!({"session": "london", "size": 3}),
        ];
        assert_eq!(
            filter(&items, "session", &FilterPredicate::Equals("london".to_string())).len(),
            2
        );
        assert_eq!(
            filter(&items, "size", &FilterPredicate::Equals("2".to_string())).len(),
            2
        );
    }

    #[test]
    fn test_sort_numeric_and_reverse() {
        let items = vec![json!({"amount": 3}), json!({"amount": 1}), json!({"amount": 2})];
        let asc = sort(&items, "amount", SortOrder::Asc);
        let mut desc = sort(&items, "amount", SortOrder::Desc);
        assert_eq!(asc, vec![json!({"amount": 1}), json!({"amount": 2}), json!({"amount": 3})]);
        desc.reverse();
        assert_eq!(asc, desc);
    }

    #[test]
    fn test_sort_dates_chronologically() {
        let items = vec![
            json!({"date": "2024-03-01T10:00:00Z"}),
            json!({"date": "2024-01-15"}),
            json!({"date": "2024-02-01 09:30:00"}),
        ];
        let sorted = sort(&items, "date", SortOrder::Asc);
        assert_eq!(sorted[0]["date"], json!("2024-01-15"));
        assert_eq!(sorted[2]["date"], json!("2024-03-01T10:00:00Z"));
    }

    #[test]
    fn test_sort_mixed_dates_and_text_is_consistent() {
        let values = [
            "2024-03-01T10:00:00Z",
            "2024-03-01T05:00:00-08:00",
            "2024-03-01T07",
            "pending",
            "2024-01-15",
        ];
        let items: Vec<Value> = values
            .iter()
            .cycle()
            .take(120)
            .map(|date| json!({"date": date}))
            .collect();

        let sorted = sort(&items, "date", SortOrder::Asc);
        for pair in sorted.windows(2) {
            assert_ne!(
                compare_values(pair[0].get("date"), pair[1].get("date")),
                Ordering::Greater
            );
        }
        assert_eq!(sorted[0]["date"], json!("2024-01-15"));
        assert_eq!(sorted[119]["date"], json!("pending"));

        let mixed = vec![json!({"v": "b"}), json!({"v": 10}), json!({"v": true}), json!({"v": 9})];
        let sorted = sort(&mixed, "v", SortOrder::Asc);
        let order: Vec<Value> = sorted.iter().map(|item| item["v"].clone()).collect();
        assert_eq!(order, vec![json!(9), json!(10), json!("b"), json!(true)]);
    }

    #[test]
    fn test_sort_is_stable_and_missing_last() {
        let items = vec![
            json!({"id": "a", "pair": "EURUSD"}),
            json!({"id": "b"}),
            json!({"id": "c", "pair": "AUDUSD"}),
            json!({"id": "d", "pair": "EURUSD"}),
        ];
        let sorted = sort(&items, "pair", SortOrder::Asc);
        let order: Vec<&str> = sorted.iter().filter_map(|t| t["id"].as_str()).collect();
        assert_eq!(order, vec!["c", "a", "d", "b"]);
    }
}
