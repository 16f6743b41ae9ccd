//! Placeholder resolution against the execution history
//!
//! The resolver walks a step's arguments, classifies every string with
//! [`parse_placeholder`], and replaces directives with data from earlier
//! steps. Evaluation helpers return [`ResolutionError`]; only
//! [`PlaceholderResolver::resolve`] turns an error into an empty array and
//! a warning, so a partially wrong workflow still makes progress.

use crate::directive::{Directive, ResultRef, parse_placeholder};
use crate::operators;
use chain_core::json::{kind_of, lookup_path, trade_ids, trade_records};
use chain_core::{HistoryEntry, ResolutionError, ToolResult};
use serde_json::{Map, Value};
use tracing::{debug, warn};

type ResolveResult<T> = std::result::Result<T, ResolutionError>;

/// Keys of the result envelope itself, as opposed to the tool's data
const ENVELOPE_KEYS: [&str; 4] = ["success", "data", "error", "cacheKey"];

/// Arguments after resolution, plus the directives that degraded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArgs {
    /// Arguments with every directive replaced
    pub args: Map<String, Value>,
    /// One message per directive that resolved to an empty array
    pub warnings: Vec<String>,
}

/// Resolves argument directives against history
#[derive(Debug, Clone)]
pub struct PlaceholderResolver {
    cache_prefix: String,
}

impl PlaceholderResolver {
    /// Create a resolver; strings starting with `cache_prefix` are left for
    /// the dispatcher
    pub fn new(cache_prefix: impl Into<String>) -> Self {
        Self {
            cache_prefix: cache_prefix.into(),
        }
    }

    /// Resolve every string directive in `args`, recursing into nested
    /// arrays and objects. Never fails.
    pub fn resolve(&self, args: &Map<String, Value>, history: &[HistoryEntry]) -> ResolvedArgs {
        let mut warnings = Vec::new();
        let args = args
            .iter()
            .map(|(key, value)| (key.clone(), self.resolve_value(value, history, &mut warnings)))
            .collect();
        ResolvedArgs { args, warnings }
    }

    fn resolve_value(&self, value: &Value, history: &[HistoryEntry], warnings: &mut Vec<String>) -> Value {
        match value {
            Value::String(text) => {
                let directive = parse_placeholder(text, &self.cache_prefix);
                if directive == Directive::Literal {
                    return value.clone();
                }
                match evaluate(&directive, history) {
                    Ok(resolved) => {
                        debug!("Resolved placeholder {}", text);
                        resolved
                    }
                    Err(e) => {
                        warn!(directive = %text, "Placeholder resolved to empty array: {}", e);
                        warnings.push(format!("{text}: {e}"));
                        Value::Array(Vec::new())
                    }
                }
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_value(item, history, warnings))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.resolve_value(item, history, warnings)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Evaluate a directive against history
pub fn evaluate(directive: &Directive, history: &[HistoryEntry]) -> ResolveResult<Value> {
    match directive {
        Directive::ExtractField { source, path } => {
            let entry = entry_at(history, *source)?;
            lookup_in_result(&entry.result, &segments(path))
        }
        Directive::TradeIdSet { op, indices } => {
            let lists = indices
                .iter()
                .map(|index| {
                    let entry = entry_at(history, ResultRef::Index(*index))?;
                    ids_of(&entry.result, *index)
                })
                .collect::<ResolveResult<Vec<_>>>()?;
            Ok(Value::from(operators::combine_ids(*op, lists)))
        }
        Directive::TradeSet { op, indices } => {
            let lists = indices
                .iter()
                .map(|index| {
                    let entry = entry_at(history, ResultRef::Index(*index))?;
                    records_of(&entry.result, *index)
                })
                .collect::<ResolveResult<Vec<_>>>()?;
            Ok(Value::Array(operators::combine_records(*op, lists)))
        }
        Directive::Slice {
            source,
            field,
            start,
            end,
        } => {
            let entry = entry_at(history, *source)?;
            let items = array_at(&entry.result, &segments(field))?;
            Ok(Value::Array(operators::slice(&items, *start, *end)))
        }
        Directive::Filter {
            source,
            field,
            property,
            predicate,
        } => {
            let entry = entry_at(history, *source)?;
            let items = array_at(&entry.result, &[field.as_str()])?;
            Ok(Value::Array(operators::filter(&items, property, predicate)))
        }
        Directive::Sort {
            source,
            field,
            property,
            order,
        } => {
            let entry = entry_at(history, *source)?;
            let items = array_at(&entry.result, &[field.as_str()])?;
            Ok(Value::Array(operators::sort(&items, property, *order)))
        }
        Directive::WholeResult(source) => Ok(entry_at(history, *source)?.result.to_value()),
        Directive::ExtractTradeIds(source) => {
            let (index, entry) = indexed_entry_at(history, *source)?;
            ids_of(&entry.result, index).map(Value::from)
        }
        Directive::ExtractTrades(source) => {
            let (index, entry) = indexed_entry_at(history, *source)?;
            records_of(&entry.result, index).map(Value::Array)
        }
        Directive::CacheKey(key) => Ok(Value::String(key.clone())),
        Directive::Malformed(text) => Err(ResolutionError::Malformed(text.clone())),
        Directive::Literal => Err(ResolutionError::Malformed(String::new())),
    }
}

fn segments(path: &[String]) -> Vec<&str> {
    path.iter().map(String::as_str).collect()
}

/// History entry addressed by `source`; `Last` skips skipped steps
fn entry_at(history: &[HistoryEntry], source: ResultRef) -> ResolveResult<&HistoryEntry> {
    indexed_entry_at(history, source).map(|(_, entry)| entry)
}

fn indexed_entry_at(history: &[HistoryEntry], source: ResultRef) -> ResolveResult<(usize, &HistoryEntry)> {
    match source {
        ResultRef::Index(index) => history
            .get(index)
            .map(|entry| (index, entry))
            .ok_or(ResolutionError::HistoryIndex {
                index,
                len: history.len(),
            }),
        ResultRef::Last => history
            .iter()
            .enumerate()
            .rev()
            .find(|(_, entry)| !entry.skipped)
            .ok_or(ResolutionError::NoLastResult),
    }
}

/// Look `segments` up in a result's data, falling back to the envelope when
/// the path names an envelope key
pub fn lookup_in_result(result: &ToolResult, segments: &[&str]) -> ResolveResult<Value> {
    let data = result.data_or_null();
    if segments.is_empty() {
        return Ok(data);
    }
    match lookup_path(&data, segments) {
        Ok(value) => Ok(value),
        Err(e) if ENVELOPE_KEYS.contains(&segments[0]) => {
            lookup_path(&result.to_value(), segments).map_err(|_| e)
        }
        Err(e) => Err(e),
    }
}

fn array_at(result: &ToolResult, segments: &[&str]) -> ResolveResult<Vec<Value>> {
    match lookup_in_result(result, segments)? {
        Value::Array(items) => Ok(items),
        other => Err(ResolutionError::NotAnArray {
            what: segments.join("."),
            kind: kind_of(&other),
        }),
    }
}

fn ids_of(result: &ToolResult, index: usize) -> ResolveResult<Vec<Value>> {
    let data = result.data_or_null();
    trade_ids(&data).ok_or_else(|| ResolutionError::NotAnArray {
        what: format!("trade ids of result {index}"),
        kind: kind_of(&data),
    })
}

fn records_of(result: &ToolResult, index: usize) -> ResolveResult<Vec<Value>> {
    let data = result.data_or_null();
    trade_records(&data).ok_or_else(|| ResolutionError::NotAnArray {
        what: format!("trades of result {index}"),
        kind: kind_of(&data),
    })
}
