//! Placeholder directives
//!
//! A directive is a string argument that stands for data derived from the
//! execution history. [`parse_placeholder`] recognises the directive without
//! touching history; the resolver evaluates it afterwards.

use chain_tools::has_key_shape;

/// Which history entry a directive reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultRef {
    /// Entry at a 0-based position
    Index(usize),
    /// Most recent executed (non-skipped) entry
    Last,
}

impl ResultRef {
    fn parse(text: &str) -> Option<Self> {
        if text == "LAST" {
            return Some(Self::Last);
        }
        text.parse().ok().map(Self::Index)
    }
}

/// Set operation over id or record collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    /// Concatenate, keeping duplicates
    Merge,
    /// Concatenate, keeping first occurrences
    Unique,
    /// Keep what every collection contains
    Intersect,
}

/// Numeric comparison used by `FILTER_`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparison {
    /// Apply the comparison
    pub fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Lt => left < right,
            Self::Ge => left >= right,
            Self::Le => left <= right,
        }
    }
}

/// Element test used by `FILTER_`
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
    /// Numeric comparison against a constant
    Compare(Comparison, f64),
    /// Strictly positive value
    Win,
    /// Strictly negative value
    Loss,
    /// Exact or string-coerced equality
    Equals(String),
}

/// Direction used by `SORT_`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A recognised argument directive
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `EXTRACT_{i|LAST}.{path}`
    ExtractField { source: ResultRef, path: Vec<String> },
    /// `{MERGE|UNIQUE|INTERSECT}_TRADE_IDS_{i}_{j}...`
    TradeIdSet { op: SetOp, indices: Vec<usize> },
    /// `{MERGE|UNIQUE|INTERSECT}_TRADES_{i}_{j}...`
    TradeSet { op: SetOp, indices: Vec<usize> },
    /// `SLICE_{i|LAST}.{field}.{start}.{end}`
    Slice {
        source: ResultRef,
        field: Vec<String>,
        start: usize,
        end: usize,
    },
    /// `FILTER_{i|LAST}.{field}.{property}.{value}`
    Filter {
        source: ResultRef,
        field: String,
        property: String,
        predicate: FilterPredicate,
    },
    /// `SORT_{i|LAST}.{field}.{property}.{asc|desc}`
    Sort {
        source: ResultRef,
        field: String,
        property: String,
        order: SortOrder,
    },
    /// `RESULT_{i}` or `LAST_RESULT`
    WholeResult(ResultRef),
    /// `EXTRACT_TRADE_IDS[_{i|LAST}]`
    ExtractTradeIds(ResultRef),
    /// `EXTRACT_TRADES[_{i|LAST}]`
    ExtractTrades(ResultRef),
    /// A result-cache key, left for the dispatcher
    CacheKey(String),
    /// Uses a directive prefix but does not fit its grammar
    Malformed(String),
    /// Plain text
    Literal,
}

/// Classify `text`; `cache_prefix` identifies result-cache keys
pub fn parse_placeholder(text: &str, cache_prefix: &str) -> Directive {
    let malformed = || Directive::Malformed(text.to_string());

    if let Some(rest) = text.strip_prefix("EXTRACT_") {
        if let Some(source) = rest.strip_prefix("TRADE_IDS") {
            return optional_source(source).map_or_else(malformed, Directive::ExtractTradeIds);
        }
        if let Some(source) = rest.strip_prefix("TRADES") {
            return optional_source(source).map_or_else(malformed, Directive::ExtractTrades);
        }
        return parse_extract(rest).unwrap_or_else(malformed);
    }

    for (prefix, op) in SET_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            if let Some(indices) = rest.strip_prefix("TRADE_IDS_") {
                return parse_indices(indices)
                    .map_or_else(malformed, |indices| Directive::TradeIdSet { op, indices });
            }
            if let Some(indices) = rest.strip_prefix("TRADES_") {
                return parse_indices(indices)
                    .map_or_else(malformed, |indices| Directive::TradeSet { op, indices });
            }
        }
    }

    if let Some(rest) = text.strip_prefix("SLICE_") {
        return parse_slice(rest).unwrap_or_else(malformed);
    }
    if let Some(rest) = text.strip_prefix("FILTER_") {
        return parse_filter(rest).unwrap_or_else(malformed);
    }
    if let Some(rest) = text.strip_prefix("SORT_") {
        return parse_sort(rest).unwrap_or_else(malformed);
    }

    if let Some(rest) = text.strip_prefix("LAST_RESULT") {
        let path = if rest.is_empty() { Some("") } else { rest.strip_prefix('.') };
        return path
            .and_then(|path| with_optional_path(ResultRef::Last, path))
            .unwrap_or_else(malformed);
    }
    if let Some(rest) = text.strip_prefix("RESULT_") {
        let (index, path) = rest.split_once('.').map_or((rest, ""), |(i, p)| (i, p));
        return index
            .parse()
            .ok()
            .and_then(|index| with_optional_path(ResultRef::Index(index), path))
            .unwrap_or_else(malformed);
    }

    if has_key_shape(cache_prefix, text) {
        return Directive::CacheKey(text.to_string());
    }

    Directive::Literal
}

const SET_PREFIXES: [(&str, SetOp); 3] = [
    ("MERGE_", SetOp::Merge),
    ("UNIQUE_", SetOp::Unique),
    ("INTERSECT_", SetOp::Intersect),
];

/// `""` means the last result, `_{i|LAST}` a specific one
fn optional_source(text: &str) -> Option<ResultRef> {
    if text.is_empty() {
        return Some(ResultRef::Last);
    }
    text.strip_prefix('_').and_then(ResultRef::parse)
}

fn path_segments(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `RESULT_i` / `LAST_RESULT`, optionally followed by a path (dot already
/// stripped)
fn with_optional_path(source: ResultRef, path: &str) -> Option<Directive> {
    if path.is_empty() {
        return Some(Directive::WholeResult(source));
    }
    let segments = path_segments(path);
    if segments.is_empty() {
        return None;
    }
    Some(Directive::ExtractField {
        source,
        path: segments,
    })
}

fn parse_extract(rest: &str) -> Option<Directive> {
    let (source, path) = rest.split_once('.')?;
    let source = ResultRef::parse(source)?;
    let path = path_segments(path);
    if path.is_empty() {
        return None;
    }
    Some(Directive::ExtractField { source, path })
}

fn parse_indices(text: &str) -> Option<Vec<usize>> {
    let indices: Option<Vec<usize>> = text.split('_').map(|i| i.parse().ok()).collect();
    indices.filter(|indices| !indices.is_empty())
}

fn parse_slice(rest: &str) -> Option<Directive> {
    let (source, remainder) = rest.split_once('.')?;
    let source = ResultRef::parse(source)?;

    let mut parts = remainder.rsplitn(3, '.');
    let end = parts.next()?.parse().ok()?;
    let start = parts.next()?.parse().ok()?;
    let field = parts.next().map(path_segments).unwrap_or_default();

    Some(Directive::Slice {
        source,
        field,
        start,
        end,
    })
}

fn parse_filter(rest: &str) -> Option<Directive> {
    let mut parts = rest.splitn(4, '.');
    let source = ResultRef::parse(parts.next()?)?;
    let field = parts.next()?.to_string();
    let property = parts.next()?.to_string();
    let value = parts.next()?;
    if field.is_empty() || property.is_empty() || value.is_empty() {
        return None;
    }

    Some(Directive::Filter {
        source,
        field,
        property,
        predicate: parse_predicate(value)?,
    })
}

fn parse_predicate(value: &str) -> Option<FilterPredicate> {
    const COMPARISONS: [(&str, Comparison); 4] = [
        (">=", Comparison::Ge),
        ("<=", Comparison::Le),
        (">", Comparison::Gt),
        ("<", Comparison::Lt),
    ];

    for (symbol, comparison) in COMPARISONS {
        if let Some(operand) = value.strip_prefix(symbol) {
            let operand = operand.trim().parse::<f64>().ok()?;
            return Some(FilterPredicate::Compare(comparison, operand));
        }
    }

    Some(match value.to_ascii_lowercase().as_str() {
        "win" => FilterPredicate::Win,
        "loss" => FilterPredicate::Loss,
        _ => FilterPredicate::Equals(value.to_string()),
    })
}

fn parse_sort(rest: &str) -> Option<Directive> {
    let mut parts = rest.splitn(4, '.');
    let source = ResultRef::parse(parts.next()?)?;
    let field = parts.next()?.to_string();
    let property = parts.next()?.to_string();
    let order = match parts.next()?.to_ascii_lowercase().as_str() {
        "asc" => SortOrder::Asc,
        "desc" => SortOrder::Desc,
        _ => return None,
    };
    if field.is_empty() || property.is_empty() {
        return None;
    }

    Some(Directive::Sort {
        source,
        field,
        property,
        order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Directive {
        parse_placeholder(text, "fc_")
    }

    #[test]
    fn test_extract_field() {
        assert_eq!(
            parse("EXTRACT_0.trades.id"),
            Directive::ExtractField {
                source: ResultRef::Index(0),
                path: vec!["trades".to_string(), "id".to_string()],
            }
        );
        assert_eq!(
            parse("EXTRACT_LAST.stats.winRate"),
            Directive::ExtractField {
                source: ResultRef::Last,
                path: vec!["stats".to_string(), "winRate".to_string()],
            }
        );
    }

    #[test]
    fn test_extract_shorthands_take_precedence_over_field_form() {
        assert_eq!(parse("EXTRACT_TRADE_IDS"), Directive::ExtractTradeIds(ResultRef::Last));
        assert_eq!(
            parse("EXTRACT_TRADE_IDS_1"),
            Directive::ExtractTradeIds(ResultRef::Index(1))
        );
        assert_eq!(parse("EXTRACT_TRADES"), Directive::ExtractTrades(ResultRef::Last));
        assert_eq!(
            parse("EXTRACT_TRADES_LAST"),
            Directive::ExtractTrades(ResultRef::Last)
        );
        assert!(matches!(parse("EXTRACT_TRADESX"), Directive::Malformed(_)));
    }

    #[test]
    fn test_set_directives() {
        assert_eq!(
            parse("MERGE_TRADE_IDS_0_1"),
            Directive::TradeIdSet {
                op: SetOp::Merge,
                indices: vec![0, 1],
            }
        );
        assert_eq!(
            parse("INTERSECT_TRADES_2_0_1"),
            Directive::TradeSet {
                op: SetOp::Intersect,
                indices: vec![2, 0, 1],
            }
        );
        assert!(matches!(parse("UNIQUE_TRADE_IDS_0_x"), Directive::Malformed(_)));
        assert_eq!(parse("UNIQUE_VALUES"), Directive::Literal);
    }

    #[test]
    fn test_slice() {
        assert_eq!(
            parse("SLICE_0.trades.0.5"),
            Directive::Slice {
                source: ResultRef::Index(0),
                field: vec!["trades".to_string()],
                start: 0,
                end: 5,
            }
        );
        assert_eq!(
            parse("SLICE_LAST.2.4"),
            Directive::Slice {
                source: ResultRef::Last,
                field: Vec::new(),
                start: 2,
                end: 4,
            }
        );
        assert!(matches!(parse("SLICE_0.trades.a.5"), Directive::Malformed(_)));
    }

    #[test]
    fn test_filter_predicates() {
        assert_eq!(
            parse("FILTER_0.trades.amount.>100"),
            Directive::Filter {
                source: ResultRef::Index(0),
                field: "trades".to_string(),
                property: "amount".to_string(),
                predicate: FilterPredicate::Compare(Comparison::Gt, 100.0),
            }
        );
        assert!(matches!(
            parse("FILTER_0.trades.amount.<=-2.5"),
            Directive::Filter {
                predicate: FilterPredicate::Compare(Comparison::Le, v),
                ..
            } if (v + 2.5).abs() < f64::EPSILON
        ));
        assert!(matches!(
            parse("FILTER_LAST.trades.pnl.WIN"),
            Directive::Filter {
                predicate: FilterPredicate::Win,
                ..
            }
        ));
        assert!(matches!(
            parse("FILTER_1.trades.session.london"),
            Directive::Filter {
                predicate: FilterPredicate::Equals(ref v),
                ..
            } if v == "london"
        ));
        assert!(matches!(parse("FILTER_0.trades.amount.>abc"), Directive::Malformed(_)));
        assert!(matches!(parse("FILTER_0.trades"), Directive::Malformed(_)));
    }

    #[test]
    fn test_sort() {
        assert_eq!(
            parse("SORT_0.trades.date.desc"),
            Directive::Sort {
                source: ResultRef::Index(0),
                field: "trades".to_string(),
                property: "date".to_string(),
                order: SortOrder::Desc,
            }
        );
        assert!(matches!(parse("SORT_0.trades.date.sideways"), Directive::Malformed(_)));
    }

    #[test]
    fn test_whole_result_references() {
        assert_eq!(parse("LAST_RESULT"), Directive::WholeResult(ResultRef::Last));
        assert_eq!(parse("RESULT_3"), Directive::WholeResult(ResultRef::Index(3)));
        assert_eq!(
            parse("RESULT_0.count"),
            Directive::ExtractField {
                source: ResultRef::Index(0),
                path: vec!["count".to_string()],
            }
        );
        assert!(matches!(parse("RESULT_x"), Directive::Malformed(_)));
        assert!(matches!(parse("LAST_RESULTS"), Directive::Malformed(_)));
    }

    #[test]
    fn test_cache_keys_and_literals() {
        assert_eq!(
            parse("fc_1700000000000_ab12cd34e"),
            Directive::CacheKey("fc_1700000000000_ab12cd34e".to_string())
        );
        assert_eq!(parse("fc_"), Directive::Literal);
        assert_eq!(parse("fc_barcelona"), Directive::Literal);
        assert_eq!(parse("win"), Directive::Literal);
        assert_eq!(parse("2024-01-01"), Directive::Literal);
    }
}
