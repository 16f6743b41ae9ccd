//! Uniform result envelope returned by every tool

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Envelope every tool call resolves to: `{success, data?, error?}`
///
/// `cache_key` is set when the dispatcher kept a copy of a large result
/// under a fresh key so a later conversational turn can reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Whether the tool succeeded
    pub success: bool,

    /// Payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Key under which a copy of `data` was cached, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl ToolResult {
    /// Successful result carrying `data`
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            cache_key: None,
        }
    }

    /// Failed result carrying an error message
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            cache_key: None,
        }
    }

    /// Placeholder result recorded for a step whose condition was false
    pub fn skipped(reason: &str) -> Self {
        Self::ok(json!({ "skipped": true, "reason": reason }))
    }

    /// Attach the key of a cached copy of this result
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Payload, or `null` when absent
    pub fn data_or_null(&self) -> Value {
        self.data.clone().unwrap_or(Value::Null)
    }

    /// The whole envelope as JSON
    pub fn to_value(&self) -> Value {
        let mut envelope = json!({ "success": self.success });
        if let Some(data) = &self.data {
            envelope["data"] = data.clone();
        }
        if let Some(error) = &self.error {
            envelope["error"] = json!(error);
        }
        if let Some(key) = &self.cache_key {
            envelope["cacheKey"] = json!(key);
        }
        envelope
    }
}

/// Compact description of a cached payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryInfo {
    /// Human-readable description of what was cached
    pub info: String,
    /// Number of records in the payload
    pub count: usize,
    /// Leading records of the payload
    pub snippet: Value,
}

/// Data returned in place of a large payload when deferral was requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSummary {
    /// Always `true`
    pub cached: bool,
    /// Key to pass as an argument to retrieve the payload
    pub cache_key: String,
    /// What was cached
    pub summary: SummaryInfo,
}

impl CachedSummary {
    /// Create a summary for `cache_key`
    pub fn new(cache_key: impl Into<String>, summary: SummaryInfo) -> Self {
        Self {
            cached: true,
            cache_key: cache_key.into(),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shapes() {
        let ok = ToolResult::ok(json!({"count": 2}));
        assert_eq!(ok.to_value(), json!({"success": true, "data": {"count": 2}}));

        let failed = ToolResult::failure("boom");
        assert_eq!(failed.to_value(), json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_serde_skips_empty_fields() {
        let ok = ToolResult::ok(json!([1, 2])).with_cache_key("fc_1_abc");
        let text = serde_json::to_string(&ok).unwrap();
        assert!(text.contains("\"cacheKey\":\"fc_1_abc\""));
        assert!(!text.contains("error"));
    }

    #[test]
    fn test_cached_summary_wire_format() {
        let summary = CachedSummary::new(
            "fc_1_abc",
            SummaryInfo {
                info: "25 trades".to_string(),
                count: 25,
                snippet: json!([]),
            },
        );
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["cached"], json!(true));
        assert_eq!(value["cacheKey"], json!("fc_1_abc"));
        assert_eq!(value["summary"]["count"], json!(25));
    }
}
