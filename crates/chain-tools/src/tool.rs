//! Tool trait definition

use async_trait::async_trait;
use chain_core::{Result, ToolName, ToolResult, json::record_count};
use serde_json::{Value, json};

/// How a cached payload is unwrapped when passed to an argument by key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    /// Bare list of trade identifiers
    Ids,
    /// Full trade records
    Records,
    /// The payload exactly as cached
    Raw,
}

impl ArgShape {
    /// Shape implied by a conventional argument name
    pub fn for_argument(arg: &str) -> Self {
        match arg {
            "tradeIds" | "ids" => Self::Ids,
            "trades" | "records" => Self::Records,
            _ => Self::Raw,
        }
    }
}

/// Trait for analytic tools the engine can dispatch to
///
/// A tool reports expected failures through [`ToolResult::failure`]; an
/// `Err` is treated like a thrown exception and converted by the
/// dispatcher.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute the tool with its (already resolved) arguments
    async fn execute(&self, args: Value) -> Result<ToolResult>;

    /// The tool's name
    ///
    /// Must be unique within a ToolRegistry
    fn name(&self) -> ToolName;

    /// Get the tool's description
    fn description(&self) -> &str;

    /// Get the tool's input schema (JSON Schema format)
    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    /// How a cache-key value for `arg` should be materialized
    fn argument_shape(&self, arg: &str) -> ArgShape {
        ArgShape::for_argument(arg)
    }

    /// Whether `data` is large enough to be kept behind a cache key
    fn is_large_result(&self, data: &Value, threshold: usize) -> bool {
        record_count(data).is_some_and(|count| count > threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EventsTool;

    #[async_trait]
    impl Tool for EventsTool {
        async fn execute(&self, _args: Value) -> Result<ToolResult> {
            Ok(ToolResult::ok(json!([])))
        }

        fn name(&self) -> ToolName {
            ToolName::FetchEconomicEvents
        }

        fn description(&self) -> &str {
            "Fetch economic events"
        }

        fn argument_shape(&self, _arg: &str) -> ArgShape {
            ArgShape::Raw
        }
    }

    #[test]
    fn test_argument_shape_by_name() {
        assert_eq!(ArgShape::for_argument("tradeIds"), ArgShape::Ids);
        assert_eq!(ArgShape::for_argument("trades"), ArgShape::Records);
        assert_eq!(ArgShape::for_argument("sql"), ArgShape::Raw);
    }

    #[test]
    fn test_default_large_result_heuristic() {
        let tool = EventsTool;
        assert!(tool.is_large_result(&json!({"trades": [1, 2, 3]}), 2));
        assert!(!tool.is_large_result(&json!({"trades": [1, 2]}), 2));
        assert!(!tool.is_large_result(&json!("text"), 0));
        assert_eq!(tool.argument_shape("tradeIds"), ArgShape::Raw);
        assert_eq!(tool.input_schema()["type"], "object");
    }

    #[test]
    fn test_execute_returns_envelope() {
        let result = tokio_test::block_on(EventsTool.execute(json!({"country": "US"})));
        let result = tokio_test::assert_ok!(result);
        assert!(result.success);
        assert_eq!(result.data, Some(json!([])));
    }
}
