//! Step descriptors, validation rules, and history entries

use crate::{Error, Result, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Tools a workflow step may invoke
///
/// Wire names are the camelCase function names the agent emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolName {
    /// Search the trade journal by filters
    SearchTrades,
    /// Aggregate statistics over a set of trades
    GetTradeStatistics,
    /// Vector similarity search over trades
    FindSimilarTrades,
    /// Read-only SQL over the journal
    QueryDatabase,
    /// Fetch economic calendar events
    FetchEconomicEvents,
    /// Correlate trades with economic events
    AnalyzeEconomicEvents,
    /// Reduce trades to their identifiers
    ExtractTradeIds,
    /// Render trade ids as display cards
    ConvertTradeIdsToCards,
    /// Load full trade records for ids
    ConvertTradeIdsToData,
}

impl ToolName {
    /// Every tool name, in declaration order
    pub const ALL: [Self; 9] = [
        Self::SearchTrades,
        Self::GetTradeStatistics,
        Self::FindSimilarTrades,
        Self::QueryDatabase,
        Self::FetchEconomicEvents,
        Self::AnalyzeEconomicEvents,
        Self::ExtractTradeIds,
        Self::ConvertTradeIdsToCards,
        Self::ConvertTradeIdsToData,
    ];

    /// Wire name of the tool
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchTrades => "searchTrades",
            Self::GetTradeStatistics => "getTradeStatistics",
            Self::FindSimilarTrades => "findSimilarTrades",
            Self::QueryDatabase => "queryDatabase",
            Self::FetchEconomicEvents => "fetchEconomicEvents",
            Self::AnalyzeEconomicEvents => "analyzeEconomicEvents",
            Self::ExtractTradeIds => "extractTradeIds",
            Self::ConvertTradeIdsToCards => "convertTradeIdsToCards",
            Self::ConvertTradeIdsToData => "convertTradeIdsToData",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| Error::UnknownTool(s.to_string()))
    }
}

/// Expected value at a dot path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValueRule {
    /// Dot path into the result data
    pub field: String,
    /// Value the field must equal
    pub value: Value,
}

/// Declarative checks applied to an executed step's result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_value: Option<FieldValueRule>,
}

/// One entry of a submitted workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    /// Tool to invoke
    #[serde(alias = "toolName")]
    pub name: ToolName,

    /// Arguments, possibly containing directives
    #[serde(default)]
    pub args: Map<String, Value>,

    /// Skip the step unless this expression holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Abort the run unless the result satisfies this rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<ValidationRule>,
}

impl StepDescriptor {
    /// Create a step; non-object arguments are treated as empty
    pub fn new(name: ToolName, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name,
            args,
            condition: None,
            validate: None,
        }
    }

    /// Set the execution condition
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Set the validation rule
    pub fn with_validation(mut self, rule: ValidationRule) -> Self {
        self.validate = Some(rule);
        self
    }
}

/// An ordered list of steps plus an optional description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub functions: Vec<StepDescriptor>,
}

impl StepBatch {
    /// Create a batch from steps
    pub fn new(functions: Vec<StepDescriptor>) -> Self {
        Self {
            description: None,
            functions,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parse the `{functions: [...], description?}` shape an agent emits
    ///
    /// Any shape error, including an unrecognised tool name, is structural.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::Structural(e.to_string()))
    }
}

/// Append-only record of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub tool_name: ToolName,
    pub resolved_args: Map<String, Value>,
    pub result: ToolResult,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl HistoryEntry {
    /// Entry for a dispatched step
    pub fn executed(tool_name: ToolName, resolved_args: Map<String, Value>, result: ToolResult) -> Self {
        Self {
            tool_name,
            resolved_args,
            result,
            skipped: false,
            skip_reason: None,
        }
    }

    /// Entry for a step whose condition was false
    pub fn skipped(tool_name: ToolName, args: Map<String, Value>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            tool_name,
            resolved_args: args,
            result: ToolResult::skipped(&reason),
            skipped: true,
            skip_reason: Some(reason),
        }
    }
}
