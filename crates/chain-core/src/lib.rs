//! Core data model for trade-chain
//!
//! This crate defines the types shared by the tool layer and the workflow
//! engine: the step descriptors an agent submits, the uniform tool result
//! envelope, the append-only history entries, and the error types.

pub mod error;
pub mod json;
pub mod result;
pub mod step;

pub use error::{Error, ResolutionError, Result};
pub use result::{CachedSummary, SummaryInfo, ToolResult};
pub use step::{FieldValueRule, HistoryEntry, StepBatch, StepDescriptor, ToolName, ValidationRule};
