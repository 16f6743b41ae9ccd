//! Multi-step execution engine for trade-chain
//!
//! A batch is an ordered list of tool calls whose arguments may reference
//! earlier results through string directives such as `EXTRACT_0.trades.id`
//! or `UNIQUE_TRADE_IDS_0_1`. The [`SequentialExecutor`] runs the steps one at
//! a time, resolving directives with the [`PlaceholderResolver`], skipping
//! steps whose condition is false, and stopping at the first failure.
//!
//! # Example
//!
//! ```no_run
//! use chain_core::{StepBatch, StepDescriptor, ToolName};
//! use chain_tools::{ToolDispatcher, ToolRegistry};
//! use chain_utils::EngineConfig;
//! use chain_workflow::SequentialExecutor;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(registry: Arc<ToolRegistry>) {
//! let dispatcher = ToolDispatcher::with_config(registry, Arc::new(EngineConfig::default()));
//! let executor = SequentialExecutor::new(Arc::new(dispatcher));
//!
//! let batch = StepBatch::new(vec![
//!     StepDescriptor::new(ToolName::SearchTrades, json!({"tradeType": "win"})),
//!     StepDescriptor::new(ToolName::GetTradeStatistics, json!({"tradeIds": "EXTRACT_TRADE_IDS_0"})),
//! ]);
//!
//! match executor.run(&batch).await {
//!     Ok(report) => println!("{} steps", report.total_functions),
//!     Err(e) => eprintln!("{e}"),
//! }
//! # }
//! ```

pub mod condition;
pub mod directive;
pub mod executor;
pub mod operators;
pub mod resolver;
pub mod validator;

pub use condition::ConditionEvaluator;
pub use directive::{Directive, ResultRef, parse_placeholder};
pub use executor::{BatchError, BatchReport, FailureReport, SequentialExecutor};
pub use resolver::{PlaceholderResolver, ResolvedArgs};
pub use validator::ResultValidator;
