//! Sequential execution of a step batch
//!
//! The executor runs one step at a time:
//! 1. Evaluate the step's condition; a false condition records a skip
//! 2. Resolve directives in the arguments against history so far
//! 3. Dispatch, asking the dispatcher to keep large intermediate results
//! 4. Stop at the first failed dispatch or unmet validation rule
//! 5. Append the step to history

use crate::condition::ConditionEvaluator;
use crate::resolver::PlaceholderResolver;
use crate::validator::ResultValidator;
use chain_core::{Error, HistoryEntry, StepBatch, ToolName, ToolResult};
use chain_tools::{RETURN_CACHE_KEY_ARG, ToolDispatcher};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Outcome of a completed batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Every step in submission order, skipped ones included
    pub functions: Vec<HistoryEntry>,
    /// Result of the last executed step
    pub final_result: Option<ToolResult>,
    pub total_functions: usize,
    pub skipped_functions: usize,
    /// Directives that degraded to an empty value
    pub resolution_warnings: usize,
}

impl BatchReport {
    /// Engine output envelope: `{success: true, data: report}`
    pub fn to_result(&self) -> ToolResult {
        match serde_json::to_value(self) {
            Ok(data) => ToolResult::ok(data),
            Err(e) => ToolResult::failure(Error::from(e).to_string()),
        }
    }
}

/// Where and how far a failed batch got
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    /// Steps recorded before the failure
    pub completed_functions: Vec<HistoryEntry>,
    /// Wire name of the failed step, which may not name a known tool
    pub failed_function: String,
    /// 1-based position of the failed step
    pub failed_at: usize,
}

/// Why a batch stopped
#[derive(Error, Debug)]
pub enum BatchError {
    /// The batch as a whole was rejected before any step was dispatched
    #[error(transparent)]
    Rejected(#[from] Error),

    /// A step cannot run as submitted; nothing was dispatched
    #[error("{source} (step {})", .report.failed_at)]
    InvalidStep { source: Error, report: FailureReport },

    /// A tool failed
    #[error("{} failed at step {}: {message}", .report.failed_function, .report.failed_at)]
    ToolFailure {
        message: String,
        report: FailureReport,
    },

    /// A result did not satisfy its validation rule
    #[error("Validation failed for {} at step {}: {reason}", .report.failed_function, .report.failed_at)]
    ValidationFailure {
        reason: String,
        report: FailureReport,
    },
}

impl BatchError {
    /// Progress up to the failing step, when a step can be blamed
    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            Self::Rejected(_) => None,
            Self::InvalidStep { report, .. }
            | Self::ToolFailure { report, .. }
            | Self::ValidationFailure { report, .. } => Some(report),
        }
    }

    fn invalid_step(source: Error, failed_function: impl Into<String>, failed_at: usize) -> Self {
        Self::InvalidStep {
            source,
            report: FailureReport {
                completed_functions: Vec::new(),
                failed_function: failed_function.into(),
                failed_at,
            },
        }
    }

    /// Engine output envelope:
    /// `{success: false, error, data: {completedFunctions, failedFunction, failedAt}}`
    pub fn to_result(&self) -> ToolResult {
        let mut result = ToolResult::failure(self.to_string());
        if let Some(report) = self.report() {
            result.data = serde_json::to_value(report).ok();
        }
        result
    }
}

#[derive(Default)]
struct RunState {
    history: Vec<HistoryEntry>,
    last_result: Option<ToolResult>,
    created_keys: Vec<String>,
    warnings: usize,
}

/// Runs step batches against a [`ToolDispatcher`]
pub struct SequentialExecutor {
    dispatcher: Arc<ToolDispatcher>,
    resolver: PlaceholderResolver,
    conditions: ConditionEvaluator,
    validator: ResultValidator,
}

impl SequentialExecutor {
    /// Create an executor; directive parsing uses the dispatcher's cache
    /// key prefix
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        let resolver = PlaceholderResolver::new(dispatcher.config().cache_key_prefix.clone());
        Self {
            dispatcher,
            resolver,
            conditions: ConditionEvaluator::new(),
            validator: ResultValidator::new(),
        }
    }

    /// Get a reference to the dispatcher
    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// Run a batch given as `{functions: [...], description?}` JSON and wrap
    /// the outcome in the engine output envelope
    pub async fn execute_multiple_functions(&self, args: Value) -> ToolResult {
        if let Some((position, name)) = first_unknown_name(&args) {
            warn!("Rejected batch: step {} names unknown function {}", position, name);
            return BatchError::invalid_step(Error::UnknownTool(name.clone()), name, position).to_result();
        }

        let batch = match StepBatch::from_value(args) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Rejected malformed batch: {}", e);
                return BatchError::from(e).to_result();
            }
        };

        match self.run(&batch).await {
            Ok(report) => report.to_result(),
            Err(e) => e.to_result(),
        }
    }

    /// Run every step of `batch` in order
    pub async fn run(&self, batch: &StepBatch) -> Result<BatchReport, BatchError> {
        self.check_structure(batch)?;

        info!(
            "Executing batch of {} function(s){}",
            batch.functions.len(),
            batch
                .description
                .as_deref()
                .map(|d| format!(": {d}"))
                .unwrap_or_default()
        );

        let mut state = RunState::default();
        let outcome = self.execute_steps(batch, &mut state).await;

        if self.dispatcher.config().cleanup_on_completion {
            self.release_keys(&state.created_keys).await;
        }
        let purged = self.dispatcher.cache().purge_expired().await;
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        outcome?;

        let skipped_functions = state.history.iter().filter(|entry| entry.skipped).count();
        info!(
            "Batch completed: {} function(s), {} skipped, {} resolution warning(s)",
            state.history.len(),
            skipped_functions,
            state.warnings
        );

        Ok(BatchReport {
            description: batch.description.clone(),
            total_functions: state.history.len(),
            skipped_functions,
            resolution_warnings: state.warnings,
            final_result: state.last_result,
            functions: state.history,
        })
    }

    /// Reject batches that cannot run before anything is dispatched
    fn check_structure(&self, batch: &StepBatch) -> Result<(), BatchError> {
        if batch.functions.is_empty() {
            return Err(Error::Structural("no functions to execute".to_string()).into());
        }

        let max_steps = self.dispatcher.config().max_steps;
        if batch.functions.len() > max_steps {
            return Err(Error::Structural(format!(
                "{} functions exceed the limit of {}",
                batch.functions.len(),
                max_steps
            ))
            .into());
        }

        for (index, step) in batch.functions.iter().enumerate() {
            let position = index + 1;
            if !self.dispatcher.registry().contains(step.name) {
                warn!("Rejected batch: {} is not registered", step.name);
                return Err(BatchError::invalid_step(
                    Error::UnknownTool(step.name.to_string()),
                    step.name.as_str(),
                    position,
                ));
            }
            let defers = step
                .args
                .get(RETURN_CACHE_KEY_ARG)
                .is_some_and(|flag| flag.as_bool() == Some(true));
            if defers {
                return Err(BatchError::invalid_step(
                    Error::Structural(format!(
                        "{} sets {}; results inside a batch must stay materialized",
                        step.name, RETURN_CACHE_KEY_ARG
                    )),
                    step.name.as_str(),
                    position,
                ));
            }
        }

        Ok(())
    }

    async fn execute_steps(&self, batch: &StepBatch, state: &mut RunState) -> Result<(), BatchError> {
        let total = batch.functions.len();

        for (index, step) in batch.functions.iter().enumerate() {
            let position = index + 1;

            if let Some(condition) = &step.condition {
                if !self
                    .conditions
                    .evaluate(condition, &state.history, state.last_result.as_ref())
                {
                    info!(
                        "Skipping {} (step {}/{}): condition '{}' not met",
                        step.name, position, total, condition
                    );
                    state.history.push(HistoryEntry::skipped(
                        step.name,
                        step.args.clone(),
                        format!("Condition not met: {condition}"),
                    ));
                    continue;
                }
            }

            let resolved = self.resolver.resolve(&step.args, &state.history);
            state.warnings += resolved.warnings.len();

            info!("Executing {} (step {}/{})", step.name, position, total);
            let preserve_cache = position < total;
            let result = self
                .dispatcher
                .execute_function_call(step.name.as_str(), resolved.args.clone(), preserve_cache)
                .await;

            if let Some(key) = &result.cache_key {
                debug!("Step {} left a cached copy under {}", position, key);
                state.created_keys.push(key.clone());
            }

            if !result.success {
                let message = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "tool reported failure".to_string());
                warn!("{} failed at step {}: {}", step.name, position, message);
                return Err(BatchError::ToolFailure {
                    message,
                    report: failure_report(state, step.name, position),
                });
            }

            if let Some(rule) = &step.validate {
                if let Err(reason) = self.validator.check(&result, rule) {
                    warn!("Validation failed for {} at step {}: {}", step.name, position, reason);
                    return Err(BatchError::ValidationFailure {
                        reason,
                        report: failure_report(state, step.name, position),
                    });
                }
            }

            state
                .history
                .push(HistoryEntry::executed(step.name, resolved.args, result.clone()));
            state.last_result = Some(result);
        }

        Ok(())
    }

    async fn release_keys(&self, keys: &[String]) {
        let mut released = 0;
        for key in keys {
            if self.dispatcher.cache().delete(key).await {
                released += 1;
            }
        }
        debug!("Released {} of {} cached result(s)", released, keys.len());
    }
}

fn failure_report(state: &RunState, failed_function: ToolName, failed_at: usize) -> FailureReport {
    FailureReport {
        completed_functions: state.history.clone(),
        failed_function: failed_function.to_string(),
        failed_at,
    }
}

/// 1-based position and wire name of the first step naming no known tool
fn first_unknown_name(args: &Value) -> Option<(usize, String)> {
    args.get("functions")?
        .as_array()?
        .iter()
        .enumerate()
        .find_map(|(index, step)| {
            let name = step
                .get("name")
                .or_else(|| step.get("toolName"))
                .and_then(Value::as_str)?;
            name.parse::<ToolName>()
                .is_err()
                .then(|| (index + 1, name.to_string()))
        })
}
