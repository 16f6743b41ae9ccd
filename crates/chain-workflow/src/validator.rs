//! Declarative checks on a completed step's result

use crate::resolver::lookup_in_result;
use chain_core::json::{kind_of, record_count, split_path, strict_eq};
use chain_core::{ToolResult, ValidationRule};
use serde_json::Value;
use tracing::debug;

/// Checks results against [`ValidationRule`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultValidator;

impl ResultValidator {
    /// Create a validator
    pub fn new() -> Self {
        Self
    }

    /// Whether `result` satisfies every check in `rule`
    pub fn validate(&self, result: &ToolResult, rule: &ValidationRule) -> bool {
        match self.check(result, rule) {
            Ok(()) => true,
            Err(reason) => {
                debug!("Validation failed: {}", reason);
                false
            }
        }
    }

    /// Like [`validate`](Self::validate), reporting the first unmet check
    pub fn check(&self, result: &ToolResult, rule: &ValidationRule) -> Result<(), String> {
        if rule.min_count.is_some() || rule.max_count.is_some() {
            let data = result.data_or_null();
            let count = record_count(&data)
                .ok_or_else(|| format!("cannot derive a count from a {} result", kind_of(&data)))?;

            if let Some(min) = rule.min_count {
                if count < min {
                    return Err(format!("count {count} is below minCount {min}"));
                }
            }
            if let Some(max) = rule.max_count {
                if count > max {
                    return Err(format!("count {count} exceeds maxCount {max}"));
                }
            }
        }

        if let Some(field) = &rule.has_field {
            match field_at(result, field) {
                Some(value) if !value.is_null() => {}
                _ => return Err(format!("field '{field}' is missing or null")),
            }
        }

        if let Some(expected) = &rule.field_value {
            let actual = field_at(result, &expected.field)
                .ok_or_else(|| format!("field '{}' is missing", expected.field))?;
            if !strict_eq(&actual, &expected.value) {
                return Err(format!(
                    "field '{}' is {actual}, expected {}",
                    expected.field, expected.value
                ));
            }
        }

        Ok(())
    }
}

fn field_at(result: &ToolResult, path: &str) -> Option<Value> {
    let segments = split_path(path);
    if segments.is_empty() {
        return None;
    }
    lookup_in_result(result, &segments).ok()
}
