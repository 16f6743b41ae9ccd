//! Uniform invocation point for registered tools
//!
//! The dispatcher resolves cache-key arguments into materialized payloads,
//! invokes the tool, converts tool errors into failed results, and keeps
//! large results behind a cache key when asked to.

use crate::{ArgShape, ResultCache, Tool, ToolRegistry};
use chain_core::json::{record_count, trade_ids, trade_records};
use chain_core::{CachedSummary, SummaryInfo, ToolName, ToolResult};
use chain_utils::EngineConfig;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Argument a caller sets to `true` to receive a summary and cache key in
/// place of a large payload
pub const RETURN_CACHE_KEY_ARG: &str = "returnCacheKey";

/// Dispatches named tool calls through the registry and result cache
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    cache: ResultCache,
    config: Arc<EngineConfig>,
}

impl ToolDispatcher {
    /// Create a dispatcher
    pub fn new(registry: Arc<ToolRegistry>, cache: ResultCache, config: Arc<EngineConfig>) -> Self {
        Self {
            registry,
            cache,
            config,
        }
    }

    /// Create a dispatcher with a fresh in-memory cache built from `config`
    pub fn with_config(registry: Arc<ToolRegistry>, config: Arc<EngineConfig>) -> Self {
        let cache = ResultCache::from_config(&config);
        Self::new(registry, cache, config)
    }

    /// Get a reference to the tool registry
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Get a reference to the result cache
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Get a reference to the engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Invoke the tool registered under `name`
    ///
    /// Never returns an error: unknown names and tool errors become failed
    /// results. With `preserve_cache`, a large successful result is also
    /// stored under a fresh key reported in [`ToolResult::cache_key`]; with
    /// `returnCacheKey: true` in `args`, the payload is replaced by a
    /// [`CachedSummary`].
    pub async fn execute_function_call(
        &self,
        name: &str,
        mut args: Map<String, Value>,
        preserve_cache: bool,
    ) -> ToolResult {
        let Some(tool) = name
            .parse::<ToolName>()
            .ok()
            .and_then(|tool_name| self.registry.get(tool_name))
        else {
            warn!("Unknown function requested: {}", name);
            return ToolResult::failure(format!("Unknown function: {name}"));
        };

        let defer = args
            .remove(RETURN_CACHE_KEY_ARG)
            .is_some_and(|flag| flag.as_bool() == Some(true));

        self.materialize_cache_keys(tool.as_ref(), &mut args).await;

        info!("Executing function: {}", name);
        let result = match tool.execute(Value::Object(args)).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Function {} raised an error: {}", name, e);
                return ToolResult::failure(e.to_string());
            }
        };

        if !result.success {
            debug!("Function {} reported failure: {:?}", name, result.error);
            return result;
        }

        let Some(data) = result.data.as_ref() else {
            return result;
        };
        if !tool.is_large_result(data, self.config.large_result_threshold) {
            return result;
        }

        if defer {
            let summary = self.summarize(tool.name(), data);
            let key = self.cache.store(tool.name(), data.clone()).await;
            info!("Deferred large result of {} under {}", name, key);
            return ToolResult::ok(json!(CachedSummary::new(key, summary)));
        }

        if preserve_cache {
            let key = self.cache.store(tool.name(), data.clone()).await;
            debug!("Preserved large result of {} under {}", name, key);
            return result.with_cache_key(key);
        }

        result
    }

    /// Replace every top-level argument equal to a cache key with its
    /// payload, consuming the entry
    async fn materialize_cache_keys(&self, tool: &dyn Tool, args: &mut Map<String, Value>) {
        for (arg, value) in args.iter_mut() {
            let Some(key) = value
                .as_str()
                .filter(|s| self.cache.is_cache_key(s))
                .map(str::to_owned)
            else {
                continue;
            };
            let shape = tool.argument_shape(arg);

            *value = match self.cache.take(&key).await {
                Some(entry) => {
                    debug!(
                        "Materialized {} from {} (produced by {}) as {:?}",
                        arg, entry.key, entry.producer, shape
                    );
                    unwrap_payload(entry.data, shape)
                }
                None => {
                    warn!(
                        "Cache miss for argument {} of {}: key {} is absent or expired",
                        arg,
                        tool.name(),
                        key
                    );
                    fallback_for(shape)
                }
            };
        }
    }

    fn summarize(&self, producer: ToolName, data: &Value) -> SummaryInfo {
        let count = record_count(data).unwrap_or(1);
        let snippet = trade_records(data).map_or(Value::Null, |records| {
            Value::Array(records.into_iter().take(self.config.snippet_len).collect())
        });
        SummaryInfo {
            info: format!(
                "{count} records from {producer} cached; pass the cacheKey as an argument to use them"
            ),
            count,
            snippet,
        }
    }
}

/// Convert a cached payload into what an argument of `shape` expects
fn unwrap_payload(data: Value, shape: ArgShape) -> Value {
    match shape {
        ArgShape::Ids => trade_ids(&data).map_or(data, |ids| json!(ids)),
        ArgShape::Records => trade_records(&data).map_or(data, Value::Array),
        ArgShape::Raw => data,
    }
}

/// Known-safe value for an argument whose cache key could not be found
fn fallback_for(shape: ArgShape) -> Value {
    match shape {
        ArgShape::Ids | ArgShape::Records => Value::Array(Vec::new()),
        ArgShape::Raw => Value::Null,
    }
}
