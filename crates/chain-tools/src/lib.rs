//! Tool layer for trade-chain
//!
//! This crate defines how analytic tools are declared and invoked: the
//! [`Tool`] trait, the [`ToolRegistry`] that holds them, the [`ResultCache`]
//! used to pass large payloads by key, and the [`ToolDispatcher`] that ties
//! the three together behind a single call.

pub mod cache;
pub mod dispatcher;
pub mod registry;
pub mod tool;

pub use cache::{CacheEntry, KeyedStore, ResultCache, TimedStore, has_key_shape};
pub use dispatcher::{RETURN_CACHE_KEY_ARG, ToolDispatcher};
pub use registry::ToolRegistry;
pub use tool::{ArgShape, Tool};
