//! Shared utilities for trade-chain
//!
//! This crate provides common functionality used across the workspace,
//! including logging setup and the engine configuration.

pub mod config;
pub mod logging;

pub use config::{ConfigError, EngineConfig, EngineConfigBuilder};
pub use logging::{init_tracing, init_tracing_json};
