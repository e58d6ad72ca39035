//! Configuration loading and layering.
//!
//! Handles `.revq.toml` loading, environment variable resolution,
//! and CLI flag merging with proper priority ordering.

pub mod loader;

pub use loader::{AdmissionConfig, AnalyzerConfig, Config, RetryConfig};
