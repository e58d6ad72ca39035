//! revq — asynchronous AI pull-request review orchestrator (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod env;
pub mod executor;
pub mod host;
pub mod limiter;
pub mod models;
pub mod queue;
pub mod status;
pub mod store;
