//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and orchestration defaults so a rename or retune only requires
//! changing this file.

use std::time::Duration;

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "revq";

/// Crate version, from Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local config filename (e.g. `.revq.toml` in repo root).
pub const CONFIG_FILENAME: &str = ".revq.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "revq";

// ── Admission defaults ──────────────────────────────────────────────

/// Maximum requests a single client may make within the rate window.
pub const DEFAULT_RATE_LIMIT: u32 = 10;

/// Length of the sliding rate window.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// How long a completed review stays valid in the result cache.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

// ── Execution defaults ──────────────────────────────────────────────

/// Maximum execution attempts before a task settles into `failed`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay before re-enqueueing a transiently failed task.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(10);

/// Maximum backoff delay between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Per-file analyzer call timeout. A call that exceeds this is treated
/// as a transient failure of the attempt.
pub const DEFAULT_ANALYZE_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum concurrent analyzer calls per attempt.
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 4;

/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 2;

// ── Environment variable names ──────────────────────────────────────

pub const ENV_PROVIDER: &str = "REVQ_PROVIDER";
pub const ENV_MODEL: &str = "REVQ_MODEL";
pub const ENV_API_KEY: &str = "REVQ_API_KEY";
pub const ENV_BASE_URL: &str = "REVQ_BASE_URL";
pub const ENV_GITHUB_TOKEN: &str = "REVQ_GITHUB_TOKEN";
pub const ENV_RATE_LIMIT: &str = "REVQ_RATE_LIMIT";
pub const ENV_RATE_WINDOW_SECS: &str = "REVQ_RATE_WINDOW_SECS";
pub const ENV_CACHE_TTL_SECS: &str = "REVQ_CACHE_TTL_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "REVQ_MAX_ATTEMPTS";
