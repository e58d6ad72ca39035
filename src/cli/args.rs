//! Clap argument types.

use clap::Parser;

/// Asynchronous AI pull-request reviewer.
#[derive(Parser, Debug)]
#[command(name = "revq", version = revq::constants::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Submit a pull request for review and wait for the report.
    Review(Box<ReviewArgs>),

    /// Print version information.
    Version,
}

/// Arguments for the `review` subcommand.
#[derive(Parser, Debug)]
pub struct ReviewArgs {
    /// Repository URL, e.g. https://github.com/user/repo.
    pub repo: String,

    /// Pull request number.
    pub pr: u64,

    /// Access token for private repositories.
    #[arg(long, env = "REVQ_GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Client identity used for rate limiting.
    #[arg(long, default_value = "cli")]
    pub client: String,

    /// Ignore any cached result and re-run the review.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Print the report as JSON instead of the terminal format.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Number of worker loops to run.
    #[arg(long)]
    pub workers: Option<usize>,
}
