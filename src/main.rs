//! revq — asynchronous AI pull-request review orchestrator.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use revq::analyzer::rig::RigAnalyzer;
use revq::cache::MemoryCache;
use revq::config::Config;
use revq::constants;
use revq::dispatcher::{DispatchError, Dispatcher, SubmitOutcome};
use revq::env::Env;
use revq::executor::{Executor, ExecutorConfig};
use revq::host::GithubHost;
use revq::limiter::SlidingWindowLimiter;
use revq::models::{ReviewReport, ReviewRequest, Severity};
use revq::queue::{MemoryQueue, TaskQueue};
use revq::status::{ResultQuery, StatusApi};
use revq::store::MemoryStore;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::args::{Cli, Command, ReviewArgs};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("warn")
        }))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Review(args) => run_review(*args).await,
        Command::Version => run_version(),
    }
}

fn run_version() -> Result<()> {
    println!("{} {}", "revq".bold(), constants::VERSION.green().bold());
    Ok(())
}

async fn run_review(args: ReviewArgs) -> Result<()> {
    let cwd = std::env::current_dir().ok();
    let config = Config::load(cwd.as_deref(), &Env::real())
        .context("failed to load configuration")?;

    // Assemble the pipeline: limiter and cache gate intake, the store
    // tracks lifecycle, the queue feeds the worker pool.
    let limiter = Arc::new(SlidingWindowLimiter::new(
        config.admission.rate_limit,
        config.admission.rate_window(),
    ));
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let host = Arc::new(GithubHost::new());
    let analyzer = Arc::new(
        RigAnalyzer::new(config.analyzer.clone()).map_err(|e| anyhow::anyhow!("{e}"))?,
    );

    let dispatcher = Dispatcher::new(
        limiter,
        cache.clone(),
        store.clone(),
        queue.clone(),
        host.clone(),
    );
    let executor_config: ExecutorConfig = config
        .retry
        .executor_config(config.admission.cache_ttl());
    let executor = Arc::new(Executor::new(
        store.clone(),
        queue.clone(),
        cache,
        host,
        analyzer,
        executor_config,
    ));

    let token = args.token.or(config.host.github_token);
    let mut request = ReviewRequest::new(&args.repo, args.pr);
    if let Some(token) = token {
        request = request.with_credential(token);
    }

    let outcome = dispatcher
        .submit(request, &args.client, args.force)
        .await
        .map_err(|e| match e {
            DispatchError::Validation(v) => anyhow::anyhow!("invalid request: {v}"),
            other => anyhow::anyhow!("{other}"),
        })?;

    let handle = match outcome {
        SubmitOutcome::Cached(report) => {
            eprintln!("{}", "Serving cached review result.".dimmed());
            render_report(&report, args.json)?;
            return Ok(());
        }
        SubmitOutcome::Denied { retry_after } => {
            bail!(
                "rate limit exceeded; retry in {} second(s)",
                retry_after.as_secs().max(1)
            );
        }
        SubmitOutcome::Accepted(handle) => handle,
    };

    let workers = args.workers.unwrap_or(config.retry.workers).max(1);
    let mut worker_set = executor.spawn(workers);

    // Poll until the task settles, then shut the workers down.
    let status_api = StatusApi::new(store);
    let report = loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        match status_api.result(handle.task_id).await? {
            ResultQuery::Ready(report) => break report,
            ResultQuery::Failed(error) => {
                queue.close();
                while worker_set.join_next().await.is_some() {}
                bail!("review failed: {error}");
            }
            ResultQuery::NotReady { .. } => {}
        }
    };
    queue.close();
    while worker_set.join_next().await.is_some() {}

    render_report(&report, args.json)
}

fn render_report(report: &ReviewReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.issues.is_empty() {
        println!(
            "  {} {} file(s) reviewed, no issues found",
            "✔".green().bold(),
            report.summary.total_files,
        );
        return Ok(());
    }

    let mut current_file: Option<&str> = None;
    for issue in &report.issues {
        if current_file != Some(issue.file.as_str()) {
            println!("\n{}", issue.file.bold());
            current_file = Some(issue.file.as_str());
        }
        let severity = match issue.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Info => "info".cyan(),
        };
        println!(
            "  {}:{} {} [{}] {}",
            issue.file.dimmed(),
            issue.line,
            severity,
            issue.kind,
            issue.description,
        );
        if let Some(ref suggestion) = issue.suggestion {
            println!("      {} {}", "suggestion:".dimmed(), suggestion);
        }
    }

    let s = &report.summary;
    println!(
        "\n  {} file(s), {} issue(s): {} error(s), {} warning(s), {} info",
        s.total_files,
        s.total_issues,
        s.critical_issues.to_string().red(),
        s.warnings.to_string().yellow(),
        s.info,
    );

    Ok(())
}
