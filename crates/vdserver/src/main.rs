//! vdserver - D language analysis broker.
//!
//! Usage:
//!   vdserver                          # Serve requests on stdio
//!   vdserver --workers 4 --task-token TODO --task-token FIXME
//!   vdserver --config vdserver.json
//!
//! Requests and responses are one JSON object per line. Logs go to stderr;
//! set `RUST_LOG` (e.g. `RUST_LOG=vdserver=debug`) to change verbosity.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vdserver::{Broker, BrokerConfig};

/// Serve D language analysis requests on stdio.
#[derive(Parser, Debug)]
#[command(name = "vdserver", author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file; command-line flags override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Query worker threads (default: one per core)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Import indexing threads, separate from the query workers (default: 2)
    #[arg(long, value_name = "THREADS")]
    index_threads: Option<usize>,

    /// Maximum number of modules in the shared parse cache
    #[arg(long, value_name = "MODULES")]
    cache_capacity: Option<usize>,

    /// Comment task token, may be repeated
    #[arg(short = 't', long = "task-token", value_name = "TOKEN")]
    task_tokens: Vec<String>,
}

impl Args {
    fn broker_config(&self) -> Result<BrokerConfig> {
        let mut config = match &self.config {
            Some(path) => BrokerConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => BrokerConfig::default(),
        };
        if let Some(workers) = self.workers {
            config.worker_threads = workers;
        }
        if let Some(threads) = self.index_threads {
            config.index_threads = threads;
        }
        if let Some(capacity) = self.cache_capacity {
            config.shared_cache_capacity = capacity;
        }
        if !self.task_tokens.is_empty() {
            config.comment_tasks.clone_from(&self.task_tokens);
        }
        Ok(config)
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.broker_config()?;
    let broker = Broker::with_d_engine(&config).context("failed to start broker")?;
    tracing::info!("vdserver {}", vdserver::VERSION);

    let result = vdserver::serve_stdio(&broker).context("failed to serve stdio");
    broker.shutdown();
    result.map(|_| ())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr; stdout carries responses
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vdserver=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
