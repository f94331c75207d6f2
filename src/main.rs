use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use resultscraper::cli::Cli;
use resultscraper::config::AppConfig;
use resultscraper::runner::{self, RunStatus};

// Rows are processed one at a time, so a single-threaded runtime is enough
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if cli.init {
        let path = AppConfig::create_default_config(&cli.config)
            .with_context(|| format!("Failed to create configuration file at {}", cli.config.display()))?;
        eprintln!("Created default configuration at {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = AppConfig::load_from_path(&cli.config).with_context(|| {
        format!(
            "Failed to load configuration (run with --init to create {})",
            cli.config.display()
        )
    })?;
    cli.apply_overrides(&mut config);

    let logger = cli.build_logger();

    match runner::run(&config, logger).await {
        RunStatus::Completed(_) => Ok(ExitCode::SUCCESS),
        RunStatus::Failed(_) => Ok(ExitCode::FAILURE),
    }
}
