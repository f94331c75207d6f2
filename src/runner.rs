//! Top-level run invocation
//!
//! Resolves the payload, wires the extractor and batch processor to the
//! logger it is given, and reports every failure through that logger rather
//! than returning an error.

use crate::batch::{BatchError, BatchProcessor, BatchSettings, BatchSummary};
use crate::config::AppConfig;
use crate::extractor::{ClientSettings, PageExtractor};
use crate::logger::RunLogger;

/// Final verdict of a run
#[derive(Debug)]
pub enum RunStatus {
    Completed(BatchSummary),
    /// The run stopped early; the message was already reported
    Failed(String),
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed(_))
    }
}

/// Execute one batch run described by `config`
pub async fn run(config: &AppConfig, logger: RunLogger) -> RunStatus {
    let status = execute(config, &logger).await;

    match &status {
        RunStatus::Completed(_) => logger.print_final_summary(),
        RunStatus::Failed(message) => logger.error(message),
    }

    if logger.is_log_export_enabled() {
        if let Err(e) = logger.export_logs() {
            logger.warn(&format!("Failed to export logs: {}", e));
        }
    }

    status
}

async fn execute(config: &AppConfig, logger: &RunLogger) -> RunStatus {
    // Payload problems stop the run before any request is made
    let payload = match config.payload.resolve() {
        Ok(payload) => payload,
        Err(e) => return RunStatus::Failed(e.to_string()),
    };

    let extractor = match PageExtractor::new(&ClientSettings::from(&config.http), logger.clone()) {
        Ok(extractor) => extractor,
        Err(e) => return RunStatus::Failed(format!("An unexpected error occurred: {}", e)),
    };

    let processor = BatchProcessor::new(extractor, BatchSettings::from(config), logger.clone());

    match processor.process(&payload).await {
        Ok(summary) => RunStatus::Completed(summary),
        Err(e @ BatchError::EmptyInput { .. }) => {
            RunStatus::Failed(format!("{}; no output written.", e))
        }
        Err(e @ BatchError::Save { .. }) => RunStatus::Failed(e.to_string()),
        Err(e) => RunStatus::Failed(format!("An unexpected error occurred: {}", e)),
    }
}
