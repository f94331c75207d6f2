//! Batch processing of a URL table
//!
//! Loads the input CSV, optionally narrows it to a reproducible random
//! sample, runs the page extractor once per row that has a URL, and writes
//! the table back out with the `results` column filled in.
//!
//! Rows are handled strictly one after another. A pause is taken between
//! successive requests (not after the last one, and never for skipped rows).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{AppConfig, RunPayload};
use crate::extractor::{ExtractionOutcome, PageExtractor, RetryPolicy};
use crate::logger::RunLogger;
use crate::table::{self, Table, TableError};

/// Seed for sample selection, fixed so repeated runs pick the same rows
pub const SAMPLE_SEED: u64 = 42;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Input table {} is empty, nothing to process", .path.display())]
    EmptyInput { path: PathBuf },

    #[error("Cannot take a sample of {requested} rows from a table of {available}")]
    SampleTooLarge { requested: usize, available: usize },

    #[error("Failed to load input table: {0}")]
    Load(#[source] TableError),

    #[error("Error saving to {}: {source}", .path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: TableError,
    },
}

/// How one URL ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Text,
    Failure,
    Absent,
}

impl From<&ExtractionOutcome> for OutcomeKind {
    fn from(outcome: &ExtractionOutcome) -> Self {
        match outcome {
            ExtractionOutcome::Text(_) => OutcomeKind::Text,
            ExtractionOutcome::Failure(_) => OutcomeKind::Failure,
            ExtractionOutcome::Absent => OutcomeKind::Absent,
        }
    }
}

/// Result of one URL request in a batch
#[derive(Debug, Clone, Serialize)]
pub struct UrlResult {
    /// 1-based row number in the processed table
    pub row: usize,
    pub url: String,
    pub outcome: OutcomeKind,
    /// Extracted text or failure description
    pub value: Option<String>,
    /// Time spent on this URL including retries, in seconds
    pub duration_secs: f64,
}

/// Summary of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Rows in the processed table (after sampling)
    pub total_rows: usize,
    /// Rows that had a URL and were requested
    pub urls_requested: usize,
    pub extracted: usize,
    pub absent: usize,
    pub failed: usize,
    /// Rows without a URL
    pub skipped: usize,
    /// Pauses taken between successive requests
    pub throttle_pauses: usize,
    /// Output table path
    pub output_file: String,
    pub url_results: Vec<UrlResult>,
    pub total_duration_secs: f64,
    pub started_at: String,
    pub completed_at: String,
}

/// Create a new batch summary
pub fn new_batch_summary() -> BatchSummary {
    BatchSummary {
        total_rows: 0,
        urls_requested: 0,
        extracted: 0,
        absent: 0,
        failed: 0,
        skipped: 0,
        throttle_pauses: 0,
        output_file: String::new(),
        url_results: Vec::new(),
        total_duration_secs: 0.0,
        started_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        completed_at: String::new(),
    }
}

/// Finalize a batch summary with end time and derived counts
pub fn finalize_batch_summary(summary: &mut BatchSummary) {
    summary.completed_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    summary.urls_requested = summary.url_results.len();
    summary.extracted = count_kind(summary, OutcomeKind::Text);
    summary.absent = count_kind(summary, OutcomeKind::Absent);
    summary.failed = count_kind(summary, OutcomeKind::Failure);
    summary.skipped = summary.total_rows.saturating_sub(summary.urls_requested);
}

fn count_kind(summary: &BatchSummary, kind: OutcomeKind) -> usize {
    summary.url_results.iter().filter(|r| r.outcome == kind).count()
}

/// Export batch summary to JSON file
pub fn export_batch_summary(summary: &BatchSummary, output_path: &Path) -> io::Result<()> {
    let json = serde_json::to_string_pretty(summary)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output_path, json)
}

/// Indices of a reproducible random subset of `len` rows, in draw order
pub fn sample_indices(len: usize, sample_size: usize, seed: u64) -> Result<Vec<usize>, BatchError> {
    if sample_size > len {
        return Err(BatchError::SampleTooLarge {
            requested: sample_size,
            available: len,
        });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(rand::seq::index::sample(&mut rng, len, sample_size).into_vec())
}

/// Pacing and reporting settings for a batch
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub retry: RetryPolicy,
    pub throttle_delay: Duration,
    pub summary_json: Option<PathBuf>,
}

impl From<&AppConfig> for BatchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            retry: config.retry.policy(),
            throttle_delay: config.retry.throttle_delay(),
            summary_json: config.report.summary_json.as_ref().map(PathBuf::from),
        }
    }
}

/// Drives the extractor over every row of a table
pub struct BatchProcessor {
    extractor: PageExtractor,
    settings: BatchSettings,
    logger: RunLogger,
}

impl BatchProcessor {
    pub fn new(extractor: PageExtractor, settings: BatchSettings, logger: RunLogger) -> Self {
        Self {
            extractor,
            settings,
            logger,
        }
    }

    /// Load, (optionally) sample, enrich and write the table named by `payload`
    pub async fn process(&self, payload: &RunPayload) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();
        let mut summary = new_batch_summary();

        let mut table = self.load(payload)?;
        table.clear_results();

        let total_rows = table.len();
        let total_requests = table.url_count();
        summary.total_rows = total_rows;
        self.logger.record_rows_total(total_rows);
        debug!("{} of {} rows have a URL", total_requests, total_rows);

        self.logger.start_progress(total_requests as u64).await;

        let mut requests_made = 0;
        for index in 0..total_rows {
            self.logger.log_row_start(index + 1, total_rows);

            let Some(url) = table.url_of(&table.rows[index]).map(str::to_string) else {
                self.logger.log_row_skipped(index + 1);
                continue;
            };

            self.logger.update_progress(&url).await;
            let url_started = Instant::now();
            let outcome = self.extractor.extract(&url, &self.settings.retry).await;

            self.logger.record_outcome(outcome.is_text(), outcome.is_absent());
            let kind = OutcomeKind::from(&outcome);
            let value = outcome.into_cell();
            summary.url_results.push(UrlResult {
                row: index + 1,
                url,
                outcome: kind,
                value: value.clone(),
                duration_secs: url_started.elapsed().as_secs_f64(),
            });
            table.rows[index].result = value;

            requests_made += 1;
            self.logger.advance_progress(1).await;

            if requests_made < total_requests {
                summary.throttle_pauses += 1;
                tokio::time::sleep(self.settings.throttle_delay).await;
            }
        }

        self.logger
            .finish_progress(&format!("Processed {} URLs from {} rows", requests_made, total_rows))
            .await;

        table::write_table(&table, &payload.output_csv_filename).map_err(|source| {
            BatchError::Save {
                path: payload.output_csv_filename.clone(),
                source,
            }
        })?;
        let output = payload.output_csv_filename.display().to_string();
        self.logger.log_export_success(&output);

        summary.output_file = output;
        summary.total_duration_secs = started.elapsed().as_secs_f64();
        finalize_batch_summary(&mut summary);

        if let Some(path) = &self.settings.summary_json {
            match export_batch_summary(&summary, path) {
                Ok(()) => self.logger.info(&format!("Batch summary saved to {}", path.display())),
                Err(e) => self.logger.warn(&format!(
                    "Failed to write batch summary to {}: {}",
                    path.display(),
                    e
                )),
            }
        }

        Ok(summary)
    }

    fn load(&self, payload: &RunPayload) -> Result<Table, BatchError> {
        let path = &payload.csv_filename;
        let shown = path.display().to_string();

        let table = match table::load_table(path) {
            Ok(table) => table,
            Err(TableError::NotFound(_)) => {
                self.logger.warn(&format!("'{}' not found.", shown));
                Table::default()
            }
            Err(e) => return Err(BatchError::Load(e)),
        };

        if table.is_empty() {
            return Err(BatchError::EmptyInput { path: path.clone() });
        }

        let overwide = table.overwide_rows();
        if overwide > 0 {
            self.logger.warn(&format!(
                "{} row(s) in {} have more cells than the header; extra cells are dropped from the output.",
                overwide, shown
            ));
        }

        if !payload.random_sample {
            self.logger.log_table_loaded(&shown, table.len());
            return Ok(table);
        }

        let indices = sample_indices(table.len(), payload.sample_size, SAMPLE_SEED)?;
        let sampled = table.select(&indices);
        if sampled.is_empty() {
            return Err(BatchError::EmptyInput { path: path.clone() });
        }
        self.logger.log_sample_selected(&shown, payload.sample_size);
        Ok(sampled)
    }
}
