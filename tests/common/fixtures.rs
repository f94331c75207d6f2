#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use resultscraper::batch::BatchSettings;
use resultscraper::config::RunPayload;
use resultscraper::extractor::{ClientSettings, PageExtractor, RetryPolicy};
use resultscraper::logger::RunLogger;
use resultscraper::BatchProcessor;

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// Writes `content` to `dir/name` and returns the path.
pub fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap_or_else(|e| panic!("Failed to write {}: {}", name, e));
    path
}

/// Reads a CSV file back as header row plus records.
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .unwrap_or_else(|e| panic!("Failed to open {}: {}", path.display(), e));
    let headers = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}

/// Retry policy with no waiting between attempts.
pub fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        retry_delay: Duration::ZERO,
    }
}

pub fn client_settings(timeout: Duration) -> ClientSettings {
    ClientSettings {
        user_agent: "resultscraper-tests".to_string(),
        accept_language: "en-US,en;q=0.9".to_string(),
        timeout,
    }
}

pub fn test_extractor(logger: &RunLogger) -> PageExtractor {
    PageExtractor::new(&client_settings(Duration::from_secs(5)), logger.clone()).unwrap()
}

/// Batch processor with zero retry and throttle delays.
pub fn test_processor(logger: &RunLogger) -> BatchProcessor {
    let settings = BatchSettings {
        retry: fast_policy(2),
        throttle_delay: Duration::ZERO,
        summary_json: None,
    };
    BatchProcessor::new(test_extractor(logger), settings, logger.clone())
}

pub fn payload(input: PathBuf, output: PathBuf) -> RunPayload {
    RunPayload {
        csv_filename: input,
        output_csv_filename: output,
        random_sample: false,
        sample_size: 100,
    }
}
