pub mod batch;
pub mod cli;
pub mod config;
pub mod extractor;
pub mod logger;
pub mod runner;
pub mod table;

pub use batch::{BatchProcessor, BatchSummary};
pub use extractor::{ExtractionOutcome, PageExtractor, RetryPolicy};
pub use runner::RunStatus;
