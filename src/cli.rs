use clap::Parser;
use std::path::PathBuf;

use crate::config::{AppConfig, CONFIG_PATH};
use crate::logger::{RunLogger, VerbosityLevel};

#[derive(Parser, Debug)]
#[command(name = "resultscraper")]
#[command(about = "Fetch every URL in a CSV file and append the scraped result counter as a new column")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = CONFIG_PATH)]
    pub config: PathBuf,

    /// Write the default configuration file to --config and exit
    #[arg(long)]
    pub init: bool,

    /// Input CSV file (overrides payload.csv_filename)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output CSV file (overrides payload.output_csv_filename)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Process a reproducible random sample of N rows (overrides payload.random_sample/sample_size)
    #[arg(long, value_name = "N")]
    pub sample: Option<usize>,

    /// Verbose logging (use -v for per-row progress, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Export execution logs to a file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

impl Cli {
    /// Apply command-line overrides to the loaded payload
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.payload.csv_filename = Some(input.clone());
        }
        if let Some(output) = &self.output {
            config.payload.output_csv_filename = Some(output.clone());
        }
        if let Some(size) = self.sample {
            config.payload.random_sample = Some(true);
            config.payload.sample_size = Some(size);
        }
    }

    pub fn build_logger(&self) -> RunLogger {
        let verbosity = VerbosityLevel::from_verbose_count(self.verbose);
        match &self.log_file {
            Some(path) => RunLogger::with_log_file(verbosity, path.clone()),
            None => RunLogger::new(verbosity),
        }
    }
}
