use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,    // Only errors, progress bar and final summary
    Summary = 1,   // Per-URL progress, outcomes and warnings (default)
    Detailed = 2,  // Per-row progress lines
    Debug = 3,     // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

/// Reporting handle shared by the batch processor and the page extractor.
///
/// One is created per run by the caller and passed down explicitly; cloning
/// shares the same buffer and progress bar.
#[derive(Clone)]
pub struct RunLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    run_metadata: Arc<Mutex<RunMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<String>,
    capture: bool,
}

#[derive(Default, Clone)]
struct RunMetadata {
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    rows_total: usize,
    urls_requested: usize,
    extracted: usize,
    absent: usize,
    failed: usize,
    output_file: String,
}

impl RunLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            run_metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
            capture: false,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: String) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    /// A logger that keeps every message in memory regardless of verbosity
    /// and prints nothing. Used by tests to assert on what was reported.
    pub fn capturing() -> Self {
        Self {
            capture: true,
            ..Self::new(VerbosityLevel::Debug)
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("WARN", message);
        }
    }

    /// Info-level line only shown with `-v`
    pub fn detail(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("INFO", message);
        }
    }

    pub fn error(&self, message: &str) {
        // Errors are never filtered by verbosity
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let timestamp = self.get_timestamp();
        let msg = format!("[{}] {}: {}", timestamp, level, message);

        if self.log_file_path.is_some() || self.capture {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        if self.capture {
            return;
        }

        // Route through the progress bar so its line is not clobbered
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    fn get_timestamp(&self) -> String {
        Local::now().format("%H:%M:%S%.3f").to_string()
    }

    pub async fn start_progress(&self, total_steps: u64) {
        let pb = if self.capture {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total_steps)
        };
        pb.set_length(total_steps);

        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting...");

        let mut progress_guard = self.progress_bar.write().await;
        *progress_guard = Some(pb);

        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.start_time = Some(SystemTime::now());
        }
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        let mut progress_guard = self.progress_bar.write().await;
        if let Some(pb) = progress_guard.take() {
            pb.finish_and_clear();
        }
        drop(progress_guard);

        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.end_time = Some(SystemTime::now());
        }

        self.info(final_message);
    }

    pub fn record_rows_total(&self, count: usize) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.rows_total = count;
        }
    }

    pub fn record_outcome(&self, extracted: bool, absent: bool) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.urls_requested += 1;
            if extracted {
                metadata.extracted += 1;
            } else if absent {
                metadata.absent += 1;
            } else {
                metadata.failed += 1;
            }
        }
    }

    pub fn record_output_file(&self, path: &str) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.output_file = path.to_string();
        }
    }

    pub fn print_final_summary(&self) {
        if self.capture {
            return;
        }
        let Ok(metadata) = self.run_metadata.lock() else {
            return;
        };

        println!("\n=== RUN SUMMARY ===");

        if let (Some(start), Some(end)) = (metadata.start_time, metadata.end_time) {
            let duration = end.duration_since(start).unwrap_or_default();
            println!("Run Duration: {:.2}s", duration.as_secs_f64());
        }

        println!("Rows: {}", metadata.rows_total);
        println!("URLs Requested: {}", metadata.urls_requested);
        println!("Values Extracted: {}", metadata.extracted);
        println!("Element Not Found: {}", metadata.absent);
        println!("Failed Requests: {}", metadata.failed);

        if !metadata.output_file.is_empty() {
            println!("Results Written: {}", metadata.output_file);
        }

        println!("===================\n");
        let _ = io::stdout().flush();
    }

    // Phase-specific messages

    pub fn log_table_loaded(&self, path: &str, rows: usize) {
        self.info(&format!("Successfully loaded {} rows from {}", rows, path));
    }

    pub fn log_sample_selected(&self, path: &str, sample_size: usize) {
        self.info(&format!(
            "Successfully loaded data from {}. Random sample of {} selected.",
            path, sample_size
        ));
    }

    pub fn log_row_start(&self, row: usize, total: usize) {
        self.detail(&format!("Processing row {} of {}:", row, total));
    }

    pub fn log_row_skipped(&self, row: usize) {
        self.info(&format!("Skipped empty or invalid url for row {}.", row));
    }

    pub fn log_attempt(&self, url: &str, attempt: u32, max_attempts: u32) {
        self.info(&format!(
            "Processing URL: {} (Attempt: {} of {})",
            url, attempt, max_attempts
        ));
    }

    pub fn log_export_success(&self, path: &str) {
        self.record_output_file(path);
        self.info(&format!("Updated data saved to {}", path));
    }

    /// Export all collected logs to the configured file
    pub fn export_logs(&self) -> io::Result<()> {
        let Some(ref log_file_path) = self.log_file_path else {
            return Ok(());
        };
        let Ok(buffer) = self.log_buffer.lock() else {
            return Ok(());
        };

        if let Some(parent) = Path::new(log_file_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)?;

        for log_entry in buffer.iter() {
            writeln!(file, "{}", log_entry)?;
        }

        file.flush()
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    /// Messages kept so far (only populated with a log file or in capture mode)
    pub fn messages(&self) -> Vec<String> {
        self.log_buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|buffer| buffer.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_count() {
        assert_eq!(VerbosityLevel::from_verbose_count(0), VerbosityLevel::Summary);
        assert_eq!(VerbosityLevel::from_verbose_count(1), VerbosityLevel::Detailed);
        assert_eq!(VerbosityLevel::from_verbose_count(5), VerbosityLevel::Debug);
    }

    #[test]
    fn test_capturing_logger_keeps_every_level() {
        let logger = RunLogger::capturing();
        logger.debug("d");
        logger.info("i");
        logger.warn("w");
        logger.error("e");

        let messages = logger.messages();
        assert_eq!(messages.len(), 4);
        assert!(messages[0].ends_with("DEBUG: d"));
        assert!(messages[3].ends_with("ERROR: e"));
    }

    #[test]
    fn test_plain_logger_does_not_buffer() {
        let logger = RunLogger::new(VerbosityLevel::Silent);
        logger.error("not buffered without a log file");
        assert_eq!(logger.get_log_count(), 0);
        assert!(!logger.is_log_export_enabled());
    }

    #[test]
    fn test_export_logs_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let logger = RunLogger::with_log_file(VerbosityLevel::Silent, path.to_string_lossy().to_string());

        // Silent still records errors
        logger.info("filtered");
        logger.error("kept");
        logger.export_logs().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("ERROR: kept"));
    }

    #[test]
    fn test_default_verbosity_keeps_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = RunLogger::with_log_file(
            VerbosityLevel::from_verbose_count(0),
            path.to_string_lossy().to_string(),
        );

        logger.warn("'x.csv' not found.");
        logger.log_row_start(1, 1);
        logger.info("Updated data saved to out.csv");
        logger.export_logs().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("WARN: 'x.csv' not found."));
        assert!(lines[1].ends_with("INFO: Updated data saved to out.csv"));
    }

    #[test]
    fn test_detail_needs_verbose_flag() {
        let quiet = RunLogger::with_log_file(VerbosityLevel::Summary, "unused.log".to_string());
        quiet.detail("row line");
        assert_eq!(quiet.get_log_count(), 0);

        let verbose = RunLogger::with_log_file(VerbosityLevel::Detailed, "unused.log".to_string());
        verbose.detail("row line");
        assert_eq!(verbose.get_log_count(), 1);
    }

    #[test]
    fn test_timestamp_format() {
        let logger = RunLogger::capturing();
        logger.info("x");

        // [HH:MM:SS.mmm] INFO: x
        let line = &logger.messages()[0];
        let stamp = &line[1..line.find(']').unwrap()];
        assert_eq!(stamp.len(), 12);
        assert_eq!(&stamp[2..3], ":");
        assert_eq!(&stamp[5..6], ":");
        assert_eq!(&stamp[8..9], ".");
        assert!(stamp.chars().filter(|c| c.is_ascii_digit()).count() == 9);
    }

    #[tokio::test]
    async fn test_progress_lifecycle() {
        let logger = RunLogger::capturing();
        logger.start_progress(3).await;
        logger.advance_progress(1).await;
        logger.update_progress("row 1").await;
        logger.finish_progress("done").await;

        assert!(logger.messages().last().unwrap().ends_with("INFO: done"));
    }
}
