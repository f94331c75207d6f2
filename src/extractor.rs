//! Single-page fetch and value extraction
//!
//! One URL goes in, one [`ExtractionOutcome`] comes out. Transient failures
//! (HTTP 403 and timeouts) are retried within a [`RetryPolicy`]; everything
//! else is reported on the first attempt. A page that loads but carries
//! neither target element yields [`ExtractionOutcome::Absent`], which is not
//! an error.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::config::HttpConfig;
use crate::logger::RunLogger;

/// Primary target: `<span id="sidebar-title">`
pub const PRIMARY_SELECTOR: &str = "span#sidebar-title";
/// Fallback target: `<span qaselector="sidebar-result-counter">`
pub const FALLBACK_SELECTOR: &str = r#"span[qaselector="sidebar-result-counter"]"#;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Invalid value for header '{header}': {source}")]
    InvalidHeader {
        header: &'static str,
        #[source]
        source: reqwest::header::InvalidHeaderValue,
    },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// How many times, and how far apart, a transient failure is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts allowed after the first
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Result of extracting from one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// The target element was found and had text
    Text(String),
    /// The request failed; human-readable reason
    Failure(String),
    /// The page loaded but the target element was not there
    Absent,
}

impl ExtractionOutcome {
    /// Value stored in the `results` column
    pub fn into_cell(self) -> Option<String> {
        match self {
            ExtractionOutcome::Text(text) => Some(text),
            ExtractionOutcome::Failure(reason) => Some(reason),
            ExtractionOutcome::Absent => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ExtractionOutcome::Text(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ExtractionOutcome::Absent)
    }
}

/// Why a retry wait was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    Forbidden,
    Timeout,
}

impl fmt::Display for RetryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryCause::Forbidden => write!(f, "HTTP 403 Forbidden"),
            RetryCause::Timeout => write!(f, "request timeout"),
        }
    }
}

/// What a single HTTP attempt produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// Non-error status; the response body
    Page(String),
    /// 4xx or 5xx status code
    Status(u16),
    Timeout,
    /// Connection, DNS, TLS, malformed URL and similar
    Transport(String),
}

/// States of the per-URL retry loop. `attempt` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Attempting { attempt: u32 },
    RetryWait { attempt: u32, cause: RetryCause },
    Succeeded(ExtractionOutcome),
    FailedTerminal(String),
}

/// Message used when the retry budget runs out from a wait state
pub fn exhausted_message(policy: &RetryPolicy) -> String {
    format!(
        "Failed after {} attempts (last error was likely 403 or Timeout)",
        policy.max_attempts()
    )
}

/// Next state after attempt number `attempt` produced `fetched`
pub fn after_attempt(attempt: u32, fetched: FetchResult, policy: &RetryPolicy) -> AttemptState {
    let attempts_remain = attempt < policy.max_retries;

    match fetched {
        FetchResult::Page(body) => match extract_from_html(&body) {
            Ok(Some(text)) => AttemptState::Succeeded(ExtractionOutcome::Text(text)),
            Ok(None) => AttemptState::Succeeded(ExtractionOutcome::Absent),
            Err(e) => AttemptState::FailedTerminal(format!("Unexpected Error: {}", e)),
        },
        FetchResult::Status(403) if attempts_remain => AttemptState::RetryWait {
            attempt,
            cause: RetryCause::Forbidden,
        },
        FetchResult::Status(code) => {
            AttemptState::FailedTerminal(format!("HTTP Error: {} (Attempt {})", code, attempt + 1))
        }
        FetchResult::Timeout if attempts_remain => AttemptState::RetryWait {
            attempt,
            cause: RetryCause::Timeout,
        },
        FetchResult::Timeout => AttemptState::FailedTerminal("Request Timeout".to_string()),
        FetchResult::Transport(details) => {
            AttemptState::FailedTerminal(format!("Request Exception: {}", details))
        }
    }
}

/// Next state when leaving a retry wait that followed attempt `attempt`
pub fn after_wait(attempt: u32, policy: &RetryPolicy) -> AttemptState {
    let next = attempt + 1;
    if next > policy.max_retries {
        AttemptState::FailedTerminal(exhausted_message(policy))
    } else {
        AttemptState::Attempting { attempt: next }
    }
}

/// Pull the target value out of an HTML document.
///
/// The fallback is only consulted when the primary element does not exist;
/// a primary element with no text yields `Ok(None)`.
pub fn extract_from_html(html: &str) -> Result<Option<String>, String> {
    let primary = parse_selector(PRIMARY_SELECTOR)?;
    let fallback = parse_selector(FALLBACK_SELECTOR)?;
    let document = Html::parse_document(html);

    let element = document
        .select(&primary)
        .next()
        .or_else(|| document.select(&fallback).next());

    Ok(element.map(normalized_text).filter(|text| !text.is_empty()))
}

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("invalid selector '{}': {:?}", selector, e))
}

/// Descendant text nodes, each trimmed, empty ones dropped, joined directly
fn normalized_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Flatten an error and its sources into one line
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// HTTP client settings for the extractor
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout: Duration,
}

impl From<&HttpConfig> for ClientSettings {
    fn from(config: &HttpConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            timeout: config.request_timeout(),
        }
    }
}

/// Fetches pages with a fixed header set and extracts the target value
pub struct PageExtractor {
    client: reqwest::Client,
    logger: RunLogger,
}

impl PageExtractor {
    pub fn new(settings: &ClientSettings, logger: RunLogger) -> Result<Self, ExtractorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent).map_err(|source| {
                ExtractorError::InvalidHeader { header: "User-Agent", source }
            })?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&settings.accept_language).map_err(|source| {
                ExtractorError::InvalidHeader { header: "Accept-Language", source }
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;

        Ok(Self { client, logger })
    }

    /// Fetch `url` and extract its value, retrying 403s and timeouts
    pub async fn extract(&self, url: &str, policy: &RetryPolicy) -> ExtractionOutcome {
        let mut state = AttemptState::Attempting { attempt: 0 };

        loop {
            state = match state {
                AttemptState::Attempting { attempt } => {
                    self.logger.log_attempt(url, attempt + 1, policy.max_attempts());
                    let fetched = self.fetch_once(url).await;
                    self.report_fetch(url, attempt, &fetched);
                    after_attempt(attempt, fetched, policy)
                }
                AttemptState::RetryWait { attempt, cause } => {
                    let next = after_wait(attempt, policy);
                    if matches!(next, AttemptState::Attempting { .. }) {
                        self.logger.info(&format!(
                            "Received {}. Waiting {:.1} seconds before retrying (Attempt {} failed)...",
                            cause,
                            policy.retry_delay.as_secs_f64(),
                            attempt + 1
                        ));
                        tokio::time::sleep(policy.retry_delay).await;
                    } else {
                        // Not reached while after_attempt only waits with attempts left
                        self.logger.warn(&format!(
                            "Retry budget exhausted for {}; last failure was {}",
                            url, cause
                        ));
                    }
                    next
                }
                AttemptState::Succeeded(outcome) => {
                    match &outcome {
                        ExtractionOutcome::Text(text) => {
                            self.logger.info(&format!("Successfully extracted: {}", text))
                        }
                        _ => self.logger.warn(&format!(
                            "Could not extract data for {} (element not found).",
                            url
                        )),
                    }
                    return outcome;
                }
                AttemptState::FailedTerminal(reason) => {
                    return ExtractionOutcome::Failure(reason);
                }
            };
        }
    }

    async fn fetch_once(&self, url: &str) -> FetchResult {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return FetchResult::Timeout,
            Err(e) => return FetchResult::Transport(error_chain(&e)),
        };

        let status = response.status();
        debug!("GET {} -> {}", url, status);
        if status.is_client_error() || status.is_server_error() {
            return FetchResult::Status(status.as_u16());
        }

        match response.text().await {
            Ok(body) => FetchResult::Page(body),
            Err(e) if e.is_timeout() => FetchResult::Timeout,
            Err(e) => FetchResult::Transport(error_chain(&e)),
        }
    }

    fn report_fetch(&self, url: &str, attempt: u32, fetched: &FetchResult) {
        match fetched {
            FetchResult::Page(body) => {
                self.logger.debug(&format!("Fetched {} bytes from {}", body.len(), url))
            }
            FetchResult::Status(code) => self.logger.error(&format!(
                "HTTP Error for {}: {} - Status: {} (Attempt {})",
                url,
                reqwest::StatusCode::from_u16(*code)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown"),
                code,
                attempt + 1
            )),
            FetchResult::Timeout => self.logger.error(&format!(
                "Request Timeout for {} (Attempt {}).",
                url,
                attempt + 1
            )),
            FetchResult::Transport(details) => self.logger.error(&format!(
                "Request Exception for {}: {}",
                url, details
            )),
        }
    }
}
