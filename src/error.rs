//! Defines the custom error types for the serp-leads application.

use std::io;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// The primary error type for the lead-scraping process.
#[derive(Error, Debug)]
pub(crate) enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a URL.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// Error reading or writing CSV output.
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// A page fetch against the SERP proxy failed.
    #[error("Fetch Error: {0}")]
    Fetch(#[from] FetchError),

    /// Indicates insufficient input data to proceed (e.g., missing profession/state/city).
    #[error("Insufficient Input Data: {0}")]
    InsufficientInput(String),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Failure modes of a single outbound call to the SERP proxy.
///
/// The fetcher classifies but never retries; retry policy belongs to the
/// orchestrator.
#[derive(Error, Debug)]
pub(crate) enum FetchError {
    /// No response within the configured request timeout.
    #[error("request timed out")]
    Timeout,

    /// The proxy answered with a non-success status.
    #[error("proxy rejected request with status {status}")]
    RemoteRejected {
        /// The HTTP status code returned by the proxy.
        status: u16,
    },

    /// Network-level failure before any response arrived.
    #[error("no response from proxy: {0}")]
    NoResponse(String),

    /// Anything that doesn't fit the categories above.
    #[error("unexpected fetch error: {0}")]
    Unknown(String),
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;
