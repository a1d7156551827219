//! Error type definitions for the IPTV checker
//!
//! Run-level errors use `thiserror` for trait implementations and chaining,
//! the same way every other layer of the application reports failures.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// The source playlist could not be read or downloaded at all
    #[error("Failed to acquire playlist from {source_name}: {message}")]
    Acquisition {
        source_name: String,
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Output persistence errors
    #[error("Failed to write {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// EPG retrieval errors
    #[error("EPG error: {0}")]
    Epg(#[from] EpgError),

    /// Serialization errors (summary reports)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Why a single stream probe was classified as failing.
///
/// A probe failure is entry-local: it ends up in the failing partitions and
/// the batch carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProbeFailure {
    #[error("Connection timed out")]
    Timeout,

    #[error("Connection error")]
    ConnectionError,

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Unexpected HTTP status code: {0}")]
    BadStatusCode(u16),

    #[error("Unable to read stream data")]
    UnreadableBody,

    #[error("Unrecognized stream format (Content-Type: {0})")]
    UnrecognizedFormat(String),

    #[error("{0}")]
    Other(String),
}

impl ProbeFailure {
    /// Short machine-friendly label, used in summaries and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeFailure::Timeout => "timeout",
            ProbeFailure::ConnectionError => "connection_error",
            ProbeFailure::TooManyRedirects => "too_many_redirects",
            ProbeFailure::BadStatusCode(_) => "bad_status_code",
            ProbeFailure::UnreadableBody => "unreadable_body",
            ProbeFailure::UnrecognizedFormat(_) => "unrecognized_format",
            ProbeFailure::Other(_) => "other",
        }
    }
}

/// EPG retrieval and cache errors
#[derive(Error, Debug)]
pub enum EpgError {
    /// Every configured EPG source failed and no cache was usable
    #[error("No EPG source available: {message}")]
    Unavailable { message: String },

    /// Parsing errors for EPG documents
    #[error("Parse error: {source_url} - {message}")]
    Parse { source_url: String, message: String },

    /// Cache read/write failures
    #[error("Cache error: {path} - {message}")]
    Cache { path: String, message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create an acquisition error for the given playlist source
    pub fn acquisition<S: Into<String>, M: Into<String>>(source_name: S, message: M) -> Self {
        Self::Acquisition {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an output error for a path
    pub fn output<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error prevented the batch from starting at all
    pub fn is_acquisition(&self) -> bool {
        matches!(self, AppError::Acquisition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_errors_are_distinct_from_other_failures() {
        let err = AppError::acquisition("http://example.com/list.m3u", "connection refused");
        assert!(err.is_acquisition());
        assert!(err.to_string().contains("http://example.com/list.m3u"));

        let err = AppError::configuration("concurrency must be at least 1");
        assert!(!err.is_acquisition());
    }

    #[test]
    fn probe_failure_messages_carry_details() {
        assert_eq!(
            ProbeFailure::BadStatusCode(404).to_string(),
            "Unexpected HTTP status code: 404"
        );
        assert!(
            ProbeFailure::UnrecognizedFormat("text/html".into())
                .to_string()
                .contains("text/html")
        );
        assert_eq!(ProbeFailure::Timeout.kind(), "timeout");
    }
}
