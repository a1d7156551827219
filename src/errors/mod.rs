//! Centralized error handling for the IPTV checker
//!
//! Two kinds of failure flow through the checker:
//!
//! - **Run errors** ([`AppError`]): the batch cannot start or its results
//!   cannot be persisted (playlist acquisition, configuration, output I/O).
//! - **Probe failures** ([`ProbeFailure`]): one stream did not answer like a
//!   live media endpoint. These are values carried in a
//!   [`ProbeOutcome`](crate::models::ProbeOutcome) and never abort a batch.
//!
//! # Usage
//!
//! ```rust
//! use iptv_checker::errors::{AppError, AppResult};
//!
//! fn load() -> AppResult<String> {
//!     Err(AppError::acquisition("playlist.m3u", "file not found"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for EPG Results
pub type EpgResult<T> = Result<T, EpgError>;
