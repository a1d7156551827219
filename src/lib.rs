//! IPTV playlist checker
//!
//! Parses M3U playlists, probes every stream with a bounded pool of
//! concurrent workers and partitions the results into working and failing
//! playlists per address family.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod sources;
pub mod streaming;
pub mod utils;

pub use config::Config;
pub use errors::{AppError, AppResult};
