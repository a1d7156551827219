use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use crate::errors::{AppError, AppResult};
use crate::models::AddressPreference;
use crate::streaming::SignatureAnchor;
use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub checker: CheckerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub epg: EpgConfig,
}

/// Batch orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Maximum number of probes in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Render output partitions in playlist order instead of completion order
    #[serde(default = "default_stable_order")]
    pub stable_order: bool,
    /// Emit a progress log event every N completed probes
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Per-stream probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Number of leading body bytes requested and inspected
    #[serde(default = "default_range_bytes")]
    pub range_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
    /// Content-type substrings accepted when no byte signature matched
    #[serde(default = "default_media_content_types")]
    pub media_content_types: Vec<String>,
    /// Custom signature table; empty selects the built-in one
    #[serde(default)]
    pub signatures: Vec<SignatureConfig>,
}

/// One configurable media byte signature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureConfig {
    pub name: String,
    /// Pattern as hex, spaces allowed ("47 40")
    pub pattern_hex: String,
    #[serde(default)]
    pub anchor: SignatureAnchor,
}

/// Playlist acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
    #[serde(default = "default_source_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_source_retry_delay", with = "duration_serde::duration")]
    pub retry_delay: Duration,
}

/// Local network capability detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub address_preference: AddressPreference,
    #[serde(default = "default_network_probe_timeout", with = "duration_serde::duration")]
    pub probe_timeout: Duration,
    #[serde(default = "default_ipv4_probe_target")]
    pub ipv4_target: String,
    #[serde(default = "default_ipv6_probe_target")]
    pub ipv6_target: String,
}

/// Where EPG channel data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EpgMode {
    #[default]
    Disabled,
    /// Download from the configured URLs, falling back to the cache
    Remote,
    /// Only read the local cache
    Cache,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgConfig {
    #[serde(default)]
    pub mode: EpgMode,
    #[serde(default = "default_epg_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_epg_cache_file")]
    pub cache_file: PathBuf,
    #[serde(default = "default_epg_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
}

// Checker defaults
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_stable_order() -> bool {
    DEFAULT_STABLE_ORDER
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

// Probe defaults
fn default_probe_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS)
}

fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

fn default_range_bytes() -> usize {
    DEFAULT_RANGE_BYTES
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_accept_invalid_certs() -> bool {
    DEFAULT_ACCEPT_INVALID_CERTS
}

fn default_media_content_types() -> Vec<String> {
    crate::streaming::DEFAULT_MEDIA_CONTENT_TYPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// Source defaults
fn default_source_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS)
}

fn default_source_max_retries() -> u32 {
    DEFAULT_SOURCE_MAX_RETRIES
}

fn default_source_retry_delay() -> Duration {
    Duration::from_secs(DEFAULT_SOURCE_RETRY_DELAY_SECS)
}

// Network defaults
fn default_network_probe_timeout() -> Duration {
    Duration::from_secs(DEFAULT_NETWORK_PROBE_TIMEOUT_SECS)
}

fn default_ipv4_probe_target() -> String {
    DEFAULT_IPV4_PROBE_TARGET.to_string()
}

fn default_ipv6_probe_target() -> String {
    DEFAULT_IPV6_PROBE_TARGET.to_string()
}

// EPG defaults
fn default_epg_urls() -> Vec<String> {
    DEFAULT_EPG_URLS.iter().map(|s| s.to_string()).collect()
}

fn default_epg_cache_file() -> PathBuf {
    PathBuf::from(DEFAULT_EPG_CACHE_FILE)
}

fn default_epg_timeout() -> Duration {
    Duration::from_secs(DEFAULT_EPG_TIMEOUT_SECS)
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            stable_order: default_stable_order(),
            progress_interval: default_progress_interval(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: default_probe_timeout(),
            max_redirects: default_max_redirects(),
            range_bytes: default_range_bytes(),
            user_agent: default_user_agent(),
            accept_invalid_certs: default_accept_invalid_certs(),
            media_content_types: default_media_content_types(),
            signatures: Vec::new(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            timeout: default_source_timeout(),
            max_retries: default_source_max_retries(),
            retry_delay: default_source_retry_delay(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address_preference: AddressPreference::default(),
            probe_timeout: default_network_probe_timeout(),
            ipv4_target: default_ipv4_probe_target(),
            ipv6_target: default_ipv6_probe_target(),
        }
    }
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            mode: EpgMode::default(),
            urls: default_epg_urls(),
            cache_file: default_epg_cache_file(),
            timeout: default_epg_timeout(),
        }
    }
}

impl Config {
    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_from_file(config_file: impl AsRef<Path>) -> Result<Self> {
        let path = config_file.as_ref();
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            info!("Configuration loaded from: {}", path.display());
            config
        } else {
            info!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the checker cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.checker.concurrency == 0 {
            return Err(AppError::configuration("checker.concurrency must be at least 1"));
        }
        if self.probe.range_bytes == 0 {
            return Err(AppError::configuration("probe.range_bytes must be at least 1"));
        }
        if self.probe.timeout.is_zero() {
            return Err(AppError::configuration("probe.timeout must be greater than zero"));
        }
        if self.source.max_retries == 0 {
            return Err(AppError::configuration("source.max_retries must be at least 1"));
        }
        Ok(())
    }

    /// Render the configuration as TOML (used by `--print-config`)
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
