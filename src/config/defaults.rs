/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Checker defaults
pub const DEFAULT_CONCURRENCY: usize = 20;
pub const DEFAULT_STABLE_ORDER: bool = false;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;
pub const DEFAULT_OUTPUT_DIR: &str = "m3u_check_result";

// Probe defaults
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
pub const DEFAULT_RANGE_BYTES: usize = 4096;
pub const DEFAULT_ACCEPT_INVALID_CERTS: bool = true;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

// Playlist source defaults
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SOURCE_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SOURCE_RETRY_DELAY_SECS: u64 = 2;

// Network capability defaults
pub const DEFAULT_NETWORK_PROBE_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_IPV4_PROBE_TARGET: &str = "8.8.8.8:53";
pub const DEFAULT_IPV6_PROBE_TARGET: &str = "[2001:4860:4860::8888]:53";

// EPG defaults
pub const DEFAULT_EPG_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_EPG_CACHE_FILE: &str = "epg_cache.json";
pub const DEFAULT_EPG_URLS: &[&str] = &[
    "https://epg.112114.xyz/pp.xml",
    "https://epg.112114.xyz/e.xml",
    "http://epg.51zmt.top:8000/api/diyp/",
    "http://epg.51zmt.top:8000/e.xml",
];
