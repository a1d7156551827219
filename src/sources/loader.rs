//! Playlist acquisition from a local path or a remote URL
//!
//! This is the only place where playlist text enters the program. Failing to
//! obtain it is fatal for the run and reported as [`AppError::Acquisition`],
//! distinct from any per-stream probe failure.

use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::path::Path;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::errors::{AppError, AppResult};
use crate::sources::m3u::has_m3u_header;
use crate::utils::UrlUtils;

/// Raw playlist text plus the advisory header flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPlaylist {
    pub source: String,
    pub content: String,
    /// Whether the text starts with `#EXTM3U`; a missing header is only a warning
    pub has_header: bool,
}

impl LoadedPlaylist {
    fn new(source: &str, content: String) -> Self {
        let has_header = has_m3u_header(&content);
        if !has_header {
            warn!(
                "{} does not start with #EXTM3U and may not be a valid playlist, continuing anyway",
                UrlUtils::obfuscate_credentials(source)
            );
        }
        Self {
            source: source.to_string(),
            content,
            has_header,
        }
    }
}

pub struct PlaylistLoader {
    client: Client,
    config: SourceConfig,
}

impl PlaylistLoader {
    pub fn new(config: SourceConfig, user_agent: &str, accept_invalid_certs: bool) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| AppError::configuration(format!("Invalid user agent: {e}")))?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Load playlist text from `source`, a URL or a filesystem path
    pub async fn load(&self, source: &str) -> AppResult<LoadedPlaylist> {
        let source = source.trim();
        if UrlUtils::is_remote(source) {
            self.fetch_remote(source).await
        } else {
            Self::read_local(Path::new(source)).await
        }
    }

    async fn fetch_remote(&self, url: &str) -> AppResult<LoadedPlaylist> {
        let display_url = UrlUtils::obfuscate_credentials(url);
        info!("Downloading playlist from {display_url}");

        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.fetch_once(url).await {
                Ok(content) => {
                    debug!("Downloaded {} bytes from {display_url}", content.len());
                    return Ok(LoadedPlaylist::new(url, content));
                }
                Err(e) => {
                    last_error = UrlUtils::obfuscate_credentials(&e);
                    if attempt < attempts {
                        warn!(
                            "Download failed, retrying ({attempt}/{attempts}): {last_error}"
                        );
                        sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(AppError::acquisition(display_url, last_error))
    }

    async fn fetch_once(&self, url: &str) -> Result<String, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn read_local(path: &Path) -> AppResult<LoadedPlaylist> {
        let source = path.display().to_string();
        info!("Reading playlist from {source}");
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::acquisition(&source, e.to_string()))?;
        Ok(LoadedPlaylist::new(
            &source,
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    }
}
