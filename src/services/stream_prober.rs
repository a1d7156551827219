//! Stream Probing Service
//!
//! Issues a ranged GET against a stream URL, reads at most the configured
//! number of leading body bytes and hands them to the content classifier.
//! Every outcome, including transport errors, is folded into a
//! [`ProbeOutcome`]; a probe never fails the batch.

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, redirect};
use std::time::Instant;
use tracing::{debug, trace};

use crate::config::ProbeConfig;
use crate::errors::{AppError, AppResult, ProbeFailure};
use crate::models::ProbeOutcome;
use crate::streaming::{ContentClassifier, SignatureTable};
use crate::utils::UrlUtils;

/// Anything able to decide whether a single URL serves a live stream
#[async_trait]
pub trait StreamProber: Send + Sync {
    /// Probe one URL; failures are reported inside the outcome
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// `Range` header value requesting the first `range_bytes` bytes
pub fn range_header_value(range_bytes: usize) -> String {
    format!("bytes=0-{}", range_bytes.saturating_sub(1))
}

/// Map a transport error onto a probe failure category
pub fn failure_from_reqwest(error: &reqwest::Error) -> ProbeFailure {
    if error.is_timeout() {
        ProbeFailure::Timeout
    } else if error.is_redirect() {
        ProbeFailure::TooManyRedirects
    } else if error.is_connect() {
        ProbeFailure::ConnectionError
    } else {
        ProbeFailure::Other(UrlUtils::obfuscate_credentials(&error.to_string()))
    }
}

/// HTTP prober backed by a shared reqwest client
pub struct HttpStreamProber {
    client: Client,
    classifier: ContentClassifier,
    range_bytes: usize,
}

impl HttpStreamProber {
    /// Build the prober and its HTTP client from probe settings
    pub fn new(config: &ProbeConfig) -> AppResult<Self> {
        let signatures = SignatureTable::from_config(&config.signatures)?;
        let classifier = ContentClassifier::new(signatures, config.media_content_types.clone());

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|e| {
            AppError::configuration(format!("Invalid probe user agent: {e}"))
        })?;
        headers.insert(header::USER_AGENT, user_agent);

        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .default_headers(headers)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self::with_client(client, classifier, config.range_bytes))
    }

    /// Use an existing client and classifier
    pub fn with_client(client: Client, classifier: ContentClassifier, range_bytes: usize) -> Self {
        Self {
            client,
            classifier,
            range_bytes,
        }
    }

    async fn probe_inner(&self, url: &str) -> Result<ProbeOutcome, ProbeFailure> {
        let started = Instant::now();
        let mut response = self
            .client
            .get(url)
            .header(header::RANGE, range_header_value(self.range_bytes))
            .send()
            .await
            .map_err(|e| failure_from_reqwest(&e))?;
        let response_time = started.elapsed();

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default();

        if !ContentClassifier::is_acceptable_status(status_code) {
            return Err(ProbeFailure::BadStatusCode(status_code));
        }

        let mut buffer: Vec<u8> = Vec::with_capacity(self.range_bytes);
        while buffer.len() < self.range_bytes {
            match response.chunk().await {
                Ok(Some(chunk)) => buffer.extend_from_slice(&chunk),
                Ok(None) => break,
                // Headers arrived; a body yielding nothing is unreadable
                Err(e) if buffer.is_empty() => {
                    trace!("body read failed before any data: {e}");
                    return Err(ProbeFailure::UnreadableBody);
                }
                // Classify whatever arrived before the stream broke
                Err(_) => break,
            }
        }
        buffer.truncate(self.range_bytes);

        self.classifier.classify_content(&buffer, &content_type)?;

        Ok(ProbeOutcome::Working {
            response_time,
            status_code,
            content_type,
        })
    }
}

#[async_trait]
impl StreamProber for HttpStreamProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let outcome = self
            .probe_inner(url)
            .await
            .unwrap_or_else(ProbeOutcome::Failed);
        debug!(
            target = "stream.probe",
            url = %UrlUtils::obfuscate_credentials(url),
            status = %outcome.status(),
            "{outcome}"
        );
        outcome
    }
}
