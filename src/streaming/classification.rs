/*!
 * Stream Content Classification
 * =============================
 *
 * Purpose:
 *   Decide, from the first few kilobytes of a probe response, whether an
 *   endpoint serves live media. This is pure classification: no network
 *   access happens here, the prober hands over what it read.
 *
 * Strategy:
 *   1. Status gate: only 200 and 206 (range honoured) are acceptable.
 *   2. Empty body => UnreadableBody.
 *   3. Byte signatures: any entry of the signature table matching the buffer
 *      (FLV, MPEG-TS, ID3, M3U text, RIFF, ISO-BMFF/H.264, MPEG start codes).
 *   4. Content-type fallback: many servers only reveal the stream type in the
 *      header, so a media-ish content type is accepted when no signature hit.
 *   5. Otherwise => UnrecognizedFormat(content_type).
 *
 * The signature list is a table rather than constants so tests and config
 * files can swap it for synthetic buffers.
 */

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SignatureConfig;
use crate::errors::{AppError, AppResult, ProbeFailure};

/// Number of body bytes inspected by default
pub const DEFAULT_SNIFF_BYTES: usize = 4096;

/// Content types accepted when no byte signature matched
pub const DEFAULT_MEDIA_CONTENT_TYPES: &[&str] = &[
    "video/",
    "audio/",
    "application/octet-stream",
    "application/vnd.apple.mpegurl",
];

/// Where in the buffer a signature must appear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAnchor {
    /// Only at offset 0
    Prefix,
    /// Anywhere in the inspected bytes
    #[default]
    Anywhere,
}

/// A named byte pattern identifying a media container or fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub pattern: Vec<u8>,
    pub anchor: SignatureAnchor,
}

impl Signature {
    pub fn new(name: impl Into<String>, pattern: impl Into<Vec<u8>>, anchor: SignatureAnchor) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            anchor,
        }
    }

    pub fn matches(&self, buffer: &[u8]) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        match self.anchor {
            SignatureAnchor::Prefix => buffer.starts_with(&self.pattern),
            SignatureAnchor::Anywhere => buffer
                .windows(self.pattern.len())
                .any(|window| window == self.pattern.as_slice()),
        }
    }
}

/// Ordered set of media signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTable {
    signatures: Vec<Signature>,
}

impl SignatureTable {
    pub fn new(signatures: Vec<Signature>) -> Self {
        Self { signatures }
    }

    /// Build a table from configuration; an empty list selects the built-in table
    pub fn from_config(configs: &[SignatureConfig]) -> AppResult<Self> {
        if configs.is_empty() {
            return Ok(Self::default());
        }

        let signatures = configs
            .iter()
            .map(|config| {
                let pattern = hex::decode(config.pattern_hex.replace(' ', "")).map_err(|e| {
                    AppError::configuration(format!(
                        "Invalid hex pattern for signature '{}': {e}",
                        config.name
                    ))
                })?;
                if pattern.is_empty() {
                    return Err(AppError::configuration(format!(
                        "Signature '{}' has an empty pattern",
                        config.name
                    )));
                }
                Ok(Signature::new(config.name.clone(), pattern, config.anchor))
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self::new(signatures))
    }

    /// First signature matching the buffer
    pub fn find_match(&self, buffer: &[u8]) -> Option<&Signature> {
        self.signatures.iter().find(|sig| sig.matches(buffer))
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl Default for SignatureTable {
    /// Every default signature matches anywhere in the buffer. Configure
    /// `0x47` with `anchor = "prefix"` for a stricter MPEG-TS check.
    fn default() -> Self {
        use SignatureAnchor::*;
        Self::new(vec![
            Signature::new("flv", b"FLV".to_vec(), Anywhere),
            Signature::new("mpegts-pusi", b"G@".to_vec(), Anywhere),
            Signature::new("mpegts-sync", vec![0x47], Anywhere),
            Signature::new("id3", b"ID3".to_vec(), Anywhere),
            Signature::new("m3u", b"#EXTM3U".to_vec(), Anywhere),
            Signature::new("riff", b"RIFF".to_vec(), Anywhere),
            Signature::new("h264-box", vec![0x00, 0x00, 0x00, 0x1c], Anywhere),
            Signature::new("mpeg-start-code", vec![0x00, 0x00, 0x01], Anywhere),
        ])
    }
}

/// How a response was accepted as media
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvidence {
    /// A byte signature matched (signature name)
    Signature(String),
    /// No signature, but the content type looked like media
    ContentType(String),
}

/// Two-tier content classifier
#[derive(Debug, Clone)]
pub struct ContentClassifier {
    signatures: SignatureTable,
    media_content_types: Vec<String>,
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new(
            SignatureTable::default(),
            DEFAULT_MEDIA_CONTENT_TYPES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl ContentClassifier {
    pub fn new(signatures: SignatureTable, media_content_types: Vec<String>) -> Self {
        let media_content_types = media_content_types
            .into_iter()
            .map(|t| t.to_ascii_lowercase())
            .collect();
        Self {
            signatures,
            media_content_types,
        }
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    /// Whether an HTTP status code can carry the stream body
    pub fn is_acceptable_status(status_code: u16) -> bool {
        matches!(status_code, 200 | 206)
    }

    /// Classify the body bytes read from a response, independent of its status.
    ///
    /// An empty buffer is always `UnreadableBody`.
    pub fn classify_content(
        &self,
        buffer: &[u8],
        content_type: &str,
    ) -> Result<MediaEvidence, ProbeFailure> {
        if buffer.is_empty() {
            return Err(ProbeFailure::UnreadableBody);
        }

        if let Some(signature) = self.signatures.find_match(buffer) {
            debug!(
                target = "stream.classify",
                signature = %signature.name,
                "byte signature matched"
            );
            return Ok(MediaEvidence::Signature(signature.name.clone()));
        }

        let lowered = content_type.to_ascii_lowercase();
        if self
            .media_content_types
            .iter()
            .any(|media| lowered.contains(media.as_str()))
        {
            debug!(
                target = "stream.classify",
                content_type = %content_type,
                "no signature, accepted by content type"
            );
            return Ok(MediaEvidence::ContentType(content_type.to_string()));
        }

        Err(ProbeFailure::UnrecognizedFormat(content_type.to_string()))
    }

    /// Full response classification: status gate first, then content
    pub fn classify_response(
        &self,
        status_code: u16,
        content_type: &str,
        buffer: &[u8],
    ) -> Result<MediaEvidence, ProbeFailure> {
        if !Self::is_acceptable_status(status_code) {
            return Err(ProbeFailure::BadStatusCode(status_code));
        }
        self.classify_content(buffer, content_type)
    }
}
