//! EPG channel list retrieval
//!
//! Downloads a channel list from the configured EPG sources (XMLTV documents
//! or DIYP-style `id,name` text), keeps the first non-empty one in a local
//! JSON cache and falls back to that cache when every source fails. The
//! resulting [`EpgIndex`] is only used to report how many working channels
//! have a guide listing; EPG problems never stop a run.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::{EpgConfig, EpgMode};
use crate::errors::{AppError, AppResult, EpgError, EpgResult};

/// One channel listed by an EPG source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgChannel {
    pub id: String,
    pub name: String,
}

/// Channel list keyed by display name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpgIndex {
    channels: BTreeMap<String, EpgChannel>,
}

/// Lowercased name without whitespace or dashes, so `CCTV-1` matches `cctv1`
fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

impl EpgIndex {
    pub fn insert(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let name = name.into();
        self.channels.insert(
            name.clone(),
            EpgChannel {
                id: id.into(),
                name,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&EpgChannel> {
        self.channels.get(name)
    }

    /// Number of `names` that have a listing, comparing normalized names
    pub fn count_matches<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> usize {
        let known: HashSet<String> = self.channels.keys().map(|n| normalize_name(n)).collect();
        names
            .into_iter()
            .filter(|name| known.contains(&normalize_name(name)))
            .count()
    }
}

/// Document format of an EPG source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpgFormat {
    Xmltv,
    /// `id,name` lines (DIYP and plain text lists)
    Text,
}

impl EpgFormat {
    /// Pick the format from the URL, or from the content when the URL is silent
    pub fn detect(url: &str, content: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".xml") {
            EpgFormat::Xmltv
        } else if path.ends_with(".txt") || path.ends_with("/diyp/") {
            EpgFormat::Text
        } else if content.trim_start().starts_with('<') {
            EpgFormat::Xmltv
        } else {
            EpgFormat::Text
        }
    }
}

/// Parse `id,name` lines; lines without a comma are skipped
pub fn parse_text_channels(content: &str) -> EpgIndex {
    let mut index = EpgIndex::default();
    for line in content.lines() {
        let mut parts = line.split(',');
        if let (Some(id), Some(name)) = (parts.next(), parts.next()) {
            let (id, name) = (id.trim(), name.trim());
            if !name.is_empty() {
                index.insert(id, name);
            }
        }
    }
    index
}

/// Parse `<channel id="..."><display-name>...</display-name></channel>` entries
/// of an XMLTV document; programme data is skipped.
pub fn parse_xmltv_channels(content: &str, source_url: &str) -> EpgResult<EpgIndex> {
    let parse_error = |message: String| EpgError::Parse {
        source_url: source_url.to_string(),
        message,
    };

    let mut reader = Reader::from_str(content);

    let mut index = EpgIndex::default();
    let mut channel_id: Option<String> = None;
    let mut display_name: Option<String> = None;
    let mut in_display_name = false;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"channel" => {
                    channel_id = attribute(e, "id");
                    display_name = None;
                }
                b"display-name" if channel_id.is_some() => {
                    in_display_name = true;
                    current_text.clear();
                }
                _ => {}
            },

            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"display-name" if in_display_name => {
                    in_display_name = false;
                    // First display name of a channel is the canonical one
                    if display_name.is_none() && !current_text.trim().is_empty() {
                        display_name = Some(current_text.trim().to_string());
                    }
                }
                b"channel" => {
                    if let (Some(id), Some(name)) = (channel_id.take(), display_name.take())
                        && !id.is_empty()
                    {
                        index.insert(id, name);
                    }
                }
                _ => {}
            },

            Ok(Event::Text(e)) if in_display_name => {
                let text = std::str::from_utf8(&e)
                    .map_err(|e| parse_error(format!("Invalid UTF-8 in text: {e}")))?;
                current_text.push_str(text);
            }

            Ok(Event::CData(e)) if in_display_name => {
                let text = std::str::from_utf8(&e)
                    .map_err(|e| parse_error(format!("Invalid UTF-8 in CDATA: {e}")))?;
                current_text.push_str(text);
            }

            Ok(Event::GeneralRef(e)) if in_display_name => {
                let name = std::str::from_utf8(&e)
                    .map_err(|e| parse_error(format!("Invalid UTF-8 in entity: {e}")))?;
                if let Some(resolved) = resolve_entity(name) {
                    current_text.push_str(&resolved);
                }
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(parse_error(format!(
                    "XML parsing error at position {}: {e}",
                    reader.buffer_position()
                )));
            }

            _ => {}
        }
    }

    Ok(index)
}

fn attribute(element: &BytesStart, key: &str) -> Option<String> {
    element.attributes().flatten().find_map(|attr| {
        (attr.key.as_ref() == key.as_bytes())
            .then(|| std::str::from_utf8(&attr.value).ok().map(str::to_string))
            .flatten()
    })
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_string)
}

/// Fetches and caches the EPG channel list
pub struct EpgLoader {
    client: Client,
    config: EpgConfig,
}

impl EpgLoader {
    pub fn new(config: EpgConfig, user_agent: &str) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| AppError::configuration(format!("Invalid user agent: {e}")))?,
        );
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(true)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, config })
    }

    /// Load the index according to the configured mode.
    ///
    /// `Ok(None)` means EPG is disabled.
    pub async fn load(&self) -> EpgResult<Option<EpgIndex>> {
        match self.config.mode {
            EpgMode::Disabled => Ok(None),
            EpgMode::Cache => self.read_cache().await.map(Some),
            EpgMode::Remote => self.load_remote().await.map(Some),
        }
    }

    async fn load_remote(&self) -> EpgResult<EpgIndex> {
        for url in &self.config.urls {
            info!("Fetching EPG data from {url}");
            match self.fetch_source(url).await {
                Ok(index) if !index.is_empty() => {
                    info!("Loaded {} EPG channels from {url}", index.len());
                    if let Err(e) = self.write_cache(&index).await {
                        warn!("Failed to save EPG cache: {e}");
                    }
                    return Ok(index);
                }
                Ok(_) => debug!("EPG source {url} listed no channels"),
                Err(e) => warn!("EPG source {url} failed: {e}"),
            }
        }

        warn!("No EPG source reachable, trying local cache");
        self.read_cache().await.map_err(|e| EpgError::Unavailable {
            message: format!("all {} sources failed and {e}", self.config.urls.len()),
        })
    }

    async fn fetch_source(&self, url: &str) -> EpgResult<EpgIndex> {
        let unavailable = |message: String| EpgError::Unavailable { message };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| unavailable(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let content = String::from_utf8_lossy(&bytes);

        match EpgFormat::detect(url, &content) {
            EpgFormat::Xmltv => parse_xmltv_channels(&content, url),
            EpgFormat::Text => Ok(parse_text_channels(&content)),
        }
    }

    async fn read_cache(&self) -> EpgResult<EpgIndex> {
        let path = &self.config.cache_file;
        let cache_error = |message: String| EpgError::Cache {
            path: path.display().to_string(),
            message,
        };

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| cache_error(e.to_string()))?;
        let index: EpgIndex =
            serde_json::from_str(&contents).map_err(|e| cache_error(e.to_string()))?;
        info!("Loaded {} EPG channels from cache {}", index.len(), path.display());
        Ok(index)
    }

    async fn write_cache(&self, index: &EpgIndex) -> EpgResult<PathBuf> {
        let path = self.config.cache_file.clone();
        let cache_error = |message: String| EpgError::Cache {
            path: path.display().to_string(),
            message,
        };

        let json = serde_json::to_string_pretty(index).map_err(|e| cache_error(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| cache_error(e.to_string()))?;
        debug!("EPG cache written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const XMLTV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="test">
  <channel id="cctv1">
    <display-name lang="zh">CCTV-1</display-name>
    <display-name lang="en">CCTV1 General</display-name>
  </channel>
  <channel id="news">
    <display-name>News &amp; Weather</display-name>
  </channel>
  <channel id="">
    <display-name>No Id</display-name>
  </channel>
  <programme start="20240101000000 +0800" stop="20240101010000 +0800" channel="cctv1">
    <title>Morning</title>
  </programme>
</tv>"#;

    #[test]
    fn parses_xmltv_channels() {
        let index = parse_xmltv_channels(XMLTV, "test.xml").unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("CCTV-1").unwrap().id, "cctv1");
        assert_eq!(index.get("News & Weather").unwrap().id, "news");
        assert!(index.get("Morning").is_none());
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_xmltv_channels("<tv><channel id=\"a\"></tv>", "bad.xml").unwrap_err();
        assert!(matches!(err, EpgError::Parse { .. }));
    }

    #[test]
    fn parses_text_channels() {
        let index = parse_text_channels("1,CCTV-1\n2, Hunan TV \nheader line\n3,\n");
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("Hunan TV").unwrap().id, "2");
    }

    #[test]
    fn detects_format() {
        assert_eq!(EpgFormat::detect("http://h/e.xml", ""), EpgFormat::Xmltv);
        assert_eq!(EpgFormat::detect("http://h:8000/api/diyp/", "<x>"), EpgFormat::Text);
        assert_eq!(EpgFormat::detect("http://h/epg", "  <tv>"), EpgFormat::Xmltv);
        assert_eq!(EpgFormat::detect("http://h/epg?fmt=1", "1,A"), EpgFormat::Text);
    }

    #[test]
    fn matches_ignore_case_dashes_and_spaces() {
        let mut index = EpgIndex::default();
        index.insert("cctv1", "CCTV-1");
        index.insert("hn", "Hunan TV");
        let names = vec![
            "cctv1".to_string(),
            "HunanTV".to_string(),
            "Unknown".to_string(),
        ];
        assert_eq!(index.count_matches(&names), 2);
    }

    fn config(mode: EpgMode, cache_file: PathBuf, urls: Vec<String>) -> EpgConfig {
        EpgConfig {
            mode,
            urls,
            cache_file,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn disabled_mode_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let loader = EpgLoader::new(
            config(EpgMode::Disabled, dir.path().join("cache.json"), vec![]),
            "test",
        )
        .unwrap();
        assert_eq!(loader.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn cache_round_trip_and_remote_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("cache.json");

        let mut index = EpgIndex::default();
        index.insert("cctv1", "CCTV-1");
        let loader = EpgLoader::new(config(EpgMode::Cache, cache_file.clone(), vec![]), "test")
            .unwrap();
        assert!(matches!(loader.load().await, Err(EpgError::Cache { .. })));

        loader.write_cache(&index).await.unwrap();
        assert_eq!(loader.load().await.unwrap(), Some(index.clone()));

        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let remote = EpgLoader::new(
            config(
                EpgMode::Remote,
                cache_file,
                vec![format!("http://127.0.0.1:{port}/e.xml")],
            ),
            "test",
        )
        .unwrap();
        assert_eq!(remote.load().await.unwrap(), Some(index));
    }
}
