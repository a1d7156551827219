//! M3U playlist parser
//!
//! Turns raw playlist text into ordered [`PlaylistEntry`] values. Parsing is
//! permissive: anything that is neither an `#EXTINF` directive nor a stream
//! URL is skipped without error, since playlists found in the wild are rarely
//! conformant. The parser never touches the network or the filesystem.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::models::{M3U_HEADER, PlaylistEntry, Resolution};

/// Directive prefix of a metadata line
pub const EXTINF_PREFIX: &str = "#EXTINF:";

/// Prefix identifying a stream URL line (covers http:// and https://)
pub const URL_PREFIX: &str = "http";

/// Result of parsing one playlist document
#[derive(Debug, Clone, Default)]
pub struct ParsedPlaylist {
    pub entries: Vec<PlaylistEntry>,
    /// Whether the text began with the `#EXTM3U` header tag (advisory)
    pub has_header: bool,
    /// Non-blank lines that were neither metadata nor URLs
    pub ignored_lines: usize,
}

impl ParsedPlaylist {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// M3U playlist parser
#[derive(Debug, Default, Clone, Copy)]
pub struct M3uParser;

impl M3uParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse M3U content into entries, in playlist order
    pub fn parse(&self, content: &str) -> ParsedPlaylist {
        let mut entries = Vec::new();
        let mut pending_extinf: Option<String> = None;
        let mut ignored_lines = 0;

        let has_header = has_m3u_header(content);

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            if line.starts_with(EXTINF_PREFIX) {
                if pending_extinf.is_some() {
                    debug!("EXTINF at line {} replaces an unused one", line_num + 1);
                }
                pending_extinf = Some(line.to_string());
            } else if line.starts_with(URL_PREFIX) {
                let entry = PlaylistEntry::new(entries.len(), pending_extinf.take(), line);
                entries.push(entry);
            } else {
                // Other directives (#EXTM3U, #EXTGRP, ...) and junk lines
                ignored_lines += 1;
            }
        }

        info!(
            "Parsed {} entries from playlist ({} other lines ignored)",
            entries.len(),
            ignored_lines
        );

        ParsedPlaylist {
            entries,
            has_header,
            ignored_lines,
        }
    }
}

/// Parse playlist text with the default parser
pub fn parse_playlist(content: &str) -> ParsedPlaylist {
    M3uParser::new().parse(content)
}

/// Whether the document begins with the `#EXTM3U` header tag
pub fn has_m3u_header(content: &str) -> bool {
    content
        .trim_start_matches('\u{feff}')
        .trim_start()
        .starts_with(M3U_HEADER)
}

fn tvg_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"tvg-name="([^"]*)""#).expect("valid tvg-name regex"))
}

fn group_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"group-title="[^"]*",\s*([^,]+)$"#).expect("valid group-title regex")
    })
}

fn trailing_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",([^,]+)$").expect("valid trailing label regex"))
}

/// Extract a channel name from an EXTINF line.
///
/// Priority: `tvg-name` attribute, then the label following `group-title`,
/// then any trailing comma-delimited label. An explicit empty `tvg-name`
/// wins and yields an empty name.
pub fn channel_name_from_extinf(extinf: &str) -> String {
    let captured = tvg_name_regex()
        .captures(extinf)
        .or_else(|| group_label_regex().captures(extinf))
        .or_else(|| trailing_label_regex().captures(extinf));

    captured
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Detect the advertised resolution from fixed tokens in an EXTINF line.
///
/// Case-insensitive substring scan; the first matching tier wins.
pub fn resolution_from_extinf(extinf: &str) -> Resolution {
    let upper = extinf.to_uppercase();
    let has = |token: &str| upper.contains(token);

    if has("4K") || has("2160P") {
        Resolution::P2160
    } else if has("1080P") || has("FHD") {
        Resolution::P1080
    } else if has("720P") || has("HD") {
        Resolution::P720
    } else if has("576P") || has("SD") {
        Resolution::P576
    } else if has("480P") {
        Resolution::P480
    } else {
        Resolution::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AddressFamily;
    use proptest::prelude::*;
    use rstest::rstest;

    const SAMPLE: &str = r#"#EXTM3U x-tvg-url="http://epg.example.com/e.xml"
#EXTINF:-1 tvg-id="cctv1" tvg-name="CCTV-1" group-title="News",CCTV-1 综合 FHD
http://10.0.0.1:8080/cctv1.m3u8

#EXTINF:-1 group-title="Sports", Sports Channel 720p
http://[2409:8087::1]:80/sports.ts
this line is junk
http://example.com/bare.flv
#EXTGRP:Music
#EXTINF:-1,Radio
https://radio.example.com/live.mp3
"#;

    #[test]
    fn parses_entries_in_order_with_metadata() {
        let parsed = parse_playlist(SAMPLE);

        assert!(parsed.has_header);
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed.ignored_lines, 3);

        let first = &parsed.entries[0];
        assert_eq!(first.index, 0);
        assert_eq!(first.channel_name, "CCTV-1");
        assert_eq!(first.resolution, Resolution::P1080);
        assert_eq!(first.address_family, AddressFamily::Ipv4);

        let second = &parsed.entries[1];
        assert_eq!(second.channel_name, "Sports Channel 720p");
        assert_eq!(second.resolution, Resolution::P720);
        assert_eq!(second.address_family, AddressFamily::Ipv6);

        let bare = &parsed.entries[2];
        assert!(bare.metadata.is_none());
        assert_eq!(bare.channel_name, "");

        let radio = &parsed.entries[3];
        assert_eq!(radio.channel_name, "Radio");
        assert_eq!(radio.url, "https://radio.example.com/live.mp3");
    }

    #[test]
    fn metadata_is_consumed_by_one_url_only() {
        let parsed = parse_playlist(
            "#EXTINF:-1,First\nhttp://a.example.com/1\nhttp://a.example.com/2\n",
        );
        assert_eq!(parsed.len(), 2);
        assert!(parsed.entries[0].metadata.is_some());
        assert!(parsed.entries[1].metadata.is_none());
    }

    #[test]
    fn later_metadata_replaces_unconsumed_metadata() {
        let parsed = parse_playlist("#EXTINF:-1,Old\n#EXTINF:-1,New\nhttp://a.example.com/1\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.entries[0].channel_name, "New");
    }

    #[test]
    fn missing_header_is_advisory_only() {
        let parsed = parse_playlist("http://a.example.com/1\n");
        assert!(!parsed.has_header);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn playlist_without_urls_is_empty() {
        let parsed = parse_playlist("#EXTM3U\n#EXTINF:-1,Nothing follows\n\n");
        assert!(parsed.is_empty());
        assert!(parsed.has_header);
    }

    #[rstest]
    #[case(r#"#EXTINF:-1 tvg-name="Alpha" group-title="G",Beta"#, "Alpha")]
    #[case(r#"#EXTINF:-1 tvg-name="" group-title="G",Beta"#, "")]
    #[case(r#"#EXTINF:-1 group-title="G",  Beta HD"#, "Beta HD")]
    #[case("#EXTINF:-1,Gamma", "Gamma")]
    #[case("#EXTINF:-1", "")]
    fn channel_name_priority(#[case] extinf: &str, #[case] expected: &str) {
        assert_eq!(channel_name_from_extinf(extinf), expected);
    }

    #[rstest]
    #[case("#EXTINF:-1,Movie 4K", Resolution::P2160)]
    #[case("#EXTINF:-1,Movie 2160p", Resolution::P2160)]
    #[case("#EXTINF:-1,News 1080P", Resolution::P1080)]
    #[case("#EXTINF:-1,News fhd", Resolution::P1080)]
    #[case("#EXTINF:-1,Sport 720p", Resolution::P720)]
    #[case("#EXTINF:-1,Sport HD", Resolution::P720)]
    #[case("#EXTINF:-1,Old 576p", Resolution::P576)]
    #[case("#EXTINF:-1,Old SD", Resolution::P576)]
    #[case("#EXTINF:-1,Tiny 480p", Resolution::P480)]
    #[case("#EXTINF:-1,Plain", Resolution::Unknown)]
    fn resolution_tiers(#[case] extinf: &str, #[case] expected: Resolution) {
        assert_eq!(resolution_from_extinf(extinf), expected);
    }

    proptest! {
        #[test]
        fn derived_fields_are_pure(extinf in "#EXTINF:-1[ a-zA-Z0-9=\"-]{0,40},[a-zA-Z0-9 ]{0,20}") {
            prop_assert_eq!(channel_name_from_extinf(&extinf), channel_name_from_extinf(&extinf));
            prop_assert_eq!(resolution_from_extinf(&extinf), resolution_from_extinf(&extinf));
        }

        #[test]
        fn render_then_parse_round_trips(
            name in "[a-zA-Z][a-zA-Z0-9 ]{0,20}",
            host in "[a-z]{1,10}\\.example\\.com",
            path in "[a-z0-9]{1,12}",
        ) {
            let extinf = format!("#EXTINF:-1 group-title=\"Test\",{name}");
            let url = format!("http://{host}/{path}.m3u8");
            let entry = PlaylistEntry::new(0, Some(extinf), url);

            let reparsed = parse_playlist(&entry.render());
            prop_assert_eq!(reparsed.len(), 1);
            let again = &reparsed.entries[0];
            prop_assert_eq!(&again.url, &entry.url);
            prop_assert_eq!(&again.channel_name, &entry.channel_name);
            prop_assert_eq!(again.resolution, entry.resolution);
            prop_assert_eq!(again.address_family, entry.address_family);
        }
    }
}
