use lazy_static::lazy_static;
use regex::Regex;

use crate::error::IngestError;
use crate::models::{
    ContentType, EntryWarning, ParsedCatalog, RawEntry, WarningKind, DEFAULT_GROUP_TITLE,
};
use crate::services::attributes::{last_unquoted_comma, tokenize_attributes, ExtinfAttributes};
use crate::services::classifier::ContentClassifier;
use crate::services::series_grouper::group_series_list;

lazy_static! {
    /// Regex to normalize runs of whitespace into a single space
    static ref MULTI_SPACE_REGEX: Regex = Regex::new(r"\s{2,}").unwrap();
}

const HEADER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF:";
const EXTGRP: &str = "#EXTGRP:";

/// Flat, classified output of one playlist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct M3uPlaylist {
    /// Entries in source order; `ordinal` equals the index
    pub entries: Vec<RawEntry>,
    pub warnings: Vec<EntryWarning>,
    /// `x-tvg-url` / `url-tvg` announced by the header
    pub epg_url: Option<String>,
}

impl M3uPlaylist {
    /// Splits entries by content type and groups series episodes
    pub fn into_catalog(self) -> ParsedCatalog {
        let mut channels = Vec::new();
        let mut movies = Vec::new();
        let mut episodes = Vec::new();

        for entry in self.entries {
            match entry.content_type {
                ContentType::Live => channels.push(entry),
                ContentType::Movie => movies.push(entry),
                ContentType::SeriesEpisode { .. } => episodes.push(entry),
            }
        }

        ParsedCatalog {
            channels,
            movies,
            series: group_series_list(episodes),
            warnings: self.warnings,
            epg_url: self.epg_url,
        }
    }
}

/// Parsed `#EXTINF` line waiting for its URL
#[derive(Debug)]
struct ExtinfData {
    attributes: ExtinfAttributes,
    title: String,
    group_override: Option<String>,
    line: usize,
}

/// Parse the part of an `#EXTINF:` line after the directive.
/// Format: `duration key="value" ...,Title`. The title starts after the last
/// comma that is not inside a quoted value.
fn parse_extinf(content: &str, line: usize) -> ExtinfData {
    let (segment, title) = match last_unquoted_comma(content) {
        Some(idx) => (&content[..idx], content[idx + 1..].trim()),
        None => (content, ""),
    };

    ExtinfData {
        attributes: tokenize_attributes(segment),
        title: title.to_string(),
        group_override: None,
        line,
    }
}

/// Normalize text: trim and collapse multiple spaces into single space
fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    MULTI_SPACE_REGEX.replace_all(trimmed, " ").to_string()
}

/// Case-insensitive directive prefix match, returning the remainder
fn strip_directive<'a>(line: &'a str, directive: &str) -> Option<&'a str> {
    let head = line.get(..directive.len())?;
    if head.eq_ignore_ascii_case(directive) {
        Some(&line[directive.len()..])
    } else {
        None
    }
}

/// First URL of a header `x-tvg-url`/`url-tvg` attribute (may be a comma list)
fn header_epg_url(attributes: &ExtinfAttributes) -> Option<String> {
    attributes
        .non_empty("x-tvg-url")
        .or_else(|| attributes.non_empty("url-tvg"))
        .and_then(|v| v.split(',').map(str::trim).find(|u| !u.is_empty()))
        .map(str::to_string)
}

/// M3U/M3U8 parser. Pure: text in, classified entries out.
#[derive(Debug, Clone, Default)]
pub struct M3uParser {
    classifier: ContentClassifier,
}

impl M3uParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(classifier: ContentClassifier) -> Self {
        Self { classifier }
    }

    /// Parses a whole playlist.
    ///
    /// Per-entry problems become warnings. The only error is text that has
    /// content but neither an `#EXTM3U` header nor a single `#EXTINF` line.
    pub fn parse(&self, text: &str) -> Result<M3uPlaylist, IngestError> {
        let mut playlist = M3uPlaylist::default();
        let mut pending: Option<ExtinfData> = None;
        let mut has_header = false;
        let mut has_extinf = false;
        let mut has_content = false;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim_start_matches('\u{feff}').trim();
            if line.is_empty() {
                continue;
            }
            has_content = true;

            if let Some(rest) = strip_directive(line, HEADER) {
                has_header = true;
                if playlist.epg_url.is_none() {
                    playlist.epg_url = header_epg_url(&tokenize_attributes(rest));
                }
                continue;
            }

            if let Some(rest) = strip_directive(line, EXTINF) {
                has_extinf = true;
                if let Some(dropped) = pending.take() {
                    playlist.warnings.push(missing_url_warning(&dropped));
                }
                pending = Some(parse_extinf(rest, line_no));
                continue;
            }

            if let Some(rest) = strip_directive(line, EXTGRP) {
                if let Some(extinf) = pending.as_mut() {
                    let group = normalize_text(rest);
                    if !group.is_empty() {
                        extinf.group_override = Some(group);
                    }
                }
                continue;
            }

            // Other directives and comments
            if line.starts_with('#') {
                continue;
            }

            match pending.take() {
                Some(extinf) => {
                    for key in extinf.attributes.out_of_range_keys() {
                        playlist.warnings.push(EntryWarning::new(
                            WarningKind::OutOfRange,
                            format!("Line {}: {} out of range, ignored", extinf.line, key),
                        ));
                    }
                    let ordinal = playlist.entries.len();
                    playlist.entries.push(self.build_entry(extinf, line, ordinal));
                }
                None => playlist.warnings.push(EntryWarning::new(
                    WarningKind::OrphanStreamUrl,
                    format!("Line {}: stream URL without #EXTINF skipped", line_no),
                )),
            }
        }

        if let Some(dropped) = pending.take() {
            playlist.warnings.push(missing_url_warning(&dropped));
        }

        if !has_header {
            if has_content && !has_extinf {
                return Err(IngestError::MalformedInput(
                    "Not an M3U playlist: no #EXTM3U header and no #EXTINF entries".to_string(),
                ));
            }
            if has_extinf {
                playlist.warnings.insert(
                    0,
                    EntryWarning::new(WarningKind::MissingHeader, "Playlist has no #EXTM3U header"),
                );
            }
        }

        tracing::debug!(
            entries = playlist.entries.len(),
            warnings = playlist.warnings.len(),
            "M3U parsed"
        );

        Ok(playlist)
    }

    fn build_entry(&self, extinf: ExtinfData, url: &str, ordinal: usize) -> RawEntry {
        let attrs = &extinf.attributes;

        let title = normalize_text(&extinf.title);
        let display_name = if title.is_empty() {
            attrs.tvg_name().map(normalize_text).unwrap_or_default()
        } else {
            title
        };

        let group_title = attrs
            .group_title()
            .map(normalize_text)
            .or(extinf.group_override)
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| DEFAULT_GROUP_TITLE.to_string());

        let content_type = self.classifier.classify(&group_title, url, &display_name);

        RawEntry {
            display_name,
            stream_url: url.to_string(),
            logo_url: attrs.tvg_logo().map(str::to_string),
            group_title,
            epg_id: attrs.tvg_id().map(str::to_string),
            catchup_days: attrs.catchup_days(),
            catchup_source: attrs.catchup_source().map(str::to_string),
            channel_number: attrs.channel_number(),
            provider_id: None,
            ordinal,
            content_type,
        }
    }
}

fn missing_url_warning(extinf: &ExtinfData) -> EntryWarning {
    let name = if extinf.title.is_empty() {
        extinf.attributes.tvg_name().unwrap_or_default()
    } else {
        extinf.title.as_str()
    };
    EntryWarning::new(
        WarningKind::MissingStreamUrl,
        format!("Line {}: #EXTINF '{}' has no stream URL, dropped", extinf.line, name),
    )
}

/// `parseM3U`: playlist text to channels, movies, grouped series and warnings
pub fn parse_m3u(text: &str) -> Result<ParsedCatalog, IngestError> {
    M3uParser::new().parse(text).map(M3uPlaylist::into_catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"#EXTM3U x-tvg-url="http://epg.example/guide.xml"
#EXTINF:-1 tvg-id="bbc1" tvg-logo="http://logo/bbc1.png" group-title="UK",BBC One
http://host/live/bbc1.ts
#EXTINF:-1 group-title="Films",Inception
http://host/vod/123.mp4
#EXTINF:-1 group-title="Series",Breaking Bad S01E05
http://host/series/u/p/55.mkv
#EXTINF:-1 group-title="Series",Breaking Bad S01E04
http://host/series/u/p/54.mkv
"#;

    #[test]
    fn test_parse_extinf() {
        let extinf = parse_extinf(r#"-1 tvg-id="bbc1" group-title="UK",BBC One"#, 1);
        assert_eq!(extinf.title, "BBC One");
        assert_eq!(extinf.attributes.tvg_id(), Some("bbc1"));
        assert_eq!(extinf.attributes.group_title(), Some("UK"));
    }

    #[test]
    fn test_parse_extinf_minimal() {
        let extinf = parse_extinf("-1,Canal Teste", 1);
        assert_eq!(extinf.title, "Canal Teste");
        assert!(extinf.attributes.is_empty());
    }

    #[test]
    fn test_last_comma_wins_outside_quotes() {
        let extinf = parse_extinf(r#"-1 tvg-name="News, Sport",Sky News, HD"#, 1);
        assert_eq!(extinf.title, "HD");
        assert_eq!(extinf.attributes.tvg_name(), Some("News, Sport"));
    }

    #[test]
    fn test_parse_sample_playlist() {
        let playlist = M3uParser::new().parse(SAMPLE).unwrap();
        assert_eq!(playlist.entries.len(), 4);
        assert!(playlist.warnings.is_empty());
        assert_eq!(playlist.epg_url.as_deref(), Some("http://epg.example/guide.xml"));

        let bbc = &playlist.entries[0];
        assert_eq!(bbc.display_name, "BBC One");
        assert_eq!(bbc.epg_id.as_deref(), Some("bbc1"));
        assert_eq!(bbc.group_title, "UK");
        assert_eq!(bbc.logo_url.as_deref(), Some("http://logo/bbc1.png"));
        assert_eq!(bbc.content_type, ContentType::Live);

        assert_eq!(playlist.entries[1].content_type, ContentType::Movie);
        assert_eq!(playlist.entries[2].content_type.kind(), ContentKind::Series);
    }

    #[test]
    fn test_into_catalog_splits_and_groups() {
        let catalog = parse_m3u(SAMPLE).unwrap();
        assert_eq!(catalog.channels.len(), 1);
        assert_eq!(catalog.movies.len(), 1);
        assert_eq!(catalog.series.len(), 1);

        let series = &catalog.series[0];
        assert_eq!(series.name, "Breaking Bad");
        assert_eq!(series.episodes[0].stream_url, "http://host/series/u/p/54.mkv");
        assert_eq!(series.episodes[1].stream_url, "http://host/series/u/p/55.mkv");
        assert_eq!(catalog.total_entries(), 4);
    }

    #[test]
    fn test_reparse_is_ordinal_stable() {
        let first = M3uParser::new().parse(SAMPLE).unwrap();
        let second = M3uParser::new().parse(SAMPLE).unwrap();
        assert_eq!(first, second);
        for (idx, entry) in first.entries.iter().enumerate() {
            assert_eq!(entry.ordinal, idx);
        }
    }

    #[test]
    fn test_missing_url_is_dropped_with_warning() {
        let text = "#EXTM3U\n#EXTINF:-1,Lost One\n#EXTINF:-1,Kept\nhttp://host/kept.ts\n#EXTINF:-1,Tail\n";
        let playlist = M3uParser::new().parse(text).unwrap();

        assert_eq!(playlist.entries.len(), 1);
        assert_eq!(playlist.entries[0].display_name, "Kept");
        assert_eq!(playlist.entries[0].ordinal, 0);

        let kinds: Vec<WarningKind> = playlist.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::MissingStreamUrl, WarningKind::MissingStreamUrl]);
        assert!(playlist.warnings[0].message.contains("Lost One"));
    }

    #[test]
    fn test_name_falls_back_to_tvg_name_then_empty() {
        let text = "#EXTM3U\n#EXTINF:-1 tvg-name=\"Fallback  Name\",\nhttp://host/1.ts\n#EXTINF:-1,\nhttp://host/2.ts\n";
        let playlist = M3uParser::new().parse(text).unwrap();
        assert_eq!(playlist.entries[0].display_name, "Fallback Name");
        assert_eq!(playlist.entries[1].display_name, "");
    }

    #[test]
    fn test_group_defaults_and_extgrp() {
        let text = "#EXTM3U\n#EXTINF:-1 group-title=\"\",A\nhttp://host/a.ts\n#EXTINF:-1,B\n#EXTGRP:News   Channels\nhttp://host/b.ts\n";
        let playlist = M3uParser::new().parse(text).unwrap();
        assert_eq!(playlist.entries[0].group_title, DEFAULT_GROUP_TITLE);
        assert_eq!(playlist.entries[1].group_title, "News Channels");
    }

    #[test]
    fn test_orphan_url_and_comments_are_skipped() {
        let text = "#EXTM3U\nhttp://host/orphan.ts\n#EXTINF:-1,A\n#EXTVLCOPT:http-user-agent=VLC\nhttp://host/a.ts\n";
        let playlist = M3uParser::new().parse(text).unwrap();
        assert_eq!(playlist.entries.len(), 1);
        assert_eq!(playlist.entries[0].stream_url, "http://host/a.ts");
        assert_eq!(playlist.warnings[0].kind, WarningKind::OrphanStreamUrl);
    }

    #[test]
    fn test_missing_header_is_a_warning() {
        let playlist = M3uParser::new()
            .parse("#EXTINF:-1,A\nhttp://host/a.ts\n")
            .unwrap();
        assert_eq!(playlist.entries.len(), 1);
        assert_eq!(playlist.warnings[0].kind, WarningKind::MissingHeader);
    }

    #[test]
    fn test_html_page_is_malformed() {
        let result = parse_m3u("<html><body>403 Forbidden</body></html>");
        assert!(matches!(result, Err(IngestError::MalformedInput(_))));
    }

    #[test]
    fn test_empty_playlist_is_valid() {
        let catalog = parse_m3u("#EXTM3U\n").unwrap();
        assert_eq!(catalog.total_entries(), 0);
        assert!(parse_m3u("").unwrap().warnings.is_empty());
    }

    #[test]
    fn test_lowercase_directives_and_crlf() {
        let text = "#extm3u\r\n#extinf:-1 tvg-chno=\"7\" catchup-days=\"3\",Seven\r\nhttp://host/7.ts\r\n";
        let playlist = M3uParser::new().parse(text).unwrap();
        assert!(playlist.warnings.is_empty());
        assert_eq!(playlist.entries[0].channel_number, Some(7));
        assert_eq!(playlist.entries[0].catchup_days, 3);
    }

    #[test]
    fn test_oversized_channel_number_keeps_entry() {
        let text = "#EXTM3U\n#EXTINF:-1 tvg-chno=\"3000000000\",Big\nhttp://host/big.ts\n";
        let playlist = M3uParser::new().parse(text).unwrap();
        assert_eq!(playlist.entries.len(), 1);
        assert_eq!(playlist.entries[0].channel_number, None);
        assert_eq!(playlist.warnings.len(), 1);
        assert_eq!(playlist.warnings[0].kind, WarningKind::OutOfRange);
    }

    #[test]
    fn test_custom_classifier_is_used() {
        let mut overrides = HashMap::new();
        overrides.insert("http://host/42.ts".to_string(), ContentKind::Movie);
        let parser = M3uParser::with_classifier(ContentClassifier::with_overrides(overrides));
        let playlist = parser
            .parse("#EXTM3U\n#EXTINF:-1,2 Fast 2 Furious 2x02\nhttp://host/42.ts\n")
            .unwrap();
        assert_eq!(playlist.entries[0].content_type, ContentType::Movie);
    }
}
