use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::models::{catalog_number, ContentKind, ContentType};

lazy_static! {
    // ============ URL PATTERNS ============
    static ref URL_MOVIE_PATH: Regex = Regex::new(r"(?i)/(movie|vod)/").unwrap();
    static ref URL_SERIES_PATH: Regex = Regex::new(r"(?i)/(series|episode)/").unwrap();

    // ============ SEASON/EPISODE PATTERNS (tried in this order) ============
    // Glued to surrounding letters is fine ("Show.S01E05HDTV"); only a
    // neighbouring digit rejects a match, so "1920x1080" stays unmatched.
    static ref SERIES_SXXEXX: Regex = Regex::new(
        r"(?i)(?P<tag>S(?P<season>\d{1,2})[\s._-]?E(?P<episode>\d{1,2}))(?:\D|$)"
    )
    .unwrap();
    static ref SERIES_NXN: Regex = Regex::new(
        r"(?i)(?:^|\D)(?P<tag>(?P<season>\d{1,2})x(?P<episode>\d{1,2}))(?:\D|$)"
    )
    .unwrap();
    static ref SERIES_SEASON_EPISODE: Regex = Regex::new(
        r"(?i)(?P<tag>\bSeason\s*(?P<season>\d+)\b.*?\bEpisode\s*(?P<episode>\d+))\b"
    )
    .unwrap();

    static ref TRAILING_SEPARATORS: Regex = Regex::new(r"[\s\-_.:|]+$").unwrap();
}

/// Group keywords that mark movies (case-insensitive substring)
const MOVIE_GROUP_KEYWORDS: &[&str] = &["vod", "movie", "film", "cinema", "movies", "films"];

/// Group keywords that mark series (case-insensitive substring)
const SERIES_GROUP_KEYWORDS: &[&str] = &["series", "tv show", "tvshow", "episode"];

/// Season/episode numbers extracted from a display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSeriesInfo {
    pub series_name: String,
    pub season: u32,
    pub episode: u32,
}

impl ExtractedSeriesInfo {
    fn into_content_type(self) -> ContentType {
        ContentType::SeriesEpisode {
            series_name: self.series_name,
            season_number: self.season,
            episode_number: self.episode,
        }
    }
}

/// Ordered-heuristic content classifier.
///
/// Stateless apart from an optional override table keyed by stream URL,
/// which is empty by default and leaves the heuristics untouched.
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    overrides: HashMap<String, ContentKind>,
}

impl ContentClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier that forces the given kind for specific stream URLs
    pub fn with_overrides(overrides: HashMap<String, ContentKind>) -> Self {
        Self { overrides }
    }

    /// Decides Live / Movie / SeriesEpisode. First matching rule wins:
    /// URL path, then group keywords, then the season/episode pattern in
    /// the name, then Live.
    pub fn classify(&self, group_title: &str, stream_url: &str, name: &str) -> ContentType {
        if let Some(kind) = self.overrides.get(stream_url) {
            return match kind {
                ContentKind::Live => ContentType::Live,
                ContentKind::Movie => ContentType::Movie,
                ContentKind::Series => Self::series_or_fallback(name),
            };
        }

        // 1-2. URL path hints
        let path = url_path(stream_url);
        if URL_MOVIE_PATH.is_match(&path) {
            return ContentType::Movie;
        }
        if URL_SERIES_PATH.is_match(&path) {
            return Self::series_or_fallback(name);
        }

        // 3-4. Group keywords
        let lower_group = group_title.to_lowercase();
        if contains_any(&lower_group, MOVIE_GROUP_KEYWORDS) {
            return ContentType::Movie;
        }
        if contains_any(&lower_group, SERIES_GROUP_KEYWORDS) {
            return Self::series_or_fallback(name);
        }

        // 5. Name pattern
        if let Some(info) = Self::extract_series_info(name) {
            return info.into_content_type();
        }

        ContentType::Live
    }

    /// Tries `SxxEyy`, `NxM` and `Season N ... Episode M` in order.
    /// The series name is the text before the match; when that is empty the
    /// whole name is used.
    pub fn extract_series_info(name: &str) -> Option<ExtractedSeriesInfo> {
        [&*SERIES_SXXEXX, &*SERIES_NXN, &*SERIES_SEASON_EPISODE]
            .iter()
            .find_map(|pattern| {
                let caps = pattern.captures(name)?;
                let tag = caps.name("tag")?;
                let season = captured_number(&caps, "season")?;
                let episode = captured_number(&caps, "episode")?;

                let prefix = TRAILING_SEPARATORS
                    .replace(&name[..tag.start()], "")
                    .trim()
                    .to_string();
                let series_name = if prefix.is_empty() {
                    name.trim().to_string()
                } else {
                    prefix
                };

                Some(ExtractedSeriesInfo {
                    series_name,
                    season: season.max(1),
                    episode: episode.max(1),
                })
            })
    }

    /// Series info from the name, or the documented fallback
    /// (whole name, season 1, episode 1) when no pattern matches.
    fn series_or_fallback(name: &str) -> ContentType {
        Self::extract_series_info(name)
            .unwrap_or_else(|| ExtractedSeriesInfo {
                series_name: name.trim().to_string(),
                season: 1,
                episode: 1,
            })
            .into_content_type()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Path component of a stream URL; the raw string when it does not parse
fn url_path(stream_url: &str) -> String {
    match url::Url::parse(stream_url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => stream_url.split('?').next().unwrap_or_default().to_string(),
    }
}

fn captured_number(caps: &regex::Captures<'_>, group: &str) -> Option<u32> {
    catalog_number(caps.name(group)?.as_str().parse::<u64>().ok()?)
}
