use serde::{Deserialize, Serialize};

use super::RawEntry;

/// Category of a non-fatal, per-entry problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// `#EXTINF` without a following stream URL
    MissingStreamUrl,
    /// URL line with no pending `#EXTINF`
    OrphanStreamUrl,
    /// Playlist without `#EXTM3U` header
    MissingHeader,
    /// Programme lacking channel, start or stop
    MissingAttribute,
    /// Unparseable XMLTV timestamp
    InvalidTimestamp,
    /// Programme with stop <= start
    InvalidTimeRange,
    /// Xtream item pointing at an unknown category id
    UnresolvedCategory,
    /// Xtream item without a usable id (or name, for series)
    MalformedRecord,
    /// Numeric attribute beyond the storable range, ignored
    OutOfRange,
    /// Entry whose stable id was already emitted
    DuplicateEntry,
    /// Source used to have content and now returned none
    EmptyCatalog,
    /// EPG refresh after a catalog sync failed
    EpgRefreshFailed,
}

/// Non-fatal problem accumulated next to a partial result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl EntryWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EntryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Series name with its de-duplicated, ordered episodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesGroup {
    pub name: String,
    pub episodes: Vec<RawEntry>,
}

/// Result of `parse_m3u`: entries split by content type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCatalog {
    pub channels: Vec<RawEntry>,
    pub movies: Vec<RawEntry>,
    pub series: Vec<SeriesGroup>,
    pub warnings: Vec<EntryWarning>,
    /// EPG URL announced by the playlist header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_url: Option<String>,
}

impl ParsedCatalog {
    pub fn total_entries(&self) -> usize {
        self.channels.len()
            + self.movies.len()
            + self.series.iter().map(|s| s.episodes.len()).sum::<usize>()
    }
}
