use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use uuid::Uuid;

/// Group title used when an entry carries none
pub const DEFAULT_GROUP_TITLE: &str = "Uncategorized";

/// Upper bound for channel numbers, catch-up days and season/episode
/// numbers; the catalog tables store them as `INTEGER`
pub const MAX_CATALOG_NUMBER: u32 = i32::MAX as u32;

/// `value` as a catalog number; None when negative or above
/// [`MAX_CATALOG_NUMBER`]
pub fn catalog_number<T: TryInto<u32>>(value: T) -> Option<u32> {
    value.try_into().ok().filter(|n| *n <= MAX_CATALOG_NUMBER)
}

/// Provider protocol of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    M3u,
    Xtream,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::M3u => write!(f, "m3u"),
            SourceKind::Xtream => write!(f, "xtream"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "m3u" | "m3u8" => Ok(SourceKind::M3u),
            "xtream" | "xtreamcodes" | "xtream_codes" => Ok(SourceKind::Xtream),
            other => Err(format!("Unknown source kind: {}", other)),
        }
    }
}

/// One provider. Never mutated in place: edits build a new descriptor and
/// replace the stored one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub id: Uuid,
    pub name: String,
    pub kind: SourceKind,
    /// Playlist URL for M3U, server base URL for Xtream
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Encrypted credential blob, only ever decrypted right before use
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SourceDescriptor {
    /// New M3U source
    pub fn m3u(name: &str, playlist_url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind: SourceKind::M3u,
            endpoint: playlist_url.trim().to_string(),
            username: None,
            password: None,
            epg_url: None,
            created_at: Utc::now(),
        }
    }

    /// New Xtream Codes source; `password_blob` is the encrypted password
    pub fn xtream(name: &str, server: &str, username: &str, password_blob: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind: SourceKind::Xtream,
            endpoint: server.trim().to_string(),
            username: Some(username.to_string()),
            password: Some(password_blob.to_string()),
            epg_url: None,
            created_at: Utc::now(),
        }
    }

    /// Copy of this descriptor with a different EPG URL
    pub fn with_epg_url(self, epg_url: Option<String>) -> Self {
        Self {
            epg_url: epg_url.filter(|u| !u.trim().is_empty()),
            ..self
        }
    }
}

/// Classification outcome for one playable entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentType {
    Live,
    Movie,
    #[serde(rename_all = "camelCase")]
    SeriesEpisode {
        series_name: String,
        season_number: u32,
        episode_number: u32,
    },
}

impl ContentType {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentType::Live => ContentKind::Live,
            ContentType::Movie => ContentKind::Movie,
            ContentType::SeriesEpisode { .. } => ContentKind::Series,
        }
    }
}

/// Content type without series payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Live,
    Movie,
    Series,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Live => write!(f, "live"),
            ContentKind::Movie => write!(f, "movie"),
            ContentKind::Series => write!(f, "series"),
        }
    }
}

/// One playable unit before series grouping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    pub display_name: String,
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub group_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_id: Option<String>,
    pub catchup_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catchup_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_number: Option<u32>,
    /// Provider-native identifier (Xtream stream id), absent for M3U
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Zero-based position in the source document
    pub ordinal: usize,
    pub content_type: ContentType,
}

impl RawEntry {
    /// Stable identity of this entry within its source
    pub fn stable_id(&self, source_id: Uuid) -> String {
        match &self.provider_id {
            Some(native) => stable_id(source_id, native),
            None => stable_id(source_id, &self.stream_url),
        }
    }
}

/// SHA1 over the owning source and a provider-native key
pub fn stable_id(source_id: Uuid, native_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"|");
    hasher.update(native_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Catalog fields of a live channel, as written by sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub id: String,
    pub source_id: Uuid,
    pub name: String,
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub group_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_id: Option<String>,
    pub catchup_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catchup_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_number: Option<u32>,
    /// Display rank
    pub order: i64,
}

impl ChannelRecord {
    pub fn from_entry(entry: &RawEntry, source_id: Uuid) -> Self {
        Self {
            id: entry.stable_id(source_id),
            source_id,
            name: entry.display_name.clone(),
            stream_url: entry.stream_url.clone(),
            logo_url: entry.logo_url.clone(),
            group_title: entry.group_title.clone(),
            epg_id: entry.epg_id.clone(),
            catchup_days: entry.catchup_days,
            catchup_source: entry.catchup_source.clone(),
            channel_number: entry.channel_number,
            order: entry.ordinal as i64,
        }
    }
}

/// Channel as read back by clients: catalog fields plus user-owned state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    #[serde(flatten)]
    pub record: ChannelRecord,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieRecord {
    pub id: String,
    pub source_id: Uuid,
    pub name: String,
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub group_title: String,
    pub order: i64,
}

impl MovieRecord {
    pub fn from_entry(entry: &RawEntry, source_id: Uuid) -> Self {
        Self {
            id: entry.stable_id(source_id),
            source_id,
            name: entry.display_name.clone(),
            stream_url: entry.stream_url.clone(),
            logo_url: entry.logo_url.clone(),
            group_title: entry.group_title.clone(),
            order: entry.ordinal as i64,
        }
    }
}

/// One episode inside a series, unique on (season, episode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub season_number: u32,
    pub episode_number: u32,
    pub name: String,
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRecord {
    pub id: String,
    pub source_id: Uuid,
    /// Grouping key within the source
    pub name: String,
    pub group_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Sorted by (season, episode) ascending
    pub episodes: Vec<Episode>,
}

impl SeriesRecord {
    pub fn new(source_id: Uuid, name: &str) -> Self {
        Self {
            id: stable_id(source_id, &format!("series:{}", name)),
            source_id,
            name: name.to_string(),
            group_title: DEFAULT_GROUP_TITLE.to_string(),
            logo_url: None,
            provider_id: None,
            episodes: Vec::new(),
        }
    }
}

/// Persisted catalog of one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub channels: Vec<ChannelRecord>,
    pub movies: Vec<MovieRecord>,
    pub series: Vec<SeriesRecord>,
}

impl CatalogSnapshot {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.movies.is_empty() && self.series.is_empty()
    }

    pub fn total(&self) -> usize {
        self.channels.len() + self.movies.len() + self.series.len()
    }
}
