//! Xtream Codes API Types
//!
//! Wire types for Player API v2 responses. Providers disagree about field
//! types (ids as numbers or strings, `"1"` vs `1`, `null` vs missing), so
//! every field is optional and goes through a lenient deserializer. Defaults
//! are applied later, in the mapping step.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Credentials of one Xtream account, server already normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XtreamCredentials {
    /// Server base URL (e.g., "http://example.com:8080")
    pub server: String,
    pub username: String,
    pub password: String,
}

impl XtreamCredentials {
    pub fn new(server: &str, username: &str, password: &str) -> Self {
        Self {
            server: normalize_server(server),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Build the player_api.php base URL
    pub fn api_url(&self) -> String {
        format!(
            "{}/player_api.php?username={}&password={}",
            self.server,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password)
        )
    }

    /// player_api.php URL for one action plus extra query parameters
    pub fn action_url(&self, action: &str, params: &[(&str, &str)]) -> String {
        let mut url = format!("{}&action={}", self.api_url(), action);
        for (key, value) in params {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }
        url
    }

    /// Build playback URL for live streams
    pub fn live_url(&self, stream_id: &str) -> String {
        format!(
            "{}/live/{}/{}/{}.m3u8",
            self.server, self.username, self.password, stream_id
        )
    }

    /// Build playback URL for VOD
    pub fn vod_url(&self, stream_id: &str, extension: &str) -> String {
        format!(
            "{}/movie/{}/{}/{}.{}",
            self.server, self.username, self.password, stream_id, extension
        )
    }

    /// Build playback URL for series episodes
    pub fn series_url(&self, episode_id: &str, extension: &str) -> String {
        format!(
            "{}/series/{}/{}/{}.{}",
            self.server, self.username, self.password, episode_id, extension
        )
    }

    /// Build EPG XML URL
    pub fn epg_url(&self) -> String {
        format!(
            "{}/xmltv.php?username={}&password={}",
            self.server,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password)
        )
    }

    pub fn catchup_url(&self, stream_id: &str, start: DateTime<Utc>, duration_minutes: u32) -> String {
        build_catchup_url(
            &self.server,
            &self.username,
            &self.password,
            stream_id,
            start,
            duration_minutes,
        )
    }
}

/// Trims, drops trailing slashes and adds `http://` when no scheme is present
pub fn normalize_server(server: &str) -> String {
    let trimmed = server.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Timeshift URL:
/// `{server}/timeshift/{user}/{pass}/{duration}/{yyyy-MM-dd:HH-mm}/{streamId}.m3u8`
pub fn build_catchup_url(
    server: &str,
    username: &str,
    password: &str,
    stream_id: &str,
    start: DateTime<Utc>,
    duration_minutes: u32,
) -> String {
    format!(
        "{}/timeshift/{}/{}/{}/{}/{}.m3u8",
        normalize_server(server),
        username,
        password,
        duration_minutes,
        start.format("%Y-%m-%d:%H-%M"),
        stream_id
    )
}

// ============================================================================
// Lenient field deserializers
// ============================================================================

/// String, number or bool as trimmed string; null, empty and objects as None
pub(crate) fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Integer given as number, numeric string or bool
pub(crate) fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        Some(Value::Bool(b)) => Some(b as i64),
        _ => None,
    })
}

// ============================================================================
// Authentication Response Types
// ============================================================================

/// Main authentication response from player_api.php (no action)
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamAuthResponse {
    #[serde(default)]
    pub user_info: Option<XtreamUserInfo>,
    #[serde(default)]
    pub server_info: Option<XtreamServerInfo>,
}

/// User account information
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamUserInfo {
    #[serde(default, deserialize_with = "de_opt_string")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub auth: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub exp_date: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub is_trial: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub active_cons: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub max_connections: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub message: Option<String>,
}

impl XtreamUserInfo {
    pub fn is_authenticated(&self) -> bool {
        self.auth == Some(1)
    }

    /// Missing status counts as active; some panels omit it
    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("active"))
            .unwrap_or(true)
    }
}

/// Server information
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamServerInfo {
    #[serde(default, deserialize_with = "de_opt_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub port: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub server_protocol: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub timezone: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub timestamp_now: Option<i64>,
}

/// Account summary returned by a successful authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub username: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_trial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_connections: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_timezone: Option<String>,
}

impl AccountInfo {
    pub fn from_auth(auth: &XtreamAuthResponse, fallback_username: &str) -> Self {
        let user = auth.user_info.clone().unwrap_or_default();
        Self {
            username: user
                .username
                .unwrap_or_else(|| fallback_username.to_string()),
            status: user.status.unwrap_or_else(|| "Active".to_string()),
            expires_at: user
                .exp_date
                .filter(|ts| *ts > 0)
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            is_trial: user.is_trial == Some(1),
            max_connections: user.max_connections,
            active_connections: user.active_cons,
            server_timezone: auth.server_info.as_ref().and_then(|s| s.timezone.clone()),
        }
    }
}

// ============================================================================
// Category Types
// ============================================================================

/// Category for live, VOD, or series
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamCategory {
    #[serde(default, deserialize_with = "de_opt_string")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub category_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub parent_id: Option<i64>,
}

/// Which category list to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Live,
    Vod,
    Series,
}

impl CategoryKind {
    pub fn action(&self) -> &'static str {
        match self {
            CategoryKind::Live => "get_live_categories",
            CategoryKind::Vod => "get_vod_categories",
            CategoryKind::Series => "get_series_categories",
        }
    }

    /// Group title used when an item's category id is unknown
    pub fn fallback_group(&self) -> &'static str {
        match self {
            CategoryKind::Live => "Live",
            CategoryKind::Vod => "Films",
            CategoryKind::Series => "Series",
        }
    }
}

// ============================================================================
// Stream Types
// ============================================================================

/// Live stream (channel) information
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamLiveStream {
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub num: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub stream_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub stream_icon: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub epg_channel_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub tv_archive: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub tv_archive_duration: Option<i64>,
}

/// VOD (movie) stream information
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamVodStream {
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub num: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub stream_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub stream_icon: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub container_extension: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub rating: Option<String>,
}

/// Detailed VOD information (from get_vod_info)
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamVodInfo {
    #[serde(default, deserialize_with = "de_lenient_object")]
    pub info: Option<XtreamVodDetails>,
    #[serde(default, deserialize_with = "de_lenient_object")]
    pub movie_data: Option<XtreamVodStream>,
}

/// VOD metadata details
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamVodDetails {
    #[serde(default, deserialize_with = "de_opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub plot: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub genre: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub director: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub cast: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub releasedate: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub duration_secs: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub cover_big: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub movie_image: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub youtube_trailer: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub tmdb_id: Option<String>,
}

// ============================================================================
// Series Types
// ============================================================================

/// Series information from get_series
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamSeries {
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub num: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub series_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub cover: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub plot: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub genre: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub category_id: Option<String>,
}

/// Detailed series information (from get_series_info)
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamSeriesInfo {
    #[serde(default, deserialize_with = "de_lenient_object")]
    pub info: Option<XtreamSeriesDetails>,
    /// Flattened episode list. Providers send either a map keyed by season
    /// number or a (nested) array; the season key fills a missing `season`.
    #[serde(default, deserialize_with = "de_episodes")]
    pub episodes: Vec<XtreamEpisode>,
}

/// Series metadata details
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamSeriesDetails {
    #[serde(default, deserialize_with = "de_opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub cover: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub plot: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub genre: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub category_id: Option<String>,
}

/// Episode information
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamEpisode {
    #[serde(default, deserialize_with = "de_opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub episode_num: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub season: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub container_extension: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_object")]
    pub info: Option<XtreamEpisodeInfo>,
}

/// Episode metadata
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamEpisodeInfo {
    #[serde(default, deserialize_with = "de_opt_string")]
    pub plot: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub movie_image: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub season: Option<i64>,
}

/// Nested object that some panels replace with `[]` or a string when empty
fn de_lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(obj @ Value::Object(_)) => serde_json::from_value(obj).ok(),
        _ => None,
    })
}

fn de_episodes<'de, D>(deserializer: D) -> Result<Vec<XtreamEpisode>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let mut episodes = Vec::new();
    if let Some(value) = value {
        collect_episodes(value, None, &mut episodes);
    }
    Ok(episodes)
}

fn collect_episodes(value: Value, season_hint: Option<i64>, out: &mut Vec<XtreamEpisode>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_episodes(item, season_hint, out);
            }
        }
        Value::Object(map) if map.contains_key("id") || map.contains_key("episode_num") => {
            if let Ok(mut episode) = serde_json::from_value::<XtreamEpisode>(Value::Object(map)) {
                if episode.season.is_none() {
                    episode.season = episode
                        .info
                        .as_ref()
                        .and_then(|i| i.season)
                        .or(season_hint);
                }
                out.push(episode);
            }
        }
        Value::Object(map) => {
            // Season map: {"1": [...], "2": [...]}
            for (key, nested) in map {
                let hint = key.trim().parse::<i64>().ok().or(season_hint);
                collect_episodes(nested, hint, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_url_builders() {
        let creds = XtreamCredentials::new("http://host:8080", "u", "p");

        assert_eq!(creds.live_url("42"), "http://host:8080/live/u/p/42.m3u8");
        assert_eq!(creds.vod_url("456", "mkv"), "http://host:8080/movie/u/p/456.mkv");
        assert_eq!(creds.series_url("789", "mp4"), "http://host:8080/series/u/p/789.mp4");
        assert_eq!(
            creds.api_url(),
            "http://host:8080/player_api.php?username=u&password=p"
        );
        assert_eq!(
            creds.epg_url(),
            "http://host:8080/xmltv.php?username=u&password=p"
        );
    }

    #[test]
    fn test_server_normalization() {
        assert_eq!(normalize_server("host.com/"), "http://host.com");
        assert_eq!(normalize_server(" https://host.com:8443// "), "https://host.com:8443");
        assert_eq!(normalize_server("http://host:8080"), "http://host:8080");

        let creds = XtreamCredentials::new("host.com/", "u", "p");
        assert_eq!(creds.live_url("1"), "http://host.com/live/u/p/1.m3u8");
    }

    #[test]
    fn test_action_url_encodes_query_values() {
        let creds = XtreamCredentials::new("http://host", "user name", "p&ss");
        assert_eq!(
            creds.action_url("get_series_info", &[("series_id", "12")]),
            "http://host/player_api.php?username=user%20name&password=p%26ss&action=get_series_info&series_id=12"
        );
    }

    #[test]
    fn test_catchup_url() {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 20, 5, 0).unwrap();
        assert_eq!(
            build_catchup_url("host:8080/", "u", "p", "42", start, 90),
            "http://host:8080/timeshift/u/p/90/2024-03-09:20-05/42.m3u8"
        );
    }

    #[test]
    fn test_lenient_fields() {
        let stream: XtreamLiveStream = serde_json::from_str(
            r#"{"num":"3","name":" News ","stream_id":101,"stream_icon":"","category_id":7,"tv_archive":"1","tv_archive_duration":"5"}"#,
        )
        .unwrap();
        assert_eq!(stream.num, Some(3));
        assert_eq!(stream.name.as_deref(), Some("News"));
        assert_eq!(stream.stream_id.as_deref(), Some("101"));
        assert_eq!(stream.stream_icon, None);
        assert_eq!(stream.category_id.as_deref(), Some("7"));
        assert_eq!(stream.tv_archive_duration, Some(5));

        let auth: XtreamAuthResponse =
            serde_json::from_str(r#"{"user_info":{"auth":"1","status":"Active","exp_date":null}}"#)
                .unwrap();
        assert!(auth.user_info.unwrap().is_authenticated());
    }

    #[test]
    fn test_episodes_map_and_list_shapes() {
        let by_season: XtreamSeriesInfo = serde_json::from_str(
            r#"{"info":{"name":"Show"},"episodes":{"1":[{"id":"11","episode_num":1,"title":"Pilot","container_extension":"mkv"}],"2":[{"id":"21","episode_num":"1"}]}}"#,
        )
        .unwrap();
        assert_eq!(by_season.episodes.len(), 2);
        assert_eq!(by_season.episodes[0].season, Some(1));
        assert_eq!(by_season.episodes[1].season, Some(2));
        assert_eq!(by_season.episodes[1].episode_num, Some(1));

        let nested: XtreamSeriesInfo = serde_json::from_str(
            r#"{"info":[],"episodes":[[{"id":"5","episode_num":2,"season":3}]]}"#,
        )
        .unwrap();
        assert!(nested.info.is_none());
        assert_eq!(nested.episodes[0].season, Some(3));

        let empty: XtreamSeriesInfo = serde_json::from_str(r#"{"episodes":null}"#).unwrap();
        assert!(empty.episodes.is_empty());
    }
}
