//! Xtream Codes API Client
//!
//! Stateless request/response mapper over player_api.php. Every call is one
//! GET through the shared [`HttpFetch`]; nothing is cached between calls.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::mapping::*;
use super::types::*;
use crate::error::{redact_url, IngestError, TransportError};
use crate::models::{EntryWarning, WarningKind};
use crate::services::http::{HttpFetch, HttpResponse};

const JSON_HEADERS: &[(&str, &str)] = &[("Accept", "application/json")];

/// Xtream API Error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum XtreamError {
    /// Network/connection error, retryable
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Credentials rejected or account unusable
    #[error("Xtream authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Response body that is not the JSON shape the action returns
    #[error("Invalid response for '{action}': {message}")]
    Parse { action: String, message: String },
}

impl From<XtreamError> for IngestError {
    fn from(err: XtreamError) -> Self {
        match err {
            XtreamError::Transport(e) => IngestError::Transport(e),
            XtreamError::AuthenticationFailed(msg) => IngestError::AuthenticationFailed(msg),
            XtreamError::Parse { action, message } => {
                IngestError::MalformedInput(format!("Xtream {}: {}", action, message))
            }
        }
    }
}

/// Xtream API Client
pub struct XtreamClient {
    http: Arc<dyn HttpFetch>,
    credentials: XtreamCredentials,
    timeout: Duration,
}

impl XtreamClient {
    pub fn new(http: Arc<dyn HttpFetch>, credentials: XtreamCredentials, timeout: Duration) -> Self {
        Self {
            http,
            credentials,
            timeout,
        }
    }

    pub fn credentials(&self) -> &XtreamCredentials {
        &self.credentials
    }

    async fn fetch(&self, url: &str) -> Result<HttpResponse, XtreamError> {
        Ok(self.http.get(url, JSON_HEADERS, self.timeout).await?)
    }

    /// GET an action and decode it as `T`; non-2xx is a transport failure
    async fn get<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<T, XtreamError> {
        let url = self.credentials.action_url(action, params);
        debug!(action, "Xtream API request");

        let response = self.fetch(&url).await?;
        if !response.is_success() {
            return Err(TransportError::Status {
                url: redact_url(&url),
                status: response.status,
            }
            .into());
        }

        serde_json::from_slice(&response.body).map_err(|e| {
            debug!(
                action,
                body = %String::from_utf8_lossy(&response.body[..response.body.len().min(200)]),
                "Unparseable Xtream response"
            );
            XtreamError::Parse {
                action: action.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// GET a list action. Empty bodies, `[]` and `null` are empty lists, an
    /// object is read as a map of items, and items that do not decode are
    /// skipped and counted.
    async fn get_list<T: DeserializeOwned>(
        &self,
        action: &str,
    ) -> Result<(Vec<T>, usize), XtreamError> {
        let url = self.credentials.action_url(action, &[]);
        debug!(action, "Xtream API request");

        let response = self.fetch(&url).await?;
        if !response.is_success() {
            return Err(TransportError::Status {
                url: redact_url(&url),
                status: response.status,
            }
            .into());
        }

        let text = response.text();
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "[]" || trimmed == "null" {
            return Ok((Vec::new(), 0));
        }

        let value: Value = serde_json::from_str(trimmed).map_err(|e| XtreamError::Parse {
            action: action.to_string(),
            message: e.to_string(),
        })?;

        let raw_items: Vec<Value> = match value {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            other => {
                return Err(XtreamError::Parse {
                    action: action.to_string(),
                    message: format!("expected a list, got {}", json_kind(&other)),
                })
            }
        };

        let mut skipped = 0;
        let items: Vec<T> = raw_items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    skipped += 1;
                    None
                }
            })
            .collect();

        Ok((items, skipped))
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Validates the account. Non-2xx, non-JSON, `auth != 1` and a
    /// non-active status are all `AuthenticationFailed`; only network
    /// failures stay transport errors.
    pub async fn authenticate(&self) -> Result<AccountInfo, XtreamError> {
        let url = self.credentials.api_url();
        let response = self.fetch(&url).await?;

        if !response.is_success() {
            return Err(XtreamError::AuthenticationFailed(format!(
                "HTTP {} from {}",
                response.status,
                redact_url(&url)
            )));
        }

        let auth: XtreamAuthResponse = serde_json::from_slice(&response.body).map_err(|_| {
            XtreamError::AuthenticationFailed("Server did not return account JSON".to_string())
        })?;

        let user = auth.user_info.clone().unwrap_or_default();
        if !user.is_authenticated() {
            return Err(XtreamError::AuthenticationFailed(
                user.message
                    .unwrap_or_else(|| "Credentials rejected (auth != 1)".to_string()),
            ));
        }
        if !user.is_active() {
            return Err(XtreamError::AuthenticationFailed(format!(
                "Account status is {}",
                user.status.unwrap_or_default()
            )));
        }

        let account = AccountInfo::from_auth(&auth, &self.credentials.username);
        debug!(
            username = %account.username,
            status = %account.status,
            "Xtream account authenticated"
        );
        Ok(account)
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub async fn list_categories(
        &self,
        kind: CategoryKind,
    ) -> Result<Vec<XtreamCategory>, XtreamError> {
        let (categories, skipped) = self.get_list(kind.action()).await?;
        if skipped > 0 {
            warn!(action = kind.action(), skipped, "Skipped undecodable categories");
        }
        Ok(categories)
    }

    // ========================================================================
    // Streams
    // ========================================================================

    /// Live channels; `categories` must be the live category list
    pub async fn list_live_streams(
        &self,
        categories: &[XtreamCategory],
    ) -> Result<XtreamListing, XtreamError> {
        let (streams, skipped) = self.get_list::<XtreamLiveStream>("get_live_streams").await?;
        let mut listing = map_live_streams(&self.credentials, streams, categories);
        push_skipped(&mut listing.warnings, "live streams", skipped);
        Ok(listing)
    }

    /// Movies; `categories` must be the VOD category list
    pub async fn list_vod_streams(
        &self,
        categories: &[XtreamCategory],
    ) -> Result<XtreamListing, XtreamError> {
        let (streams, skipped) = self.get_list::<XtreamVodStream>("get_vod_streams").await?;
        let mut listing = map_vod_streams(&self.credentials, streams, categories);
        push_skipped(&mut listing.warnings, "movies", skipped);
        Ok(listing)
    }

    /// Series summaries; `categories` must be the series category list
    pub async fn list_series(
        &self,
        categories: &[XtreamCategory],
    ) -> Result<XtreamSeriesListing, XtreamError> {
        let (series, skipped) = self.get_list::<XtreamSeries>("get_series").await?;
        let mut listing = map_series(series, categories);
        push_skipped(&mut listing.warnings, "series", skipped);
        Ok(listing)
    }

    // ========================================================================
    // Details
    // ========================================================================

    pub async fn get_vod_detail(&self, vod_id: &str) -> Result<VodDetail, XtreamError> {
        let info: XtreamVodInfo = self.get("get_vod_info", &[("vod_id", vod_id)]).await?;
        Ok(map_vod_detail(&self.credentials, vod_id, info))
    }

    /// Episodes grouped by season, as declared by the provider
    pub async fn get_series_detail(
        &self,
        series_id: &str,
        fallback_name: Option<&str>,
    ) -> Result<SeriesDetail, XtreamError> {
        let info: XtreamSeriesInfo = self
            .get("get_series_info", &[("series_id", series_id)])
            .await?;
        Ok(map_series_detail(
            &self.credentials,
            series_id,
            fallback_name,
            info,
        ))
    }
}

fn push_skipped(warnings: &mut Vec<EntryWarning>, what: &str, skipped: usize) {
    if skipped > 0 {
        warnings.push(EntryWarning::new(
            WarningKind::MalformedRecord,
            format!("{} undecodable {} skipped", skipped, what),
        ));
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::http::testing::FakeFetcher;

    const API: &str = "http://host:8080/player_api.php?username=u&password=p";

    fn client(fetcher: Arc<FakeFetcher>) -> XtreamClient {
        XtreamClient::new(
            fetcher,
            XtreamCredentials::new("host:8080/", "u", "p"),
            Duration::from_secs(5),
        )
    }

    fn action(name: &str) -> String {
        format!("{}&action={}", API, name)
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.respond(
            API,
            200,
            r#"{"user_info":{"username":"u","auth":1,"status":"Active","exp_date":"1893456000","max_connections":"2"},"server_info":{"timezone":"Europe/London"}}"#,
        );

        let account = client(fetcher).authenticate().await.unwrap();
        assert_eq!(account.username, "u");
        assert_eq!(account.max_connections, Some(2));
        assert!(account.expires_at.is_some());
        assert_eq!(account.server_timezone.as_deref(), Some("Europe/London"));
    }

    #[tokio::test]
    async fn test_authenticate_failures_are_typed() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.respond(API, 200, r#"{"user_info":{"auth":0}}"#);
        let err = client(fetcher.clone()).authenticate().await.unwrap_err();
        assert!(matches!(err, XtreamError::AuthenticationFailed(_)));

        fetcher.respond(API, 200, "<html>Login</html>");
        let err = client(fetcher.clone()).authenticate().await.unwrap_err();
        assert!(matches!(err, XtreamError::AuthenticationFailed(_)));

        fetcher.respond(API, 401, "");
        let err = client(fetcher.clone()).authenticate().await.unwrap_err();
        assert!(matches!(err, XtreamError::AuthenticationFailed(_)));

        fetcher.respond(API, 200, r#"{"user_info":{"auth":1,"status":"Expired"}}"#);
        let err = client(fetcher.clone()).authenticate().await.unwrap_err();
        assert!(matches!(err, XtreamError::AuthenticationFailed(_)));

        fetcher.fail(
            API,
            TransportError::Timeout {
                url: "http://host:8080/player_api.php".to_string(),
            },
        );
        let err = client(fetcher).authenticate().await.unwrap_err();
        assert!(matches!(err, XtreamError::Transport(_)));
        assert!(IngestError::from(err).is_retryable());
    }

    #[tokio::test]
    async fn test_list_live_streams_with_categories() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.respond(
            &action("get_live_categories"),
            200,
            r#"[{"category_id":"1","category_name":"News"}]"#,
        );
        fetcher.respond(
            &action("get_live_streams"),
            200,
            r#"[{"name":"CNN","stream_id":9,"category_id":"1"},"garbage"]"#,
        );

        let client = client(fetcher.clone());
        let categories = client.list_categories(CategoryKind::Live).await.unwrap();
        let listing = client.list_live_streams(&categories).await.unwrap();

        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].group_title, "News");
        assert_eq!(listing.entries[0].stream_url, "http://host:8080/live/u/p/9.m3u8");
        assert_eq!(listing.warnings.len(), 1);
        assert_eq!(
            fetcher.requests(),
            vec![action("get_live_categories"), action("get_live_streams")]
        );
    }

    #[tokio::test]
    async fn test_empty_list_shapes() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.respond(&action("get_vod_streams"), 200, "[]");
        fetcher.respond(&action("get_series"), 200, "null");
        fetcher.respond(&action("get_vod_categories"), 200, "");

        let client = client(fetcher);
        assert!(client.list_vod_streams(&[]).await.unwrap().entries.is_empty());
        assert!(client.list_series(&[]).await.unwrap().series.is_empty());
        assert!(client
            .list_categories(CategoryKind::Vod)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_errors() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.respond(&action("get_live_streams"), 503, "");
        fetcher.respond(&action("get_series"), 200, "\"nope\"");

        let client = client(fetcher);
        let err = client.list_live_streams(&[]).await.unwrap_err();
        assert!(matches!(
            err,
            XtreamError::Transport(TransportError::Status { status: 503, .. })
        ));

        let err = client.list_series(&[]).await.unwrap_err();
        assert!(matches!(err, XtreamError::Parse { .. }));
        assert!(matches!(
            IngestError::from(err),
            IngestError::MalformedInput(_)
        ));
    }

    #[tokio::test]
    async fn test_series_detail_request() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.respond(
            &format!("{}&series_id=5", action("get_series_info")),
            200,
            r#"{"info":{"name":"Dark"},"episodes":{"1":[{"id":"101","episode_num":1}]}}"#,
        );

        let detail = client(fetcher)
            .get_series_detail("5", None)
            .await
            .unwrap();
        assert_eq!(detail.name, "Dark");
        assert_eq!(detail.seasons[&1][0].stream_url, "http://host:8080/series/u/p/101.mp4");
    }
}
