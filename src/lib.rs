//! AtivePlay catalog ingestion
//!
//! Turns IPTV provider sources (M3U playlists, Xtream Codes panels, XMLTV
//! guides) into a normalized catalog of live channels, movies and series,
//! and keeps it in sync with the upstream provider.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::services::credentials::CredentialCipher;
use crate::services::http::HttpFetch;
use crate::services::redis::RedisService;
use crate::services::store::CatalogStore;
use crate::services::sync::SyncOrchestrator;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CatalogStore>,
    /// Set when the catalog lives in PostgreSQL
    pub pool: Option<PgPool>,
    /// Set when sync progress is published to Redis
    pub redis: Option<RedisService>,
    pub orchestrator: SyncOrchestrator,
    pub http: Arc<dyn HttpFetch>,
    pub cipher: Arc<dyn CredentialCipher>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn CatalogStore>,
        http: Arc<dyn HttpFetch>,
        cipher: Arc<dyn CredentialCipher>,
    ) -> Self {
        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            http.clone(),
            cipher.clone(),
            config.sync_options(),
        );
        Self {
            config,
            store,
            pool: None,
            redis: None,
            orchestrator,
            http,
            cipher,
            start_time: Instant::now(),
        }
    }

    /// Publishes sync progress to Redis instead of process memory
    pub fn with_redis(mut self, redis: RedisService) -> Self {
        self.orchestrator = self.orchestrator.with_progress(Arc::new(redis.clone()));
        self.redis = Some(redis);
        self
    }

    /// Pool checked by the health endpoints
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/ready", get(routes::health::ready))
        .route("/live", get(routes::health::live))
        // Stateless parsing
        .route("/api/m3u/parse", post(routes::parse::parse_playlist))
        .route("/api/xmltv/parse", post(routes::parse::parse_epg))
        // Sources
        .route(
            "/api/sources",
            get(routes::sources::list_sources).post(routes::sources::create_source),
        )
        .route(
            "/api/sources/:id",
            get(routes::sources::get_source).delete(routes::sources::delete_source),
        )
        .route("/api/sources/:id/sync", post(routes::sources::sync_source))
        .route("/api/sources/:id/status", get(routes::sources::get_status))
        .route("/api/sources/:id/catalog", get(routes::sources::get_catalog))
        .route("/api/sources/:id/epg", get(routes::sources::get_epg))
        .route(
            "/api/sources/:id/epg/refresh",
            post(routes::sources::refresh_epg),
        )
        .route(
            "/api/sources/:id/channels/:channel_id/favorite",
            put(routes::sources::set_favorite),
        )
        .route(
            "/api/sources/:id/series/:series_id/detail",
            get(routes::sources::get_series_detail),
        )
        .route(
            "/api/sources/:id/vod/:vod_id/detail",
            get(routes::sources::get_vod_detail),
        )
        // Xtream helpers
        .route(
            "/api/xtream/catchup-url",
            get(routes::xtream::get_catchup_url),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::services::credentials::PlaintextCipher;
    use crate::services::http::testing::FakeFetcher;
    use crate::services::store::MemoryStore;

    const PLAYLIST_URL: &str = "http://host/list.m3u";

    const PLAYLIST: &str = "#EXTM3U\n\
        #EXTINF:-1 tvg-id=\"bbc1\" group-title=\"UK\",BBC One\n\
        http://host/live/bbc1.ts\n\
        #EXTINF:-1 group-title=\"Films\",Inception\n\
        http://host/vod/123.mp4\n";

    fn test_app(fetcher: Arc<FakeFetcher>) -> Router {
        let state = AppState::new(
            Config::from_env(),
            Arc::new(MemoryStore::new()),
            fetcher,
            Arc::new(PlaintextCipher),
        );
        build_router(Arc::new(state))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_live_and_root() {
        let app = test_app(Arc::new(FakeFetcher::new()));
        let (status, body) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn test_parse_playlist_endpoint() {
        let app = test_app(Arc::new(FakeFetcher::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/api/m3u/parse")
            .body(Body::from(PLAYLIST))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["channels"].as_array().unwrap().len(), 1);
        assert_eq!(body["movies"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_xmltv_is_unprocessable() {
        let app = test_app(Arc::new(FakeFetcher::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/api/xmltv/parse")
            .body(Body::from("<tv><programme></tv>"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_create_source_detects_xtream_and_hides_password() {
        let app = test_app(Arc::new(FakeFetcher::new()));
        let (status, body) = send(
            &app,
            "POST",
            "/api/sources",
            Some(serde_json::json!({
                "name": "Panel",
                "url": "http://panel.tv:8080/get.php?username=u&password=p&type=m3u_plus"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["kind"], "xtream");
        assert_eq!(body["endpoint"], "http://panel.tv:8080");
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn test_invalid_and_unknown_source_ids() {
        let app = test_app(Arc::new(FakeFetcher::new()));
        let (status, _) = send(&app, "GET", "/api/sources/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/sources/{}", uuid::Uuid::new_v4());
        let (status, _) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sync_then_favorite_shows_in_catalog() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.respond(PLAYLIST_URL, 200, PLAYLIST);
        let app = test_app(fetcher);

        let (_, source) = send(
            &app,
            "POST",
            "/api/sources",
            Some(serde_json::json!({ "name": "List", "kind": "m3u", "url": PLAYLIST_URL })),
        )
        .await;
        let id = source["id"].as_str().unwrap().to_string();

        let (status, result) = send(&app, "POST", &format!("/api/sources/{}/sync", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["status"], "completed");
        assert_eq!(result["channels"]["added"], 1);

        let (_, progress) = send(&app, "GET", &format!("/api/sources/{}/status", id), None).await;
        assert_eq!(progress["stage"], "completed");

        let (_, catalog) = send(&app, "GET", &format!("/api/sources/{}/catalog", id), None).await;
        let channel_id = catalog["channels"][0]["id"].as_str().unwrap().to_string();
        assert_eq!(catalog["channels"][0]["isFavorite"], false);

        let uri = format!("/api/sources/{}/channels/{}/favorite", id, channel_id);
        let (status, _) = send(&app, "PUT", &uri, Some(serde_json::json!({ "favorite": true }))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, catalog) = send(&app, "GET", &format!("/api/sources/{}/catalog", id), None).await;
        assert_eq!(catalog["channels"][0]["isFavorite"], true);
        assert_eq!(catalog["movies"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "DELETE", &format!("/api/sources/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &format!("/api/sources/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_sync_is_reported_in_body() {
        let app = test_app(Arc::new(FakeFetcher::new()));
        let (_, source) = send(
            &app,
            "POST",
            "/api/sources",
            Some(serde_json::json!({ "name": "Gone", "url": "http://host/missing.m3u" })),
        )
        .await;
        let id = source["id"].as_str().unwrap().to_string();

        let (status, result) = send(&app, "POST", &format!("/api/sources/{}/sync", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["status"], "failed");
        assert_eq!(result["kind"], "fetch_error");
    }

    #[tokio::test]
    async fn test_catchup_url_with_inline_credentials() {
        let app = test_app(Arc::new(FakeFetcher::new()));
        let (status, body) = send(
            &app,
            "GET",
            "/api/xtream/catchup-url?stream_id=42&start=2024-03-09T20:05:00Z&duration=90\
             &server=host:8080&username=u&password=p",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["url"],
            "http://host:8080/timeshift/u/p/90/2024-03-09:20-05/42.m3u8"
        );
    }

    #[tokio::test]
    async fn test_vod_detail_rejects_m3u_source() {
        let app = test_app(Arc::new(FakeFetcher::new()));
        let (_, source) = send(
            &app,
            "POST",
            "/api/sources",
            Some(serde_json::json!({ "name": "List", "url": PLAYLIST_URL })),
        )
        .await;
        let id = source["id"].as_str().unwrap().to_string();

        let uri = format!("/api/sources/{}/vod/7/detail", id);
        let (status, _) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
