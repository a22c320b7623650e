//! Source management, sync and catalog read routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{api_error, ingest_error, parse_uuid, persistence_error, ApiError};
use crate::models::{
    Channel, EpgProgram, MovieRecord, SeriesRecord, SourceDescriptor, SourceKind, SyncProgress,
    SyncStage,
};
use crate::services::xtream::detect_xtream_source;
use crate::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSourceRequest {
    pub name: String,
    /// "m3u" or "xtream"; detected from `url` when omitted
    pub kind: Option<String>,
    /// Playlist URL (M3U sources)
    pub url: Option<String>,
    /// Panel base URL (Xtream sources)
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub epg_url: Option<String>,
}

#[derive(Serialize)]
pub struct SourcesResponse {
    pub total: usize,
    pub sources: Vec<SourceDescriptor>,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    pub channels: Vec<Channel>,
    pub movies: Vec<MovieRecord>,
    pub series: Vec<SeriesRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EpgQuery {
    pub channel: Option<String>,
}

#[derive(Serialize)]
pub struct ProgramsResponse {
    pub total: usize,
    pub programs: Vec<EpgProgram>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub favorite: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeriesDetailQuery {
    /// Used when the provider omits the series name
    pub name: Option<String>,
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn load_source(state: &AppState, id: &str) -> Result<SourceDescriptor, ApiError> {
    let source_id = parse_uuid(id)?;
    state
        .store
        .get_source(source_id)
        .await
        .map_err(persistence_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Source not found"))
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, format!("{} is required", field)))
}

fn descriptor_from_request(
    state: &AppState,
    req: &CreateSourceRequest,
) -> Result<SourceDescriptor, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "name is required"));
    }

    let kind = match req.kind.as_deref() {
        Some(kind) => Some(kind.parse::<SourceKind>().map_err(|_| {
            api_error(StatusCode::BAD_REQUEST, "Invalid kind. Use: m3u or xtream")
        })?),
        None => None,
    };

    let source = match kind {
        Some(SourceKind::Xtream) => {
            let server = required(&req.server, "server")?;
            let username = required(&req.username, "username")?;
            let password = required(&req.password, "password")?;
            SourceDescriptor::xtream(name, server, username, &state.cipher.encrypt(password))
        }
        Some(SourceKind::M3u) => SourceDescriptor::m3u(name, required(&req.url, "url")?),
        None => {
            let url = required(&req.url, "url")?;
            detect_xtream_source(name, url, state.cipher.as_ref())
                .unwrap_or_else(|| SourceDescriptor::m3u(name, url))
        }
    };

    let epg_url = req
        .epg_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    Ok(source.with_epg_url(epg_url))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /api/sources
pub async fn create_source(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let source = descriptor_from_request(&state, &req)?;
    state
        .store
        .save_source(&source)
        .await
        .map_err(persistence_error)?;

    tracing::info!(source_id = %source.id, kind = %source.kind, "Source created");
    Ok((StatusCode::CREATED, Json(source)))
}

/// GET /api/sources
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let sources = state.store.list_sources().await.map_err(persistence_error)?;
    Ok(Json(SourcesResponse {
        total: sources.len(),
        sources,
    }))
}

/// GET /api/sources/:id
pub async fn get_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load_source(&state, &id).await?))
}

/// DELETE /api/sources/:id - source, catalog, guide and favorites
pub async fn delete_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let source_id = parse_uuid(&id)?;
    let deleted = state
        .store
        .delete_source(source_id)
        .await
        .map_err(persistence_error)?;

    if !deleted {
        return Err(api_error(StatusCode::NOT_FOUND, "Source not found"));
    }
    tracing::info!(source_id = %source_id, "Source deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sources/:id/sync
///
/// Runs the sync to completion. A failed sync is still a 200: the outcome
/// lives in the result's status.
pub async fn sync_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let source = load_source(&state, &id).await?;
    let result = state.orchestrator.sync(&source).await;
    Ok(Json(result))
}

/// GET /api/sources/:id/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let source = load_source(&state, &id).await?;
    let progress = state
        .orchestrator
        .progress()
        .latest(source.id)
        .await
        .unwrap_or_else(|| SyncProgress::new(source.id, SyncStage::Idle));
    Ok(Json(progress))
}

/// GET /api/sources/:id/catalog
pub async fn get_catalog(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let source = load_source(&state, &id).await?;
    let channels = state
        .store
        .channels(source.id)
        .await
        .map_err(persistence_error)?;
    let catalog = state
        .store
        .read_current_catalog(source.id)
        .await
        .map_err(persistence_error)?;

    Ok(Json(CatalogResponse {
        channels,
        movies: catalog.movies,
        series: catalog.series,
    }))
}

/// GET /api/sources/:id/epg?channel=
pub async fn get_epg(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EpgQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let source = load_source(&state, &id).await?;
    let programs = state
        .store
        .programs(source.id, query.channel.as_deref())
        .await
        .map_err(persistence_error)?;

    Ok(Json(ProgramsResponse {
        total: programs.len(),
        programs,
    }))
}

/// POST /api/sources/:id/epg/refresh
pub async fn refresh_epg(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let source = load_source(&state, &id).await?;
    let refresh = state
        .orchestrator
        .refresh_epg(&source)
        .await
        .map_err(ingest_error)?;
    Ok(Json(refresh))
}

/// PUT /api/sources/:id/channels/:channel_id/favorite
pub async fn set_favorite(
    State(state): State<Arc<AppState>>,
    Path((id, channel_id)): Path<(String, String)>,
    Json(req): Json<FavoriteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let source = load_source(&state, &id).await?;
    state
        .store
        .set_favorite(source.id, &channel_id, req.favorite)
        .await
        .map_err(persistence_error)?;

    Ok(Json(serde_json::json!({
        "channelId": channel_id,
        "favorite": req.favorite,
    })))
}

/// GET /api/sources/:id/series/:series_id/detail
pub async fn get_series_detail(
    State(state): State<Arc<AppState>>,
    Path((id, series_id)): Path<(String, String)>,
    Query(query): Query<SeriesDetailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let source = load_source(&state, &id).await?;
    let client = state
        .orchestrator
        .xtream_client(&source)
        .map_err(ingest_error)?;

    let detail = client
        .get_series_detail(&series_id, query.name.as_deref())
        .await
        .map_err(|e| ingest_error(e.into()))?;
    Ok(Json(detail))
}

/// GET /api/sources/:id/vod/:vod_id/detail
pub async fn get_vod_detail(
    State(state): State<Arc<AppState>>,
    Path((id, vod_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let source = load_source(&state, &id).await?;
    let client = state
        .orchestrator
        .xtream_client(&source)
        .map_err(ingest_error)?;

    let detail = client
        .get_vod_detail(&vod_id)
        .await
        .map_err(|e| ingest_error(e.into()))?;
    Ok(Json(detail))
}
