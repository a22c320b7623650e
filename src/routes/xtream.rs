//! Xtream Codes helper routes

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{api_error, ingest_error, parse_uuid, persistence_error, ApiError};
use crate::services::xtream::XtreamCredentials;
use crate::AppState;

// ============================================================================
// Query Parameters
// ============================================================================

/// Either `source_id` of a stored Xtream source, or inline credentials
#[derive(Debug, Deserialize)]
pub struct CatchupQuery {
    pub stream_id: String,
    /// RFC 3339 programme start
    pub start: String,
    /// Minutes
    pub duration: u32,
    pub source_id: Option<String>,
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct CatchupUrlResponse {
    pub url: String,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /api/xtream/catchup-url
pub async fn get_catchup_url(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatchupQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let start = DateTime::parse_from_rfc3339(query.start.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "start must be an RFC 3339 timestamp"))?;

    if query.stream_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "stream_id is required"));
    }

    let creds = match &query.source_id {
        Some(source_id) => {
            let source_uuid = parse_uuid(source_id)?;
            let source = state
                .store
                .get_source(source_uuid)
                .await
                .map_err(persistence_error)?
                .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Source not found"))?;
            state
                .orchestrator
                .xtream_credentials(&source)
                .map_err(ingest_error)?
        }
        None => match (&query.server, &query.username, &query.password) {
            (Some(server), Some(username), Some(password)) => {
                XtreamCredentials::new(server, username, password)
            }
            _ => {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "Provide source_id or server, username and password",
                ))
            }
        },
    };

    Ok(Json(CatchupUrlResponse {
        url: creds.catchup_url(query.stream_id.trim(), start, query.duration),
    }))
}
