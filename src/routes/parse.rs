//! Stateless parse endpoints

use axum::{response::IntoResponse, Json};

use super::{ingest_error, ApiError};
use crate::services::epg_parser::parse_xmltv;
use crate::services::m3u_parser::parse_m3u;

/// POST /api/m3u/parse - raw playlist text in, classified catalog out
pub async fn parse_playlist(body: String) -> Result<impl IntoResponse, ApiError> {
    let catalog = parse_m3u(&body).map_err(ingest_error)?;

    tracing::debug!(
        entries = catalog.total_entries(),
        warnings = catalog.warnings.len(),
        "Playlist parsed"
    );
    Ok(Json(catalog))
}

/// POST /api/xmltv/parse - raw XMLTV in, channels and programmes out
pub async fn parse_epg(body: String) -> Result<impl IntoResponse, ApiError> {
    let document = parse_xmltv(&body).map_err(ingest_error)?;
    Ok(Json(document))
}
