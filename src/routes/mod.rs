//! HTTP handlers
//!
//! Thin glue over the ingestion core: every handler validates its input,
//! calls one service operation and maps the outcome to JSON.

pub mod health;
pub mod parse;
pub mod sources;
pub mod xtream;

use axum::{http::StatusCode, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{IngestError, PersistenceError};

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
}

fn parse_uuid(s: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(s).map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid source ID format"))
}

fn persistence_error(err: PersistenceError) -> ApiError {
    tracing::error!("Database error: {}", err);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
}

/// Maps a core failure to a status code
fn ingest_error(err: IngestError) -> ApiError {
    let status = match &err {
        IngestError::Transport(_) => StatusCode::BAD_GATEWAY,
        IngestError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
        IngestError::MalformedInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        IngestError::Credentials(_) => StatusCode::BAD_REQUEST,
        IngestError::Cancelled => StatusCode::CONFLICT,
        IngestError::Persistence(e) => return persistence_error(e.clone()),
    };
    tracing::warn!("Request failed: {}", err);
    api_error(status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn test_ingest_error_status_mapping() {
        let (status, _) = ingest_error(IngestError::MalformedInput("not xml".into()));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = ingest_error(IngestError::from(TransportError::Status {
            url: "http://host".into(),
            status: 503,
        }));
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) =
            ingest_error(IngestError::Persistence(PersistenceError("secret detail".into())));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0["error"], "Database error");
    }
}
