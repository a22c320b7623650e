use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CatalogSnapshot, EntryWarning};
use crate::error::IngestError;

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    Idle,
    Fetching,
    Parsing,
    Diffing,
    Persisting,
    Completed,
    Failed,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStage::Idle => "idle",
            SyncStage::Fetching => "fetching",
            SyncStage::Parsing => "parsing",
            SyncStage::Diffing => "diffing",
            SyncStage::Persisting => "persisting",
            SyncStage::Completed => "completed",
            SyncStage::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Added/changed/removed counts for one entity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCounts {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

impl ChangeCounts {
    pub fn is_zero(&self) -> bool {
        self.added == 0 && self.changed == 0 && self.removed == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    FetchError,
    AuthenticationFailed,
    MalformedInput,
    PersistenceFailure,
    CredentialError,
    Cancelled,
}

impl FailureKind {
    /// Wire name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::FetchError => "fetch_error",
            FailureKind::AuthenticationFailed => "authentication_failed",
            FailureKind::MalformedInput => "malformed_input",
            FailureKind::PersistenceFailure => "persistence_failure",
            FailureKind::CredentialError => "credential_error",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl From<&IngestError> for FailureKind {
    fn from(err: &IngestError) -> Self {
        match err {
            IngestError::Transport(_) => FailureKind::FetchError,
            IngestError::AuthenticationFailed(_) => FailureKind::AuthenticationFailed,
            IngestError::MalformedInput(_) => FailureKind::MalformedInput,
            IngestError::Persistence(_) => FailureKind::PersistenceFailure,
            IngestError::Credentials(_) => FailureKind::CredentialError,
            IngestError::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// Terminal status of a sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncStatus {
    Completed,
    #[serde(rename_all = "camelCase")]
    Failed {
        kind: FailureKind,
        message: String,
        retryable: bool,
    },
}

/// Stable ids added, changed and removed for one entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChanges {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl EntityChanges {
    pub fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            added: self.added.len(),
            changed: self.changed.len(),
            removed: self.removed.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Everything persisting one sync needs: the full replacement catalog of
/// the source, plus what changed relative to the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    pub source_id: Uuid,
    pub catalog: CatalogSnapshot,
    pub channels: EntityChanges,
    pub movies: EntityChanges,
    pub series: EntityChanges,
}

impl Changeset {
    pub fn is_noop(&self) -> bool {
        self.channels.is_empty() && self.movies.is_empty() && self.series.is_empty()
    }
}

/// Summary of one orchestration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub source_id: Uuid,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub channels: ChangeCounts,
    pub movies: ChangeCounts,
    pub series: ChangeCounts,
    pub warnings: Vec<EntryWarning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Completed
    }

    pub fn total_changes(&self) -> usize {
        [self.channels, self.movies, self.series]
            .iter()
            .map(|c| c.added + c.changed + c.removed)
            .sum()
    }

    /// Single human-readable line for a failed run
    pub fn failure_summary(&self) -> Option<String> {
        match &self.status {
            SyncStatus::Completed => None,
            SyncStatus::Failed { message, .. } if self.warnings.is_empty() => {
                Some(message.clone())
            }
            SyncStatus::Failed { message, .. } => Some(format!(
                "{} ({} warnings)",
                message,
                self.warnings.len()
            )),
        }
    }
}

/// Progress record published while a sync runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub source_id: Uuid,
    pub stage: SyncStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: i64,
}

impl SyncProgress {
    pub fn new(source_id: Uuid, stage: SyncStage) -> Self {
        Self {
            source_id,
            stage,
            message: None,
            updated_at: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WarningKind;

    fn failed_result(warnings: usize) -> SyncResult {
        SyncResult {
            source_id: Uuid::new_v4(),
            status: SyncStatus::Failed {
                kind: FailureKind::FetchError,
                message: "HTTP 503 from http://host/list.m3u".to_string(),
                retryable: true,
            },
            channels: ChangeCounts::default(),
            movies: ChangeCounts::default(),
            series: ChangeCounts::default(),
            warnings: (0..warnings)
                .map(|i| EntryWarning::new(WarningKind::MissingStreamUrl, format!("line {}", i)))
                .collect(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_failure_summary_includes_warning_count() {
        assert_eq!(
            failed_result(0).failure_summary().as_deref(),
            Some("HTTP 503 from http://host/list.m3u")
        );
        assert_eq!(
            failed_result(2).failure_summary().as_deref(),
            Some("HTTP 503 from http://host/list.m3u (2 warnings)")
        );
    }

    #[test]
    fn test_failure_kind_names_match_serde() {
        for kind in [
            FailureKind::FetchError,
            FailureKind::AuthenticationFailed,
            FailureKind::MalformedInput,
            FailureKind::PersistenceFailure,
            FailureKind::CredentialError,
            FailureKind::Cancelled,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
    }

    #[test]
    fn test_status_serializes_flat() {
        let json = serde_json::to_value(failed_result(0)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "fetch_error");
        assert_eq!(json["retryable"], true);
    }
}
