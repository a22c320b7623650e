//! Source synchronization
//!
//! - **Orchestrator**: fetch, parse, diff and persist one source
//! - **Diff**: added/changed/removed sets keyed by stable id
//! - **Progress**: stage transitions published for status polling

pub mod diff;
pub mod orchestrator;

pub use diff::compute_changeset;
pub use orchestrator::{EpgRefresh, SyncOrchestrator};

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::SyncProgress;

/// Sink for stage transitions of running syncs
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Publishes a transition. Never fails the sync.
    async fn report(&self, progress: SyncProgress);

    async fn latest(&self, source_id: Uuid) -> Option<SyncProgress>;
}

/// Keeps the last transition per source in process memory
#[derive(Debug, Default)]
pub struct MemoryProgress {
    latest: RwLock<HashMap<Uuid, SyncProgress>>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressReporter for MemoryProgress {
    async fn report(&self, progress: SyncProgress) {
        self.latest.write().await.insert(progress.source_id, progress);
    }

    async fn latest(&self, source_id: Uuid) -> Option<SyncProgress> {
        self.latest.read().await.get(&source_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStage;

    #[tokio::test]
    async fn test_memory_progress_keeps_last_stage() {
        let progress = MemoryProgress::new();
        let id = Uuid::new_v4();
        assert!(progress.latest(id).await.is_none());

        progress.report(SyncProgress::new(id, SyncStage::Fetching)).await;
        progress.report(SyncProgress::new(id, SyncStage::Parsing)).await;

        let latest = progress.latest(id).await.unwrap();
        assert_eq!(latest.stage, SyncStage::Parsing);
    }
}
