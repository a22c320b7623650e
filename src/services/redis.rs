use anyhow::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::models::SyncProgress;
use crate::services::sync::ProgressReporter;

/// Redis service for sync progress publication
#[derive(Clone)]
pub struct RedisService {
    conn: ConnectionManager,
    progress_ttl_seconds: u64,
}

fn progress_key(source_id: Uuid) -> String {
    format!("sync:progress:{}", source_id)
}

impl RedisService {
    /// Create a new Redis service with connection pooling
    pub async fn new(redis_url: &str, progress_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            progress_ttl_seconds,
        })
    }

    /// Set a key with expiration (seconds)
    pub async fn set_ex<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(value)?;
        conn.set_ex::<_, _, ()>(key, serialized, ttl_seconds).await?;
        Ok(())
    }

    /// Get a key and deserialize
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    /// Ping Redis to check connection
    pub async fn ping(&self) -> Result<bool> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }

    // ============ Sync Progress ============

    pub async fn set_sync_progress(&self, progress: &SyncProgress) -> Result<()> {
        self.set_ex(
            &progress_key(progress.source_id),
            progress,
            self.progress_ttl_seconds,
        )
        .await
    }

    pub async fn get_sync_progress(&self, source_id: Uuid) -> Result<Option<SyncProgress>> {
        self.get(&progress_key(source_id)).await
    }
}

#[async_trait]
impl ProgressReporter for RedisService {
    async fn report(&self, progress: SyncProgress) {
        // Progress is advisory; a Redis outage must not fail the sync
        if let Err(e) = self.set_sync_progress(&progress).await {
            tracing::warn!(
                source_id = %progress.source_id,
                stage = %progress.stage,
                "Failed to publish sync progress: {}",
                e
            );
        }
    }

    async fn latest(&self, source_id: Uuid) -> Option<SyncProgress> {
        match self.get_sync_progress(source_id).await {
            Ok(progress) => progress,
            Err(e) => {
                tracing::warn!(source_id = %source_id, "Failed to read sync progress: {}", e);
                None
            }
        }
    }
}
