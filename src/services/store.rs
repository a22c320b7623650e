//! Persistence boundary of the ingestion core
//!
//! [`CatalogStore`] is what sync writes through and what the HTTP layer reads
//! from. Catalog writes are whole-source replacements: readers see either
//! the old catalog or the new one, never a mix. Favorites live beside the
//! catalog, keyed by (source, stable channel id), so replacing the catalog
//! never touches them.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::models::{
    CatalogSnapshot, Changeset, Channel, EpgChannel, EpgProgram, SourceDescriptor,
};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or wholesale-replace a source descriptor
    async fn save_source(&self, source: &SourceDescriptor) -> Result<(), PersistenceError>;

    async fn get_source(&self, id: Uuid) -> Result<Option<SourceDescriptor>, PersistenceError>;

    async fn list_sources(&self) -> Result<Vec<SourceDescriptor>, PersistenceError>;

    /// Removes the source and everything it owns, favorites included.
    /// Returns false when the source did not exist.
    async fn delete_source(&self, id: Uuid) -> Result<bool, PersistenceError>;

    async fn read_current_catalog(&self, source_id: Uuid)
        -> Result<CatalogSnapshot, PersistenceError>;

    /// Atomically replaces the source's catalog with `changeset.catalog`
    async fn apply_changeset(&self, changeset: &Changeset) -> Result<(), PersistenceError>;

    /// Drops catalog and programme guide of a source, keeping the source
    /// itself and its favorites
    async fn delete_all_for_source(&self, source_id: Uuid) -> Result<(), PersistenceError>;

    /// Atomically replaces the source's programme guide
    async fn replace_epg(
        &self,
        source_id: Uuid,
        channels: &[EpgChannel],
        programs: &[EpgProgram],
    ) -> Result<(), PersistenceError>;

    /// Programmes of a source ordered by start, optionally for one EPG id
    async fn programs(
        &self,
        source_id: Uuid,
        epg_id: Option<&str>,
    ) -> Result<Vec<EpgProgram>, PersistenceError>;

    async fn set_favorite(
        &self,
        source_id: Uuid,
        channel_id: &str,
        favorite: bool,
    ) -> Result<(), PersistenceError>;

    async fn favorites(&self, source_id: Uuid) -> Result<HashSet<String>, PersistenceError>;

    /// Catalog channels joined with favorite state
    async fn channels(&self, source_id: Uuid) -> Result<Vec<Channel>, PersistenceError> {
        let catalog = self.read_current_catalog(source_id).await?;
        let favorites = self.favorites(source_id).await?;
        Ok(catalog
            .channels
            .into_iter()
            .map(|record| Channel {
                is_favorite: favorites.contains(&record.id),
                record,
            })
            .collect())
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    sources: HashMap<Uuid, SourceDescriptor>,
    catalogs: HashMap<Uuid, CatalogSnapshot>,
    epg_channels: HashMap<Uuid, Vec<EpgChannel>>,
    programs: HashMap<Uuid, Vec<EpgProgram>>,
    favorites: HashMap<Uuid, HashSet<String>>,
}

/// Store used when no database is configured. Each write swaps a whole
/// per-source value under one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unknown_source(source_id: Uuid) -> PersistenceError {
    PersistenceError(format!("Unknown source {}", source_id))
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn save_source(&self, source: &SourceDescriptor) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        state.sources.insert(source.id, source.clone());
        Ok(())
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<SourceDescriptor>, PersistenceError> {
        Ok(self.state.read().await.sources.get(&id).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<SourceDescriptor>, PersistenceError> {
        let state = self.state.read().await;
        let mut sources: Vec<SourceDescriptor> = state.sources.values().cloned().collect();
        sources.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(sources)
    }

    async fn delete_source(&self, id: Uuid) -> Result<bool, PersistenceError> {
        let mut state = self.state.write().await;
        let existed = state.sources.remove(&id).is_some();
        state.catalogs.remove(&id);
        state.epg_channels.remove(&id);
        state.programs.remove(&id);
        state.favorites.remove(&id);
        Ok(existed)
    }

    async fn read_current_catalog(
        &self,
        source_id: Uuid,
    ) -> Result<CatalogSnapshot, PersistenceError> {
        let state = self.state.read().await;
        Ok(state.catalogs.get(&source_id).cloned().unwrap_or_default())
    }

    async fn apply_changeset(&self, changeset: &Changeset) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if !state.sources.contains_key(&changeset.source_id) {
            return Err(unknown_source(changeset.source_id));
        }
        state
            .catalogs
            .insert(changeset.source_id, changeset.catalog.clone());
        Ok(())
    }

    async fn delete_all_for_source(&self, source_id: Uuid) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        state.catalogs.remove(&source_id);
        state.epg_channels.remove(&source_id);
        state.programs.remove(&source_id);
        Ok(())
    }

    async fn replace_epg(
        &self,
        source_id: Uuid,
        channels: &[EpgChannel],
        programs: &[EpgProgram],
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if !state.sources.contains_key(&source_id) {
            return Err(unknown_source(source_id));
        }
        let mut sorted = programs.to_vec();
        sorted.sort_by(|a, b| a.start.cmp(&b.start));
        state.epg_channels.insert(source_id, channels.to_vec());
        state.programs.insert(source_id, sorted);
        Ok(())
    }

    async fn programs(
        &self,
        source_id: Uuid,
        epg_id: Option<&str>,
    ) -> Result<Vec<EpgProgram>, PersistenceError> {
        let state = self.state.read().await;
        Ok(state
            .programs
            .get(&source_id)
            .map(|programs| {
                programs
                    .iter()
                    .filter(|p| epg_id.map_or(true, |id| p.channel_id == id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_favorite(
        &self,
        source_id: Uuid,
        channel_id: &str,
        favorite: bool,
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if !state.sources.contains_key(&source_id) {
            return Err(unknown_source(source_id));
        }
        let favorites = state.favorites.entry(source_id).or_default();
        if favorite {
            favorites.insert(channel_id.to_string());
        } else {
            favorites.remove(channel_id);
        }
        Ok(())
    }

    async fn favorites(&self, source_id: Uuid) -> Result<HashSet<String>, PersistenceError> {
        let state = self.state.read().await;
        Ok(state.favorites.get(&source_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
pub mod testing {
    //! Store wrapper that fails writes on demand

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub struct FailingStore {
        pub inner: MemoryStore,
        fail_apply: AtomicBool,
    }

    impl FailingStore {
        pub fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_apply: AtomicBool::new(false),
            }
        }

        pub fn fail_next_apply(&self, fail: bool) {
            self.fail_apply.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CatalogStore for FailingStore {
        async fn save_source(&self, source: &SourceDescriptor) -> Result<(), PersistenceError> {
            self.inner.save_source(source).await
        }

        async fn get_source(&self, id: Uuid) -> Result<Option<SourceDescriptor>, PersistenceError> {
            self.inner.get_source(id).await
        }

        async fn list_sources(&self) -> Result<Vec<SourceDescriptor>, PersistenceError> {
            self.inner.list_sources().await
        }

        async fn delete_source(&self, id: Uuid) -> Result<bool, PersistenceError> {
            self.inner.delete_source(id).await
        }

        async fn read_current_catalog(
            &self,
            source_id: Uuid,
        ) -> Result<CatalogSnapshot, PersistenceError> {
            self.inner.read_current_catalog(source_id).await
        }

        async fn apply_changeset(&self, changeset: &Changeset) -> Result<(), PersistenceError> {
            if self.fail_apply.load(Ordering::SeqCst) {
                return Err(PersistenceError("simulated failure mid-apply".to_string()));
            }
            self.inner.apply_changeset(changeset).await
        }

        async fn delete_all_for_source(&self, source_id: Uuid) -> Result<(), PersistenceError> {
            self.inner.delete_all_for_source(source_id).await
        }

        async fn replace_epg(
            &self,
            source_id: Uuid,
            channels: &[EpgChannel],
            programs: &[EpgProgram],
        ) -> Result<(), PersistenceError> {
            self.inner.replace_epg(source_id, channels, programs).await
        }

        async fn programs(
            &self,
            source_id: Uuid,
            epg_id: Option<&str>,
        ) -> Result<Vec<EpgProgram>, PersistenceError> {
            self.inner.programs(source_id, epg_id).await
        }

        async fn set_favorite(
            &self,
            source_id: Uuid,
            channel_id: &str,
            favorite: bool,
        ) -> Result<(), PersistenceError> {
            self.inner.set_favorite(source_id, channel_id, favorite).await
        }

        async fn favorites(&self, source_id: Uuid) -> Result<HashSet<String>, PersistenceError> {
            self.inner.favorites(source_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelRecord, EntityChanges};
    use chrono::{Duration, Utc};

    fn channel(source_id: Uuid, id: &str) -> ChannelRecord {
        ChannelRecord {
            id: id.to_string(),
            source_id,
            name: id.to_uppercase(),
            stream_url: format!("http://host/{}.ts", id),
            logo_url: None,
            group_title: "News".to_string(),
            epg_id: None,
            catchup_days: 0,
            catchup_source: None,
            channel_number: None,
            order: 0,
        }
    }

    fn changeset(source_id: Uuid, channels: Vec<ChannelRecord>) -> Changeset {
        Changeset {
            source_id,
            catalog: CatalogSnapshot {
                channels,
                ..Default::default()
            },
            channels: EntityChanges::default(),
            movies: EntityChanges::default(),
            series: EntityChanges::default(),
        }
    }

    #[tokio::test]
    async fn test_apply_requires_known_source() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(store.apply_changeset(&changeset(id, vec![])).await.is_err());
    }

    #[tokio::test]
    async fn test_channels_join_favorites() {
        let store = MemoryStore::new();
        let source = SourceDescriptor::m3u("List", "http://host/list.m3u");
        store.save_source(&source).await.unwrap();
        store
            .apply_changeset(&changeset(
                source.id,
                vec![channel(source.id, "a"), channel(source.id, "b")],
            ))
            .await
            .unwrap();
        store.set_favorite(source.id, "b", true).await.unwrap();

        let channels = store.channels(source.id).await.unwrap();
        assert!(!channels[0].is_favorite);
        assert!(channels[1].is_favorite);

        store.set_favorite(source.id, "b", false).await.unwrap();
        assert!(store.favorites(source.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_source_cascades() {
        let store = MemoryStore::new();
        let source = SourceDescriptor::m3u("List", "http://host/list.m3u");
        store.save_source(&source).await.unwrap();
        store
            .apply_changeset(&changeset(source.id, vec![channel(source.id, "a")]))
            .await
            .unwrap();
        store.set_favorite(source.id, "a", true).await.unwrap();

        assert!(store.delete_source(source.id).await.unwrap());
        assert!(store.read_current_catalog(source.id).await.unwrap().is_empty());
        assert!(store.favorites(source.id).await.unwrap().is_empty());
        assert!(!store.delete_source(source.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_for_source_keeps_source() {
        let store = MemoryStore::new();
        let source = SourceDescriptor::m3u("List", "http://host/list.m3u");
        store.save_source(&source).await.unwrap();
        store
            .apply_changeset(&changeset(source.id, vec![channel(source.id, "a")]))
            .await
            .unwrap();
        let now = Utc::now();
        let guide_channel = EpgChannel {
            id: "a".to_string(),
            display_name: "A".to_string(),
            icon: None,
        };
        let program = EpgProgram {
            channel_id: "a".to_string(),
            title: "Morning".to_string(),
            description: None,
            start: now,
            end: now + Duration::hours(1),
            category: None,
            icon: None,
        };
        store
            .replace_epg(source.id, &[guide_channel], &[program])
            .await
            .unwrap();
        store.set_favorite(source.id, "a", true).await.unwrap();

        store.delete_all_for_source(source.id).await.unwrap();

        assert!(store.read_current_catalog(source.id).await.unwrap().is_empty());
        assert!(store.programs(source.id, None).await.unwrap().is_empty());
        assert!(store.get_source(source.id).await.unwrap().is_some());
        assert!(store.favorites(source.id).await.unwrap().contains("a"));

        // Source is still known, so a later sync can repopulate it
        store
            .apply_changeset(&changeset(source.id, vec![channel(source.id, "b")]))
            .await
            .unwrap();
        assert_eq!(store.channels(source.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_epg_and_filter() {
        let store = MemoryStore::new();
        let source = SourceDescriptor::m3u("List", "http://host/list.m3u");
        store.save_source(&source).await.unwrap();

        let now = Utc::now();
        let program = |channel: &str, offset: i64| EpgProgram {
            channel_id: channel.to_string(),
            title: format!("{} {}", channel, offset),
            description: None,
            start: now + Duration::hours(offset),
            end: now + Duration::hours(offset + 1),
            category: None,
            icon: None,
        };

        store
            .replace_epg(source.id, &[], &[program("a", 2), program("b", 0), program("a", 1)])
            .await
            .unwrap();
        let a = store.programs(source.id, Some("a")).await.unwrap();
        assert_eq!(a.len(), 2);
        assert!(a[0].start < a[1].start);

        store
            .replace_epg(source.id, &[], &[program("c", 0)])
            .await
            .unwrap();
        let all = store.programs(source.id, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].channel_id, "c");
    }
}
