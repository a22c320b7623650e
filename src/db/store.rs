//! PostgreSQL implementation of the catalog store
//!
//! Every catalog or guide replacement runs in one transaction: delete the
//! source's rows, COPY the new ones in, commit. The source row is locked
//! `FOR UPDATE` first so two processes cannot interleave replacements.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use super::repository::{channels, epg, favorites, movies, series, sources};
use crate::error::PersistenceError;
use crate::models::{CatalogSnapshot, Changeset, EpgChannel, EpgProgram, SourceDescriptor};
use crate::services::store::CatalogStore;

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begins a transaction holding the source row lock
    async fn begin_for_source(
        &self,
        source_id: Uuid,
    ) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM sources WHERE id = $1 FOR UPDATE")
                .bind(source_id)
                .fetch_optional(&mut *tx)
                .await?;

        if locked.is_none() {
            return Err(PersistenceError(format!("Unknown source {}", source_id)));
        }
        Ok(tx)
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn save_source(&self, source: &SourceDescriptor) -> Result<(), PersistenceError> {
        sources::upsert_source(&self.pool, source).await?;
        Ok(())
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<SourceDescriptor>, PersistenceError> {
        let row = sources::find_by_id(&self.pool, id).await?;
        Ok(row.map(|r| r.into_descriptor()))
    }

    async fn list_sources(&self) -> Result<Vec<SourceDescriptor>, PersistenceError> {
        let rows = sources::list_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.into_descriptor()).collect())
    }

    async fn delete_source(&self, id: Uuid) -> Result<bool, PersistenceError> {
        Ok(sources::delete_source(&self.pool, id).await?)
    }

    async fn read_current_catalog(
        &self,
        source_id: Uuid,
    ) -> Result<CatalogSnapshot, PersistenceError> {
        // One snapshot for all three tables, so a concurrent replace is
        // seen entirely or not at all
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let channels = channels::get_by_source(&mut tx, source_id).await?;
        let movies = movies::get_by_source(&mut tx, source_id).await?;
        let series = series::get_with_episodes(&mut tx, source_id).await?;
        tx.commit().await?;

        Ok(CatalogSnapshot {
            channels: channels.into_iter().map(Into::into).collect(),
            movies: movies.into_iter().map(Into::into).collect(),
            series,
        })
    }

    async fn apply_changeset(&self, changeset: &Changeset) -> Result<(), PersistenceError> {
        let source_id = changeset.source_id;
        let catalog = &changeset.catalog;
        let mut tx = self.begin_for_source(source_id).await?;

        channels::delete_by_source(&mut tx, source_id).await?;
        movies::delete_by_source(&mut tx, source_id).await?;
        series::delete_by_source(&mut tx, source_id).await?;

        channels::insert_many(&mut tx, &catalog.channels).await?;
        movies::insert_many(&mut tx, &catalog.movies).await?;
        series::insert_many(&mut tx, &catalog.series).await?;

        tx.commit().await?;

        debug!(
            source_id = %source_id,
            channels = catalog.channels.len(),
            movies = catalog.movies.len(),
            series = catalog.series.len(),
            "Catalog replaced"
        );
        Ok(())
    }

    async fn delete_all_for_source(&self, source_id: Uuid) -> Result<(), PersistenceError> {
        let mut tx = self.begin_for_source(source_id).await?;

        channels::delete_by_source(&mut tx, source_id).await?;
        movies::delete_by_source(&mut tx, source_id).await?;
        series::delete_by_source(&mut tx, source_id).await?;
        epg::delete_by_source(&mut tx, source_id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn replace_epg(
        &self,
        source_id: Uuid,
        channels: &[EpgChannel],
        programs: &[EpgProgram],
    ) -> Result<(), PersistenceError> {
        let mut tx = self.begin_for_source(source_id).await?;

        epg::delete_by_source(&mut tx, source_id).await?;
        epg::insert_channels(&mut tx, source_id, channels).await?;
        epg::insert_programs(&mut tx, source_id, programs).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn programs(
        &self,
        source_id: Uuid,
        epg_id: Option<&str>,
    ) -> Result<Vec<EpgProgram>, PersistenceError> {
        let rows = epg::get_programs(&self.pool, source_id, epg_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_favorite(
        &self,
        source_id: Uuid,
        channel_id: &str,
        favorite: bool,
    ) -> Result<(), PersistenceError> {
        if favorite {
            favorites::add(&self.pool, source_id, channel_id).await?;
        } else {
            favorites::remove(&self.pool, source_id, channel_id).await?;
        }
        Ok(())
    }

    async fn favorites(&self, source_id: Uuid) -> Result<HashSet<String>, PersistenceError> {
        let ids = favorites::get_by_source(&self.pool, source_id).await?;
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelRecord, EntityChanges};
    use sqlx::postgres::PgPoolOptions;

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_replacement_futures_are_send() {
        // Lazy pool: nothing connects unless a future is polled
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/ativeplay")
            .unwrap();
        let store = PgCatalogStore::new(pool);
        let source_id = Uuid::new_v4();

        let mut catalog = CatalogSnapshot::default();
        catalog.channels.push(ChannelRecord {
            id: "abc".to_string(),
            source_id,
            name: "BBC One".to_string(),
            stream_url: "http://host/1.ts".to_string(),
            logo_url: None,
            group_title: "UK".to_string(),
            epg_id: None,
            catchup_days: 0,
            catchup_source: None,
            channel_number: None,
            order: 0,
        });
        let changeset = Changeset {
            source_id,
            catalog,
            channels: EntityChanges::default(),
            movies: EntityChanges::default(),
            series: EntityChanges::default(),
        };

        let apply = store.apply_changeset(&changeset);
        assert_send(&apply);
        let guide = store.replace_epg(source_id, &[], &[]);
        assert_send(&guide);
        let purge = store.delete_all_for_source(source_id);
        assert_send(&purge);
    }
}
