//! Sync state machine for one source
//!
//! `Idle → Fetching → Parsing → Diffing → Persisting → {Completed | Failed}`.
//! Every stage boundary is a cancellation checkpoint, and nothing reaches the
//! store before Persisting. Syncs of the same source are serialized through a
//! per-source lock; different sources run independently.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{compute_changeset, MemoryProgress, ProgressReporter};
use crate::config::SyncOptions;
use crate::error::{redact_url, IngestError, TransportError};
use crate::models::{
    CatalogSnapshot, ChangeCounts, Changeset, ChannelRecord, EntryWarning, Episode, FailureKind,
    MovieRecord, ParsedCatalog, SeriesRecord, SourceDescriptor, SourceKind, SyncProgress,
    SyncResult, SyncStage, SyncStatus, WarningKind,
};
use crate::services::classifier::ContentClassifier;
use crate::services::credentials::CredentialCipher;
use crate::services::epg_parser::parse_xmltv;
use crate::services::http::{HttpFetch, HttpResponse};
use crate::services::m3u_parser::M3uParser;
use crate::services::metrics;
use crate::services::series_grouper::series_record;
use crate::services::store::CatalogStore;
use crate::services::xtream::{CategoryKind, XtreamClient, XtreamCredentials};

/// Outcome of one programme guide refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpgRefresh {
    pub channels: usize,
    pub programs: usize,
    pub warnings: Vec<EntryWarning>,
}

/// Upstream catalog ready for diffing
struct Fetched {
    snapshot: CatalogSnapshot,
    /// EPG URL announced by the playlist header
    epg_hint: Option<String>,
}

pub struct SyncOrchestrator {
    store: Arc<dyn CatalogStore>,
    http: Arc<dyn HttpFetch>,
    cipher: Arc<dyn CredentialCipher>,
    progress: Arc<dyn ProgressReporter>,
    parser: M3uParser,
    options: SyncOptions,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        http: Arc<dyn HttpFetch>,
        cipher: Arc<dyn CredentialCipher>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            http,
            cipher,
            progress: Arc::new(MemoryProgress::new()),
            parser: M3uParser::new(),
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_classifier(mut self, classifier: ContentClassifier) -> Self {
        self.parser = M3uParser::with_classifier(classifier);
        self
    }

    pub fn progress(&self) -> &Arc<dyn ProgressReporter> {
        &self.progress
    }

    async fn source_lock(&self, source_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(source_id).or_default().clone()
    }

    /// Forgets the source's lock once nobody else holds or awaits it.
    /// Clones are only handed out under the map lock, so the count is stable here.
    async fn release_lock(&self, source_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&source_id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Runs a full sync. Never errors: failures are reported in the result.
    pub async fn sync(&self, source: &SourceDescriptor) -> SyncResult {
        self.sync_with_cancel(source, &CancellationToken::new()).await
    }

    pub async fn sync_with_cancel(
        &self,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let lock = self.source_lock(source.id).await;
        let result = {
            let _guard = lock.lock().await;
            self.sync_locked(source, cancel).await
        };
        self.release_lock(source.id, lock).await;
        result
    }

    async fn sync_locked(
        &self,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let started_at = Utc::now();
        let mut warnings = Vec::new();
        info!(source_id = %source.id, kind = %source.kind, "Sync started");

        let outcome = self.run(source, cancel, &mut warnings).await;

        let (status, counts) = match outcome {
            Ok(changeset) => {
                self.report(source.id, SyncStage::Completed, None).await;
                let counts = [
                    changeset.channels.counts(),
                    changeset.movies.counts(),
                    changeset.series.counts(),
                ];
                info!(
                    source_id = %source.id,
                    channels = ?counts[0],
                    movies = ?counts[1],
                    series = ?counts[2],
                    warnings = warnings.len(),
                    "Sync completed"
                );
                (SyncStatus::Completed, counts)
            }
            Err(err) => {
                self.report(source.id, SyncStage::Failed, Some(err.to_string()))
                    .await;
                let status = SyncStatus::Failed {
                    kind: FailureKind::from(&err),
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                };
                (status, [ChangeCounts::default(); 3])
            }
        };

        let result = SyncResult {
            source_id: source.id,
            status,
            channels: counts[0],
            movies: counts[1],
            series: counts[2],
            warnings,
            started_at,
            finished_at: Utc::now(),
        };
        if let Some(summary) = result.failure_summary() {
            error!(source_id = %source.id, "Sync failed: {}", summary);
        }
        metrics::record_sync(source.kind, &result);
        result
    }

    /// Syncs several sources, at most `concurrency` at once. Results come
    /// back in input order.
    pub async fn sync_many(&self, sources: &[SourceDescriptor]) -> Vec<SyncResult> {
        stream::iter(sources)
            .map(|source| self.sync(source))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await
    }

    /// Replaces the source's programme guide from its EPG URL: the explicit
    /// one, else the Xtream `xmltv.php` endpoint.
    pub async fn refresh_epg(&self, source: &SourceDescriptor) -> Result<EpgRefresh, IngestError> {
        let lock = self.source_lock(source.id).await;
        let outcome = {
            let _guard = lock.lock().await;
            match self.epg_url_for(source, None) {
                Ok(Some(url)) => {
                    self.refresh_epg_from(source, &url, &CancellationToken::new())
                        .await
                }
                Ok(None) => Err(IngestError::MalformedInput(format!(
                    "Source {} has no EPG URL",
                    source.id
                ))),
                Err(err) => Err(err),
            }
        };
        self.release_lock(source.id, lock).await;
        outcome
    }

    // ========================================================================
    // Stages
    // ========================================================================

    async fn run(
        &self,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
        warnings: &mut Vec<EntryWarning>,
    ) -> Result<Changeset, IngestError> {
        checkpoint(cancel)?;
        self.report(source.id, SyncStage::Fetching, None).await;

        let fetched = match source.kind {
            SourceKind::M3u => self.fetch_m3u(source, cancel, warnings).await?,
            SourceKind::Xtream => self.fetch_xtream(source, cancel, warnings).await?,
        };

        checkpoint(cancel)?;
        self.report(source.id, SyncStage::Diffing, None).await;

        let current = self.store.read_current_catalog(source.id).await?;
        if fetched.snapshot.is_empty() && !current.is_empty() {
            warn!(source_id = %source.id, "Source returned an empty catalog");
            warnings.push(EntryWarning::new(
                WarningKind::EmptyCatalog,
                format!(
                    "Source returned no entries, {} were stored before",
                    current.total()
                ),
            ));
        }
        let changeset = compute_changeset(source.id, &current, fetched.snapshot);

        checkpoint(cancel)?;
        self.report(source.id, SyncStage::Persisting, None).await;

        if changeset.is_noop() {
            debug!(source_id = %source.id, "Catalog unchanged, nothing to persist");
        } else {
            self.store.apply_changeset(&changeset).await?;
        }

        self.refresh_epg_after_sync(source, fetched.epg_hint.as_deref(), cancel, warnings)
            .await;

        Ok(changeset)
    }

    async fn fetch_m3u(
        &self,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
        warnings: &mut Vec<EntryWarning>,
    ) -> Result<Fetched, IngestError> {
        let response = self.download(&source.endpoint, cancel).await?;
        info!(
            source_id = %source.id,
            bytes = response.body.len(),
            "Playlist downloaded"
        );

        checkpoint(cancel)?;
        self.report(source.id, SyncStage::Parsing, None).await;

        let playlist = self.parser.parse(&response.text())?;
        let catalog = playlist.into_catalog();
        info!(
            source_id = %source.id,
            channels = catalog.channels.len(),
            movies = catalog.movies.len(),
            series = catalog.series.len(),
            warnings = catalog.warnings.len(),
            "Playlist parsed"
        );

        let epg_hint = catalog.epg_url.clone();
        let snapshot = snapshot_from_playlist(source.id, catalog, warnings);
        Ok(Fetched { snapshot, epg_hint })
    }

    /// Categories are fetched before the stream list that references them;
    /// calls within one account stay sequential.
    async fn fetch_xtream(
        &self,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
        warnings: &mut Vec<EntryWarning>,
    ) -> Result<Fetched, IngestError> {
        let client = self.xtream_client(source)?;

        let account = interruptible(cancel, client.authenticate()).await?;
        info!(
            source_id = %source.id,
            username = %account.username,
            "Xtream account authenticated"
        );

        let live_categories = interruptible(cancel, client.list_categories(CategoryKind::Live)).await?;
        let live = interruptible(cancel, client.list_live_streams(&live_categories)).await?;

        let vod_categories = interruptible(cancel, client.list_categories(CategoryKind::Vod)).await?;
        let vod = interruptible(cancel, client.list_vod_streams(&vod_categories)).await?;

        let series_categories =
            interruptible(cancel, client.list_categories(CategoryKind::Series)).await?;
        let series = interruptible(cancel, client.list_series(&series_categories)).await?;

        let mut episodes: HashMap<String, Vec<Episode>> = HashMap::new();
        if self.options.expand_series {
            for summary in &series.series {
                let detail = client.get_series_detail(&summary.series_id, Some(&summary.name));
                match interruptible(cancel, detail).await {
                    Ok(detail) => {
                        episodes.insert(summary.series_id.clone(), detail.episodes());
                    }
                    Err(IngestError::MalformedInput(message)) => {
                        warnings.push(EntryWarning::new(
                            WarningKind::MalformedRecord,
                            format!("Series '{}' detail unreadable: {}", summary.name, message),
                        ));
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        checkpoint(cancel)?;
        self.report(source.id, SyncStage::Parsing, None).await;

        warnings.extend(live.warnings);
        warnings.extend(vod.warnings);
        warnings.extend(series.warnings);

        let mut builder = SnapshotBuilder::new();
        for entry in &live.entries {
            builder.push_channel(ChannelRecord::from_entry(entry, source.id), warnings);
        }
        for entry in &vod.entries {
            builder.push_movie(MovieRecord::from_entry(entry, source.id), warnings);
        }
        for summary in series.series {
            let mut record = SeriesRecord::new(source.id, &summary.name);
            record.group_title = summary.group_title;
            record.logo_url = summary.cover;
            record.episodes = episodes.remove(&summary.series_id).unwrap_or_default();
            record.provider_id = Some(summary.series_id);
            builder.push_series(record, warnings);
        }

        info!(
            source_id = %source.id,
            channels = builder.snapshot.channels.len(),
            movies = builder.snapshot.movies.len(),
            series = builder.snapshot.series.len(),
            "Xtream catalog mapped"
        );

        Ok(Fetched {
            snapshot: builder.snapshot,
            epg_hint: None,
        })
    }

    // ========================================================================
    // EPG
    // ========================================================================

    async fn refresh_epg_after_sync(
        &self,
        source: &SourceDescriptor,
        epg_hint: Option<&str>,
        cancel: &CancellationToken,
        warnings: &mut Vec<EntryWarning>,
    ) {
        let outcome = match self.epg_url_for(source, epg_hint) {
            Ok(Some(url)) => self.refresh_epg_from(source, &url, cancel).await,
            Ok(None) => return,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            warn!(source_id = %source.id, "EPG refresh failed: {}", e);
            warnings.push(EntryWarning::new(
                WarningKind::EpgRefreshFailed,
                e.to_string(),
            ));
        }
    }

    fn epg_url_for(
        &self,
        source: &SourceDescriptor,
        epg_hint: Option<&str>,
    ) -> Result<Option<String>, IngestError> {
        if let Some(url) = source.epg_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(Some(url.to_string()));
        }
        if let Some(hint) = epg_hint {
            return Ok(Some(hint.to_string()));
        }
        match source.kind {
            SourceKind::Xtream => Ok(Some(self.xtream_credentials(source)?.epg_url())),
            SourceKind::M3u => Ok(None),
        }
    }

    async fn refresh_epg_from(
        &self,
        source: &SourceDescriptor,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<EpgRefresh, IngestError> {
        let response = self.download(url, cancel).await?;
        let document = parse_xmltv(&response.text())?;

        checkpoint(cancel)?;
        self.store
            .replace_epg(source.id, &document.channels, &document.programs)
            .await?;

        info!(
            source_id = %source.id,
            channels = document.channels.len(),
            programs = document.programs.len(),
            warnings = document.warnings.len(),
            "EPG refreshed"
        );

        Ok(EpgRefresh {
            channels: document.channels.len(),
            programs: document.programs.len(),
            warnings: document.warnings,
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn download(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, IngestError> {
        let response =
            interruptible(cancel, self.http.get(url, &[], self.options.fetch_timeout)).await?;
        if !response.is_success() {
            return Err(TransportError::Status {
                url: redact_url(url),
                status: response.status,
            }
            .into());
        }
        Ok(response)
    }

    /// Client for a stored Xtream source, password decrypted
    pub fn xtream_client(&self, source: &SourceDescriptor) -> Result<XtreamClient, IngestError> {
        Ok(XtreamClient::new(
            self.http.clone(),
            self.xtream_credentials(source)?,
            self.options.xtream_timeout,
        ))
    }

    pub fn xtream_credentials(
        &self,
        source: &SourceDescriptor,
    ) -> Result<XtreamCredentials, IngestError> {
        if source.kind != SourceKind::Xtream {
            return Err(IngestError::Credentials(format!(
                "Source {} is not an Xtream source",
                source.id
            )));
        }
        let username = source
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| IngestError::Credentials("Xtream source has no username".to_string()))?;
        let blob = source
            .password
            .as_deref()
            .ok_or_else(|| IngestError::Credentials("Xtream source has no password".to_string()))?;
        let password = self.cipher.decrypt(blob)?;
        Ok(XtreamCredentials::new(&source.endpoint, username, &password))
    }

    async fn report(&self, source_id: Uuid, stage: SyncStage, message: Option<String>) {
        debug!(source_id = %source_id, stage = %stage, "Sync stage");
        let progress = SyncProgress::new(source_id, stage);
        let progress = match message {
            Some(message) => progress.with_message(message),
            None => progress,
        };
        self.progress.report(progress).await;
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), IngestError> {
    if cancel.is_cancelled() {
        Err(IngestError::Cancelled)
    } else {
        Ok(())
    }
}

/// Races an upstream call against cancellation
async fn interruptible<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T, IngestError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<IngestError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IngestError::Cancelled),
        result = fut => result.map_err(Into::into),
    }
}

// ============================================================================
// Snapshot assembly
// ============================================================================

/// Collects records with unique stable ids; a repeated id replaces the
/// earlier record in place and raises a warning.
struct SnapshotBuilder {
    snapshot: CatalogSnapshot,
    channel_ids: HashMap<String, usize>,
    movie_ids: HashMap<String, usize>,
    series_ids: HashMap<String, usize>,
}

impl SnapshotBuilder {
    fn new() -> Self {
        Self {
            snapshot: CatalogSnapshot::default(),
            channel_ids: HashMap::new(),
            movie_ids: HashMap::new(),
            series_ids: HashMap::new(),
        }
    }

    fn push_channel(&mut self, record: ChannelRecord, warnings: &mut Vec<EntryWarning>) {
        let id = record.id.clone();
        let label = format!("Channel '{}'", record.name);
        push_unique(&mut self.snapshot.channels, &mut self.channel_ids, id, record, &label, warnings);
    }

    fn push_movie(&mut self, record: MovieRecord, warnings: &mut Vec<EntryWarning>) {
        let id = record.id.clone();
        let label = format!("Movie '{}'", record.name);
        push_unique(&mut self.snapshot.movies, &mut self.movie_ids, id, record, &label, warnings);
    }

    fn push_series(&mut self, record: SeriesRecord, warnings: &mut Vec<EntryWarning>) {
        let id = record.id.clone();
        let label = format!("Series '{}'", record.name);
        push_unique(&mut self.snapshot.series, &mut self.series_ids, id, record, &label, warnings);
    }
}

fn push_unique<T>(
    records: &mut Vec<T>,
    seen: &mut HashMap<String, usize>,
    id: String,
    record: T,
    label: &str,
    warnings: &mut Vec<EntryWarning>,
) {
    match seen.get(&id) {
        Some(&index) => {
            warnings.push(EntryWarning::new(
                WarningKind::DuplicateEntry,
                format!("{} appears more than once, later entry kept", label),
            ));
            records[index] = record;
        }
        None => {
            seen.insert(id, records.len());
            records.push(record);
        }
    }
}

fn snapshot_from_playlist(
    source_id: Uuid,
    catalog: ParsedCatalog,
    warnings: &mut Vec<EntryWarning>,
) -> CatalogSnapshot {
    warnings.extend(catalog.warnings);

    let mut builder = SnapshotBuilder::new();
    for entry in &catalog.channels {
        builder.push_channel(ChannelRecord::from_entry(entry, source_id), warnings);
    }
    for entry in &catalog.movies {
        builder.push_movie(MovieRecord::from_entry(entry, source_id), warnings);
    }
    for group in &catalog.series {
        builder.push_series(series_record(source_id, group), warnings);
    }
    builder.snapshot
}
