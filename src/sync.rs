//! Fetch, normalize and persist the entries of a source.
//!
//! A sync aborts only when the source is missing or its document cannot be
//! fetched or parsed. Once entries are flowing, a failure on one entry is
//! logged and the loop moves on, so repeated syncs converge on the full
//! document and the unique (source, link) index keeps them idempotent.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::db::NewEntry;
use crate::entries::EntryStore;
use crate::error::{StoreError, SyncError};
use crate::fetcher::Fetcher;
use crate::sources::SourceStore;
use crate::timestamp;

/// Outcome counts for one sync pass.
///
/// `new_items + duplicates + failed == parsed` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub parsed: usize,
    pub new_items: usize,
    pub duplicates: usize,
    pub failed: usize,
}

pub struct Syncer {
    sources: Arc<dyn SourceStore>,
    entries: Arc<dyn EntryStore>,
    fetcher: Fetcher,
    syncing_all: RwLock<bool>,
}

impl Syncer {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        entries: Arc<dyn EntryStore>,
        fetcher: Fetcher,
    ) -> Self {
        Self {
            sources,
            entries,
            fetcher,
            syncing_all: RwLock::new(false),
        }
    }

    /// Sync one source and return how many entries were new.
    pub async fn sync(&self, source_id: i64) -> Result<usize, SyncError> {
        Ok(self.sync_source(source_id).await?.new_items)
    }

    pub async fn sync_source(&self, source_id: i64) -> Result<SyncReport, SyncError> {
        let source = self
            .sources
            .get_source(source_id)
            .await?
            .ok_or(SyncError::SourceNotFound(source_id))?;

        let document = self
            .fetcher
            .fetch(&source.link)
            .await
            .map_err(|e| SyncError::Failed {
                source_id,
                source: e,
            })?;

        let mut report = SyncReport::default();
        for raw in document {
            report.parsed += 1;

            let published_at = timestamp::normalize(raw.published);
            let entry = NewEntry {
                source_id,
                title: raw.title,
                description: raw.description,
                link: raw.link,
                published_at,
            };
            let link = entry.link.clone();

            match self.entries.create_entry(entry).await {
                Ok(_) => report.new_items += 1,
                Err(StoreError::DuplicateEntry) => {
                    debug!("Skipping known entry {} for source {}", link, source_id);
                    report.duplicates += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to store entry '{}' for source {}: {}",
                        link, source_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Synced source '{}' ({}): {} new, {} known, {} failed",
            source.title, source_id, report.new_items, report.duplicates, report.failed
        );
        Ok(report)
    }

    pub async fn is_syncing_all(&self) -> bool {
        *self.syncing_all.read().await
    }

    /// Sync every stored source one after another.
    ///
    /// Returns an empty list without doing anything if another `sync_all` is
    /// still running.
    pub async fn sync_all(&self) -> Result<Vec<(i64, Result<SyncReport, SyncError>)>, SyncError> {
        {
            let mut syncing = self.syncing_all.write().await;
            if *syncing {
                info!("Sync of all sources already in progress, skipping");
                return Ok(Vec::new());
            }
            *syncing = true;
        }

        let result = self.do_sync_all().await;

        {
            let mut syncing = self.syncing_all.write().await;
            *syncing = false;
        }

        result
    }

    async fn do_sync_all(&self) -> Result<Vec<(i64, Result<SyncReport, SyncError>)>, SyncError> {
        let sources = self.sources.list_sources().await.map_err(|e| {
            error!("Failed to list sources for sync: {}", e);
            e
        })?;
        info!("Syncing {} sources", sources.len());

        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let outcome = self.sync_source(source.id).await;
            if let Err(e) = &outcome {
                error!("Failed to sync source '{}': {}", source.title, e);
            }
            results.push((source.id, outcome));
        }

        info!("Sync of all sources complete");
        Ok(results)
    }
}

fn sync_interval(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Run `sync_all` now and then every `interval_minutes`. Never returns.
pub async fn start_periodic_sync(syncer: Arc<Syncer>, interval_minutes: u64) {
    let interval = sync_interval(interval_minutes);

    info!("Starting initial sync");
    if let Err(e) = syncer.sync_all().await {
        error!("Initial sync failed: {}", e);
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled sync");
        if let Err(e) = syncer.sync_all().await {
            error!("Scheduled sync failed: {}", e);
        }
    }
}
