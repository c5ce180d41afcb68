//! The per-entity fetch → upsert → advance loop.
//!
//! ```text
//! LOADING_CURSOR → FETCHING ─┬─ empty ──────────────────────────────→ DONE
//!                     ↑      └─ rows → UPSERTING → ADVANCING_CURSOR ─┐
//!                     └──────────────────────────────────────────────┘
//! ```
//!
//! Any error leaves the saved cursor untouched. The next run re-reads the
//! failed batch and re-applies it, which is safe because upserts overwrite.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::backend::{BatchUpserter, ChangeFetcher, CursorStore};
use crate::entity::EntityDescriptor;
use crate::error::{Error, Result};
use crate::types::SourceRecord;
use crate::watermark::Watermark;

/// Default rows per fetch.
pub const DEFAULT_BATCH_SIZE: usize = 2000;

/// Default per-fetch deadline.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Loop settings shared by every entity in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum rows per fetch.
    pub batch_size: usize,
    /// Deadline for a single fetch.
    pub query_timeout: Duration,
    /// Treat a batch shorter than `batch_size` as the end of the stream
    /// instead of probing with one more fetch.
    pub stop_on_short_batch: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            stop_on_short_batch: true,
        }
    }
}

impl SyncOptions {
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }
}

/// Outcome of one entity's loop.
#[derive(Debug, Clone)]
pub struct EntityReport {
    pub entity: String,
    /// Number of fetch calls, including the final empty probe if any.
    pub fetches: usize,
    /// Number of batches written and committed.
    pub batches: usize,
    pub rows: u64,
    pub started_at: Watermark,
    pub finished_at: Watermark,
    pub elapsed: Duration,
}

/// Drives one entity's change stream to exhaustion.
pub struct EntitySync<'a, F, U, C> {
    entity: &'a EntityDescriptor,
    fetcher: &'a F,
    upserter: &'a U,
    cursors: &'a C,
    options: &'a SyncOptions,
}

impl<'a, F, U, C> EntitySync<'a, F, U, C>
where
    F: ChangeFetcher,
    U: BatchUpserter,
    C: CursorStore,
{
    pub fn new(
        entity: &'a EntityDescriptor,
        fetcher: &'a F,
        upserter: &'a U,
        cursors: &'a C,
        options: &'a SyncOptions,
    ) -> Self {
        Self {
            entity,
            fetcher,
            upserter,
            cursors,
            options,
        }
    }

    /// Run until a fetch comes back empty (or short, see [`SyncOptions`]).
    pub async fn run(&self) -> Result<EntityReport> {
        let started = Instant::now();
        let limit = self.options.batch_size.max(1);

        let start = self.cursors.load_cursor(self.entity).await?;
        debug!(entity = %self.entity.id, watermark = %start, "Loaded cursor");

        let mut report = EntityReport {
            entity: self.entity.id.clone(),
            fetches: 0,
            batches: 0,
            rows: 0,
            started_at: start.clone(),
            finished_at: start.clone(),
            elapsed: Duration::ZERO,
        };
        let mut watermark = start;

        loop {
            let batch = self.fetch(&watermark, limit).await?;
            report.fetches += 1;

            if batch.is_empty() {
                break;
            }
            if batch.len() > limit {
                return Err(Error::Source(format!(
                    "fetch for {} returned {} rows, limit was {}",
                    self.entity.id,
                    batch.len(),
                    limit
                )));
            }

            let next = advance_watermark(self.entity, &watermark, &batch)?;
            let written = self.upserter.upsert_batch(self.entity, &batch).await?;
            self.cursors.save_cursor(self.entity, &next).await?;

            debug!(
                entity = %self.entity.id,
                rows = batch.len(),
                written,
                last_modified = %next.time_string(),
                last_name = next.key(),
                "Committed batch"
            );

            report.batches += 1;
            report.rows += batch.len() as u64;
            watermark = next;

            if self.options.stop_on_short_batch && batch.len() < limit {
                break;
            }
        }

        report.finished_at = watermark;
        report.elapsed = started.elapsed();

        info!(
            entity = %report.entity,
            rows = report.rows,
            batches = report.batches,
            fetches = report.fetches,
            watermark = %report.finished_at,
            "Entity sync complete"
        );

        Ok(report)
    }

    async fn fetch(&self, after: &Watermark, limit: usize) -> Result<Vec<SourceRecord>> {
        let deadline = self.options.query_timeout;
        tokio::time::timeout(deadline, self.fetcher.fetch_changes(self.entity, after, limit))
            .await
            .map_err(|_| Error::Timeout {
                entity: self.entity.id.clone(),
                after: deadline,
            })?
    }
}

/// Compute the watermark a batch advances to, checking it against the
/// current one.
///
/// Every row must sort strictly after the one before it, and the first row
/// strictly after `current`, so the saved cursor can never move backwards.
/// Keys must also be unique within the batch.
pub fn advance_watermark(
    entity: &EntityDescriptor,
    current: &Watermark,
    batch: &[SourceRecord],
) -> Result<Watermark> {
    let mut previous = current.clone();
    let mut seen = HashSet::with_capacity(batch.len());

    for record in batch {
        let position = record.watermark(&entity.time_column, &entity.key_column)?;

        let regressed = position <= previous || !seen.insert(position.key().to_string());
        if regressed {
            return Err(Error::OutOfOrder {
                entity: entity.id.clone(),
                row: position.to_string(),
                previous: previous.to_string(),
            });
        }
        previous = position;
    }

    Ok(previous)
}
