use std::future::Future;

use crate::entity::EntityDescriptor;
use crate::error::Result;
use crate::types::SourceRecord;
use crate::watermark::Watermark;

/// Reads changed rows from the source store.
pub trait ChangeFetcher: Send + Sync {
    /// Return up to `limit` rows positioned strictly after `after`, ordered
    /// ascending by `(time, key)`.
    ///
    /// The row filter must be exact: no rows may be dropped after the limit is
    /// applied, since a short batch is taken to mean the stream is exhausted.
    fn fetch_changes(
        &self,
        entity: &EntityDescriptor,
        after: &Watermark,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SourceRecord>>> + Send;
}

/// Writes batches into the replica.
pub trait BatchUpserter: Send + Sync {
    /// Insert or fully replace every record by natural key, all-or-nothing.
    /// Returns the number of rows written.
    fn upsert_batch(
        &self,
        entity: &EntityDescriptor,
        records: &[SourceRecord],
    ) -> impl Future<Output = Result<u64>> + Send;
}

/// Durable per-entity replication progress.
pub trait CursorStore: Send + Sync {
    /// Load the saved watermark, or the sentinel when none was saved yet.
    fn load_cursor(&self, entity: &EntityDescriptor) -> impl Future<Output = Result<Watermark>> + Send;

    /// Overwrite the saved watermark.
    fn save_cursor(
        &self,
        entity: &EntityDescriptor,
        watermark: &Watermark,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Creates replica tables, indexes and the cursor table.
pub trait SchemaProvisioner: Send + Sync {
    /// Idempotently create everything the given entities need.
    fn ensure_schema(&self, entities: &[EntityDescriptor]) -> impl Future<Output = Result<()>> + Send;
}

/// Everything the orchestrator needs from the replica side.
pub trait Replica: BatchUpserter + CursorStore + SchemaProvisioner {}

impl<T> Replica for T where T: BatchUpserter + CursorStore + SchemaProvisioner {}
