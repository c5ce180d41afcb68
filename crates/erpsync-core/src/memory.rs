//! In-memory source and replica, used by tests.
//!
//! They honor the same contracts as the database backends: the source
//! applies the exact `(time, key)` predicate and ordering (using byte order
//! for keys), and the replica applies batches all-or-nothing with overwrite
//! semantics.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::backend::{BatchUpserter, ChangeFetcher, CursorStore, SchemaProvisioner};
use crate::entity::EntityDescriptor;
use crate::error::{Error, Result};
use crate::projection::{project_batch, ReplicaRow};
use crate::types::SourceRecord;
use crate::watermark::Watermark;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicked test thread must not hide the state from later assertions.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A source store holding rows per table.
#[derive(Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<SourceState>>,
}

#[derive(Default)]
struct SourceState {
    tables: HashMap<String, Vec<SourceRecord>>,
    fetches: HashMap<String, usize>,
    delay: Option<Duration>,
    fail_with: Option<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row to a source table.
    pub fn insert(&self, table: &str, record: SourceRecord) {
        lock(&self.state)
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    /// Replace the row with the same key, or add it.
    pub fn update(&self, table: &str, key_column: &str, record: SourceRecord) {
        let mut state = lock(&self.state);
        let rows = state.tables.entry(table.to_string()).or_default();
        let key = record.get(key_column).cloned();
        rows.retain(|r| r.get(key_column) != key.as_ref());
        rows.push(record);
    }

    /// Make every fetch wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        lock(&self.state).delay = Some(delay);
    }

    /// Make every fetch fail.
    pub fn fail_with(&self, message: impl Into<String>) {
        lock(&self.state).fail_with = Some(message.into());
    }

    /// Number of fetch calls made for an entity.
    pub fn fetch_count(&self, entity_id: &str) -> usize {
        lock(&self.state).fetches.get(entity_id).copied().unwrap_or(0)
    }
}

impl ChangeFetcher for MemorySource {
    fn fetch_changes(
        &self,
        entity: &EntityDescriptor,
        after: &Watermark,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SourceRecord>>> + Send {
        let state = self.state.clone();
        async move {
            let delay = {
                let mut state = lock(&state);
                *state.fetches.entry(entity.id.clone()).or_default() += 1;
                state.delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let state = lock(&state);
            if let Some(ref error) = state.fail_with {
                return Err(Error::Source(error.clone()));
            }

            let rows = state
                .tables
                .get(&entity.source_table)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let mut positioned = rows
                .iter()
                .map(|r| {
                    r.watermark(&entity.time_column, &entity.key_column)
                        .map(|w| (w, r))
                })
                .collect::<Result<Vec<_>>>()?;
            positioned.retain(|(w, _)| w > after);
            positioned.sort_by(|(a, _), (b, _)| a.cmp(b));

            Ok(positioned
                .into_iter()
                .take(limit)
                .map(|(_, r)| r.clone())
                .collect())
        }
    }
}

/// A replica store with typed tables and a key/value cursor table.
#[derive(Clone, Default)]
pub struct MemoryReplica {
    state: Arc<Mutex<ReplicaState>>,
}

#[derive(Default)]
struct ReplicaState {
    tables: HashMap<String, BTreeMap<String, ReplicaRow>>,
    kv: HashMap<String, String>,
    provisioned: HashSet<String>,
    schema_calls: usize,
    cursor_history: HashMap<String, Vec<Watermark>>,
    upserts: usize,
    fail_upsert_after: Option<(usize, String)>,
    fail_cursor_saves: Option<String>,
    fail_schema: Option<String>,
}

impl MemoryReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `n` more upserts succeed, then fail every one after.
    pub fn fail_upsert_after(&self, n: usize, message: impl Into<String>) {
        let mut state = lock(&self.state);
        let at = state.upserts + n;
        state.fail_upsert_after = Some((at, message.into()));
    }

    /// Fail every cursor save, as if the process died after the batch commit.
    pub fn fail_cursor_saves(&self, message: impl Into<String>) {
        lock(&self.state).fail_cursor_saves = Some(message.into());
    }

    /// Fail schema provisioning.
    pub fn fail_schema(&self, message: impl Into<String>) {
        lock(&self.state).fail_schema = Some(message.into());
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        let mut state = lock(&self.state);
        state.fail_upsert_after = None;
        state.fail_cursor_saves = None;
        state.fail_schema = None;
    }

    pub fn row_count(&self, table: &str) -> usize {
        lock(&self.state).tables.get(table).map_or(0, |t| t.len())
    }

    pub fn get_row(&self, table: &str, key: &str) -> Option<ReplicaRow> {
        lock(&self.state)
            .tables
            .get(table)
            .and_then(|t| t.get(key))
            .cloned()
    }

    /// All rows of a table ordered by key.
    pub fn rows(&self, table: &str) -> Vec<ReplicaRow> {
        lock(&self.state)
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every watermark saved for an entity, oldest first.
    pub fn cursor_history(&self, entity_id: &str) -> Vec<Watermark> {
        lock(&self.state)
            .cursor_history
            .get(entity_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The watermark currently stored for an entity.
    pub fn stored_watermark(&self, entity: &EntityDescriptor) -> Watermark {
        let keys = entity.cursor_keys();
        let state = lock(&self.state);
        Watermark::from_stored(
            state.kv.get(&keys.time_key).map(String::as_str),
            state.kv.get(&keys.name_key).map(String::as_str),
        )
        .unwrap_or_default()
    }

    /// Raw value of a cursor key.
    pub fn kv_value(&self, key: &str) -> Option<String> {
        lock(&self.state).kv.get(key).cloned()
    }

    pub fn schema_calls(&self) -> usize {
        lock(&self.state).schema_calls
    }

    pub fn upsert_calls(&self) -> usize {
        lock(&self.state).upserts
    }
}

impl SchemaProvisioner for MemoryReplica {
    fn ensure_schema(&self, entities: &[EntityDescriptor]) -> impl Future<Output = Result<()>> + Send {
        let state = self.state.clone();
        let tables: Vec<String> = entities.iter().map(|e| e.target_table.clone()).collect();
        async move {
            let mut state = lock(&state);
            state.schema_calls += 1;
            if let Some(ref error) = state.fail_schema {
                return Err(Error::Schema(error.clone()));
            }
            for table in tables {
                state.tables.entry(table.clone()).or_default();
                state.provisioned.insert(table);
            }
            Ok(())
        }
    }
}

impl BatchUpserter for MemoryReplica {
    fn upsert_batch(
        &self,
        entity: &EntityDescriptor,
        records: &[SourceRecord],
    ) -> impl Future<Output = Result<u64>> + Send {
        let state = self.state.clone();
        async move {
            let rows = project_batch(entity, records)?;

            let mut state = lock(&state);
            if let Some((at, ref message)) = state.fail_upsert_after {
                if state.upserts >= at {
                    return Err(Error::Replica(message.clone()));
                }
            }
            if !state.provisioned.contains(&entity.target_table) {
                return Err(Error::Replica(format!(
                    "relation \"{}\" does not exist",
                    entity.target_table
                )));
            }

            state.upserts += 1;
            let table = state.tables.entry(entity.target_table.clone()).or_default();
            let written = rows.len() as u64;
            for row in rows {
                table.insert(row.key.clone(), row);
            }
            Ok(written)
        }
    }
}

impl CursorStore for MemoryReplica {
    fn load_cursor(&self, entity: &EntityDescriptor) -> impl Future<Output = Result<Watermark>> + Send {
        let state = self.state.clone();
        let keys = entity.cursor_keys();
        async move {
            let state = lock(&state);
            Watermark::from_stored(
                state.kv.get(&keys.time_key).map(String::as_str),
                state.kv.get(&keys.name_key).map(String::as_str),
            )
        }
    }

    fn save_cursor(
        &self,
        entity: &EntityDescriptor,
        watermark: &Watermark,
    ) -> impl Future<Output = Result<()>> + Send {
        let state = self.state.clone();
        let keys = entity.cursor_keys();
        let entity_id = entity.id.clone();
        let watermark = watermark.clone();
        async move {
            let mut state = lock(&state);
            if let Some(ref error) = state.fail_cursor_saves {
                return Err(Error::Cursor(error.clone()));
            }
            state.kv.insert(keys.time_key, watermark.time_string());
            state.kv.insert(keys.name_key, watermark.key().to_string());
            state
                .cursor_history
                .entry(entity_id)
                .or_default()
                .push(watermark);
            Ok(())
        }
    }
}
