pub mod backend;
pub mod entity;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod projection;
pub mod sync;
pub mod types;
pub mod watermark;

pub use backend::{BatchUpserter, ChangeFetcher, CursorStore, Replica, SchemaProvisioner};
pub use entity::{
    validate_identifier, ColumnType, CursorKeys, EntityDescriptor, EntityDescriptorBuilder,
    ProjectedColumn, BUILTIN_ENTITY_IDS, PAYLOAD_COLUMN,
};
pub use error::{Error, Result};
pub use memory::{MemoryReplica, MemorySource};
pub use orchestrator::{EntitySelection, RunReport, SyncOrchestrator, SyncPlan};
pub use projection::{project_batch, project_record, ProjectedValue, ReplicaRow};
pub use sync::{
    advance_watermark, EntityReport, EntitySync, SyncOptions, DEFAULT_BATCH_SIZE,
    DEFAULT_QUERY_TIMEOUT,
};
pub use types::{RowMap, SourceRecord, Value};
pub use watermark::{format_timestamp, parse_timestamp, Watermark, TIMESTAMP_FORMAT};
