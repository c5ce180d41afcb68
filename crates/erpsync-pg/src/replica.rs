//! Postgres replica: typed tables, the `sync_state_kv` cursor table and the
//! batch upsert path.

use std::future::Future;

use chrono::{NaiveDate, NaiveDateTime};
use erpsync_core::{
    project_batch, BatchUpserter, ColumnType, CursorStore, EntityDescriptor, ProjectedValue,
    ReplicaRow, SchemaProvisioner, SourceRecord, Watermark,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;
use tracing::{debug, info};

use crate::connect::connect_postgres;
use crate::error::{PgError, PgResult};
use crate::sql;

type Param = Box<dyn ToSql + Sync + Send>;

/// A replica database reached through one client.
pub struct PgReplica {
    client: Mutex<Client>,
}

impl PgReplica {
    pub async fn connect(connection_string: &str) -> PgResult<Self> {
        let client = connect_postgres(connection_string).await?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    async fn provision(&self, entities: &[EntityDescriptor]) -> PgResult<()> {
        let client = self.client.lock().await;
        for entity in entities {
            debug!(table = %entity.target_table, "Ensuring replica table");
            for statement in sql::entity_ddl(entity) {
                client.batch_execute(&statement).await?;
            }
        }
        client.batch_execute(sql::CURSOR_TABLE_DDL).await?;
        client.batch_execute(sql::CURSOR_TABLE_WIDEN).await?;
        info!(tables = entities.len(), "Replica schema ready");
        Ok(())
    }

    async fn write_batch(&self, entity: &EntityDescriptor, rows: Vec<ReplicaRow>) -> PgResult<u64> {
        let chunk_size = sql::rows_per_statement(entity);
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        let mut written = 0;
        for chunk in rows.chunks(chunk_size) {
            let statement = sql::upsert(entity, chunk.len());
            let params = chunk
                .iter()
                .flat_map(|row| row_params(entity, row))
                .collect::<Vec<Param>>();
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();
            written += tx.execute(&statement, &refs).await?;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Read the stored watermark for an entity.
    pub async fn read_cursor(&self, entity: &EntityDescriptor) -> PgResult<Watermark> {
        let keys = entity.cursor_keys();
        let client = self.client.lock().await;
        let rows = client
            .query(sql::CURSOR_LOAD, &[&keys.time_key, &keys.name_key])
            .await?;

        let mut time = None;
        let mut name = None;
        for row in &rows {
            let key: String = row.get(0);
            let value: Option<String> = row.get(1);
            if key == keys.time_key {
                time = value;
            } else if key == keys.name_key {
                name = value;
            }
        }

        Watermark::from_stored(time.as_deref(), name.as_deref())
            .map_err(|e| PgError::CorruptCursor {
                entity: entity.id.clone(),
                message: e.to_string(),
            })
    }

    async fn write_cursor(&self, entity: &EntityDescriptor, watermark: &Watermark) -> PgResult<()> {
        let keys = entity.cursor_keys();
        let time = watermark.time_string();
        let name = watermark.key();
        let client = self.client.lock().await;
        client
            .execute(sql::CURSOR_SAVE, &[&keys.time_key, &time, &keys.name_key, &name])
            .await?;
        Ok(())
    }
}

/// Bind values for one row, payload last. Nulls are typed by their column so
/// the server-inferred parameter type accepts them.
fn row_params(entity: &EntityDescriptor, row: &ReplicaRow) -> Vec<Param> {
    let mut params: Vec<Param> = entity
        .columns
        .iter()
        .zip(&row.values)
        .map(|(column, value)| to_param(column.column_type, value))
        .collect();
    params.push(Box::new(row.raw.clone()));
    params
}

fn to_param(column_type: ColumnType, value: &ProjectedValue) -> Param {
    match value {
        ProjectedValue::Text(s) => Box::new(s.clone()),
        ProjectedValue::Integer(i) => Box::new(*i),
        ProjectedValue::Numeric(d) => Box::new(*d),
        ProjectedValue::Date(d) => Box::new(*d),
        ProjectedValue::Timestamp(t) => Box::new(*t),
        ProjectedValue::Null => match column_type {
            ColumnType::Text => Box::new(None::<String>),
            ColumnType::Integer => Box::new(None::<i32>),
            ColumnType::Numeric => Box::new(None::<Decimal>),
            ColumnType::Date => Box::new(None::<NaiveDate>),
            ColumnType::Timestamp => Box::new(None::<NaiveDateTime>),
        },
    }
}

impl SchemaProvisioner for PgReplica {
    fn ensure_schema(
        &self,
        entities: &[EntityDescriptor],
    ) -> impl Future<Output = erpsync_core::Result<()>> + Send {
        async move {
            self.provision(entities)
                .await
                .map_err(|e| erpsync_core::Error::Schema(e.to_string()))
        }
    }
}

impl BatchUpserter for PgReplica {
    fn upsert_batch(
        &self,
        entity: &EntityDescriptor,
        records: &[SourceRecord],
    ) -> impl Future<Output = erpsync_core::Result<u64>> + Send {
        async move {
            // Projection runs before the transaction opens.
            let rows = project_batch(entity, records)?;
            Ok(self.write_batch(entity, rows).await?)
        }
    }
}

impl CursorStore for PgReplica {
    fn load_cursor(
        &self,
        entity: &EntityDescriptor,
    ) -> impl Future<Output = erpsync_core::Result<Watermark>> + Send {
        async move {
            self.read_cursor(entity)
                .await
                .map_err(|e| erpsync_core::Error::Cursor(e.to_string()))
        }
    }

    fn save_cursor(
        &self,
        entity: &EntityDescriptor,
        watermark: &Watermark,
    ) -> impl Future<Output = erpsync_core::Result<()>> + Send {
        async move {
            self.write_cursor(entity, watermark)
                .await
                .map_err(|e| erpsync_core::Error::Cursor(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erpsync_core::{project_record, Value};
    use std::str::FromStr;

    #[test]
    fn test_row_params_follow_replica_columns() {
        let entity = EntityDescriptor::invoice().unwrap();
        let record = SourceRecord::from_pairs([
            ("name", Value::from("SINV-1")),
            ("modified", Value::from("2024-01-01 00:00:00")),
            ("grand_total", Value::from("10.50")),
        ]);
        let row = project_record(&entity, &record).unwrap();

        let params = row_params(&entity, &row);
        assert_eq!(params.len(), entity.replica_columns().len());
    }

    #[test]
    fn test_typed_nulls() {
        let numeric = to_param(ColumnType::Numeric, &ProjectedValue::Null);
        assert_eq!(format!("{numeric:?}"), "None");

        let value = to_param(
            ColumnType::Numeric,
            &ProjectedValue::Numeric(Decimal::from_str("1.25").unwrap()),
        );
        assert_eq!(format!("{value:?}"), "1.25");
    }
}
