//! Change fetcher backed by a MySQL / MariaDB connection pool.

use std::future::Future;
use std::time::Instant;

use erpsync_core::{ChangeFetcher, EntityDescriptor, SourceRecord, Watermark};
use mysql_async::prelude::*;
use mysql_async::{Opts, Params, Pool, Row, Value as MySqlValue};
use tracing::debug;

use crate::decode::decode_row;
use crate::error::SourceResult;
use crate::query::change_query;

/// Reads changed rows with a keyset query on `(modified, name)`.
#[derive(Clone)]
pub struct MySqlFetcher {
    pool: Pool,
}

impl MySqlFetcher {
    /// Create a pool for the given `mysql://` url. No connection is opened
    /// until the first fetch.
    pub fn new(url: &str) -> SourceResult<Self> {
        let opts = Opts::from_url(url)?;
        Ok(Self {
            pool: Pool::new(opts),
        })
    }

    /// Open a connection and run a trivial query.
    pub async fn ping(&self) -> SourceResult<()> {
        let mut conn = self.pool.get_conn().await?;
        let _: Option<i32> = conn.query_first("SELECT 1").await?;
        Ok(())
    }

    /// Close every pooled connection.
    pub async fn disconnect(self) -> SourceResult<()> {
        self.pool.disconnect().await?;
        Ok(())
    }

    async fn fetch(
        &self,
        entity: &EntityDescriptor,
        after: &Watermark,
        limit: usize,
    ) -> SourceResult<Vec<SourceRecord>> {
        let started = Instant::now();
        let sql = change_query(entity);
        let params = Params::Positional(vec![
            MySqlValue::from(after.time()),
            MySqlValue::from(after.time()),
            MySqlValue::from(after.key().to_string()),
            MySqlValue::from(limit as u64),
        ]);

        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.exec(sql.as_str(), params).await?;
        let records = rows.iter().map(decode_row).collect::<SourceResult<Vec<_>>>()?;

        debug!(
            entity = %entity.id,
            after = %after,
            rows = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched changes"
        );
        Ok(records)
    }
}

impl ChangeFetcher for MySqlFetcher {
    fn fetch_changes(
        &self,
        entity: &EntityDescriptor,
        after: &Watermark,
        limit: usize,
    ) -> impl Future<Output = erpsync_core::Result<Vec<SourceRecord>>> + Send {
        async move {
            self.fetch(entity, after, limit)
                .await
                .map_err(erpsync_core::Error::from)
        }
    }
}

impl std::fmt::Debug for MySqlFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlFetcher").finish_non_exhaustive()
    }
}
