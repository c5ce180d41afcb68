//! SQL text for the replica: DDL, cursor statements and batch upserts.

use erpsync_core::{EntityDescriptor, PAYLOAD_COLUMN};

/// Postgres rejects statements with more bind parameters than this.
pub const MAX_BIND_PARAMS: usize = 65_535;

pub const CURSOR_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS sync_state_kv (key TEXT PRIMARY KEY, value TEXT)";

/// Older deployments created `value` with a narrower type.
pub const CURSOR_TABLE_WIDEN: &str = "ALTER TABLE sync_state_kv ALTER COLUMN value TYPE TEXT";

pub const CURSOR_LOAD: &str = "SELECT key, value FROM sync_state_kv WHERE key IN ($1, $2)";

/// Writes both keys of one entity at once.
pub const CURSOR_SAVE: &str = "INSERT INTO sync_state_kv (key, value) VALUES ($1, $2), ($3, $4) \
     ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value";

/// Quote a Postgres identifier with double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE IF NOT EXISTS` for an entity's replica table.
pub fn create_table(entity: &EntityDescriptor) -> String {
    let mut columns: Vec<String> = entity
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote_ident(&c.name), c.column_type.sql_type());
            if c.name == entity.key_column {
                def.push_str(" PRIMARY KEY");
            }
            def
        })
        .collect();
    columns.push(format!("{} JSONB", quote_ident(PAYLOAD_COLUMN)));

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&entity.target_table),
        columns.join(", ")
    )
}

/// `ALTER TABLE ... ADD COLUMN IF NOT EXISTS` for every non-key column, so
/// tables created by older versions gain new projections.
pub fn add_missing_columns(entity: &EntityDescriptor) -> String {
    let mut adds: Vec<String> = entity
        .columns
        .iter()
        .filter(|c| c.name != entity.key_column)
        .map(|c| {
            format!(
                "ADD COLUMN IF NOT EXISTS {} {}",
                quote_ident(&c.name),
                c.column_type.sql_type()
            )
        })
        .collect();
    adds.push(format!("ADD COLUMN IF NOT EXISTS {} JSONB", quote_ident(PAYLOAD_COLUMN)));

    format!("ALTER TABLE {} {}", quote_ident(&entity.target_table), adds.join(", "))
}

/// Index name for a replica column, e.g. `idx_sales_invoice_modified`.
pub fn index_name(table: &str, column: &str) -> String {
    format!("idx_{table}_{column}").replace(' ', "_")
}

/// `CREATE INDEX IF NOT EXISTS` for each indexed column.
pub fn create_indexes(entity: &EntityDescriptor) -> Vec<String> {
    entity
        .indexes
        .iter()
        .map(|column| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&index_name(&entity.target_table, column)),
                quote_ident(&entity.target_table),
                quote_ident(column)
            )
        })
        .collect()
}

/// Every statement needed to provision one entity, in execution order.
pub fn entity_ddl(entity: &EntityDescriptor) -> Vec<String> {
    let mut statements = vec![create_table(entity), add_missing_columns(entity)];
    statements.extend(create_indexes(entity));
    statements
}

/// Rows per upsert statement that stay under the bind parameter ceiling.
pub fn rows_per_statement(entity: &EntityDescriptor) -> usize {
    (MAX_BIND_PARAMS / entity.replica_columns().len()).max(1)
}

/// Multi-row `INSERT ... ON CONFLICT DO UPDATE` for `rows` rows.
///
/// Every column, payload included, is overwritten from `EXCLUDED`.
pub fn upsert(entity: &EntityDescriptor, rows: usize) -> String {
    let columns = entity.replica_columns();
    let width = columns.len();

    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let values = (0..rows)
        .map(|row| {
            let placeholders = (1..=width)
                .map(|col| format!("${}", row * width + col))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({placeholders})")
        })
        .collect::<Vec<_>>()
        .join(", ");

    let updates = columns
        .iter()
        .filter(|c| **c != entity.key_column)
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({column_list}) VALUES {values} ON CONFLICT ({}) DO UPDATE SET {updates}",
        quote_ident(&entity.target_table),
        quote_ident(&entity.key_column),
    )
}
