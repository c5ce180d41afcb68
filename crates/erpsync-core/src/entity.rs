//! Static descriptions of the replicated entities.

use crate::error::{Error, Result};

/// Replica column type of a projected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Numeric,
    Date,
    Timestamp,
}

impl ColumnType {
    /// Postgres type name used in DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }
}

/// A business field copied into its own typed replica column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    pub name: String,
    pub column_type: ColumnType,
    /// A null or missing value fails the batch instead of being written as NULL.
    pub required: bool,
}

impl ProjectedColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Stored cursor keys for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorKeys {
    pub time_key: String,
    pub name_key: String,
}

/// Configuration for replicating one source table into one replica table.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    /// Stable identifier, used in the allow-list and in logs.
    pub id: String,
    /// Source table name.
    pub source_table: String,
    /// Modification timestamp column on the source.
    pub time_column: String,
    /// Natural key column; also the replica conflict key.
    pub key_column: String,
    /// Replica table name.
    pub target_table: String,
    /// Typed projections, key column first.
    pub columns: Vec<ProjectedColumn>,
    /// Replica columns to index.
    pub indexes: Vec<String>,
    /// Prefix for the entity's cursor keys.
    pub cursor_prefix: String,
}

/// Replica column holding the complete source record.
pub const PAYLOAD_COLUMN: &str = "raw";

/// Entity ids in the order a full run processes them.
pub const BUILTIN_ENTITY_IDS: &[&str] = &["item", "invoice", "invoice_item"];

impl EntityDescriptor {
    /// Create a builder for constructing a descriptor.
    pub fn builder(id: impl Into<String>) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder::new(id)
    }

    /// Product master data.
    pub fn item() -> Result<Self> {
        Self::builtin_with_source("item", "tabItem")
    }

    /// Invoice headers.
    pub fn invoice() -> Result<Self> {
        Self::builtin_with_source("invoice", "tabSales Invoice")
    }

    /// Invoice line items.
    pub fn invoice_item() -> Result<Self> {
        Self::builtin_with_source("invoice_item", "tabSales Invoice Item")
    }

    /// All built-in descriptors in processing order.
    pub fn all() -> Result<Vec<Self>> {
        Ok(vec![Self::item()?, Self::invoice()?, Self::invoice_item()?])
    }

    /// Build a built-in descriptor with an overridden source table.
    pub fn builtin_with_source(id: &str, source_table: &str) -> Result<Self> {
        use ColumnType::*;

        let builder = Self::builder(id).source_table(source_table);
        let builder = match id {
            "item" => builder
                .target_table("item")
                .cursor_prefix("item")
                .column(ProjectedColumn::new("item_category", Text))
                .column(ProjectedColumn::new("cost", Numeric))
                .column(ProjectedColumn::new("modified", Timestamp).required())
                .index("modified"),
            "invoice" => builder
                .target_table("sales_invoice")
                .cursor_prefix("sales_invoice")
                .column(ProjectedColumn::new("posting_date", Date))
                .column(ProjectedColumn::new("modified", Timestamp).required())
                .column(ProjectedColumn::new("customer", Text))
                .column(ProjectedColumn::new("docstatus", Integer))
                .column(ProjectedColumn::new("grand_total", Numeric))
                .column(ProjectedColumn::new("outstanding_amount", Numeric))
                .index("posting_date")
                .index("docstatus")
                .index("modified"),
            "invoice_item" => builder
                .target_table("sales_invoice_item")
                .cursor_prefix("sales_invoice_item")
                .column(ProjectedColumn::new("parent", Text))
                .column(ProjectedColumn::new("item_code", Text))
                .column(ProjectedColumn::new("warehouse", Text))
                .column(ProjectedColumn::new("qty", Numeric))
                .column(ProjectedColumn::new("rate", Numeric))
                .column(ProjectedColumn::new("amount", Numeric))
                .column(ProjectedColumn::new("creation", Timestamp))
                .column(ProjectedColumn::new("modified", Timestamp).required())
                .column(ProjectedColumn::new("docstatus", Integer))
                .column(ProjectedColumn::new("idx", Integer))
                .index("parent")
                .index("modified"),
            other => {
                return Err(Error::InvalidValue {
                    column: "entity".into(),
                    message: format!("unknown entity '{other}'"),
                })
            }
        };
        builder.build()
    }

    /// Cursor store keys for this entity.
    pub fn cursor_keys(&self) -> CursorKeys {
        CursorKeys {
            time_key: format!("{}_modified", self.cursor_prefix),
            name_key: format!("{}_modified_name", self.cursor_prefix),
        }
    }

    /// Replica column names in insert order, payload last.
    pub fn replica_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .chain(std::iter::once(PAYLOAD_COLUMN))
            .collect()
    }
}

/// Check that a configured table or column name is safe to embed in SQL.
///
/// Names may contain ASCII letters, digits, underscores and spaces.
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidValue {
            column: "identifier".into(),
            message: format!("unsafe identifier: {name:?}"),
        })
    }
}

/// Builder for constructing an EntityDescriptor.
pub struct EntityDescriptorBuilder {
    id: String,
    source_table: Option<String>,
    time_column: String,
    key_column: String,
    target_table: Option<String>,
    columns: Vec<ProjectedColumn>,
    indexes: Vec<String>,
    cursor_prefix: Option<String>,
}

impl EntityDescriptorBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_table: None,
            time_column: "modified".into(),
            key_column: "name".into(),
            target_table: None,
            columns: vec![],
            indexes: vec![],
            cursor_prefix: None,
        }
    }

    pub fn source_table(mut self, table: impl Into<String>) -> Self {
        self.source_table = Some(table.into());
        self
    }

    pub fn time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = column.into();
        self
    }

    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = column.into();
        self
    }

    pub fn target_table(mut self, table: impl Into<String>) -> Self {
        self.target_table = Some(table.into());
        self
    }

    pub fn column(mut self, column: ProjectedColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, column: impl Into<String>) -> Self {
        self.indexes.push(column.into());
        self
    }

    pub fn cursor_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cursor_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> Result<EntityDescriptor> {
        let source_table = self
            .source_table
            .ok_or_else(|| Error::MissingColumn("source_table".into()))?;
        let target_table = self
            .target_table
            .ok_or_else(|| Error::MissingColumn("target_table".into()))?;
        let cursor_prefix = self.cursor_prefix.unwrap_or_else(|| target_table.clone());

        validate_identifier(&source_table)?;
        validate_identifier(&target_table)?;
        validate_identifier(&self.time_column)?;
        validate_identifier(&self.key_column)?;

        // The key column is always projected first and required.
        let mut columns = vec![ProjectedColumn::new(&self.key_column, ColumnType::Text).required()];
        for column in self.columns {
            validate_identifier(&column.name)?;
            if column.name == self.key_column || column.name == PAYLOAD_COLUMN {
                continue;
            }
            if columns.iter().any(|c| c.name == column.name) {
                return Err(Error::InvalidValue {
                    column: column.name,
                    message: "projected twice".into(),
                });
            }
            columns.push(column);
        }

        for index in &self.indexes {
            if !columns.iter().any(|c| &c.name == index) {
                return Err(Error::MissingColumn(index.clone()));
            }
        }

        Ok(EntityDescriptor {
            id: self.id,
            source_table,
            time_column: self.time_column,
            key_column: self.key_column,
            target_table,
            columns,
            indexes: self.indexes,
            cursor_prefix,
        })
    }
}
