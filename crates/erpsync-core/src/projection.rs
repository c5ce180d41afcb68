//! Typed projection of source records into replica rows.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::entity::{ColumnType, EntityDescriptor, ProjectedColumn};
use crate::error::{Error, Result};
use crate::types::{SourceRecord, Value};
use crate::watermark::parse_timestamp;

/// A typed value bound for one replica column.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedValue {
    Null,
    Text(String),
    Integer(i32),
    Numeric(Decimal),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

/// One row ready to be written to a replica table.
///
/// `values` is aligned with the descriptor's projected columns; `raw` is the
/// full source record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaRow {
    pub key: String,
    pub values: Vec<ProjectedValue>,
    pub raw: serde_json::Value,
}

/// Project a single source record.
pub fn project_record(entity: &EntityDescriptor, record: &SourceRecord) -> Result<ReplicaRow> {
    let key = record.require_str(&entity.key_column)?.to_string();

    let values = entity
        .columns
        .iter()
        .map(|column| project_value(column, record.get(&column.name)))
        .collect::<Result<Vec<_>>>()?;

    Ok(ReplicaRow {
        key,
        values,
        raw: record.to_json(),
    })
}

/// Project a whole batch. Any invalid row fails the batch.
pub fn project_batch(entity: &EntityDescriptor, records: &[SourceRecord]) -> Result<Vec<ReplicaRow>> {
    records
        .iter()
        .map(|record| project_record(entity, record))
        .collect()
}

fn project_value(column: &ProjectedColumn, value: Option<&Value>) -> Result<ProjectedValue> {
    let value = match value {
        None | Some(Value::Null) => {
            if column.required {
                return Err(Error::MissingColumn(column.name.clone()));
            }
            return Ok(ProjectedValue::Null);
        }
        Some(v) => v,
    };

    let mismatch = || Error::InvalidColumnType {
        column: column.name.clone(),
        expected: column.column_type.sql_type().to_lowercase(),
        actual: value.kind().into(),
    };
    let invalid = |message: String| Error::InvalidValue {
        column: column.name.clone(),
        message,
    };

    match column.column_type {
        ColumnType::Text => match value {
            Value::Text(s) => Ok(ProjectedValue::Text(s.clone())),
            Value::Int(i) => Ok(ProjectedValue::Text(i.to_string())),
            Value::Float(f) => Ok(ProjectedValue::Text(f.to_string())),
            Value::Null => Ok(ProjectedValue::Null),
        },
        ColumnType::Integer => match value {
            Value::Int(i) => i32::try_from(*i)
                .map(ProjectedValue::Integer)
                .map_err(|_| invalid(format!("{i} does not fit in INT"))),
            Value::Text(s) => s
                .trim()
                .parse::<i32>()
                .map(ProjectedValue::Integer)
                .map_err(|e| invalid(format!("{s:?}: {e}"))),
            _ => Err(mismatch()),
        },
        ColumnType::Numeric => match value {
            Value::Int(i) => Ok(ProjectedValue::Numeric(Decimal::from(*i))),
            Value::Float(f) => Decimal::try_from(*f)
                .map(ProjectedValue::Numeric)
                .map_err(|e| invalid(format!("{f}: {e}"))),
            Value::Text(s) => parse_decimal(s)
                .map(ProjectedValue::Numeric)
                .map_err(invalid),
            _ => Err(mismatch()),
        },
        ColumnType::Date => match value {
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .or_else(|_| parse_timestamp(s).map(|t| t.date()))
                .map(ProjectedValue::Date)
                .map_err(|_| invalid(format!("{s:?} is not a date"))),
            _ => Err(mismatch()),
        },
        ColumnType::Timestamp => match value {
            Value::Text(s) => parse_timestamp(s).map(ProjectedValue::Timestamp),
            _ => Err(mismatch()),
        },
    }
}

fn parse_decimal(s: &str) -> std::result::Result<Decimal, String> {
    let trimmed = s.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| format!("{s:?}: {e}"))
}
