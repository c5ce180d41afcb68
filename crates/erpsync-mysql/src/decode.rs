//! Conversion of MySQL rows into source records.

use chrono::NaiveDate;
use erpsync_core::{format_timestamp, RowMap, SourceRecord, Value};
use mysql_async::consts::ColumnType;
use mysql_async::{Row, Value as MySqlValue};

use crate::error::{SourceError, SourceResult};

/// Decode every column of a row.
pub fn decode_row(row: &Row) -> SourceResult<SourceRecord> {
    let mut columns = RowMap::with_capacity(row.len());
    for (i, column) in row.columns_ref().iter().enumerate() {
        let name = column.name_str().into_owned();
        let value = match row.as_ref(i) {
            Some(raw) => decode_value(&name, column.column_type(), raw)?,
            None => Value::Null,
        };
        columns.insert(name, value);
    }
    Ok(SourceRecord::new(columns))
}

/// Decode one binary-protocol value.
///
/// DECIMAL arrives as text and stays text so no precision is lost. Zero dates
/// (`0000-00-00`) become null.
pub fn decode_value(column: &str, column_type: ColumnType, value: &MySqlValue) -> SourceResult<Value> {
    let decode_err = |message: String| SourceError::Decode {
        column: column.to_string(),
        message,
    };

    match value {
        MySqlValue::NULL => Ok(Value::Null),
        MySqlValue::Int(i) => Ok(Value::Int(*i)),
        MySqlValue::UInt(u) => Ok(i64::try_from(*u)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(u.to_string()))),
        MySqlValue::Float(f) => Ok(Value::Float(f64::from(*f))),
        MySqlValue::Double(d) => Ok(Value::Float(*d)),
        MySqlValue::Bytes(bytes) => String::from_utf8(bytes.clone())
            .map(Value::Text)
            .map_err(|_| decode_err(format!("{} bytes of non-UTF-8 data", bytes.len()))),
        MySqlValue::Date(0, 0, 0, _, _, _, _) => Ok(Value::Null),
        MySqlValue::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                .ok_or_else(|| decode_err(format!("invalid date {year}-{month}-{day}")))?;
            if matches!(column_type, ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE) {
                return Ok(Value::Text(date.format("%Y-%m-%d").to_string()));
            }
            let ts = date
                .and_hms_micro_opt(u32::from(*hour), u32::from(*minute), u32::from(*second), *micros)
                .ok_or_else(|| decode_err(format!("invalid time {hour}:{minute}:{second}.{micros}")))?;
            Ok(Value::Text(format_timestamp(&ts)))
        }
        MySqlValue::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let sign = if *negative { "-" } else { "" };
            Ok(Value::Text(format!(
                "{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_stays_exact() {
        let v = decode_value(
            "grand_total",
            ColumnType::MYSQL_TYPE_NEWDECIMAL,
            &MySqlValue::Bytes(b"1500.500000000".to_vec()),
        )
        .unwrap();
        assert_eq!(v, Value::from("1500.500000000"));
    }

    #[test]
    fn test_datetime_is_canonical_text() {
        let v = decode_value(
            "modified",
            ColumnType::MYSQL_TYPE_DATETIME,
            &MySqlValue::Date(2024, 3, 5, 7, 8, 9, 123456),
        )
        .unwrap();
        assert_eq!(v, Value::from("2024-03-05 07:08:09.123456"));
    }

    #[test]
    fn test_date_column_has_no_time() {
        let v = decode_value(
            "posting_date",
            ColumnType::MYSQL_TYPE_DATE,
            &MySqlValue::Date(2024, 2, 29, 0, 0, 0, 0),
        )
        .unwrap();
        assert_eq!(v, Value::from("2024-02-29"));
    }

    #[test]
    fn test_zero_date_is_null() {
        let v = decode_value(
            "posting_date",
            ColumnType::MYSQL_TYPE_DATE,
            &MySqlValue::Date(0, 0, 0, 0, 0, 0, 0),
        )
        .unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn test_invalid_date_fails() {
        let err = decode_value(
            "modified",
            ColumnType::MYSQL_TYPE_DATETIME,
            &MySqlValue::Date(2024, 2, 30, 0, 0, 0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::Decode { ref column, .. } if column == "modified"));
    }

    #[test]
    fn test_non_utf8_fails() {
        let err = decode_value(
            "image",
            ColumnType::MYSQL_TYPE_BLOB,
            &MySqlValue::Bytes(vec![0xff, 0xfe]),
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::Decode { .. }));

        let core: erpsync_core::Error = err.into();
        assert!(core.is_data_error());
    }

    #[test]
    fn test_numbers() {
        let ty = ColumnType::MYSQL_TYPE_LONGLONG;
        assert_eq!(decode_value("idx", ty, &MySqlValue::Int(-3)).unwrap(), Value::Int(-3));
        assert_eq!(decode_value("idx", ty, &MySqlValue::UInt(7)).unwrap(), Value::Int(7));
        assert_eq!(
            decode_value("idx", ty, &MySqlValue::UInt(u64::MAX)).unwrap(),
            Value::from(u64::MAX.to_string())
        );
        assert_eq!(
            decode_value("qty", ColumnType::MYSQL_TYPE_DOUBLE, &MySqlValue::Double(2.5)).unwrap(),
            Value::Float(2.5)
        );
    }

    #[test]
    fn test_time_value() {
        let v = decode_value(
            "posting_time",
            ColumnType::MYSQL_TYPE_TIME,
            &MySqlValue::Time(false, 1, 2, 3, 4, 0),
        )
        .unwrap();
        assert_eq!(v, Value::from("26:03:04.000000"));
    }
}
