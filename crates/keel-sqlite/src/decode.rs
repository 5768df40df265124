//! Row decoding.
//!
//! SQLite is dynamically typed, so each cell is decoded by the storage class
//! of the value actually stored. The declared column type is only consulted
//! to turn integers stored in `BOOLEAN` columns back into booleans.

use keel_core::{Error, Result, Row, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

/// Converts a sqlx row into a keel [`Row`], keeping column order.
pub fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::with_capacity(row.len());
    for column in row.columns() {
        let index = column.ordinal();
        let declared_bool = column.type_info().name().eq_ignore_ascii_case("BOOLEAN");
        let (is_null, type_name) = {
            let raw = row.try_get_raw(index).map_err(Error::driver)?;
            (raw.is_null(), raw.type_info().name().to_string())
        };

        let value = if is_null {
            Value::Null
        } else {
            match type_name.as_str() {
                "BOOLEAN" => Value::Bool(row.try_get_unchecked(index).map_err(Error::driver)?),
                "INTEGER" if declared_bool => {
                    let stored: i64 = row.try_get_unchecked(index).map_err(Error::driver)?;
                    Value::Bool(stored != 0)
                }
                "INTEGER" => Value::Int(row.try_get_unchecked(index).map_err(Error::driver)?),
                "REAL" => Value::Float(row.try_get_unchecked(index).map_err(Error::driver)?),
                "BLOB" => Value::Blob(row.try_get_unchecked(index).map_err(Error::driver)?),
                _ => Value::Text(row.try_get_unchecked(index).map_err(Error::driver)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}
