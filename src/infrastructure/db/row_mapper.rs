use sqlx::any::AnyRow;
use sqlx::{Column, Row, TypeInfo};

use crate::domain::error::MigrationError;
use crate::domain::ports::{SqlRow, SqlValue};

/// Convert a sqlx `AnyRow` into a positional [`SqlRow`].
///
/// The Any driver reports one of a small set of type names; everything
/// it cannot decode natively is read as text, falling back to raw bytes
/// for MySQL's habit of returning string-ish columns as BLOB.
pub fn row_to_values(row: &AnyRow) -> Result<SqlRow, MigrationError> {
    let mut values = Vec::with_capacity(row.columns().len());
    for col in row.columns() {
        values.push(decode_column(row, col.ordinal(), col.type_info().name())?);
    }
    Ok(values)
}

fn decode_column(row: &AnyRow, idx: usize, type_name: &str) -> Result<SqlValue, MigrationError> {
    let decode_err =
        |e: sqlx::Error| MigrationError::operation("row-decode", format!("column {idx}: {e}"));

    let value = match type_name.to_uppercase().as_str() {
        "NULL" => SqlValue::Null,

        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, SqlValue::Bool),

        "SMALLINT" | "INT2" | "TINYINT" => row
            .try_get::<Option<i32>, _>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, |v| SqlValue::Int(v as i64)),

        "INT" | "INT4" | "INTEGER" | "MEDIUMINT" | "SERIAL" => row
            .try_get::<Option<i32>, _>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, |v| SqlValue::Int(v as i64)),

        "BIGINT" | "INT8" | "BIGSERIAL" => row
            .try_get::<Option<i64>, _>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, SqlValue::Int),

        "REAL" | "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, |v| SqlValue::Float(v as f64)),

        "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" | "FLOAT" => row
            .try_get::<Option<f64>, _>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, SqlValue::Float),

        "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, SqlValue::Bytes),

        // TEXT, VARCHAR, CHAR, UUID, TIMESTAMP, NUMERIC… all read as text;
        // fall back to bytes when the driver insists on BLOB.
        _ => match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => v.map_or(SqlValue::Null, SqlValue::Text),
            Err(_) => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .map_err(decode_err)?
                .map_or(SqlValue::Null, SqlValue::Bytes),
        },
    };
    Ok(value)
}
