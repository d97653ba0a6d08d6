//! Conforming Parquet batches to the target table schema.
//!
//! Source files may order columns differently, carry extra columns, or store
//! a column with another physical type. Columns are selected by name and cast
//! to the declared type; a value that does not survive the cast is an error
//! rather than a silent null.

use anyhow::{Context, Result, anyhow};
use arrow::array::{Array, ArrayRef, Int64Builder, LargeStringArray, StringArray};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::formats::schema::{ColumnType, TableSchema};

/// Select and cast the columns of `batch` to match `schema`
pub fn conform_batch(batch: &RecordBatch, schema: &TableSchema) -> Result<RecordBatch> {
    let cast_options = CastOptions {
        safe: false,
        ..Default::default()
    };

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.len());
    for column in schema.columns() {
        let array = batch
            .column_by_name(&column.name)
            .ok_or_else(|| anyhow!("Source is missing column '{}'", column.name))?;

        let converted = match (column.column_type, array.data_type()) {
            (ColumnType::HexInt64, DataType::Utf8 | DataType::LargeUtf8) => hex_to_int64(array),
            (column_type, _) => cast_with_options(array, &column_type.arrow_type(), &cast_options)
                .map_err(anyhow::Error::from),
        }
        .with_context(|| {
            format!(
                "Failed to convert column {} from {:?} to {:?}",
                column.name,
                array.data_type(),
                column.column_type
            )
        })?;

        arrays.push(converted);
    }

    RecordBatch::try_new(schema.to_arrow(), arrays).context("Failed to assemble RecordBatch")
}

/// Decode a string column of hex hashes; empty strings and nulls become nulls
fn hex_to_int64(array: &ArrayRef) -> Result<ArrayRef> {
    let values: Box<dyn Iterator<Item = Option<&str>>> = match array.data_type() {
        DataType::Utf8 => Box::new(
            array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow!("Expected a Utf8 array"))?
                .iter(),
        ),
        _ => Box::new(
            array
                .as_any()
                .downcast_ref::<LargeStringArray>()
                .ok_or_else(|| anyhow!("Expected a LargeUtf8 array"))?
                .iter(),
        ),
    };

    let mut builder = Int64Builder::with_capacity(array.len());
    for value in values {
        match value {
            None | Some("") => builder.append_null(),
            Some(hex) => builder.append_value(
                i64::from_str_radix(hex, 16)
                    .with_context(|| format!("Invalid hex value '{}'", hex))?,
            ),
        }
    }

    Ok(Arc::new(builder.finish()))
}
