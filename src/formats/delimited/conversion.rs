//! Conversion from delimited text records to Arrow RecordBatches.
//!
//! Fields are parsed straight into typed column builders according to the
//! declared column types. Empty fields become nulls; anything else that does
//! not parse as the declared type is an error.

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, Int64Builder, StringBuilder};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use csv::StringRecord;
use std::sync::Arc;

use crate::formats::schema::{ColumnType, TableSchema};

enum ColumnBuilder {
    Int64(Int64Builder),
    Utf8(StringBuilder),
    HexInt64(Int64Builder),
}

impl ColumnBuilder {
    fn new(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Int64 => ColumnBuilder::Int64(Int64Builder::with_capacity(capacity)),
            ColumnType::Utf8 => {
                ColumnBuilder::Utf8(StringBuilder::with_capacity(capacity, capacity * 8))
            }
            ColumnType::HexInt64 => ColumnBuilder::HexInt64(Int64Builder::with_capacity(capacity)),
        }
    }

    fn append(&mut self, field: &str) -> Result<()> {
        match self {
            ColumnBuilder::Int64(builder) => {
                if field.is_empty() {
                    builder.append_null();
                } else {
                    builder.append_value(field.parse::<i64>()?);
                }
            }
            ColumnBuilder::Utf8(builder) => {
                if field.is_empty() {
                    builder.append_null();
                } else {
                    builder.append_value(field);
                }
            }
            ColumnBuilder::HexInt64(builder) => {
                if field.is_empty() {
                    builder.append_null();
                } else {
                    builder.append_value(i64::from_str_radix(field, 16)?);
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Int64(builder) | ColumnBuilder::HexInt64(builder) => {
                Arc::new(builder.finish())
            }
            ColumnBuilder::Utf8(builder) => Arc::new(builder.finish()),
        }
    }
}

/// Accumulates delimited records into one typed RecordBatch
pub struct BatchBuilder<'a> {
    schema: &'a TableSchema,
    arrow_schema: SchemaRef,
    builders: Vec<ColumnBuilder>,
}

impl<'a> BatchBuilder<'a> {
    pub fn new(schema: &'a TableSchema, capacity: usize) -> Self {
        let builders = schema
            .columns()
            .iter()
            .map(|c| ColumnBuilder::new(c.column_type, capacity))
            .collect();

        Self {
            schema,
            arrow_schema: schema.to_arrow(),
            builders,
        }
    }

    /// Append one record; its field count must match the schema
    pub fn append_record(&mut self, record: &StringRecord) -> Result<()> {
        if record.len() != self.schema.len() {
            bail!(
                "Expected {} fields but found {}",
                self.schema.len(),
                record.len()
            );
        }

        for ((builder, column), field) in self
            .builders
            .iter_mut()
            .zip(self.schema.columns())
            .zip(record.iter())
        {
            builder.append(field).with_context(|| {
                format!(
                    "Invalid value '{}' for column {} ({:?})",
                    field, column.name, column.column_type
                )
            })?;
        }

        Ok(())
    }

    pub fn finish(mut self) -> Result<RecordBatch> {
        let arrays: Vec<ArrayRef> = self.builders.iter_mut().map(|b| b.finish()).collect();
        RecordBatch::try_new(self.arrow_schema, arrays).context("Failed to assemble RecordBatch")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use std::collections::HashMap;

    fn small_schema(categorical: ColumnType) -> TableSchema {
        let names: Vec<String> = ["label", "I1", "C1"].iter().map(|s| s.to_string()).collect();
        let types = HashMap::from([
            ("label".to_string(), ColumnType::Int64),
            ("I1".to_string(), ColumnType::Int64),
            ("C1".to_string(), categorical),
        ]);
        TableSchema::new(&names, &types).unwrap()
    }

    #[test]
    fn test_typed_columns_and_nulls() {
        let schema = small_schema(ColumnType::Utf8);
        let mut builder = BatchBuilder::new(&schema, 4);

        builder
            .append_record(&StringRecord::from(vec!["1", "5", "68fd1e64"]))
            .unwrap();
        builder
            .append_record(&StringRecord::from(vec!["0", "", ""]))
            .unwrap();

        let batch = builder.finish().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 3);

        let label = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(label.value(0), 1);
        assert_eq!(label.value(1), 0);

        let i1 = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(i1.value(0), 5);
        assert!(i1.is_null(1));

        let c1 = batch.column(2).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(c1.value(0), "68fd1e64");
        assert!(c1.is_null(1));
    }

    #[test]
    fn test_hex_categoricals() {
        let schema = small_schema(ColumnType::HexInt64);
        let mut builder = BatchBuilder::new(&schema, 1);
        builder
            .append_record(&StringRecord::from(vec!["0", "-1", "ff"]))
            .unwrap();

        let batch = builder.finish().unwrap();
        let c1 = batch.column(2).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(c1.value(0), 255);
        let i1 = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(i1.value(0), -1);
    }

    #[test]
    fn test_wrong_field_count() {
        let schema = small_schema(ColumnType::Utf8);
        let mut builder = BatchBuilder::new(&schema, 1);
        let err = builder
            .append_record(&StringRecord::from(vec!["1", "2"]))
            .unwrap_err();
        assert!(err.to_string().contains("Expected 3 fields but found 2"));
    }

    #[test]
    fn test_unparseable_integer() {
        let schema = small_schema(ColumnType::Utf8);
        let mut builder = BatchBuilder::new(&schema, 1);
        let err = builder
            .append_record(&StringRecord::from(vec!["1", "abc", "x"]))
            .unwrap_err();
        assert!(err.to_string().contains("column I1"));
    }

    #[test]
    fn test_empty_batch() {
        let schema = small_schema(ColumnType::Utf8);
        let batch = BatchBuilder::new(&schema, 0).finish().unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema(), schema.to_arrow());
    }
}
