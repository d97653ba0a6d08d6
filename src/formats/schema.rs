//! Column layout of the Criteo click-logs dataset.
//!
//! Shards carry no header: every row is a label followed by 13 integer
//! features and 26 categorical features. Categorical values are 32-bit hashes
//! rendered as 8 hex characters.

use anyhow::{Result, bail};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::collections::HashMap;
use std::sync::Arc;

pub const LABEL_COLUMN: &str = "label";
pub const NUM_INTEGER_FEATURES: usize = 13;
pub const NUM_CATEGORICAL_FEATURES: usize = 26;

/// Declared scalar type of a source column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Base-10 integer
    Int64,
    /// Text, kept verbatim
    Utf8,
    /// Hex-encoded integer, stored as a 64-bit integer
    HexInt64,
}

impl ColumnType {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "int64" | "int" => Ok(ColumnType::Int64),
            "utf8" | "str" | "string" => Ok(ColumnType::Utf8),
            "hex" => Ok(ColumnType::HexInt64),
            _ => bail!("Unsupported column type: {}. Supported types: int64, utf8, hex", s),
        }
    }

    /// Arrow type the column is materialized as
    pub fn arrow_type(self) -> DataType {
        match self {
            ColumnType::Int64 | ColumnType::HexInt64 => DataType::Int64,
            ColumnType::Utf8 => DataType::Utf8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// Ordered column names plus their declared types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<Column>,
}

impl TableSchema {
    /// Build a schema from ordered names and a name -> type map
    ///
    /// Every name must have a type, and names must be unique.
    pub fn new(names: &[String], types: &HashMap<String, ColumnType>) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let Some(&column_type) = types.get(name) else {
                bail!("No type declared for column '{}'", name);
            };
            if columns.iter().any(|c: &Column| &c.name == name) {
                bail!("Duplicate column '{}'", name);
            }
            columns.push(Column {
                name: name.clone(),
                column_type,
            });
        }
        if columns.is_empty() {
            bail!("Schema must declare at least one column");
        }
        Ok(Self { columns })
    }

    /// The fixed Criteo layout: `label`, `I1`..`I13`, `C1`..`C26`
    ///
    /// With `hex_categoricals` the categorical hashes are decoded to integers
    /// instead of being kept as strings.
    pub fn criteo(hex_categoricals: bool) -> Self {
        let categorical_type = if hex_categoricals {
            ColumnType::HexInt64
        } else {
            ColumnType::Utf8
        };

        let mut columns = Vec::with_capacity(1 + NUM_INTEGER_FEATURES + NUM_CATEGORICAL_FEATURES);
        columns.push(Column {
            name: LABEL_COLUMN.to_string(),
            column_type: ColumnType::Int64,
        });
        columns.extend((1..=NUM_INTEGER_FEATURES).map(|i| Column {
            name: format!("I{}", i),
            column_type: ColumnType::Int64,
        }));
        columns.extend((1..=NUM_CATEGORICAL_FEATURES).map(|i| Column {
            name: format!("C{}", i),
            column_type: categorical_type,
        }));

        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn types(&self) -> HashMap<String, ColumnType> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.column_type))
            .collect()
    }

    /// Arrow schema of the batches produced for this table; every column is
    /// nullable because empty fields are common in the click logs
    pub fn to_arrow(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(&c.name, c.column_type.arrow_type(), true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}
