//! Source formats, schemas and the batch stream built on top of them

pub mod dataset;
pub mod delimited;
pub mod parquet;
pub mod reader;
pub mod schema;

pub use dataset::{DatasetReader, RowBatch};
pub use reader::{BatchBudget, DelimitedConfig, Format, ReaderFactory};
pub use schema::{ColumnType, TableSchema};
