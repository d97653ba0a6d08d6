//! Parquet source support.
//!
//! Existing Parquet shards can be re-read and rewritten with the target
//! schema. It includes:
//! - Row-group based chunking, so a batch never splits a row group
//! - Conforming batches to the target schema (column selection and casts)

mod conversion;
mod reader;

pub use reader::GenericParquetReader;
