//! Parquet output sink backed by `ArrowWriter`.

use anyhow::{Context, Result, anyhow};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression as ParquetCompression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};

use super::{BatchSink, SinkFactory, SinkSummary};
use crate::config::{MAX_ROW_GROUP_SIZE, TARGET_EXTENSION};

/// Column compression codec for Parquet output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Snappy,
    Zstd,
    Lz4,
}

impl Compression {
    /// Parse codec from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "uncompressed" => Ok(Compression::None),
            "snappy" => Ok(Compression::Snappy),
            "zstd" => Ok(Compression::Zstd),
            "lz4" => Ok(Compression::Lz4),
            _ => Err(anyhow!(
                "Unsupported compression: {}. Supported: none, snappy, zstd, lz4",
                s
            )),
        }
    }

    fn to_parquet(self) -> ParquetCompression {
        match self {
            Compression::None => ParquetCompression::UNCOMPRESSED,
            Compression::Snappy => ParquetCompression::SNAPPY,
            Compression::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
            Compression::Lz4 => ParquetCompression::LZ4_RAW,
        }
    }
}

/// Creates one Parquet file per output path
#[derive(Debug, Clone)]
pub struct ParquetSinkFactory {
    compression: Compression,
    max_row_group_size: usize,
}

impl Default for ParquetSinkFactory {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl ParquetSinkFactory {
    pub fn new(compression: Compression) -> Self {
        Self {
            compression,
            max_row_group_size: MAX_ROW_GROUP_SIZE,
        }
    }

    pub fn with_max_row_group_size(mut self, rows: usize) -> Self {
        self.max_row_group_size = rows.max(1);
        self
    }

    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression.to_parquet())
            .set_max_row_group_size(self.max_row_group_size)
            .build()
    }
}

impl SinkFactory for ParquetSinkFactory {
    fn extension(&self) -> &'static str {
        TARGET_EXTENSION
    }

    fn create(&self, path: &Path, schema: SchemaRef) -> Result<Box<dyn BatchSink>> {
        // File::create truncates, so a re-run replaces earlier output
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        let writer = ArrowWriter::try_new(file, schema, Some(self.writer_properties()))
            .with_context(|| format!("Failed to create Parquet writer for {}", path.display()))?;

        Ok(Box::new(ParquetSink {
            path: path.to_path_buf(),
            writer,
            summary: SinkSummary::default(),
        }))
    }
}

struct ParquetSink {
    path: PathBuf,
    writer: ArrowWriter<File>,
    summary: SinkSummary,
}

impl BatchSink for ParquetSink {
    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer
            .write(batch)
            .with_context(|| format!("Failed to write batch to {}", self.path.display()))?;
        self.summary.rows_written += batch.num_rows() as u64;
        self.summary.batches_written += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<SinkSummary> {
        let ParquetSink {
            path,
            writer,
            summary,
        } = *self;
        writer
            .close()
            .with_context(|| format!("Failed to finalize {}", path.display()))?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn batch(start: i64, len: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("label", DataType::Int64, true),
            Field::new("C1", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from_iter_values(start..start + len)),
                Arc::new(StringArray::from_iter_values(
                    (start..start + len).map(|i| format!("{:08x}", i)),
                )),
            ],
        )
        .unwrap()
    }

    fn read_labels(path: &Path) -> Vec<i64> {
        let file = File::open(path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let mut labels = Vec::new();
        for batch in reader {
            let batch = batch.unwrap();
            let col = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
            labels.extend(col.values().iter().copied());
        }
        labels
    }

    #[test]
    fn test_compression_parse() {
        assert_eq!(Compression::parse("ZSTD").unwrap(), Compression::Zstd);
        assert_eq!(Compression::parse("uncompressed").unwrap(), Compression::None);
        assert_eq!(Compression::default(), Compression::Snappy);
        assert!(Compression::parse("brotli-9000").is_err());
    }

    #[test]
    fn test_sink_appends_batches_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("day_0.parquet");
        let factory = ParquetSinkFactory::new(Compression::Zstd);

        let mut sink = factory.create(&path, batch(0, 1).schema()).unwrap();
        sink.write(&batch(0, 3)).unwrap();
        sink.write(&batch(3, 2)).unwrap();
        let summary = sink.close().unwrap();

        assert_eq!(
            summary,
            SinkSummary {
                rows_written: 5,
                batches_written: 2
            }
        );
        assert_eq!(read_labels(&path), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("day_0.parquet");
        let factory = ParquetSinkFactory::default().with_max_row_group_size(2);

        for _ in 0..2 {
            let mut sink = factory.create(&path, batch(0, 1).schema()).unwrap();
            sink.write(&batch(10, 3)).unwrap();
            sink.close().unwrap();
        }

        assert_eq!(read_labels(&path), vec![10, 11, 12]);
    }

    #[test]
    fn test_unwritable_output_dir() {
        let factory = ParquetSinkFactory::default();
        let result = factory.create(
            Path::new("/nonexistent/dir/day_0.parquet"),
            batch(0, 1).schema(),
        );
        assert!(result.is_err());
    }
}
