use anyhow::{Result, anyhow, bail};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use sysinfo::{System, SystemExt};

use super::delimited::GenericDelimitedReader;
use super::parquet::GenericParquetReader;
use super::schema::TableSchema;
use crate::config::FALLBACK_ROW_BYTES;
use crate::io::LocalFileByteReader;

/// Metadata about a source file
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub file_size_bytes: u64,
    pub estimated_rows: Option<u64>,
    /// Approximate size of one row, used to turn a batch budget into bytes
    pub avg_row_bytes: u64,
}

/// A contiguous slice of a source file that is materialized as one batch
///
/// For delimited files the offsets are byte offsets on record boundaries; for
/// Parquet files they are row-group indices (`end_offset` exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: u32,
    pub start_offset: u64,
    pub end_offset: u64,
    pub estimated_rows: Option<u64>,
}

/// Trait for reading a tabular source file as a sequence of typed batches
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Path of the file this reader scans
    fn path(&self) -> &Path;

    /// Get metadata about the file
    async fn metadata(&self) -> Result<FileMetadata>;

    /// Split the file into chunks of roughly `target_size` bytes, respecting
    /// record boundaries. Chunks are returned in file order.
    async fn create_chunks(&self, target_size: u64) -> Result<Vec<Chunk>>;

    /// Materialize one chunk as a batch conforming to the table schema
    async fn read_chunk(&self, chunk: &Chunk) -> Result<RecordBatch>;
}

/// Configuration for delimited file reading (CSV, TSV, etc.)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub has_header: bool,
    /// Quote character; `None` treats quotes as ordinary data
    pub quote: Option<u8>,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: false,
            quote: Some(b'"'),
        }
    }
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self::default()
    }

    /// Tab-separated, headerless: the layout of the Criteo shards
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }
}

/// Supported source file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Tsv,
    Parquet,
}

impl Format {
    /// Parse format from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "tsv" => Ok(Format::Tsv),
            "parquet" => Ok(Format::Parquet),
            _ => Err(anyhow!(
                "Unsupported format: {}. Supported formats: csv, tsv, parquet",
                s
            )),
        }
    }
}

/// How large a single row batch may grow
///
/// A memory budget is turned into a row count with the reader's row-size
/// estimate: `max(budget / row_size, 1)` rows per batch.
///
/// The row size is the source's average encoded row size (text bytes per
/// line for delimited files, compressed bytes per row for Parquet), not the
/// decoded Arrow footprint. For Criteo rows the two are of the same order:
/// 14 integers take 8 bytes each in memory against 1-10 digits on disk, and
/// categorical strings cost their text plus a 4-byte offset. Treat the
/// budget as approximate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchBudget {
    /// Bytes of memory one batch may occupy
    MemoryBytes(u64),
    /// Fixed number of rows per batch
    Rows(u64),
}

impl BatchBudget {
    /// Budget a fraction of memory per batch
    ///
    /// `memory_bytes` overrides the memory the fraction is taken of; when
    /// absent the host's currently available memory is used.
    pub fn from_memory_fraction(fraction: f64, memory_bytes: Option<u64>) -> Result<Self> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            bail!("Memory fraction must be in (0, 1], got {}", fraction);
        }

        let memory_bytes = match memory_bytes {
            Some(bytes) => bytes,
            None => available_memory()?,
        };

        Ok(BatchBudget::MemoryBytes(
            ((memory_bytes as f64 * fraction) as u64).max(1),
        ))
    }

    /// Rows one batch may hold, given the average size of a row
    pub fn rows_per_batch(&self, avg_row_bytes: u64) -> u64 {
        match *self {
            BatchBudget::MemoryBytes(bytes) => (bytes / avg_row_bytes.max(1)).max(1),
            BatchBudget::Rows(rows) => rows.max(1),
        }
    }

    /// Target chunk size in bytes, given the average size of a row
    pub fn target_bytes(&self, avg_row_bytes: u64) -> u64 {
        let avg_row_bytes = if avg_row_bytes == 0 {
            FALLBACK_ROW_BYTES
        } else {
            avg_row_bytes
        };
        self.rows_per_batch(avg_row_bytes)
            .saturating_mul(avg_row_bytes)
    }
}

fn available_memory() -> Result<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    match sys.available_memory() {
        0 => bail!("Could not determine available memory; pass an explicit memory budget"),
        bytes => Ok(bytes),
    }
}

/// Factory for creating SourceReader instances based on format
pub struct ReaderFactory {
    schema: TableSchema,
    delimited_config: Option<DelimitedConfig>,
}

impl ReaderFactory {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            delimited_config: None,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Override the delimited settings implied by the format
    pub fn with_delimited_config(mut self, config: DelimitedConfig) -> Self {
        self.delimited_config = Some(config);
        self
    }

    /// Create a SourceReader for a local file
    pub async fn create_reader(
        &self,
        path: &Path,
        format: Format,
    ) -> Result<Arc<dyn SourceReader>> {
        match format {
            Format::Csv | Format::Tsv => {
                let config = self.delimited_config.clone().unwrap_or(match format {
                    Format::Csv => DelimitedConfig::csv(),
                    _ => DelimitedConfig::tsv(),
                });
                let byte_reader = LocalFileByteReader::new(path);
                let reader = GenericDelimitedReader::new(byte_reader, config, self.schema.clone());
                Ok(Arc::new(reader) as Arc<dyn SourceReader>)
            }

            Format::Parquet => {
                let reader = GenericParquetReader::new(path, self.schema.clone()).await?;
                Ok(Arc::new(reader) as Arc<dyn SourceReader>)
            }
        }
    }
}
