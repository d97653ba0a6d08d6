//! Parquet source reader implementation.

use anyhow::{Context, Result, anyhow};
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use parquet::arrow::ProjectionMask;
use parquet::arrow::async_reader::ParquetRecordBatchStreamBuilder;
use std::path::{Path, PathBuf};
use tokio::fs::File;

use crate::formats::reader::{Chunk, FileMetadata, SourceReader};
use crate::formats::schema::TableSchema;

use super::conversion::conform_batch;

/// Information about a row group cached from Parquet metadata
#[derive(Debug, Clone)]
struct RowGroupInfo {
    index: usize,
    num_rows: u64,
    total_byte_size: u64,
}

/// Parquet reader over a local file
/// Chunks are runs of whole row groups
pub struct GenericParquetReader {
    path: PathBuf,
    schema: TableSchema,
    file_size: u64,
    row_groups: Vec<RowGroupInfo>,
}

impl GenericParquetReader {
    /// Create a new reader by reading the file footer
    pub async fn new(path: &Path, schema: TableSchema) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let file_size = file.metadata().await?.len();

        let builder = ParquetRecordBatchStreamBuilder::new(file)
            .await
            .with_context(|| format!("Failed to read Parquet metadata of {}", path.display()))?;

        let row_groups = builder
            .metadata()
            .row_groups()
            .iter()
            .enumerate()
            .map(|(index, rg)| RowGroupInfo {
                index,
                num_rows: rg.num_rows() as u64,
                total_byte_size: rg.total_byte_size() as u64,
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            schema,
            file_size,
            row_groups,
        })
    }

    fn total_rows(&self) -> u64 {
        self.row_groups.iter().map(|rg| rg.num_rows).sum()
    }
}

#[async_trait]
impl SourceReader for GenericParquetReader {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn metadata(&self) -> Result<FileMetadata> {
        let total_rows = self.total_rows();
        let total_bytes: u64 = self.row_groups.iter().map(|rg| rg.total_byte_size).sum();

        Ok(FileMetadata {
            file_size_bytes: self.file_size,
            estimated_rows: Some(total_rows),
            avg_row_bytes: if total_rows == 0 {
                0
            } else {
                (total_bytes / total_rows).max(1)
            },
        })
    }

    async fn create_chunks(&self, target_size: u64) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut chunk_id = 0u32;

        let mut current: Option<(usize, usize)> = None; // (first, last) row group
        let mut current_size = 0u64;
        let mut current_rows = 0u64;

        for rg in self.row_groups.iter().filter(|rg| rg.num_rows > 0) {
            if let Some((first, last)) = current
                && current_size + rg.total_byte_size > target_size
            {
                chunks.push(Chunk {
                    chunk_id,
                    start_offset: first as u64,
                    end_offset: last as u64 + 1,
                    estimated_rows: Some(current_rows),
                });
                chunk_id += 1;
                current = None;
                current_size = 0;
                current_rows = 0;
            }

            current = Some(match current {
                Some((first, _)) => (first, rg.index),
                None => (rg.index, rg.index),
            });
            current_size += rg.total_byte_size;
            current_rows += rg.num_rows;
        }

        if let Some((first, last)) = current {
            chunks.push(Chunk {
                chunk_id,
                start_offset: first as u64,
                end_offset: last as u64 + 1,
                estimated_rows: Some(current_rows),
            });
        }

        Ok(chunks)
    }

    async fn read_chunk(&self, chunk: &Chunk) -> Result<RecordBatch> {
        let row_group_indices: Vec<usize> =
            (chunk.start_offset as usize..chunk.end_offset as usize).collect();
        if row_group_indices.is_empty() {
            return Err(anyhow!("No row groups found for chunk {}", chunk.chunk_id));
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let builder = ParquetRecordBatchStreamBuilder::new(file)
            .await
            .context("Failed to create Parquet stream builder")?;

        // Only decode the columns the table needs; a missing one is reported
        // by conform_batch with its name.
        let source_schema = builder.schema().clone();
        let projection: Vec<usize> = self
            .schema
            .columns()
            .iter()
            .filter_map(|c| source_schema.index_of(&c.name).ok())
            .collect();
        let mask = ProjectionMask::roots(builder.parquet_schema(), projection);

        let stream = builder
            .with_row_groups(row_group_indices)
            .with_projection(mask)
            .build()
            .context("Failed to build Parquet stream")?;

        let batches: Vec<RecordBatch> = stream
            .map_err(anyhow::Error::from)
            .and_then(|batch| async move { conform_batch(&batch, &self.schema) })
            .try_collect()
            .await
            .with_context(|| {
                format!(
                    "Failed to read chunk {} of {}",
                    chunk.chunk_id,
                    self.path.display()
                )
            })?;

        concat_batches(&self.schema.to_arrow(), &batches).context("Failed to concatenate batches")
    }
}
