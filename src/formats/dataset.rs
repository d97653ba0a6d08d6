//! Lazy row-batch stream over a sorted set of source files.

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use async_stream::try_stream;
use futures::stream::BoxStream;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::reader::{BatchBudget, Format, ReaderFactory};

/// A batch of rows tagged with the file it was read from
#[derive(Debug, Clone)]
pub struct RowBatch {
    pub source: PathBuf,
    pub batch: RecordBatch,
}

/// Reads a set of files, one after another, as a single stream of batches
///
/// Files are opened only when the stream reaches them. Batches of one file
/// are yielded contiguously and in file order. A file without rows yields a
/// single empty batch, so every source still maps to an output.
pub struct DatasetReader {
    paths: Vec<PathBuf>,
    format: Format,
    factory: ReaderFactory,
    budget: BatchBudget,
}

impl DatasetReader {
    pub fn new(
        mut paths: Vec<PathBuf>,
        format: Format,
        factory: ReaderFactory,
        budget: BatchBudget,
    ) -> Self {
        paths.sort();
        Self {
            paths,
            format,
            factory,
            budget,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn batches(&self) -> BoxStream<'_, Result<RowBatch>> {
        Box::pin(try_stream! {
            for path in &self.paths {
                let reader = self
                    .factory
                    .create_reader(path, self.format)
                    .await
                    .with_context(|| format!("Failed to open source {}", path.display()))?;

                let metadata = reader.metadata().await?;
                let target_bytes = self.budget.target_bytes(metadata.avg_row_bytes);
                let chunks = reader.create_chunks(target_bytes).await?;

                debug!(
                    "{}: {} bytes, ~{} rows, {} batches of up to {} rows",
                    path.display(),
                    metadata.file_size_bytes,
                    metadata.estimated_rows.unwrap_or(0),
                    chunks.len(),
                    self.budget.rows_per_batch(metadata.avg_row_bytes)
                );
                if chunks.is_empty() {
                    warn!("{} contains no rows, writing an empty output", path.display());
                    yield RowBatch {
                        source: path.clone(),
                        batch: RecordBatch::new_empty(self.factory.schema().to_arrow()),
                    };
                    continue;
                }

                for chunk in chunks {
                    let batch = reader.read_chunk(&chunk).await?;
                    yield RowBatch {
                        source: path.clone(),
                        batch,
                    };
                }
            }
        })
    }
}
