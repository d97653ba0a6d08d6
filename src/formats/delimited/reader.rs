use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::path::Path;

use super::conversion::BatchBuilder;
use crate::config::FALLBACK_ROW_BYTES;
use crate::formats::reader::{Chunk, DelimitedConfig, FileMetadata, SourceReader};
use crate::formats::schema::TableSchema;
use crate::io::{
    ByteReader, LocalFileByteReader, estimate_rows_in_range, find_next_record_boundary,
    sample_row_bytes,
};

/// Delimited file reader over a local file
/// Chunks are planned on record boundaries so each one parses independently
pub struct GenericDelimitedReader {
    reader: LocalFileByteReader,
    config: DelimitedConfig,
    schema: TableSchema,
}

impl GenericDelimitedReader {
    pub fn new(reader: LocalFileByteReader, config: DelimitedConfig, schema: TableSchema) -> Self {
        Self {
            reader,
            config,
            schema,
        }
    }

    /// Offset of the first data record
    async fn data_start(&self) -> Result<u64> {
        if self.config.has_header {
            find_next_record_boundary(&self.reader, 0).await
        } else {
            Ok(0)
        }
    }
}

#[async_trait]
impl SourceReader for GenericDelimitedReader {
    fn path(&self) -> &Path {
        self.reader.path()
    }

    async fn metadata(&self) -> Result<FileMetadata> {
        let file_size_bytes = self
            .reader
            .size()
            .await
            .context("Failed to get file size")?;
        let data_start = self.data_start().await?;

        let avg_row_bytes = sample_row_bytes(&self.reader, data_start, file_size_bytes)
            .await?
            .unwrap_or(FALLBACK_ROW_BYTES);
        let estimated_rows =
            estimate_rows_in_range(&self.reader, data_start, file_size_bytes).await?;

        Ok(FileMetadata {
            file_size_bytes,
            estimated_rows,
            avg_row_bytes,
        })
    }

    async fn create_chunks(&self, target_size: u64) -> Result<Vec<Chunk>> {
        let file_size = self.reader.size().await?;
        let target_size = target_size.max(1);

        let mut chunks = Vec::new();
        let mut current_offset = self.data_start().await?;
        let mut chunk_id = 0u32;

        while current_offset < file_size {
            let target_end = current_offset.saturating_add(target_size);

            // The chunk runs through the end of the record containing target_end - 1
            let actual_end = if target_end >= file_size {
                file_size
            } else {
                find_next_record_boundary(&self.reader, target_end - 1).await?
            };

            let estimated_rows =
                estimate_rows_in_range(&self.reader, current_offset, actual_end).await?;

            chunks.push(Chunk {
                chunk_id,
                start_offset: current_offset,
                end_offset: actual_end,
                estimated_rows,
            });

            current_offset = actual_end;
            chunk_id += 1;
        }

        Ok(chunks)
    }

    async fn read_chunk(&self, chunk: &Chunk) -> Result<RecordBatch> {
        let buffer = self
            .reader
            .read_range(chunk.start_offset, chunk.end_offset)
            .await
            .context("Failed to read chunk data")?;

        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.config.delimiter)
            .has_headers(false) // Headers are skipped at the file level
            .flexible(true); // Field counts are checked against the schema instead
        match self.config.quote {
            Some(quote) => builder.quote(quote),
            None => builder.quoting(false),
        };
        let mut csv_reader = builder.from_reader(buffer.as_slice());

        let capacity = chunk.estimated_rows.unwrap_or(0) as usize;
        let mut batch = BatchBuilder::new(&self.schema, capacity);
        let mut record = csv::StringRecord::new();

        loop {
            let byte_offset = chunk.start_offset + csv_reader.position().byte();
            let has_record = csv_reader.read_record(&mut record).with_context(|| {
                format!(
                    "Failed to parse record at byte offset {} of {}",
                    byte_offset,
                    self.path().display()
                )
            })?;
            if !has_record {
                break;
            }

            batch.append_record(&record).with_context(|| {
                format!(
                    "Malformed record at byte offset {} of {}",
                    byte_offset,
                    self.path().display()
                )
            })?;
        }

        batch.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::formats::schema::ColumnType;

    fn three_column_schema() -> TableSchema {
        let names: Vec<String> = ["label", "I1", "C1"].iter().map(|s| s.to_string()).collect();
        let types = HashMap::from([
            ("label".to_string(), ColumnType::Int64),
            ("I1".to_string(), ColumnType::Int64),
            ("C1".to_string(), ColumnType::Utf8),
        ]);
        TableSchema::new(&names, &types).unwrap()
    }

    fn write_tsv(rows: usize) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        for i in 0..rows {
            writeln!(temp_file, "{}\t{}\tcat{:04}", i % 2, i, i).unwrap();
        }
        temp_file.flush().unwrap();
        temp_file
    }

    fn reader_for(file: &NamedTempFile, config: DelimitedConfig) -> GenericDelimitedReader {
        GenericDelimitedReader::new(
            LocalFileByteReader::new(file.path()),
            config,
            three_column_schema(),
        )
    }

    #[tokio::test]
    async fn test_metadata() {
        let temp_file = write_tsv(10);
        let reader = reader_for(&temp_file, DelimitedConfig::tsv());
        let metadata = reader.metadata().await.unwrap();

        assert!(metadata.file_size_bytes > 0);
        assert!(metadata.avg_row_bytes > 0);
        assert_eq!(metadata.estimated_rows, Some(10));
    }

    #[tokio::test]
    async fn test_chunks_are_contiguous_and_cover_file() {
        let temp_file = write_tsv(100);
        let reader = reader_for(&temp_file, DelimitedConfig::tsv());
        let metadata = reader.metadata().await.unwrap();
        let chunks = reader.create_chunks(200).await.unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks.last().unwrap().end_offset, metadata.file_size_bytes);
        for i in 1..chunks.len() {
            assert_eq!(chunks[i - 1].end_offset, chunks[i].start_offset);
            assert_eq!(chunks[i].chunk_id, i as u32);
        }
    }

    #[tokio::test]
    async fn test_chunks_preserve_every_row_in_order() {
        let temp_file = write_tsv(100);
        let reader = reader_for(&temp_file, DelimitedConfig::tsv());
        let chunks = reader.create_chunks(150).await.unwrap();

        let mut seen = Vec::new();
        for chunk in &chunks {
            let batch = reader.read_chunk(chunk).await.unwrap();
            let i1 = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
            seen.extend(i1.values().iter().copied());
        }

        assert_eq!(seen, (0..100).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_chunk_exactly_on_record_boundary() {
        let temp_file = write_tsv(4);
        let reader = reader_for(&temp_file, DelimitedConfig::tsv());
        let row_len = "0\t0\tcat0000\n".len() as u64;

        let chunks = reader.create_chunks(row_len).await.unwrap();
        assert_eq!(chunks.len(), 4);
        for chunk in &chunks {
            assert_eq!(chunk.end_offset - chunk.start_offset, row_len);
        }
    }

    #[tokio::test]
    async fn test_header_is_skipped() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "label,I1,C1").unwrap();
        writeln!(temp_file, "1,7,a").unwrap();
        writeln!(temp_file, "0,,b").unwrap();
        temp_file.flush().unwrap();

        let config = DelimitedConfig {
            has_header: true,
            ..DelimitedConfig::csv()
        };
        let reader = reader_for(&temp_file, config);
        let chunks = reader.create_chunks(1_000_000).await.unwrap();
        assert_eq!(chunks.len(), 1);

        let batch = reader.read_chunk(&chunks[0]).await.unwrap();
        assert_eq!(batch.num_rows(), 2);
        let c1 = batch.column(2).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(c1.value(0), "a");
        let i1 = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert!(i1.is_null(1));
    }

    #[tokio::test]
    async fn test_malformed_record_names_offset() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "1\t2\ta").unwrap();
        writeln!(temp_file, "1\t2").unwrap();
        temp_file.flush().unwrap();

        let reader = reader_for(&temp_file, DelimitedConfig::tsv());
        let chunks = reader.create_chunks(1_000_000).await.unwrap();
        let err = reader.read_chunk(&chunks[0]).await.unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("byte offset 6"));
        assert!(message.contains("Expected 3 fields but found 2"));
    }

    #[tokio::test]
    async fn test_empty_file_has_no_chunks() {
        let temp_file = NamedTempFile::new().unwrap();
        let reader = reader_for(&temp_file, DelimitedConfig::tsv());
        assert!(reader.create_chunks(100).await.unwrap().is_empty());
    }
}
