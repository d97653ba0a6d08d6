use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::byte_reader::ByteReader;

/// ByteReader implementation for local files
#[derive(Debug, Clone)]
pub struct LocalFileByteReader {
    file_path: PathBuf,
}

impl LocalFileByteReader {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

#[async_trait]
impl ByteReader for LocalFileByteReader {
    async fn size(&self) -> Result<u64> {
        let metadata = tokio::fs::metadata(&self.file_path)
            .await
            .with_context(|| format!("Failed to stat {}", self.file_path.display()))?;
        Ok(metadata.len())
    }

    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut file = File::open(&self.file_path)
            .await
            .with_context(|| format!("Failed to open {} for reading", self.file_path.display()))?;
        file.seek(std::io::SeekFrom::Start(start)).await?;

        let len = end.saturating_sub(start);
        let mut buffer = Vec::with_capacity(len as usize);
        file.take(len)
            .read_to_end(&mut buffer)
            .await
            .with_context(|| {
                format!(
                    "Failed to read bytes {}..{} of {}",
                    start,
                    end,
                    self.file_path.display()
                )
            })?;

        Ok(buffer)
    }
}
