use anyhow::Result;
use async_trait::async_trait;

use crate::config::{CHUNK_SIZE, SAMPLE_SIZE};

/// Abstraction for byte-level I/O operations
///
/// Readers plan their batches against this trait instead of a concrete file
/// handle, so planning logic can be exercised against in-memory data.
#[async_trait]
pub trait ByteReader: Send + Sync {
    /// Get the total size of the file in bytes
    async fn size(&self) -> Result<u64>;

    /// Read the bytes in `[start, end)`
    /// Returns fewer bytes than requested only if EOF is reached
    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>>;
}

/// Find the start of the record following the newline at or after `offset`
///
/// Returns the file size when no newline remains, so the last record of a
/// file without a trailing newline is still covered.
pub async fn find_next_record_boundary(reader: &dyn ByteReader, offset: u64) -> Result<u64> {
    let file_size = reader.size().await?;
    let mut scan_offset = offset;

    while scan_offset < file_size {
        let scan_end = std::cmp::min(scan_offset + CHUNK_SIZE as u64, file_size);
        let window = reader.read_range(scan_offset, scan_end).await?;

        if window.is_empty() {
            break;
        }

        if let Some(pos) = window.iter().position(|&b| b == b'\n') {
            return Ok(scan_offset + pos as u64 + 1);
        }

        scan_offset += window.len() as u64;
    }

    Ok(file_size)
}

/// Average number of bytes per record, sampled from the start of `[start, end)`
///
/// Returns `None` when the sample holds no complete record.
pub async fn sample_row_bytes(
    reader: &dyn ByteReader,
    start: u64,
    end: u64,
) -> Result<Option<u64>> {
    if start >= end {
        return Ok(None);
    }

    let sample_end = start + std::cmp::min(SAMPLE_SIZE as u64, end - start);
    let sample = reader.read_range(start, sample_end).await?;

    // Only count bytes up to the last newline: a trailing partial record would
    // otherwise inflate the average.
    let Some(last_newline) = sample.iter().rposition(|&b| b == b'\n') else {
        return Ok(None);
    };
    let complete = &sample[..=last_newline];
    let records = complete.iter().filter(|&&b| b == b'\n').count() as u64;

    Ok(Some((complete.len() as u64 / records).max(1)))
}

/// Estimate the number of records in `[start, end)` from a sampled row size
pub async fn estimate_rows_in_range(
    reader: &dyn ByteReader,
    start: u64,
    end: u64,
) -> Result<Option<u64>> {
    if start >= end {
        return Ok(Some(0));
    }

    Ok(sample_row_bytes(reader, start, end)
        .await?
        .map(|row_bytes| (end - start).div_ceil(row_bytes)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory ByteReader for tests
    pub(crate) struct MemoryByteReader {
        pub data: Vec<u8>,
    }

    #[async_trait]
    impl ByteReader for MemoryByteReader {
        async fn size(&self) -> Result<u64> {
            Ok(self.data.len() as u64)
        }

        async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
            let start = std::cmp::min(start as usize, self.data.len());
            let end = std::cmp::min(end as usize, self.data.len());
            Ok(self.data[start..end].to_vec())
        }
    }

    #[tokio::test]
    async fn test_find_next_record_boundary() {
        let reader = MemoryByteReader {
            data: b"0\t1\ta\n1\t2\tb\n0\t3\tc\n".to_vec(),
        };

        // Mid-record offsets resolve to the start of the following record
        assert_eq!(find_next_record_boundary(&reader, 0).await.unwrap(), 6);
        assert_eq!(find_next_record_boundary(&reader, 3).await.unwrap(), 6);
        assert_eq!(find_next_record_boundary(&reader, 6).await.unwrap(), 12);
        assert_eq!(find_next_record_boundary(&reader, 17).await.unwrap(), 18);
    }

    #[tokio::test]
    async fn test_boundary_without_trailing_newline() {
        let reader = MemoryByteReader {
            data: b"0\t1\ta\n1\t2\tb".to_vec(),
        };

        assert_eq!(find_next_record_boundary(&reader, 7).await.unwrap(), 11);
        assert_eq!(find_next_record_boundary(&reader, 11).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_boundary_spanning_scan_windows() {
        let mut data = vec![b'x'; CHUNK_SIZE * 2 + 10];
        data.push(b'\n');
        data.extend_from_slice(b"tail\n");
        let reader = MemoryByteReader { data };

        let boundary = find_next_record_boundary(&reader, 5).await.unwrap();
        assert_eq!(boundary, (CHUNK_SIZE * 2 + 11) as u64);
    }

    #[tokio::test]
    async fn test_sample_row_bytes_ignores_partial_record() {
        let reader = MemoryByteReader {
            data: b"abcd\nefgh\nijklmnopqrstuvwxyz".to_vec(),
        };

        let row_bytes = sample_row_bytes(&reader, 0, 28).await.unwrap();
        assert_eq!(row_bytes, Some(5));

        let none = sample_row_bytes(&reader, 10, 28).await.unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn test_estimate_rows() {
        let reader = MemoryByteReader {
            data: b"line1\nline2\nline3\nline4\nline5\n".to_vec(),
        };

        let size = reader.size().await.unwrap();
        let estimate = estimate_rows_in_range(&reader, 0, size).await.unwrap();
        assert_eq!(estimate, Some(5));

        let empty = estimate_rows_in_range(&reader, 4, 4).await.unwrap();
        assert_eq!(empty, Some(0));
    }
}
