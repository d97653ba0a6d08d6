//! Output sinks: where converted batches are written

pub mod parquet;

use anyhow::{Result, anyhow};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::path::{Path, PathBuf};

pub use self::parquet::{Compression, ParquetSinkFactory};

/// Totals reported by a sink once it is closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub rows_written: u64,
    pub batches_written: u64,
}

/// An open output file accepting batches in order
pub trait BatchSink: Send {
    /// Append a batch after everything written so far
    fn write(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Flush and finalize the output
    fn close(self: Box<Self>) -> Result<SinkSummary>;
}

/// Opens sinks of one output format
pub trait SinkFactory: Send + Sync {
    /// Extension appended to output file base names
    fn extension(&self) -> &'static str;

    /// Create (or truncate) the output at `path`
    fn create(&self, path: &Path, schema: SchemaRef) -> Result<Box<dyn BatchSink>>;
}

/// Derive the output path for a source file
///
/// The base name is the file name up to its first `.`, so `day_0`,
/// `day_0.tsv` and `day_0.tsv.gz` all map to `<output_dir>/day_0.<extension>`.
pub fn output_path_for(source: &Path, output_dir: &Path, extension: &str) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("Source path has no usable file name: {}", source.display()))?;

    let base_name = file_name.split('.').next().unwrap_or(file_name);
    if base_name.is_empty() {
        return Err(anyhow!(
            "Source file name has an empty base name: {}",
            source.display()
        ));
    }

    Ok(output_dir.join(format!("{}.{}", base_name, extension)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_strips_after_first_dot() {
        let out = Path::new("/out");
        assert_eq!(
            output_path_for(Path::new("/data/train/day_0"), out, "parquet").unwrap(),
            PathBuf::from("/out/day_0.parquet")
        );
        assert_eq!(
            output_path_for(Path::new("day_3.tsv"), out, "parquet").unwrap(),
            PathBuf::from("/out/day_3.parquet")
        );
        assert_eq!(
            output_path_for(Path::new("/data/day_7.tsv.gz"), out, "parquet").unwrap(),
            PathBuf::from("/out/day_7.parquet")
        );
    }

    #[test]
    fn test_output_path_rejects_hidden_style_names() {
        assert!(output_path_for(Path::new("/data/.day_0"), Path::new("/out"), "parquet").is_err());
        assert!(output_path_for(Path::new("/"), Path::new("/out"), "parquet").is_err());
    }
}
