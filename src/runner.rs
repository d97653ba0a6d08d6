//! High-level runner API for the converter.
//!
//! This module provides a simplified public interface that encapsulates
//! discovery, reader setup, batch budgeting and writer rotation.
//!
//! This is the primary API for external users and for the CLI.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{DEFAULT_FILE_PREFIX, DEFAULT_MEMORY_FRACTION, DEFAULT_SPLITS, TARGET_EXTENSION};
use crate::coordination::{ConversionResult, Converter, ConverterConfigBuilder, OutputFile};
use crate::discovery::discover_source_files;
use crate::formats::{BatchBudget, DatasetReader, ReaderFactory};
use crate::sink::{ParquetSinkFactory, SinkFactory, output_path_for};

pub use crate::formats::{ColumnType, DelimitedConfig, Format, TableSchema};
pub use crate::sink::Compression;

/// Arguments for running a conversion
#[derive(Debug, Clone)]
pub struct ConvertArgs {
    // Source configuration
    pub input_root: PathBuf,
    /// Subdirectories converted independently; empty converts `input_root` itself
    pub splits: Vec<String>,
    pub file_prefix: String,
    pub exclude_extension: String,
    pub format: Format,
    /// Overrides the delimited settings implied by `format`
    pub delimited: Option<DelimitedConfig>,
    pub schema: TableSchema,

    // Output configuration
    pub output_root: PathBuf,
    pub compression: Compression,
    /// Maximum rows per Parquet row group; the writer default when absent
    pub row_group_size: Option<usize>,

    // Batch sizing
    pub memory_fraction: f64,
    /// Memory the fraction is taken of; host available memory when absent
    pub memory_budget_bytes: Option<u64>,
    /// Fixed rows per batch, bypassing the memory budget
    pub batch_rows: Option<u64>,

    // Options
    pub dry_run: bool,
    pub quiet: bool,
}

impl ConvertArgs {
    /// Arguments with the defaults used for the Criteo day shards: the
    /// train/valid/test splits of `input_root`, tab-separated `day_*` files,
    /// string categoricals and a memory-fraction batch budget
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            splits: DEFAULT_SPLITS.iter().map(|s| s.to_string()).collect(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            exclude_extension: TARGET_EXTENSION.to_string(),
            format: Format::Tsv,
            delimited: None,
            schema: TableSchema::criteo(false),
            output_root: output_root.into(),
            compression: Compression::default(),
            row_group_size: None,
            memory_fraction: DEFAULT_MEMORY_FRACTION,
            memory_budget_bytes: None,
            batch_rows: None,
            dry_run: false,
            quiet: false,
        }
    }
}

/// Outcome of converting one split directory
#[derive(Debug)]
pub struct SplitResult {
    /// Split name; empty when the input root was converted directly
    pub split: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Sources discovered, in processing order
    pub sources: Vec<PathBuf>,
    /// Outputs written; empty on a dry run
    pub files: Vec<OutputFile>,
    pub rows_written: u64,
    pub batches_written: u64,
    pub duration: Duration,
}

/// Result of a completed conversion run
#[derive(Debug)]
pub struct ConvertResult {
    pub run_id: String,
    pub splits: Vec<SplitResult>,
    pub files_written: usize,
    pub rows_written: u64,
    pub batches_written: u64,
    pub duration: Duration,
}

/// Run a conversion with the specified arguments
///
/// # Example
///
/// ```no_run
/// use criteo_converter::runner::{Compression, ConvertArgs, run_convert};
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut args = ConvertArgs::new("/data/criteo", "/data/criteo/parquet");
/// args.splits = vec!["train".to_string(), "valid".to_string()];
/// args.compression = Compression::Zstd;
/// args.quiet = true;
///
/// let result = run_convert(args).await?;
/// println!("Wrote {} rows in {:?}", result.rows_written, result.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_convert(args: ConvertArgs) -> Result<ConvertResult> {
    let start_time = Instant::now();
    let run_id = Uuid::new_v4().to_string();
    info!("Starting conversion run: {}", run_id);

    let budget = match args.batch_rows {
        Some(rows) => BatchBudget::Rows(rows),
        None => BatchBudget::from_memory_fraction(args.memory_fraction, args.memory_budget_bytes)?,
    };
    info!("Batch budget: {:?}", budget);

    let mut parquet_factory = ParquetSinkFactory::new(args.compression);
    if let Some(rows) = args.row_group_size {
        parquet_factory = parquet_factory.with_max_row_group_size(rows);
    }
    let sink_factory: Arc<dyn SinkFactory> = Arc::new(parquet_factory);

    let split_dirs: Vec<(String, PathBuf, PathBuf)> = if args.splits.is_empty() {
        vec![(String::new(), args.input_root.clone(), args.output_root.clone())]
    } else {
        args.splits
            .iter()
            .map(|split| {
                (
                    split.clone(),
                    args.input_root.join(split),
                    args.output_root.join(split),
                )
            })
            .collect()
    };

    let mut splits = Vec::with_capacity(split_dirs.len());
    for (split, input_dir, output_dir) in split_dirs {
        let result =
            convert_split(&args, budget, &sink_factory, split, input_dir, output_dir).await?;
        splits.push(result);
    }

    let files_written = splits.iter().map(|s| s.files.len()).sum();
    let rows_written = splits.iter().map(|s| s.rows_written).sum();
    let batches_written = splits.iter().map(|s| s.batches_written).sum();

    Ok(ConvertResult {
        run_id,
        splits,
        files_written,
        rows_written,
        batches_written,
        duration: start_time.elapsed(),
    })
}

async fn convert_split(
    args: &ConvertArgs,
    budget: BatchBudget,
    sink_factory: &Arc<dyn SinkFactory>,
    split: String,
    input_dir: PathBuf,
    output_dir: PathBuf,
) -> Result<SplitResult> {
    let sources =
        discover_source_files(&input_dir, &args.file_prefix, &args.exclude_extension).await?;
    info!(
        "Found {} source files in {}",
        sources.len(),
        input_dir.display()
    );
    if sources.is_empty() {
        warn!(
            "No files starting with '{}' in {}",
            args.file_prefix,
            input_dir.display()
        );
    }

    if args.dry_run {
        log_plan(&sources, &output_dir, sink_factory.extension())?;
        return Ok(SplitResult {
            split,
            input_dir,
            output_dir,
            sources,
            files: Vec::new(),
            rows_written: 0,
            batches_written: 0,
            duration: Duration::ZERO,
        });
    }

    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut factory = ReaderFactory::new(args.schema.clone());
    if let Some(delimited) = &args.delimited {
        factory = factory.with_delimited_config(delimited.clone());
    }
    let dataset = DatasetReader::new(sources.clone(), args.format, factory, budget);

    let config = ConverterConfigBuilder::default()
        .output_dir(output_dir.clone())
        .expected_files(dataset.paths().len() as u64)
        .quiet(args.quiet)
        .build()?;

    let converter = Converter::new(Arc::clone(sink_factory));
    let ConversionResult {
        files,
        rows_written,
        batches_written,
        duration,
    } = converter
        .run(&config, args.schema.to_arrow(), dataset.batches())
        .await
        .with_context(|| format!("Conversion of {} failed", input_dir.display()))?;

    Ok(SplitResult {
        split,
        input_dir,
        output_dir,
        sources,
        files,
        rows_written,
        batches_written,
        duration,
    })
}

fn log_plan(sources: &[PathBuf], output_dir: &Path, extension: &str) -> Result<()> {
    for source in sources {
        let output = output_path_for(source, output_dir, extension)?;
        info!("Would convert {} -> {}", source.display(), output.display());
    }
    Ok(())
}
