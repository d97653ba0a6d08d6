use clap::{Parser, Subcommand};
use criteo_converter::runner::{
    Compression, ConvertArgs, DelimitedConfig, Format, TableSchema, run_convert,
};

#[derive(Parser, Clone)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    Convert {
        /// Directory holding the split subdirectories (or the shards themselves with --no-splits)
        #[arg(short, long)]
        input_root: String,

        /// Directory the Parquet files are written into, mirroring the splits
        #[arg(short, long)]
        output_root: String,

        /// Split subdirectories to convert (format: train,valid,test)
        #[arg(long, conflicts_with = "no_splits")]
        splits: Option<String>,

        /// Convert the shards directly under --input-root
        #[arg(long)]
        no_splits: bool,

        /// Only convert files whose name starts with this prefix (default: day_)
        #[arg(long)]
        prefix: Option<String>,

        /// Skip files already carrying this extension (default: parquet)
        #[arg(long)]
        exclude_extension: Option<String>,

        /// Source format (tsv, csv, parquet)
        #[arg(short, long, default_value = "tsv")]
        format: String,

        /// Field delimiter for delimited sources (single character or \t)
        #[arg(long)]
        delimiter: Option<String>,

        /// Delimited sources start with a header line
        #[arg(long)]
        has_header: bool,

        /// Decode categorical hex hashes into 64-bit integers
        #[arg(long)]
        hex_categoricals: bool,

        /// Column type overrides (format: C1:hex,I3:utf8)
        #[arg(long)]
        column_types: Option<String>,

        /// Fraction of memory one row batch may use (default: 0.1)
        #[arg(short, long)]
        memory_fraction: Option<f64>,

        /// Memory the fraction is taken of (e.g., 8GB); defaults to available memory
        #[arg(long)]
        memory_budget: Option<String>,

        /// Fixed number of rows per batch, overriding the memory fraction
        #[arg(short, long)]
        batch_rows: Option<u64>,

        /// Parquet compression (none, snappy, zstd, lz4)
        #[arg(short, long, default_value = "snappy")]
        compression: String,

        /// Maximum rows per Parquet row group
        #[arg(long)]
        row_group_size: Option<usize>,

        /// Show the files that would be converted without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Convert {
            input_root,
            output_root,
            splits,
            no_splits,
            prefix,
            exclude_extension,
            format,
            delimiter,
            has_header,
            hex_categoricals,
            column_types,
            memory_fraction,
            memory_budget,
            batch_rows,
            compression,
            row_group_size,
            dry_run,
            quiet,
        } => {
            // Initialize tracing based on quiet mode
            use tracing_subscriber::{EnvFilter, FmtSubscriber};
            let filter = if quiet {
                EnvFilter::new("criteo_converter=warn")
            } else {
                EnvFilter::new("criteo_converter=info")
            };
            let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
            let _ = tracing::subscriber::set_global_default(subscriber);

            let mut convert_args = ConvertArgs::new(&input_root, &output_root);

            if no_splits {
                convert_args.splits.clear();
            } else if let Some(ref splits) = splits {
                convert_args.splits = cli::parse_list(splits);
            }
            if let Some(prefix) = prefix {
                convert_args.file_prefix = prefix;
            }
            if let Some(extension) = exclude_extension {
                convert_args.exclude_extension = extension.trim_start_matches('.').to_string();
            }

            convert_args.format = Format::parse(&format)?;
            if delimiter.is_some() || has_header {
                let mut config = match convert_args.format {
                    Format::Csv => DelimitedConfig::csv(),
                    _ => DelimitedConfig::tsv(),
                };
                if let Some(ref delimiter) = delimiter {
                    config.delimiter = cli::parse_delimiter(delimiter)?;
                }
                config.has_header = has_header;
                convert_args.delimited = Some(config);
            }

            let criteo = TableSchema::criteo(hex_categoricals);
            convert_args.schema = match column_types {
                Some(ref overrides) => {
                    let mut types = criteo.types();
                    for (name, column_type) in cli::parse_column_types(overrides)? {
                        if !types.contains_key(&name) {
                            anyhow::bail!("Unknown column '{}' in --column-types", name);
                        }
                        types.insert(name, column_type);
                    }
                    TableSchema::new(&criteo.names(), &types)?
                }
                None => criteo,
            };

            if let Some(fraction) = memory_fraction {
                convert_args.memory_fraction = fraction;
            }
            if let Some(ref budget) = memory_budget {
                convert_args.memory_budget_bytes = Some(
                    cli::parse_size_string(budget)
                        .map_err(|e| anyhow::anyhow!("Invalid memory budget '{}': {}", budget, e))?,
                );
            }
            convert_args.batch_rows = batch_rows;
            convert_args.compression = Compression::parse(&compression)?;
            convert_args.row_group_size = row_group_size;
            convert_args.dry_run = dry_run;
            convert_args.quiet = quiet;

            if !quiet {
                println!("Criteo Parquet Converter");
                println!("========================");
                println!("Input: {}", input_root);
                println!("Output: {}", output_root);
                if !convert_args.splits.is_empty() {
                    println!("Splits: {}", convert_args.splits.join(", "));
                }
                println!("Format: {}", format);
                println!("Compression: {}", compression);
                println!();
            }

            let result = run_convert(convert_args).await?;

            if dry_run {
                println!("DRY RUN MODE - No data was written");
                for split in &result.splits {
                    println!();
                    println!(
                        "{} -> {}",
                        split.input_dir.display(),
                        split.output_dir.display()
                    );
                    for source in &split.sources {
                        println!("  {}", source.display());
                    }
                }
                println!();
                println!("To execute, run without --dry-run");
                return Ok(());
            }

            println!();
            println!("Conversion Summary");
            println!("==================");
            println!("Run ID: {}", result.run_id);
            for split in &result.splits {
                let label = if split.split.is_empty() {
                    split.input_dir.display().to_string()
                } else {
                    split.split.clone()
                };
                println!(
                    "{}: {} files, {} rows in {} batches ({:.2}s)",
                    label,
                    split.files.len(),
                    split.rows_written,
                    split.batches_written,
                    split.duration.as_secs_f64()
                );
            }
            println!("Files written: {}", result.files_written);
            println!("Rows written: {}", result.rows_written);
            println!("Batches written: {}", result.batches_written);
            println!("Duration: {:.2}s", result.duration.as_secs_f64());
            println!(
                "Throughput: {:.2} rows/sec",
                result.rows_written as f64 / result.duration.as_secs_f64()
            );
        }
    }
    Ok(())
}

/// CLI utility functions for parsing command-line arguments
mod cli {
    use criteo_converter::runner::ColumnType;

    /// Parse human-readable size strings like "10MB", "1GB", "512KB"
    pub fn parse_size_string(s: &str) -> anyhow::Result<u64> {
        let s = s.trim().to_uppercase();

        let (number_part, unit_part) = if let Some(pos) = s.find(|c: char| !c.is_ascii_digit()) {
            s.split_at(pos)
        } else {
            // No unit, assume bytes
            return s
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("Invalid size: {}", e));
        };

        let number: u64 = number_part
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid size number '{}': {}", number_part, e))?;

        let multiplier: u64 = match unit_part.trim() {
            "B" => 1,
            "KB" => 1024,
            "MB" => 1024 * 1024,
            "GB" => 1024 * 1024 * 1024,
            "TB" => 1024 * 1024 * 1024 * 1024,
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid size unit '{}'. Valid units: B, KB, MB, GB, TB",
                    unit_part
                ));
            }
        };

        number
            .checked_mul(multiplier)
            .ok_or_else(|| anyhow::anyhow!("Size '{}' is too large", s))
    }

    /// Split a comma-separated list, dropping empty entries
    pub fn parse_list(s: &str) -> Vec<String> {
        s.split(',')
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(|item| item.to_string())
            .collect()
    }

    /// Parse a delimiter given as a single character or the escape `\t`
    pub fn parse_delimiter(s: &str) -> anyhow::Result<u8> {
        match s {
            "\\t" | "\t" | "tab" => Ok(b'\t'),
            _ if s.len() == 1 => Ok(s.as_bytes()[0]),
            _ => Err(anyhow::anyhow!(
                "Delimiter must be a single character or \\t, got '{}'",
                s
            )),
        }
    }

    /// Parse column type overrides "col:type,col2:type" into ordered pairs
    pub fn parse_column_types(s: &str) -> anyhow::Result<Vec<(String, ColumnType)>> {
        let mut overrides: Vec<(String, ColumnType)> = Vec::new();

        for pair in s.split(',').filter(|p| !p.trim().is_empty()) {
            let parts: Vec<&str> = pair.trim().split(':').collect();
            if parts.len() != 2 {
                return Err(anyhow::anyhow!(
                    "Invalid column type override '{}'. Expected format: 'column:type,column2:type'",
                    pair
                ));
            }

            let name = parts[0].trim();
            if name.is_empty() {
                return Err(anyhow::anyhow!("Column name cannot be empty in '{}'", pair));
            }
            if overrides.iter().any(|(existing, _)| existing == name) {
                return Err(anyhow::anyhow!(
                    "Duplicate column '{}' in column type overrides",
                    name
                ));
            }

            overrides.push((name.to_string(), ColumnType::parse(parts[1].trim())?));
        }

        Ok(overrides)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_size_string() {
            assert_eq!(parse_size_string("512").unwrap(), 512);
            assert_eq!(parse_size_string("10MB").unwrap(), 10 * 1024 * 1024);
            assert_eq!(parse_size_string("8gb").unwrap(), 8 * 1024 * 1024 * 1024);
            assert!(parse_size_string("10XB").is_err());
            assert!(parse_size_string("99999999999TB").is_err());
        }

        #[test]
        fn test_parse_list() {
            assert_eq!(parse_list("train, valid,,test"), vec!["train", "valid", "test"]);
            assert!(parse_list("").is_empty());
        }

        #[test]
        fn test_parse_delimiter() {
            assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
            assert_eq!(parse_delimiter("|").unwrap(), b'|');
            assert!(parse_delimiter("||").is_err());
        }

        #[test]
        fn test_parse_column_types() {
            let overrides = parse_column_types("C1:hex, I3:utf8").unwrap();
            assert_eq!(
                overrides,
                vec![
                    ("C1".to_string(), ColumnType::HexInt64),
                    ("I3".to_string(), ColumnType::Utf8),
                ]
            );

            assert!(parse_column_types("C1").is_err());
            assert!(parse_column_types("C1:hex,C1:utf8").is_err());
            assert!(parse_column_types("C1:float").is_err());
        }
    }
}
