//! Configuration constants for the converter
//!
//! This module centralizes all tunable parameters and constants used throughout
//! the application.

// ============================================================================
// Source Discovery
// ============================================================================

/// File name prefix shared by the Criteo day shards (`day_0` .. `day_23`)
pub const DEFAULT_FILE_PREFIX: &str = "day_";

/// Extension of converted output files; sources already carrying it are skipped
pub const TARGET_EXTENSION: &str = "parquet";

/// Split subdirectories converted when none are given explicitly
pub const DEFAULT_SPLITS: &[&str] = &["train", "valid", "test"];

// ============================================================================
// Batch Sizing
// ============================================================================

/// Fraction of available memory a single row batch may occupy
pub const DEFAULT_MEMORY_FRACTION: f64 = 0.1;

/// Row size assumed when a reader cannot sample its input (empty or
/// newline-free sample)
pub const FALLBACK_ROW_BYTES: u64 = 256;

// ============================================================================
// I/O Configuration
// ============================================================================

/// Size of chunks read while scanning for record boundaries
///
/// Set to 8KB (standard memory page size). Boundary scans only need to reach
/// the next newline, which for Criteo rows is a few hundred bytes away.
pub const CHUNK_SIZE: usize = 8192; // 8 KB

/// Size of sample to read when estimating the average row size of a file
///
/// 64KB covers a few hundred Criteo rows, enough for a stable average without
/// touching a meaningful part of a multi-gigabyte shard.
pub const SAMPLE_SIZE: usize = 64 * 1024; // 64 KB

// ============================================================================
// Progress Reporting
// ============================================================================

/// Number of most recent batch durations kept for the percentile display
pub const DURATION_WINDOW: usize = 1024;

// ============================================================================
// Output Configuration
// ============================================================================

/// Maximum number of rows per Parquet row group
pub const MAX_ROW_GROUP_SIZE: usize = 1024 * 1024;
