//! Source shard discovery

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// List the source files under `root`, sorted by path
///
/// A file qualifies when its name starts with `prefix` and does not already
/// end in `.<exclude_extension>`. Subdirectories are skipped; symlinks are
/// resolved, and a link to a file is kept under its link name.
pub async fn discover_source_files(
    root: &Path,
    prefix: &str,
    exclude_extension: &str,
) -> Result<Vec<PathBuf>> {
    let excluded_suffix = format!(".{}", exclude_extension);

    let mut entries = fs::read_dir(root)
        .await
        .with_context(|| format!("Failed to list source directory {}", root.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to read entry of {}", root.display()))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) || name.ends_with(&excluded_suffix) {
            continue;
        }
        // Follows symlinks, so linked shards count as files
        let path = entry.path();
        let metadata = fs::metadata(&path)
            .await
            .with_context(|| format!("Failed to stat source {}", path.display()))?;
        if !metadata.is_file() {
            continue;
        }
        files.push(path);
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }

    #[tokio::test]
    async fn test_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["day_2", "day_0", "day_1.tsv", "day_0.parquet", "README", "xday_3"] {
            touch(&dir, name);
        }
        std::fs::create_dir(dir.path().join("day_9")).unwrap();

        let files = discover_source_files(dir.path(), "day_", "parquet")
            .await
            .unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["day_0", "day_1.tsv", "day_2"]);
        assert!(files.iter().all(|p| p.starts_with(dir.path())));
    }

    #[tokio::test]
    async fn test_discovery_is_repeatable() {
        let dir = TempDir::new().unwrap();
        for i in [10, 2, 1, 0] {
            touch(&dir, &format!("day_{}", i));
        }

        let first = discover_source_files(dir.path(), "day_", "parquet")
            .await
            .unwrap();
        let second = discover_source_files(dir.path(), "day_", "parquet")
            .await
            .unwrap();

        assert_eq!(first, second);
        // Lexicographic, not numeric
        let names: Vec<_> = first.iter().map(|p| p.file_name().unwrap()).collect();
        assert_eq!(names, vec!["day_0", "day_1", "day_10", "day_2"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_shards_are_sources() {
        let real = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        std::fs::write(real.path().join("day_0"), b"0\n").unwrap();
        std::fs::create_dir(real.path().join("day_9")).unwrap();
        std::os::unix::fs::symlink(real.path().join("day_0"), dir.path().join("day_0")).unwrap();
        std::os::unix::fs::symlink(real.path().join("day_9"), dir.path().join("day_9")).unwrap();
        touch(&dir, "day_1");

        let files = discover_source_files(dir.path(), "day_", "parquet")
            .await
            .unwrap();

        // The linked directory is skipped, the linked file keeps its link path
        assert_eq!(files, vec![dir.path().join("day_0"), dir.path().join("day_1")]);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let err = discover_source_files(Path::new("/nonexistent/criteo"), "day_", "parquet")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/criteo"));
    }
}
