//! Temporary directory and file helpers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Create a fresh temporary directory that is removed on drop.
///
/// # Errors
///
/// Returns an error when the directory cannot be created.
pub fn temp_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("batchline-test-")
        .tempdir()
        .context("failed to create temporary directory")
}

/// Write `contents` to `dir/name`, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error when the file or its parents cannot be written.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Sorted file names directly inside `dir`.
///
/// # Errors
///
/// Returns an error when the directory cannot be listed.
pub fn file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_files_are_listed_in_order() -> Result<()> {
        let dir = temp_dir()?;
        write_file(dir.path(), "b.txt", b"b")?;
        write_file(dir.path(), "a.txt", b"a")?;
        write_file(dir.path(), "nested/c.txt", b"c")?;

        assert_eq!(file_names(dir.path())?, vec!["a.txt", "b.txt", "nested"]);
        assert_eq!(std::fs::read(dir.path().join("nested/c.txt"))?, b"c");
        Ok(())
    }
}
