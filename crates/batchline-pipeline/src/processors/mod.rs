//! Built-in file processors.
//!
//! Layout: `copy.rs` (streaming file copy), `command.rs` (external command
//! with `{input}`/`{output}` placeholders).
//!
//! Both write into a scratch file next to the destination and move it into
//! place only once the output is complete. A cancelled or failed item never
//! touches an existing destination.

mod command;
mod copy;

pub use command::{CommandExit, CommandProcessor, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};
pub use copy::{CopyProcessor, DEFAULT_CHUNK_SIZE};

use std::io;
use std::path::{Path, PathBuf};

use batchline_core::ProcessError;
use tempfile::{Builder, NamedTempFile, TempPath};
use tokio::fs::File;

const SCRATCH_PREFIX: &str = ".batchline-";

/// Scratch output beside a destination; removed on drop unless committed.
pub(crate) struct StagedOutput {
    scratch: TempPath,
    destination: PathBuf,
}

impl StagedOutput {
    /// Create the scratch file and return it opened for writing.
    pub(crate) async fn create(destination: &Path) -> Result<(Self, File), ProcessError> {
        let scratch = create_scratch(destination).await?;
        let (file, scratch) = scratch.into_parts();
        let staged = Self {
            scratch,
            destination: destination.to_path_buf(),
        };
        Ok((staged, File::from_std(file)))
    }

    /// Reserve a scratch path for a tool that creates the file itself.
    pub(crate) async fn reserve(destination: &Path) -> Result<Self, ProcessError> {
        let scratch = create_scratch(destination).await?.into_temp_path();
        tokio::fs::remove_file(&scratch)
            .await
            .map_err(|err| ProcessError::failed("stage.reserve", destination, err))?;
        Ok(Self {
            scratch,
            destination: destination.to_path_buf(),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.scratch
    }

    /// Move the scratch file onto the destination.
    ///
    /// Without `overwrite` an occupied destination is reported as a conflict
    /// and left as it was.
    pub(crate) async fn commit(self, overwrite: bool) -> Result<(), ProcessError> {
        let Self {
            scratch,
            destination,
        } = self;
        let target = destination.clone();
        tokio::task::spawn_blocking(move || {
            let persisted = if overwrite {
                scratch.persist(&target)
            } else {
                scratch.persist_noclobber(&target)
            };
            match persisted {
                Ok(()) => Ok(()),
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    Err(ProcessError::DestinationExists { path: target })
                }
                Err(err) => Err(ProcessError::failed("stage.commit", &target, err.error)),
            }
        })
        .await
        .map_err(|err| ProcessError::failed("stage.commit", &destination, err))?
    }
}

async fn create_scratch(destination: &Path) -> Result<NamedTempFile, ProcessError> {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|err| ProcessError::failed("stage.create_parent", &parent, err))?;
    // Keep the destination extension last so tools can infer the format.
    let suffix = match destination.extension() {
        Some(extension) => format!(".part.{}", extension.to_string_lossy()),
        None => ".part".to_string(),
    };
    let target = destination.to_path_buf();
    tokio::task::spawn_blocking(move || {
        Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&parent)
    })
    .await
    .map_err(|err| ProcessError::failed("stage.create", &target, err))?
    .map_err(|err| ProcessError::failed("stage.create", &target, err))
}

async fn destination_exists(
    operation: &'static str,
    destination: &Path,
) -> Result<bool, ProcessError> {
    tokio::fs::try_exists(destination)
        .await
        .map_err(|err| ProcessError::failed(operation, destination, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchline_test_support::fixtures::{file_names, temp_dir, write_file};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn uncommitted_output_leaves_the_destination_alone() -> anyhow::Result<()> {
        let dir = temp_dir()?;
        let destination = write_file(dir.path(), "clip.mp4", b"original")?;

        let (staged, mut file) = StagedOutput::create(&destination).await?;
        let scratch_name = staged
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        assert!(scratch_name.starts_with(SCRATCH_PREFIX));
        assert!(scratch_name.ends_with(".part.mp4"));
        file.write_all(b"half").await?;
        drop(file);
        drop(staged);

        assert_eq!(std::fs::read(&destination)?, b"original");
        assert_eq!(file_names(dir.path())?, vec!["clip.mp4"]);
        Ok(())
    }

    #[tokio::test]
    async fn commit_respects_the_overwrite_flag() -> anyhow::Result<()> {
        let dir = temp_dir()?;
        let destination = write_file(dir.path(), "out/a.txt", b"old")?;

        let (staged, mut file) = StagedOutput::create(&destination).await?;
        file.write_all(b"new").await?;
        file.flush().await?;
        drop(file);
        let err = staged.commit(false).await.expect_err("occupied");
        assert!(matches!(err, ProcessError::DestinationExists { ref path } if *path == destination));
        assert_eq!(std::fs::read(&destination)?, b"old");

        let (staged, mut file) = StagedOutput::create(&destination).await?;
        file.write_all(b"new").await?;
        file.flush().await?;
        drop(file);
        staged.commit(true).await?;
        assert_eq!(std::fs::read(&destination)?, b"new");
        assert_eq!(file_names(&dir.path().join("out"))?, vec!["a.txt"]);
        Ok(())
    }

    #[tokio::test]
    async fn reserved_scratch_path_is_free_for_the_tool() -> anyhow::Result<()> {
        let dir = temp_dir()?;
        let staged = StagedOutput::reserve(&dir.path().join("out/a.flac")).await?;
        assert!(!staged.path().exists());
        assert!(staged.path().starts_with(dir.path().join("out")));
        Ok(())
    }
}
