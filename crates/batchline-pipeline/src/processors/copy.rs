use async_trait::async_trait;
use batchline_core::{FileProcessor, ItemProgress, ProcessError, ProcessRequest, ProgressSink};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{StagedOutput, destination_exists};

/// Read buffer size used when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Streams the source into the destination, reporting byte progress.
///
/// The bytes land in a scratch file that replaces the destination only after
/// the last chunk is written. Without overwrite the final move refuses to
/// clobber, so a file that appears mid-copy still raises a conflict.
/// Cancellation is checked between chunks.
#[derive(Debug, Clone, Copy)]
pub struct CopyProcessor {
    chunk_size: usize,
}

impl CopyProcessor {
    /// Copy processor with [`DEFAULT_CHUNK_SIZE`] reads.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Use `chunk_size` byte reads (at least one byte).
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for CopyProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileProcessor for CopyProcessor {
    async fn process(
        &self,
        request: &ProcessRequest,
        progress: &dyn ProgressSink,
    ) -> Result<(), ProcessError> {
        let mut source = File::open(&request.source)
            .await
            .map_err(|err| ProcessError::failed("copy.open_source", &request.source, err))?;
        let metadata = source
            .metadata()
            .await
            .map_err(|err| ProcessError::failed("copy.stat_source", &request.source, err))?;
        let total = metadata.len();

        let overwrite = request.options.overwrite;
        if !overwrite && destination_exists("copy.stat_destination", &request.destination).await? {
            return Err(ProcessError::DestinationExists {
                path: request.destination.clone(),
            });
        }
        let (staged, mut output) = StagedOutput::create(&request.destination).await?;

        let mut buffer = vec![0_u8; self.chunk_size];
        let mut copied: u64 = 0;
        loop {
            if request.cancel.is_cancelled() {
                return Err(ProcessError::Cancelled);
            }
            let read = source
                .read(&mut buffer)
                .await
                .map_err(|err| ProcessError::failed("copy.read", &request.source, err))?;
            if read == 0 {
                break;
            }
            output
                .write_all(&buffer[..read])
                .await
                .map_err(|err| ProcessError::failed("copy.write", staged.path(), err))?;
            copied += read as u64;
            if total > 0 {
                progress.report(request.item_id, ItemProgress::fraction(ratio(copied, total)));
            }
        }
        output
            .flush()
            .await
            .map_err(|err| ProcessError::failed("copy.flush", staged.path(), err))?;
        drop(output);
        tokio::fs::set_permissions(staged.path(), metadata.permissions())
            .await
            .map_err(|err| ProcessError::failed("copy.permissions", staged.path(), err))?;
        staged.commit(overwrite).await?;
        progress.report(request.item_id, ItemProgress::fraction(1.0));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(done: u64, total: u64) -> f64 {
    done as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchline_core::{ItemId, ProcessOptions};
    use batchline_test_support::fixtures::{file_names, temp_dir, write_file};
    use batchline_test_support::mocks::RecordingProgress;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn request(source: PathBuf, destination: PathBuf, overwrite: bool) -> ProcessRequest {
        ProcessRequest {
            item_id: ItemId::nil(),
            source,
            destination,
            options: ProcessOptions { overwrite },
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn copies_bytes_and_reports_progress() -> anyhow::Result<()> {
        let dir = temp_dir()?;
        let source = write_file(dir.path(), "in/clip.bin", &[7_u8; 10])?;
        let destination = dir.path().join("out/nested/clip.bin");
        let progress = RecordingProgress::default();

        CopyProcessor::with_chunk_size(4)
            .process(&request(source, destination.clone(), false), &progress)
            .await?;

        assert_eq!(std::fs::read(&destination)?, vec![7_u8; 10]);
        let fractions: Vec<f64> = progress
            .updates()
            .iter()
            .filter_map(|(_, update)| update.fraction)
            .collect();
        assert!(fractions.len() >= 2);
        assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(fractions[0] < 1.0);
        assert_eq!(fractions.last().copied(), Some(1.0));
        Ok(())
    }

    #[tokio::test]
    async fn existing_destination_is_a_conflict_unless_overwriting() -> anyhow::Result<()> {
        let dir = temp_dir()?;
        let source = write_file(dir.path(), "a.txt", b"new")?;
        let destination = write_file(dir.path(), "out/a.txt", b"old")?;
        let processor = CopyProcessor::new();

        let err = processor
            .process(
                &request(source.clone(), destination.clone(), false),
                &RecordingProgress::default(),
            )
            .await
            .expect_err("occupied destination");
        assert!(matches!(err, ProcessError::DestinationExists { ref path } if *path == destination));
        assert_eq!(std::fs::read(&destination)?, b"old");

        processor
            .process(
                &request(source, destination.clone(), true),
                &RecordingProgress::default(),
            )
            .await?;
        assert_eq!(std::fs::read(&destination)?, b"new");
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_fails() -> anyhow::Result<()> {
        let dir = temp_dir()?;
        let err = CopyProcessor::new()
            .process(
                &request(dir.path().join("missing"), dir.path().join("out"), false),
                &RecordingProgress::default(),
            )
            .await
            .expect_err("missing source");
        assert!(matches!(
            err,
            ProcessError::Failed {
                operation: "copy.open_source",
                ..
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_copy_leaves_no_partial_output() -> anyhow::Result<()> {
        let dir = temp_dir()?;
        let source = write_file(dir.path(), "a.txt", b"payload")?;
        let destination = dir.path().join("out/a.txt");
        let request = request(source, destination.clone(), false);
        request.cancel.cancel();

        let err = CopyProcessor::new()
            .process(&request, &RecordingProgress::default())
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ProcessError::Cancelled));
        assert!(!destination.exists());
        assert!(file_names(&dir.path().join("out"))?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn interrupted_overwrite_keeps_the_existing_file() -> anyhow::Result<()> {
        let dir = temp_dir()?;
        let source = write_file(dir.path(), "in/a.txt", b"replacement")?;
        let destination = write_file(dir.path(), "out/a.txt", b"keep me")?;
        let request = request(source, destination.clone(), true);
        request.cancel.cancel();

        let err = CopyProcessor::new()
            .process(&request, &RecordingProgress::default())
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ProcessError::Cancelled));
        assert_eq!(std::fs::read(&destination)?, b"keep me");
        assert_eq!(file_names(&dir.path().join("out"))?, vec!["a.txt"]);
        Ok(())
    }
}
