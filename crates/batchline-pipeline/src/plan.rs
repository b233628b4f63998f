//! Destination planning: map input files to output paths.

use std::path::{Path, PathBuf};

use batchline_core::WorkItem;

use crate::error::{PipelineError, PipelineResult};

/// Maps each source to `output_dir/<stem>.<extension>`.
///
/// Without an extension override the source's own file name is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPlanner {
    output_dir: PathBuf,
    extension: Option<String>,
}

impl DestinationPlanner {
    /// Planner writing into `output_dir` with the source file names unchanged.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            extension: None,
        }
    }

    /// Replace every destination's extension; a leading dot is ignored.
    #[must_use]
    pub fn with_extension(mut self, extension: impl AsRef<str>) -> Self {
        let trimmed = extension.as_ref().trim().trim_start_matches('.');
        self.extension = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Output directory used for every destination.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Destination for a single `source`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] when `source` has no file name.
    pub fn plan(&self, source: &Path) -> PipelineResult<PathBuf> {
        let invalid = || PipelineError::InvalidInput {
            field: "source",
            reason: "source has no file name",
            value: Some(source.display().to_string()),
        };
        let file_name = match &self.extension {
            Some(extension) => {
                let stem = source.file_stem().ok_or_else(invalid)?;
                format!("{}.{extension}", stem.to_string_lossy())
            }
            None => source.file_name().ok_or_else(invalid)?.to_string_lossy().into_owned(),
        };
        Ok(self.output_dir.join(file_name))
    }

    /// Pending work items for `sources`, in the given order.
    ///
    /// # Errors
    ///
    /// Returns the first planning failure.
    pub fn plan_items<I, P>(&self, sources: I) -> PipelineResult<Vec<WorkItem>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        sources
            .into_iter()
            .map(|source| {
                let source = source.as_ref();
                self.plan(source)
                    .map(|destination| WorkItem::new(source, destination))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchline_core::ItemState;

    #[test]
    fn keeps_file_name_without_extension_override() -> PipelineResult<()> {
        let planner = DestinationPlanner::new("/out");
        assert_eq!(
            planner.plan(Path::new("/music/track.wav"))?,
            PathBuf::from("/out/track.wav")
        );
        Ok(())
    }

    #[test]
    fn replaces_extension_when_configured() -> PipelineResult<()> {
        let planner = DestinationPlanner::new("/out").with_extension(".flac");
        assert_eq!(
            planner.plan(Path::new("/music/track.wav"))?,
            PathBuf::from("/out/track.flac")
        );
        assert_eq!(
            planner.plan(Path::new("/music/README"))?,
            PathBuf::from("/out/README.flac")
        );
        Ok(())
    }

    #[test]
    fn blank_extension_is_ignored() -> PipelineResult<()> {
        let planner = DestinationPlanner::new("out").with_extension("  ");
        assert_eq!(planner.plan(Path::new("a.mkv"))?, PathBuf::from("out/a.mkv"));
        Ok(())
    }

    #[test]
    fn sources_without_file_name_are_rejected() {
        let planner = DestinationPlanner::new("out");
        let err = planner.plan(Path::new("/")).expect_err("no file name");
        assert!(matches!(
            err,
            PipelineError::InvalidInput { field: "source", .. }
        ));
    }

    #[test]
    fn plan_items_preserves_order_and_starts_pending() -> PipelineResult<()> {
        let planner = DestinationPlanner::new("out").with_extension("mp3");
        let items = planner.plan_items(["b.wav", "a.wav"])?;
        let destinations: Vec<_> = items.iter().map(|item| item.destination_path.clone()).collect();
        assert_eq!(
            destinations,
            vec![PathBuf::from("out/b.mp3"), PathBuf::from("out/a.mp3")]
        );
        assert!(items.iter().all(|item| item.state() == ItemState::Pending));
        Ok(())
    }
}
