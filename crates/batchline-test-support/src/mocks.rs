//! Scripted collaborators for pipeline tests.
//!
//! Both mocks record what they were asked and track peak concurrency so tests
//! can assert on slot limits and prompt serialisation.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use batchline_core::{
    ConflictDecision, DecisionProvider, FileProcessor, ItemId, ItemProgress, ProcessError,
    ProcessRequest, ProgressSink,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One recorded processor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCall {
    /// Item being processed.
    pub item_id: ItemId,
    /// Input location.
    pub source: PathBuf,
    /// Output location.
    pub destination: PathBuf,
    /// Whether overwrite was requested.
    pub overwrite: bool,
}

/// In-memory processor with a virtual set of occupied destinations.
///
/// Occupied destinations report [`ProcessError::DestinationExists`] unless
/// overwrite is requested; successful calls occupy their destination.
#[derive(Default)]
pub struct ScriptedProcessor {
    occupied: Mutex<HashSet<PathBuf>>,
    failing: HashSet<PathBuf>,
    delay: Duration,
    calls: Mutex<Vec<ProcessCall>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProcessor {
    /// Processor with no occupied destinations, no failures, and no delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `paths` as already occupied.
    #[must_use]
    pub fn with_occupied(self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        lock(&self.occupied).extend(paths);
        self
    }

    /// Fail every call whose source is `source`.
    #[must_use]
    pub fn with_failure(mut self, source: impl Into<PathBuf>) -> Self {
        self.failing.insert(source.into());
        self
    }

    /// Sleep for `delay` inside every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls made so far, in invocation order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProcessCall> {
        lock(&self.calls).clone()
    }

    /// Sources in the order their first call started.
    #[must_use]
    pub fn started_sources(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        lock(&self.calls)
            .iter()
            .filter(|call| seen.insert(call.source.clone()))
            .map(|call| call.source.clone())
            .collect()
    }

    /// Highest number of calls observed running at once.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Whether `path` is currently occupied.
    #[must_use]
    pub fn is_occupied(&self, path: &Path) -> bool {
        lock(&self.occupied).contains(path)
    }
}

#[async_trait]
impl FileProcessor for ScriptedProcessor {
    async fn process(
        &self,
        request: &ProcessRequest,
        progress: &dyn ProgressSink,
    ) -> Result<(), ProcessError> {
        let _active = ActiveGuard::enter(&self.active, &self.peak);
        lock(&self.calls).push(ProcessCall {
            item_id: request.item_id,
            source: request.source.clone(),
            destination: request.destination.clone(),
            overwrite: request.options.overwrite,
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        {
            let occupied = lock(&self.occupied);
            if occupied.contains(&request.destination) && !request.options.overwrite {
                return Err(ProcessError::DestinationExists {
                    path: request.destination.clone(),
                });
            }
        }
        if self.failing.contains(&request.source) {
            return Err(ProcessError::failed(
                "scripted",
                &request.source,
                io::Error::other("scripted failure"),
            ));
        }

        progress.report(request.item_id, ItemProgress::fraction(0.5));
        progress.report(request.item_id, ItemProgress::fraction(1.0));
        lock(&self.occupied).insert(request.destination.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Decision provider that replays a fixed list of answers.
///
/// Once the script is exhausted every prompt gets the fallback answer
/// (dismissed by default).
#[derive(Default)]
pub struct ScriptedDecisions {
    answers: Mutex<VecDeque<Option<ConflictDecision>>>,
    fallback: Option<ConflictDecision>,
    delay: Duration,
    asked: Mutex<Vec<PathBuf>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedDecisions {
    /// Provider that answers prompts with `answers` in order.
    #[must_use]
    pub fn new(answers: Vec<Option<ConflictDecision>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            ..Self::default()
        }
    }

    /// Answer used after the script runs out.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Option<ConflictDecision>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Pause for `delay` before answering, to widen race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of prompts answered so far.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        lock(&self.asked).len()
    }

    /// Destinations that were asked about, in order.
    #[must_use]
    pub fn asked(&self) -> Vec<PathBuf> {
        lock(&self.asked).clone()
    }

    /// Highest number of prompts observed open at once.
    #[must_use]
    pub fn max_concurrent_prompts(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecisions {
    async fn ask_file_action(&self, destination: &Path) -> Option<ConflictDecision> {
        let _active = ActiveGuard::enter(&self.active, &self.peak);
        lock(&self.asked).push(destination.to_path_buf());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        lock(&self.answers).pop_front().unwrap_or(self.fallback)
    }
}

/// Progress sink that keeps every update.
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<(ItemId, ItemProgress)>>,
}

impl RecordingProgress {
    /// Updates received so far.
    #[must_use]
    pub fn updates(&self) -> Vec<(ItemId, ItemProgress)> {
        lock(&self.updates).clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, item_id: ItemId, progress: ItemProgress) {
        lock(&self.updates).push((item_id, progress));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchline_core::{ConflictAction, ProcessOptions};
    use tokio_util::sync::CancellationToken;

    fn request(destination: &str, overwrite: bool) -> ProcessRequest {
        ProcessRequest {
            item_id: ItemId::nil(),
            source: PathBuf::from("in/a"),
            destination: PathBuf::from(destination),
            options: ProcessOptions { overwrite },
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn occupied_destinations_conflict_until_overwritten() {
        let processor =
            ScriptedProcessor::new().with_occupied([PathBuf::from("out/a")]);
        let progress = RecordingProgress::default();

        let err = processor
            .process(&request("out/a", false), &progress)
            .await
            .expect_err("occupied");
        assert!(matches!(err, ProcessError::DestinationExists { .. }));

        processor
            .process(&request("out/a", true), &progress)
            .await
            .expect("overwrite succeeds");
        processor
            .process(&request("out/b", false), &progress)
            .await
            .expect("free destination");
        assert!(processor.is_occupied(Path::new("out/b")));
        assert_eq!(processor.calls().len(), 3);
        assert_eq!(processor.max_concurrent(), 1);
        assert_eq!(progress.updates().len(), 4);
    }

    #[tokio::test]
    async fn scripted_failures_are_reported() {
        let processor = ScriptedProcessor::new().with_failure("in/a");
        let err = processor
            .process(&request("out/a", false), &RecordingProgress::default())
            .await
            .expect_err("scripted failure");
        assert!(matches!(err, ProcessError::Failed { operation: "scripted", .. }));
    }

    #[tokio::test]
    async fn decisions_replay_script_then_fallback() {
        let decisions = ScriptedDecisions::new(vec![
            Some(ConflictDecision::once(ConflictAction::Rename)),
            None,
        ])
        .with_fallback(Some(ConflictDecision::once(ConflictAction::Skip)));

        let answers = [
            decisions.ask_file_action(Path::new("a")).await,
            decisions.ask_file_action(Path::new("b")).await,
            decisions.ask_file_action(Path::new("c")).await,
        ];
        assert_eq!(
            answers,
            [
                Some(ConflictDecision::once(ConflictAction::Rename)),
                None,
                Some(ConflictDecision::once(ConflictAction::Skip)),
            ]
        );
        assert_eq!(decisions.prompt_count(), 3);
        assert_eq!(
            decisions.asked(),
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
    }
}
