//! Conflict resolution for occupied destinations.
//!
//! # Design
//! - A fixed policy answers without prompting; `ask` defers to the decision
//!   provider.
//! - At most one prompt is outstanding per batch. Workers queue on an async
//!   mutex and re-check the apply-to-all cache once they hold it, so a cached
//!   answer given while they waited is reused instead of asking again.
//! - A dismissed prompt resolves to `Skip`.
//! - Rename candidates avoid files on disk and every destination reserved by
//!   the batch, and are reserved as soon as they are handed out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use batchline_config::ConflictPolicy;
use batchline_core::{ConflictAction, DecisionProvider};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{PipelineError, PipelineResult};
use crate::queue::JobQueue;

/// Number of numeric suffixes tried before a rename gives up.
pub const MAX_RENAME_CANDIDATES: u32 = 10_000;

/// Action applied when the decision provider is dismissed without an answer.
pub const DISMISSED_ACTION: ConflictAction = ConflictAction::Skip;

/// Where a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOrigin {
    /// The configured policy answered without prompting.
    Policy,
    /// An earlier apply-to-all decision was reused.
    Cached,
    /// The decision provider answered.
    Prompt,
    /// The prompt was dismissed.
    Dismissed,
    /// The batch was already cancelled, so no prompt was shown.
    Cancelled,
}

/// Action chosen for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Action to apply.
    pub action: ConflictAction,
    /// How the action was obtained.
    pub origin: ResolutionOrigin,
}

impl Resolution {
    const fn new(action: ConflictAction, origin: ResolutionOrigin) -> Self {
        Self { action, origin }
    }
}

/// Per-batch conflict resolver shared by every worker.
pub struct ConflictResolver {
    policy: ConflictPolicy,
    decisions: Arc<dyn DecisionProvider>,
    cancel: CancellationToken,
    intake: Option<Arc<JobQueue>>,
    cached: Mutex<Option<ConflictAction>>,
    prompt: tokio::sync::Mutex<()>,
    reserved: Mutex<HashSet<PathBuf>>,
    prompts: AtomicUsize,
}

impl ConflictResolver {
    /// Create a resolver for one batch. `cancel` is tripped when a `Cancel` action is chosen.
    #[must_use]
    pub fn new(
        policy: ConflictPolicy,
        decisions: Arc<dyn DecisionProvider>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            policy,
            decisions,
            cancel,
            intake: None,
            cached: Mutex::new(None),
            prompt: tokio::sync::Mutex::new(()),
            reserved: Mutex::new(HashSet::new()),
            prompts: AtomicUsize::new(0),
        }
    }

    /// Close `queue` intake whenever a `Cancel` action trips the token.
    #[must_use]
    pub fn with_intake(mut self, queue: Arc<JobQueue>) -> Self {
        self.intake = Some(queue);
        self
    }

    /// Decide what to do about the occupied `destination`.
    pub async fn resolve(&self, destination: &Path) -> Resolution {
        let resolution = self.decide(destination).await;
        if resolution.action == ConflictAction::Cancel {
            if let Some(queue) = &self.intake {
                queue.close_intake();
            }
            self.cancel.cancel();
        }
        debug!(
            destination = %destination.display(),
            action = %resolution.action,
            origin = ?resolution.origin,
            "conflict resolved"
        );
        resolution
    }

    async fn decide(&self, destination: &Path) -> Resolution {
        if let Some(action) = self.policy.fixed_action() {
            return Resolution::new(action, ResolutionOrigin::Policy);
        }
        if let Some(action) = self.cached_action() {
            return Resolution::new(action, ResolutionOrigin::Cached);
        }
        if self.cancel.is_cancelled() {
            return Resolution::new(ConflictAction::Cancel, ResolutionOrigin::Cancelled);
        }

        let _prompt = self.prompt.lock().await;
        if let Some(action) = self.cached_action() {
            return Resolution::new(action, ResolutionOrigin::Cached);
        }
        if self.cancel.is_cancelled() {
            return Resolution::new(ConflictAction::Cancel, ResolutionOrigin::Cancelled);
        }

        self.prompts.fetch_add(1, Ordering::Relaxed);
        match self.decisions.ask_file_action(destination).await {
            Some(decision) => {
                if decision.apply_to_all {
                    info!(action = %decision.action, "conflict decision applied to remaining items");
                    *self.lock_cached() = Some(decision.action);
                }
                Resolution::new(decision.action, ResolutionOrigin::Prompt)
            }
            None => Resolution::new(DISMISSED_ACTION, ResolutionOrigin::Dismissed),
        }
    }

    /// Action remembered from an apply-to-all decision.
    #[must_use]
    pub fn cached_action(&self) -> Option<ConflictAction> {
        *self.lock_cached()
    }

    /// Number of times the decision provider has been asked.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::Relaxed)
    }

    /// Mark destinations as taken so rename never hands them out.
    pub fn reserve(&self, paths: impl IntoIterator<Item = PathBuf>) {
        self.lock_reserved().extend(paths);
    }

    /// Pick and reserve a free `name (N).ext` sibling of `destination`.
    ///
    /// Counting starts after any ` (N)` suffix the destination already carries.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] when `destination` has no file
    /// name or all [`MAX_RENAME_CANDIDATES`] candidates are taken.
    pub fn rename(&self, destination: &Path) -> PipelineResult<PathBuf> {
        let first = destination
            .file_stem()
            .and_then(|stem| split_counter(&stem.to_string_lossy()).1)
            .map_or(1, |existing| existing.saturating_add(1));
        let mut reserved = self.lock_reserved();
        for counter in (first..=u32::MAX).take(MAX_RENAME_CANDIDATES as usize) {
            let candidate = renamed_candidate(destination, counter).ok_or_else(|| {
                PipelineError::InvalidInput {
                    field: "destination",
                    reason: "destination has no file name",
                    value: Some(destination.display().to_string()),
                }
            })?;
            if reserved.contains(&candidate) || candidate.try_exists().unwrap_or(true) {
                continue;
            }
            reserved.insert(candidate.clone());
            return Ok(candidate);
        }
        Err(PipelineError::InvalidInput {
            field: "destination",
            reason: "no free rename candidate",
            value: Some(destination.display().to_string()),
        })
    }

    fn lock_cached(&self) -> MutexGuard<'_, Option<ConflictAction>> {
        match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("conflict cache mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    fn lock_reserved(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        match self.reserved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("rename reservation mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

/// Sibling of `destination` carrying the numeric suffix `counter`.
///
/// An existing ` (N)` suffix is replaced rather than stacked, so renaming
/// `clip (2).mp4` yields `clip (3).mp4`. Returns `None` when `destination`
/// has no file name.
#[must_use]
pub fn renamed_candidate(destination: &Path, counter: u32) -> Option<PathBuf> {
    let stem = destination.file_stem()?.to_string_lossy();
    let (base, _) = split_counter(&stem);
    let file_name = match destination.extension() {
        Some(extension) => format!("{base} ({counter}).{}", extension.to_string_lossy()),
        None => format!("{base} ({counter})"),
    };
    Some(destination.with_file_name(file_name))
}

fn split_counter(stem: &str) -> (&str, Option<u32>) {
    let Some(inner) = stem.strip_suffix(')') else {
        return (stem, None);
    };
    let Some(open) = inner.rfind(" (") else {
        return (stem, None);
    };
    let digits = &inner[open + 2..];
    if open == 0 || digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return (stem, None);
    }
    (&stem[..open], digits.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchline_core::ConflictDecision;
    use batchline_test_support::mocks::ScriptedDecisions;
    use std::time::Duration;

    fn resolver(policy: ConflictPolicy, decisions: &Arc<ScriptedDecisions>) -> ConflictResolver {
        let provider: Arc<dyn DecisionProvider> = decisions.clone();
        ConflictResolver::new(policy, provider, CancellationToken::new())
    }

    #[test]
    fn candidates_use_parenthesised_counter() {
        assert_eq!(
            renamed_candidate(Path::new("/out/clip.mp4"), 1),
            Some(PathBuf::from("/out/clip (1).mp4"))
        );
        assert_eq!(
            renamed_candidate(Path::new("/out/clip (2).mp4"), 3),
            Some(PathBuf::from("/out/clip (3).mp4"))
        );
        assert_eq!(
            renamed_candidate(Path::new("README"), 2),
            Some(PathBuf::from("README (2)"))
        );
        assert_eq!(
            renamed_candidate(Path::new("take (x).wav"), 1),
            Some(PathBuf::from("take (x) (1).wav"))
        );
        assert_eq!(renamed_candidate(Path::new("/"), 1), None);
    }

    #[tokio::test]
    async fn fixed_policy_never_prompts() {
        let decisions = Arc::new(ScriptedDecisions::new(vec![]));
        let resolver = resolver(ConflictPolicy::Overwrite, &decisions);
        let resolution = resolver.resolve(Path::new("out/a")).await;
        assert_eq!(
            resolution,
            Resolution::new(ConflictAction::Overwrite, ResolutionOrigin::Policy)
        );
        assert_eq!(decisions.prompt_count(), 0);
    }

    #[tokio::test]
    async fn apply_to_all_is_cached_for_the_batch() {
        let decisions = Arc::new(ScriptedDecisions::new(vec![Some(ConflictDecision::for_all(
            ConflictAction::Rename,
        ))]));
        let resolver = resolver(ConflictPolicy::Ask, &decisions);

        let first = resolver.resolve(Path::new("out/a")).await;
        let second = resolver.resolve(Path::new("out/b")).await;
        assert_eq!(first.origin, ResolutionOrigin::Prompt);
        assert_eq!(
            second,
            Resolution::new(ConflictAction::Rename, ResolutionOrigin::Cached)
        );
        assert_eq!(decisions.prompt_count(), 1);
        assert_eq!(resolver.prompt_count(), 1);
    }

    #[tokio::test]
    async fn single_decisions_are_not_cached() {
        let decisions = Arc::new(ScriptedDecisions::new(vec![
            Some(ConflictDecision::once(ConflictAction::Overwrite)),
            Some(ConflictDecision::once(ConflictAction::Skip)),
        ]));
        let resolver = resolver(ConflictPolicy::Ask, &decisions);

        assert_eq!(
            resolver.resolve(Path::new("out/a")).await.action,
            ConflictAction::Overwrite
        );
        assert_eq!(
            resolver.resolve(Path::new("out/b")).await.action,
            ConflictAction::Skip
        );
        assert_eq!(resolver.cached_action(), None);
        assert_eq!(decisions.prompt_count(), 2);
    }

    #[tokio::test]
    async fn dismissed_prompt_skips() {
        let decisions = Arc::new(ScriptedDecisions::new(vec![None]));
        let resolver = resolver(ConflictPolicy::Ask, &decisions);
        let resolution = resolver.resolve(Path::new("out/a")).await;
        assert_eq!(
            resolution,
            Resolution::new(ConflictAction::Skip, ResolutionOrigin::Dismissed)
        );
    }

    #[tokio::test]
    async fn cancel_trips_token_and_suppresses_later_prompts() {
        let decisions = Arc::new(ScriptedDecisions::new(vec![Some(ConflictDecision::once(
            ConflictAction::Cancel,
        ))]));
        let token = CancellationToken::new();
        let provider: Arc<dyn DecisionProvider> = decisions.clone();
        let queue = Arc::new(JobQueue::new(batchline_events::EventBus::new()));
        let resolver = ConflictResolver::new(ConflictPolicy::Ask, provider, token.clone())
            .with_intake(Arc::clone(&queue));

        let first = resolver.resolve(Path::new("out/a")).await;
        assert_eq!(first.action, ConflictAction::Cancel);
        assert!(token.is_cancelled());
        assert!(!queue.is_accepting());

        let second = resolver.resolve(Path::new("out/b")).await;
        assert_eq!(
            second,
            Resolution::new(ConflictAction::Cancel, ResolutionOrigin::Cancelled)
        );
        assert_eq!(decisions.prompt_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_conflicts_are_prompted_one_at_a_time() {
        let decisions = Arc::new(
            ScriptedDecisions::new(vec![])
                .with_fallback(Some(ConflictDecision::once(ConflictAction::Skip)))
                .with_delay(Duration::from_millis(15)),
        );
        let resolver = Arc::new(resolver(ConflictPolicy::Ask, &decisions));

        let mut handles = Vec::new();
        for index in 0..4 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                resolver
                    .resolve(Path::new(&format!("out/{index}")))
                    .await
            }));
        }
        for handle in handles {
            let resolution = handle.await.expect("resolver task");
            assert_eq!(resolution.action, ConflictAction::Skip);
        }
        assert_eq!(decisions.prompt_count(), 4);
        assert_eq!(decisions.max_concurrent_prompts(), 1);
    }

    #[tokio::test]
    async fn waiters_reuse_apply_to_all_given_while_they_queued() {
        let decisions = Arc::new(
            ScriptedDecisions::new(vec![Some(ConflictDecision::for_all(ConflictAction::Overwrite))])
                .with_delay(Duration::from_millis(25)),
        );
        let resolver = Arc::new(resolver(ConflictPolicy::Ask, &decisions));

        let mut handles = Vec::new();
        for index in 0..3 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                resolver
                    .resolve(Path::new(&format!("out/{index}")))
                    .await
            }));
        }
        for handle in handles {
            let resolution = handle.await.expect("resolver task");
            assert_eq!(resolution.action, ConflictAction::Overwrite);
        }
        assert_eq!(decisions.prompt_count(), 1);
    }

    #[test]
    fn rename_avoids_disk_and_reserved_paths() -> PipelineResult<()> {
        let dir = tempfile::tempdir().map_err(|source| PipelineError::Io {
            operation: "test.tempdir",
            path: PathBuf::new(),
            source,
        })?;
        let target = dir.path().join("a.txt");
        for name in ["a.txt", "a (1).txt"] {
            std::fs::write(dir.path().join(name), b"x").map_err(|source| PipelineError::Io {
                operation: "test.write",
                path: dir.path().join(name),
                source,
            })?;
        }
        let decisions = Arc::new(ScriptedDecisions::new(vec![]));
        let resolver = resolver(ConflictPolicy::Rename, &decisions);
        resolver.reserve([dir.path().join("a (2).txt")]);

        assert_eq!(resolver.rename(&target)?, dir.path().join("a (3).txt"));
        assert_eq!(resolver.rename(&target)?, dir.path().join("a (4).txt"));
        Ok(())
    }

    #[test]
    fn rename_counts_on_from_an_existing_suffix() -> PipelineResult<()> {
        let dir = tempfile::tempdir().map_err(|source| PipelineError::Io {
            operation: "test.tempdir",
            path: PathBuf::new(),
            source,
        })?;
        let target = dir.path().join("clip (2).mp4");
        std::fs::write(&target, b"x").map_err(|source| PipelineError::Io {
            operation: "test.write",
            path: target.clone(),
            source,
        })?;
        let decisions = Arc::new(ScriptedDecisions::new(vec![]));
        let resolver = resolver(ConflictPolicy::Rename, &decisions);

        assert!(!dir.path().join("clip (1).mp4").exists());
        assert_eq!(resolver.rename(&target)?, dir.path().join("clip (3).mp4"));
        assert_eq!(resolver.rename(&target)?, dir.path().join("clip (4).mp4"));
        Ok(())
    }

    #[test]
    fn rename_rejects_paths_without_file_name() {
        let decisions = Arc::new(ScriptedDecisions::new(vec![]));
        let resolver = resolver(ConflictPolicy::Rename, &decisions);
        let err = resolver.rename(Path::new("/")).expect_err("no file name");
        assert!(matches!(
            err,
            PipelineError::InvalidInput {
                field: "destination",
                ..
            }
        ));
    }
}
