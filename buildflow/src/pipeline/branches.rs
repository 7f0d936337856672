//! Fan-out/fan-in of one stage's branches with progress sampling.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::error;

/// Reports a running branch's own progress in `[0, 1]`.
pub type ProgressFn = Box<dyn Fn() -> f32 + Send + Sync>;

struct Branch {
    label: String,
    handle: JoinHandle<bool>,
    progress: ProgressFn,
}

/// The spawned branches of one stage.
///
/// Branches run on the tokio runtime as soon as they are spawned and may
/// complete in any order. [`join`](Self::join) waits for all of them.
#[derive(Default)]
pub struct BranchSet {
    branches: Vec<Branch>,
}

impl BranchSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a branch together with the function sampling its progress.
    pub fn spawn<F>(&mut self, label: impl Into<String>, branch: F, progress: ProgressFn)
    where
        F: Future<Output = bool> + Send + 'static,
    {
        self.branches.push(Branch {
            label: label.into(),
            handle: tokio::spawn(branch),
            progress,
        });
    }

    /// Number of spawned branches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Returns true if nothing was spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Waits for every branch and returns the AND of their results.
    ///
    /// While branches run, `on_progress` receives
    /// `(completed + sum of in-flight progress) / branch count` every
    /// `interval`. Reported values never decrease and the last one is 1.0.
    /// A branch that panicked or was aborted counts as failed.
    pub async fn join(self, interval: Duration, mut on_progress: impl FnMut(f32)) -> bool {
        if self.branches.is_empty() {
            on_progress(1.0);
            return true;
        }

        let total = self.branches.len();
        let mut progress_fns = Vec::with_capacity(total);
        let mut pending = FuturesUnordered::new();
        for (index, branch) in self.branches.into_iter().enumerate() {
            progress_fns.push(branch.progress);
            let label = branch.label;
            let handle = branch.handle;
            pending.push(async move { (index, label, handle.await) });
        }

        let mut completed = vec![false; total];
        let mut all_succeeded = true;
        let mut reported = 0.0_f32;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !pending.is_empty() {
            tokio::select! {
                Some((index, label, joined)) = pending.next() => {
                    completed[index] = true;
                    let succeeded = joined.unwrap_or_else(|err| {
                        error!(branch = %label, error = %err, "Branch did not finish");
                        false
                    });
                    all_succeeded &= succeeded;
                }
                _ = ticker.tick() => {
                    let sample = sample_progress(&completed, &progress_fns);
                    if sample > reported {
                        reported = sample;
                    }
                    on_progress(reported);
                }
            }
        }

        on_progress(1.0);
        all_succeeded
    }
}

fn sample_progress(completed: &[bool], progress_fns: &[ProgressFn]) -> f32 {
    let sum: f32 = completed
        .iter()
        .zip(progress_fns)
        .map(|(done, progress)| if *done { 1.0 } else { progress().clamp(0.0, 1.0) })
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let fraction = sum / completed.len() as f32;
    fraction.clamp(0.0, 1.0)
}

impl std::fmt::Debug for BranchSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchSet")
            .field("branches", &self.branches.iter().map(|b| b.label.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProgressHandle;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn constant(value: f32) -> ProgressFn {
        Box::new(move || value)
    }

    #[tokio::test]
    async fn test_empty_set_succeeds_immediately() {
        let mut samples = Vec::new();
        let ok = BranchSet::new()
            .join(Duration::from_millis(5), |fraction| samples.push(fraction))
            .await;
        assert!(ok);
        assert_eq!(samples, vec![1.0]);
    }

    #[tokio::test]
    async fn test_result_is_and_of_branches() {
        for outcomes in [vec![true, true, true], vec![true, false, true], vec![false]] {
            let expected = outcomes.iter().all(|ok| *ok);
            let mut set = BranchSet::new();
            for (index, outcome) in outcomes.into_iter().enumerate() {
                set.spawn(format!("b{index}"), async move { outcome }, constant(0.0));
            }
            assert_eq!(set.join(Duration::from_millis(5), |_| {}).await, expected);
        }
    }

    async fn explode() -> bool {
        panic!("branch exploded")
    }

    #[tokio::test]
    async fn test_panicking_branch_counts_as_failure() {
        let mut set = BranchSet::new();
        set.spawn("ok", async { true }, constant(0.0));
        set.spawn("boom", explode(), constant(0.0));
        assert!(!set.join(Duration::from_millis(5), |_| {}).await);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_one() {
        let handle = ProgressHandle::new();
        let writer = handle.clone();
        let reader = handle.clone();

        let mut set = BranchSet::new();
        set.spawn(
            "slow",
            async move {
                for step in 1..=5 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    // A dip must not show up in the reported value.
                    writer.set(if step == 3 { 0.1 } else { step as f32 / 5.0 });
                }
                true
            },
            Box::new(move || reader.get()),
        );
        set.spawn("fast", async { true }, constant(0.0));

        let samples = Arc::new(Mutex::new(Vec::new()));
        let sink = samples.clone();
        assert!(set.join(Duration::from_millis(2), move |f| sink.lock().push(f)).await);

        let samples = samples.lock().clone();
        assert!(samples.len() > 2);
        assert!(samples.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(samples.last().copied(), Some(1.0));
    }
}
