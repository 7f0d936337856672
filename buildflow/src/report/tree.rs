//! The keyed report tree for one task run.

use super::{LogEntry, StepResult, StepResultHandle};
use crate::core::StepType;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;

/// Position of a step result in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReportKey {
    /// The stage.
    pub step: StepType,
    /// Index of the config in the task.
    pub config_index: usize,
    /// Index of the item (source entry, modifier or destination) within the config.
    pub item_index: usize,
}

impl ReportKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(step: StepType, config_index: usize, item_index: usize) -> Self {
        Self {
            step,
            config_index,
            item_index,
        }
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}.{}]", self.step, self.config_index, self.item_index)
    }
}

/// A failed step, flattened for summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    /// Where the failure happened.
    pub key: ReportKey,
    /// First failure reason.
    pub reason: String,
    /// Captured exception text, if any.
    pub exception: Option<String>,
}

/// Serializable view of one step result.
#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    /// Where the step sits in the report.
    pub key: ReportKey,
    /// Whether the step failed.
    pub failed: bool,
    /// First failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    /// Captured exception text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// Log entries in order.
    pub logs: Vec<LogEntry>,
}

/// Serializable view of the whole report, ordered by key.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSnapshot {
    /// AND of every step's success.
    pub successful: bool,
    /// Steps ordered by `(step, config, item)`.
    pub steps: Vec<StepSnapshot>,
}

/// Tree of step results for one task run.
///
/// Each branch allocates its own slots with [`new_report`](Self::new_report)
/// and never shares one.
#[derive(Debug, Default)]
pub struct Report {
    entries: DashMap<ReportKey, StepResultHandle>,
}

impl Report {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates (or returns the existing) slot for a key.
    pub fn new_report(&self, step: StepType, config_index: usize, item_index: usize) -> StepResultHandle {
        let key = ReportKey::new(step, config_index, item_index);
        self.entries
            .entry(key)
            .or_insert_with(|| StepResult::new(key.to_string()).into_handle())
            .clone()
    }

    /// Returns the slot for a key.
    #[must_use]
    pub fn get(&self, key: &ReportKey) -> Option<StepResultHandle> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Number of allocated slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no slot was allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when no step in the tree has failed.
    #[must_use]
    pub fn successful(&self) -> bool {
        self.entries.iter().all(|entry| entry.value().lock().is_successful())
    }

    fn sorted(&self) -> Vec<(ReportKey, StepResultHandle)> {
        let mut items: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        items.sort_by_key(|(key, _)| *key);
        items
    }

    /// Every failed step, ordered by key.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.sorted()
            .into_iter()
            .filter_map(|(key, handle)| {
                let result = handle.lock();
                result.is_failed().then(|| FailureRecord {
                    key,
                    reason: result.fail_reason().unwrap_or("Unknown failure").to_string(),
                    exception: result.exception().map(str::to_string),
                })
            })
            .collect()
    }

    /// Failed steps of one stage, ordered by key.
    #[must_use]
    pub fn failures_for(&self, step: StepType) -> Vec<FailureRecord> {
        self.failures()
            .into_iter()
            .filter(|record| record.key.step == step)
            .collect()
    }

    /// Serializable snapshot ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> ReportSnapshot {
        let steps: Vec<StepSnapshot> = self
            .sorted()
            .into_iter()
            .map(|(key, handle)| {
                let result = handle.lock();
                StepSnapshot {
                    key,
                    failed: result.is_failed(),
                    fail_reason: result.fail_reason().map(str::to_string),
                    exception: result.exception().map(str::to_string),
                    logs: result.logs().to_vec(),
                }
            })
            .collect();

        ReportSnapshot {
            successful: steps.iter().all(|step| !step.failed),
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_report_is_successful() {
        let report = Report::new();
        assert!(report.successful());
        assert!(report.is_empty());
        assert!(report.failures().is_empty());
    }

    #[test]
    fn test_new_report_allocates_distinct_slots() {
        let report = Report::new();
        let slots: Vec<_> = (0..3).map(|item| report.new_report(StepType::Upload, 1, item)).collect();
        assert_eq!(report.len(), 3);
        assert!(Arc::ptr_eq(&slots[1], &report.new_report(StepType::Upload, 1, 1)));

        slots[2].lock().add_log("only the third");
        let third = report.get(&ReportKey::new(StepType::Upload, 1, 2)).unwrap();
        assert!(third.lock().contains_log("only the third"));
        let first = report.get(&ReportKey::new(StepType::Upload, 1, 0)).unwrap();
        assert!(first.lock().logs().is_empty());
    }

    #[test]
    fn test_successful_is_and_of_all_steps() {
        let report = Report::new();
        report.new_report(StepType::GetSources, 0, 0);
        let failing = report.new_report(StepType::CacheSources, 1, 0);
        assert!(report.successful());

        failing.lock().set_failed("disk full");
        assert!(!report.successful());
        assert_eq!(report.failures_for(StepType::GetSources).len(), 0);
        assert_eq!(report.failures_for(StepType::CacheSources).len(), 1);
    }

    #[test]
    fn test_failures_are_ordered() {
        let report = Report::new();
        report.new_report(StepType::Upload, 1, 0).lock().set_failed("b");
        report.new_report(StepType::Upload, 0, 1).lock().set_failed("a");
        report.new_report(StepType::GetSources, 2, 0).lock().set_failed("first");

        let reasons: Vec<String> = report.failures().into_iter().map(|f| f.reason).collect();
        assert_eq!(reasons, vec!["first", "a", "b"]);
        assert_eq!(report.failures_for(StepType::Upload).len(), 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let report = Report::new();
        report.new_report(StepType::Upload, 0, 0).lock().add_log("uploaded");
        let json = serde_json::to_value(report.snapshot()).unwrap();

        assert_eq!(json["successful"], serde_json::json!(true));
        assert_eq!(json["steps"][0]["key"]["step"], serde_json::json!("upload"));
        assert_eq!(json["steps"][0]["logs"][0]["message"], serde_json::json!("uploaded"));
    }

    #[test]
    fn test_key_display() {
        let key = ReportKey::new(StepType::ModifyCachedSources, 2, 1);
        assert_eq!(key.to_string(), "modify_cached_sources[2.1]");
    }
}
