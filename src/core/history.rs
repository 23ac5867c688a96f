//! Transition history tracking.
//!
//! Every event a machine accepts leaves one immutable `TransitionRecord`.
//! The history is bounded: once `limit` records are held, recording a new
//! one drops the oldest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single accepted event.
///
/// # Example
///
/// ```rust
/// use statecraft::core::TransitionRecord;
/// use chrono::Utc;
///
/// let record = TransitionRecord {
///     event: "GO".to_string(),
///     from: vec![".root.idle".to_string()],
///     to: vec![".root.running".to_string()],
///     timestamp: Utc::now(),
///     revision: 1,
/// };
/// assert!(record.changed_states());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Name of the event that was handled
    pub event: String,
    /// Active leaf paths before the event
    pub from: Vec<String>,
    /// Active leaf paths after the event
    pub to: Vec<String>,
    /// When the event was committed
    pub timestamp: DateTime<Utc>,
    /// Snapshot revision produced by the event
    pub revision: u64,
}

impl TransitionRecord {
    /// Whether the event moved the machine to a different set of leaves.
    ///
    /// Handlers without a target, and self-transitions, leave this `false`.
    pub fn changed_states(&self) -> bool {
        self.from != self.to
    }
}

/// Ordered, bounded history of accepted events.
///
/// History is immutable - `record` returns a new history with the record
/// appended, leaving the original untouched.
///
/// # Example
///
/// ```rust
/// use statecraft::core::{TransitionHistory, TransitionRecord};
/// use chrono::Utc;
///
/// let history = TransitionHistory::with_limit(2);
/// let step = |event: &str, from: &str, to: &str, revision| TransitionRecord {
///     event: event.to_string(),
///     from: vec![from.to_string()],
///     to: vec![to.to_string()],
///     timestamp: Utc::now(),
///     revision,
/// };
///
/// let history = history
///     .record(step("GO", ".root.idle", ".root.running", 1))
///     .record(step("STOP", ".root.running", ".root.idle", 2))
///     .record(step("GO", ".root.idle", ".root.running", 3));
///
/// assert_eq!(history.records().len(), 2);
/// assert_eq!(history.records()[0].event, "STOP");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionHistory {
    records: Vec<TransitionRecord>,
    limit: usize,
}

impl Default for TransitionHistory {
    fn default() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }
}

impl TransitionHistory {
    pub const DEFAULT_LIMIT: usize = 64;

    /// Create an empty history holding at most `limit` records.
    ///
    /// A limit of zero disables recording.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            limit,
        }
    }

    /// Record an event, returning a new history.
    pub fn record(&self, record: TransitionRecord) -> Self {
        if self.limit == 0 {
            return self.clone();
        }
        let skip = (self.records.len() + 1).saturating_sub(self.limit);
        let mut records: Vec<TransitionRecord> =
            self.records.iter().skip(skip).cloned().collect();
        records.push(record);
        Self {
            records,
            limit: self.limit,
        }
    }

    /// The sequence of active leaf sets traversed.
    ///
    /// Starts with the `from` set of the oldest retained record, followed by
    /// the `to` set of each record.
    pub fn get_path(&self) -> Vec<&[String]> {
        let mut path = Vec::new();
        if let Some(first) = self.records.first() {
            path.push(first.from.as_slice());
        }
        for record in &self.records {
            path.push(record.to.as_slice());
        }
        path
    }

    /// Time between the oldest and newest retained records.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.first()?, self.records.last()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: &str, from: &str, to: &str, revision: u64) -> TransitionRecord {
        TransitionRecord {
            event: event.to_string(),
            from: vec![from.to_string()],
            to: vec![to.to_string()],
            timestamp: Utc::now(),
            revision,
        }
    }

    #[test]
    fn new_history_is_empty() {
        let history = TransitionHistory::default();
        assert!(history.is_empty());
        assert!(history.get_path().is_empty());
        assert!(history.duration().is_none());
        assert_eq!(history.limit(), TransitionHistory::DEFAULT_LIMIT);
    }

    #[test]
    fn record_is_immutable() {
        let history = TransitionHistory::default();
        let new_history = history.record(record("GO", ".root.idle", ".root.running", 1));

        assert!(history.is_empty());
        assert_eq!(new_history.records().len(), 1);
    }

    #[test]
    fn get_path_returns_leaf_sequence() {
        let history = TransitionHistory::default()
            .record(record("GO", ".root.idle", ".root.running", 1))
            .record(record("STOP", ".root.running", ".root.idle", 2));

        let path = history.get_path();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], [".root.idle".to_string()]);
        assert_eq!(path[1], [".root.running".to_string()]);
        assert_eq!(path[2], [".root.idle".to_string()]);
    }

    #[test]
    fn limit_drops_oldest_records() {
        let mut history = TransitionHistory::with_limit(3);
        for revision in 1..=5 {
            history = history.record(record("TICK", ".root.a", ".root.a", revision));
        }
        let revisions: Vec<u64> = history.records().iter().map(|r| r.revision).collect();
        assert_eq!(revisions, vec![3, 4, 5]);
    }

    #[test]
    fn zero_limit_records_nothing() {
        let history =
            TransitionHistory::with_limit(0).record(record("GO", ".root.a", ".root.b", 1));
        assert!(history.is_empty());
    }

    #[test]
    fn self_transition_does_not_change_states() {
        assert!(!record("TICK", ".root.a", ".root.a", 1).changed_states());
        assert!(record("GO", ".root.a", ".root.b", 1).changed_states());
    }

    #[test]
    fn history_serializes_correctly() {
        let history =
            TransitionHistory::default().record(record("GO", ".root.idle", ".root.running", 1));

        let json = serde_json::to_string(&history).unwrap();
        let deserialized: TransitionHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(history.records(), deserialized.records());
    }
}
