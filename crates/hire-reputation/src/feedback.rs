//! Task outcome feedback, keyed by `(task_id, agent_id)`.
//!
//! A second submission for the same pair replaces the first; nothing
//! accumulates. Queries return the most recent record first, which the scorer
//! relies on for its decay weighting.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReputationError, StorageError};
use crate::storage::{MemoryBackend, ReputationBackend};

/// How a task ended, from the buyer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Task fully delivered.
    Success,
    /// Task delivered with gaps.
    Partial,
    /// Task not delivered.
    Failure,
}

impl Outcome {
    /// Contribution of this outcome to an agent's success rate.
    #[must_use]
    pub const fn credit(self) -> f64 {
        match self {
            Self::Success => 1.0,
            Self::Partial => 0.5,
            Self::Failure => 0.0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for Outcome {
    type Err = ReputationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failure" => Ok(Self::Failure),
            other => Err(ReputationError::InvalidFeedback(format!(
                "unknown outcome {other:?}"
            ))),
        }
    }
}

/// Primary key of the feedback table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedbackKey {
    /// Task the feedback refers to.
    pub task_id: String,
    /// Agent that performed the task.
    pub agent_id: String,
}

/// One agent's result on one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Task the feedback refers to.
    pub task_id: String,
    /// Agent that performed the task.
    pub agent_id: String,
    /// Outcome of the task.
    pub outcome: Outcome,
    /// Quality of the delivered work in `[0, 1]`.
    pub quality_score: f64,
    /// Wall-clock seconds the task took.
    pub latency_secs: f64,
    /// What the task cost.
    pub cost: f64,
    /// When the feedback was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Creates a record timestamped now.
    pub fn new(
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        outcome: Outcome,
        quality_score: f64,
        latency_secs: f64,
        cost: f64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            outcome,
            quality_score,
            latency_secs,
            cost,
            timestamp: Utc::now(),
        }
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns the table key for this record.
    pub fn key(&self) -> FeedbackKey {
        FeedbackKey {
            task_id: self.task_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }

    /// Checks ids and numeric ranges.
    pub fn validate(&self) -> Result<(), ReputationError> {
        if self.task_id.trim().is_empty() {
            return Err(ReputationError::InvalidFeedback("task_id is empty".into()));
        }
        if self.agent_id.trim().is_empty() {
            return Err(ReputationError::InvalidFeedback("agent_id is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.quality_score) {
            return Err(ReputationError::InvalidFeedback(format!(
                "quality_score {} outside [0, 1]",
                self.quality_score
            )));
        }
        if !(self.cost.is_finite() && self.cost >= 0.0) {
            return Err(ReputationError::InvalidFeedback(format!(
                "cost must be non-negative, got {}",
                self.cost
            )));
        }
        if !(self.latency_secs.is_finite() && self.latency_secs >= 0.0) {
            return Err(ReputationError::InvalidFeedback(format!(
                "latency must be non-negative, got {}",
                self.latency_secs
            )));
        }
        Ok(())
    }
}

/// Whether a write created a new row or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No record existed for the key.
    Inserted,
    /// An earlier record for the key was overwritten.
    Replaced,
}

/// Filter for [`FeedbackStore::query`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct FeedbackQuery {
    /// Only records for this agent.
    pub agent_id: Option<String>,
    /// Only records for this task.
    pub task_id: Option<String>,
}

impl FeedbackQuery {
    /// Filter on a single agent.
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            task_id: None,
        }
    }

    /// Filter on a single task.
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            agent_id: None,
            task_id: Some(task_id.into()),
        }
    }

    fn matches(&self, record: &FeedbackRecord) -> bool {
        self.agent_id.as_deref().is_none_or(|a| a == record.agent_id)
            && self.task_id.as_deref().is_none_or(|t| t == record.task_id)
    }
}

/// In-memory feedback table with best-effort persistence.
///
/// Snapshots are written outside the table lock so readers never wait on
/// the backend. A separate writer lock keeps snapshots landing in the order
/// they were taken.
pub struct FeedbackStore {
    records: RwLock<HashMap<FeedbackKey, FeedbackRecord>>,
    writer: Mutex<()>,
    backend: Arc<dyn ReputationBackend>,
}

impl FeedbackStore {
    /// Creates an empty store that persists nowhere but memory.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    /// Creates a store over `backend`, loading whatever it already holds.
    ///
    /// A backend that fails to load is logged and the store starts empty.
    pub fn with_backend(backend: Arc<dyn ReputationBackend>) -> Self {
        let records = match backend.load_feedback() {
            Ok(records) => records
                .into_iter()
                .map(|r| (r.key(), r))
                .collect::<HashMap<_, _>>(),
            Err(e) => {
                warn!(error = %e, "failed to load feedback, starting empty");
                HashMap::new()
            }
        };
        debug!(count = records.len(), "loaded feedback records");
        Self {
            records: RwLock::new(records),
            writer: Mutex::new(()),
            backend,
        }
    }

    /// Upserts a record by `(task_id, agent_id)`.
    ///
    /// Persistence failures are logged and swallowed; the in-memory table is
    /// always updated.
    pub fn record(&self, record: FeedbackRecord) -> Result<Upsert, ReputationError> {
        record.validate()?;

        let _writer = self.writer.lock();
        let (upsert, snapshot) = {
            let mut records = self.records.write();
            let upsert = match records.insert(record.key(), record) {
                Some(_) => Upsert::Replaced,
                None => Upsert::Inserted,
            };
            (upsert, Self::snapshot_of(&records))
        };
        if let Err(e) = self.backend.save_feedback(&snapshot) {
            warn!(error = %e, "failed to persist feedback");
        }

        Ok(upsert)
    }

    /// Writes the current table to the backend, surfacing any failure.
    pub fn flush(&self) -> Result<(), ReputationError> {
        let _writer = self.writer.lock();
        self.persist()?;
        Ok(())
    }

    /// Drops every record and persists the empty table.
    pub fn clear(&self) {
        let _writer = self.writer.lock();
        let dropped = std::mem::take(&mut *self.records.write()).len();
        debug!(dropped, "feedback cleared");
        if let Err(e) = self.persist() {
            warn!(error = %e, "failed to persist cleared feedback");
        }
    }

    fn persist(&self) -> Result<(), StorageError> {
        let snapshot = Self::snapshot_of(&self.records.read());
        self.backend.save_feedback(&snapshot)
    }

    fn snapshot_of(records: &HashMap<FeedbackKey, FeedbackRecord>) -> Vec<FeedbackRecord> {
        let mut snapshot: Vec<FeedbackRecord> = records.values().cloned().collect();
        snapshot.sort_by(|a, b| a.key().cmp(&b.key()));
        snapshot
    }

    /// Returns matching records, most recent first.
    pub fn query(&self, query: &FeedbackQuery) -> Vec<FeedbackRecord> {
        let mut matched: Vec<FeedbackRecord> = self
            .records
            .read()
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.task_id.cmp(&b.task_id))
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        matched
    }

    /// Returns an agent's records, most recent first.
    pub fn for_agent(&self, agent_id: &str) -> Vec<FeedbackRecord> {
        self.query(&FeedbackQuery::for_agent(agent_id))
    }

    /// Point lookup by key.
    pub fn get(&self, task_id: &str, agent_id: &str) -> Option<FeedbackRecord> {
        let key = FeedbackKey {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
        };
        self.records.read().get(&key).cloned()
    }

    /// Every agent with at least one record.
    pub fn agent_ids(&self) -> BTreeSet<String> {
        self.records
            .read()
            .keys()
            .map(|k| k.agent_id.clone())
            .collect()
    }

    /// Mean observed cost for an agent, or `None` without history.
    pub fn mean_cost(&self, agent_id: &str) -> Option<f64> {
        let records = self.records.read();
        let (sum, count) = records
            .values()
            .filter(|r| r.agent_id == agent_id)
            .fold((0.0, 0usize), |(sum, count), r| (sum + r.cost, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Number of records matching `query`.
    pub fn count(&self, query: &FeedbackQuery) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| query.matches(r))
            .count()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no feedback has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl fmt::Debug for FeedbackStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackStore")
            .field("records", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use test_case::test_case;

    fn at(minutes_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes_ago)
    }

    #[test_case(Outcome::Success, 1.0)]
    #[test_case(Outcome::Partial, 0.5)]
    #[test_case(Outcome::Failure, 0.0)]
    fn outcome_credit(outcome: Outcome, expected: f64) {
        assert!((outcome.credit() - expected).abs() < f64::EPSILON);
    }

    #[test_case("success", Outcome::Success)]
    #[test_case("Partial", Outcome::Partial)]
    #[test_case(" FAILURE ", Outcome::Failure)]
    fn outcome_parses(input: &str, expected: Outcome) {
        assert_eq!(input.parse::<Outcome>().unwrap(), expected);
    }

    #[test]
    fn outcome_rejects_unknown() {
        assert!("timeout".parse::<Outcome>().is_err());
    }

    #[test]
    fn outcome_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Outcome::Partial).unwrap(), r#""partial""#);
    }

    #[test]
    fn second_write_replaces_first() {
        let store = FeedbackStore::in_memory();
        let first = FeedbackRecord::new("task-1", "agent-a", Outcome::Failure, 0.2, 1.0, 0.5);
        let second = FeedbackRecord::new("task-1", "agent-a", Outcome::Success, 0.9, 1.0, 0.1);

        assert_eq!(store.record(first).unwrap(), Upsert::Inserted);
        assert_eq!(store.record(second).unwrap(), Upsert::Replaced);

        assert_eq!(store.len(), 1);
        let stored = store.get("task-1", "agent-a").unwrap();
        assert_eq!(stored.outcome, Outcome::Success);
        assert!((stored.quality_score - 0.9).abs() < f64::EPSILON);
        assert!((stored.cost - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn same_task_different_agents_are_distinct() {
        let store = FeedbackStore::in_memory();
        store
            .record(FeedbackRecord::new("task-1", "agent-a", Outcome::Success, 0.9, 1.0, 0.1))
            .unwrap();
        store
            .record(FeedbackRecord::new("task-1", "agent-b", Outcome::Failure, 0.1, 1.0, 0.1))
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.query(&FeedbackQuery::for_task("task-1")).len(), 2);
    }

    #[test]
    fn query_orders_most_recent_first() {
        let store = FeedbackStore::in_memory();
        for (task, minutes_ago) in [("old", 30), ("newest", 1), ("middle", 10)] {
            store
                .record(
                    FeedbackRecord::new(task, "agent-a", Outcome::Success, 0.8, 1.0, 0.1)
                        .with_timestamp(at(minutes_ago)),
                )
                .unwrap();
        }

        let tasks: Vec<String> = store
            .for_agent("agent-a")
            .into_iter()
            .map(|r| r.task_id)
            .collect();
        assert_eq!(tasks, vec!["newest", "middle", "old"]);
    }

    #[test]
    fn query_filters_by_agent() {
        let store = FeedbackStore::in_memory();
        store
            .record(FeedbackRecord::new("t1", "agent-a", Outcome::Success, 0.8, 1.0, 0.1))
            .unwrap();
        store
            .record(FeedbackRecord::new("t2", "agent-b", Outcome::Success, 0.8, 1.0, 0.1))
            .unwrap();

        assert_eq!(store.for_agent("agent-a").len(), 1);
        assert_eq!(store.query(&FeedbackQuery::default()).len(), 2);
        assert!(store.for_agent("agent-z").is_empty());
        assert_eq!(store.agent_ids().len(), 2);
    }

    #[test_case(1.2, 0.0, 0.0 ; "quality above one")]
    #[test_case(-0.1, 0.0, 0.0 ; "quality below zero")]
    #[test_case(0.5, -1.0, 0.0 ; "negative cost")]
    #[test_case(0.5, 0.0, -3.0 ; "negative latency")]
    #[test_case(0.5, f64::NAN, 0.0 ; "nan cost")]
    fn invalid_records_are_rejected(quality: f64, cost: f64, latency: f64) {
        let store = FeedbackStore::in_memory();
        let record = FeedbackRecord::new("t1", "agent-a", Outcome::Success, quality, latency, cost);
        assert!(matches!(store.record(record), Err(ReputationError::InvalidFeedback(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn empty_ids_are_rejected() {
        let store = FeedbackStore::in_memory();
        let record = FeedbackRecord::new("", "agent-a", Outcome::Success, 0.5, 0.0, 0.0);
        assert!(store.record(record).is_err());
        let record = FeedbackRecord::new("t1", "  ", Outcome::Success, 0.5, 0.0, 0.0);
        assert!(store.record(record).is_err());
    }

    #[test]
    fn mean_cost_over_history() {
        let store = FeedbackStore::in_memory();
        assert_eq!(store.mean_cost("agent-a"), None);
        store
            .record(FeedbackRecord::new("t1", "agent-a", Outcome::Success, 0.8, 1.0, 0.1))
            .unwrap();
        store
            .record(FeedbackRecord::new("t2", "agent-a", Outcome::Success, 0.8, 1.0, 0.3))
            .unwrap();
        let mean = store.mean_cost("agent-a").unwrap();
        assert!((mean - 0.2).abs() < 1e-12);
    }

    #[test]
    fn writes_reach_the_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let store = FeedbackStore::with_backend(backend.clone());
        store
            .record(FeedbackRecord::new("t1", "agent-a", Outcome::Success, 0.8, 1.0, 0.1))
            .unwrap();
        assert_eq!(backend.load_feedback().unwrap().len(), 1);

        let reopened = FeedbackStore::with_backend(backend);
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn count_and_clear() {
        let backend = Arc::new(MemoryBackend::new());
        let store = FeedbackStore::with_backend(backend.clone());
        for (task, agent) in [("t1", "agent-a"), ("t2", "agent-a"), ("t1", "agent-b")] {
            store
                .record(FeedbackRecord::new(task, agent, Outcome::Success, 0.8, 1.0, 0.1))
                .unwrap();
        }
        assert_eq!(store.count(&FeedbackQuery::default()), 3);
        assert_eq!(store.count(&FeedbackQuery::for_agent("agent-a")), 2);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.count(&FeedbackQuery::for_agent("agent-a")), 0);
        assert!(backend.load_feedback().unwrap().is_empty());
    }

    #[test]
    fn concurrent_writers_persist_the_final_table() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(FeedbackStore::with_backend(backend.clone()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store
                            .record(FeedbackRecord::new(
                                format!("t{t}-{i}"),
                                "agent-a",
                                Outcome::Success,
                                0.8,
                                1.0,
                                0.1,
                            ))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 80);
        assert_eq!(backend.load_feedback().unwrap().len(), 80);
    }
}
