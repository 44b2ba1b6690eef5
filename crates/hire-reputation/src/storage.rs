//! Storage port for reputation state.
//!
//! Two logical tables are persisted: `feedback`, keyed by
//! `(task_id, agent_id)`, and `agent_scores`, keyed by `agent_id`. Backends
//! receive full snapshots and return typed errors; whether a failure is
//! fatal is the caller's decision.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use hire_persist::JsonStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::feedback::FeedbackRecord;
use crate::scorer::AgentScore;

/// A row of the `agent_scores` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedScore {
    /// Last computed score.
    pub score: AgentScore,
    /// When it was computed.
    pub updated_at: DateTime<Utc>,
}

/// Durable home for the `feedback` and `agent_scores` tables.
pub trait ReputationBackend: Send + Sync {
    /// Loads every feedback row.
    fn load_feedback(&self) -> Result<Vec<FeedbackRecord>, StorageError>;

    /// Replaces the feedback table with `records`.
    fn save_feedback(&self, records: &[FeedbackRecord]) -> Result<(), StorageError>;

    /// Loads every cached score row.
    fn load_scores(&self) -> Result<Vec<CachedScore>, StorageError>;

    /// Replaces the score cache table with `scores`.
    fn save_scores(&self, scores: &[CachedScore]) -> Result<(), StorageError>;
}

/// Keeps snapshots in memory. State does not survive the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    feedback: RwLock<Vec<FeedbackRecord>>,
    scores: RwLock<Vec<CachedScore>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReputationBackend for MemoryBackend {
    fn load_feedback(&self) -> Result<Vec<FeedbackRecord>, StorageError> {
        Ok(self.feedback.read().clone())
    }

    fn save_feedback(&self, records: &[FeedbackRecord]) -> Result<(), StorageError> {
        *self.feedback.write() = records.to_vec();
        Ok(())
    }

    fn load_scores(&self) -> Result<Vec<CachedScore>, StorageError> {
        Ok(self.scores.read().clone())
    }

    fn save_scores(&self, scores: &[CachedScore]) -> Result<(), StorageError> {
        *self.scores.write() = scores.to_vec();
        Ok(())
    }
}

/// Persists each table as a JSON snapshot file under a state directory.
pub struct JsonBackend {
    feedback: JsonStore,
    scores: JsonStore,
}

impl JsonBackend {
    /// Creates a backend writing `feedback.json` and `agent_scores.json`
    /// under `dir`.
    pub fn new(dir: &Path) -> Self {
        Self {
            feedback: JsonStore::new(dir, "feedback"),
            scores: JsonStore::new(dir, "agent_scores"),
        }
    }
}

impl fmt::Debug for JsonBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonBackend")
            .field("feedback", &self.feedback.path())
            .field("scores", &self.scores.path())
            .finish()
    }
}

impl ReputationBackend for JsonBackend {
    fn load_feedback(&self) -> Result<Vec<FeedbackRecord>, StorageError> {
        Ok(self.feedback.try_load()?.unwrap_or_default())
    }

    fn save_feedback(&self, records: &[FeedbackRecord]) -> Result<(), StorageError> {
        Ok(self.feedback.save(records)?)
    }

    fn load_scores(&self) -> Result<Vec<CachedScore>, StorageError> {
        Ok(self.scores.try_load()?.unwrap_or_default())
    }

    fn save_scores(&self, scores: &[CachedScore]) -> Result<(), StorageError> {
        Ok(self.scores.save(scores)?)
    }
}
