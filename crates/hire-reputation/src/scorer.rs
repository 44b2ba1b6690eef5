//! Recency-weighted reputation scoring.
//!
//! Records are weighted by their position in the agent's history, most
//! recent first: position `i` carries weight `0.5^(i / half_life)`. The
//! composite blends four components:
//!
//! | component         | weight |
//! |-------------------|--------|
//! | success rate      | 0.40   |
//! | average quality   | 0.30   |
//! | reliability       | 0.20   |
//! | cost efficiency   | 0.10   |
//!
//! Agents without history get the neutral prior (`0.5`, zero confidence) so
//! new entrants are treated as average rather than bad.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ReputationError;
use crate::feedback::{FeedbackRecord, FeedbackStore};
use crate::storage::{CachedScore, ReputationBackend};

/// History positions after which a record's influence halves.
pub const HALF_LIFE: f64 = 10.0;

/// Weight of the success rate in the composite.
pub const SUCCESS_WEIGHT: f64 = 0.40;
/// Weight of the average quality in the composite.
pub const QUALITY_WEIGHT: f64 = 0.30;
/// Weight of reliability in the composite.
pub const RELIABILITY_WEIGHT: f64 = 0.20;
/// Weight of cost efficiency in the composite.
pub const COST_EFFICIENCY_WEIGHT: f64 = 0.10;

/// Score given to every component when there is not enough data.
pub const NEUTRAL: f64 = 0.5;

/// Quality-per-cost ratio that earns full cost efficiency.
const MAX_QUALITY_PER_COST: f64 = 10.0;

/// Task count at which confidence reaches `1 - 1/e`.
const CONFIDENCE_SCALE: f64 = 5.0;

/// Derived reputation of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    /// Agent the score describes.
    pub agent_id: String,
    /// Weighted blend of the four components, in `[0, 1]`.
    pub composite_score: f64,
    /// Decay-weighted outcome credit.
    pub success_rate: f64,
    /// Decay-weighted quality.
    pub avg_quality: f64,
    /// `1 - 2·stddev(quality)`, floored at zero.
    pub reliability: f64,
    /// Decay-weighted, capped quality per unit of cost.
    pub cost_efficiency: f64,
    /// Number of feedback records behind the score.
    pub task_count: usize,
    /// `1 - e^(-n/5)`.
    pub confidence: f64,
}

impl AgentScore {
    /// The prior for an agent with no history.
    pub fn neutral(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            composite_score: NEUTRAL,
            success_rate: NEUTRAL,
            avg_quality: NEUTRAL,
            reliability: NEUTRAL,
            cost_efficiency: NEUTRAL,
            task_count: 0,
            confidence: 0.0,
        }
    }
}

/// Weight of the record at `position` (0 = most recent).
#[must_use]
pub fn decay_weight(position: usize, half_life: f64) -> f64 {
    0.5_f64.powf(position as f64 / half_life)
}

fn record_cost_efficiency(record: &FeedbackRecord) -> f64 {
    if record.cost == 0.0 {
        return 1.0;
    }
    (record.quality_score / record.cost).min(MAX_QUALITY_PER_COST) / MAX_QUALITY_PER_COST
}

fn reliability(history: &[FeedbackRecord]) -> f64 {
    if history.len() < 2 {
        return NEUTRAL;
    }
    let n = history.len() as f64;
    let mean = history.iter().map(|r| r.quality_score).sum::<f64>() / n;
    let variance = history
        .iter()
        .map(|r| (r.quality_score - mean).powi(2))
        .sum::<f64>()
        / n;
    (1.0 - 2.0 * variance.sqrt()).max(0.0)
}

/// Scores a history ordered most recent first.
pub fn score_history(agent_id: &str, history: &[FeedbackRecord], half_life: f64) -> AgentScore {
    if history.is_empty() {
        return AgentScore::neutral(agent_id);
    }

    let mut total_weight = 0.0;
    let mut success = 0.0;
    let mut quality = 0.0;
    let mut efficiency = 0.0;
    for (position, record) in history.iter().enumerate() {
        let w = decay_weight(position, half_life);
        total_weight += w;
        success += w * record.outcome.credit();
        quality += w * record.quality_score;
        efficiency += w * record_cost_efficiency(record);
    }

    let success_rate = success / total_weight;
    let avg_quality = quality / total_weight;
    let cost_efficiency = efficiency / total_weight;
    let reliability = reliability(history);

    let composite_score = SUCCESS_WEIGHT * success_rate
        + QUALITY_WEIGHT * avg_quality
        + RELIABILITY_WEIGHT * reliability
        + COST_EFFICIENCY_WEIGHT * cost_efficiency;

    let task_count = history.len();
    AgentScore {
        agent_id: agent_id.to_string(),
        composite_score,
        success_rate,
        avg_quality,
        reliability,
        cost_efficiency,
        task_count,
        confidence: 1.0 - (-(task_count as f64) / CONFIDENCE_SCALE).exp(),
    }
}

/// Computes scores from a [`FeedbackStore`] and keeps the `agent_scores`
/// cache current.
pub struct Scorer {
    feedback: Arc<FeedbackStore>,
    backend: Arc<dyn ReputationBackend>,
    cache: RwLock<HashMap<String, CachedScore>>,
    writer: Mutex<()>,
    half_life: f64,
}

impl Scorer {
    /// Creates a scorer, loading any previously cached scores.
    pub fn new(feedback: Arc<FeedbackStore>, backend: Arc<dyn ReputationBackend>) -> Self {
        let cache = match backend.load_scores() {
            Ok(rows) => rows
                .into_iter()
                .map(|row| (row.score.agent_id.clone(), row))
                .collect(),
            Err(e) => {
                warn!(error = %e, "failed to load score cache, starting empty");
                HashMap::new()
            }
        };
        Self {
            feedback,
            backend,
            cache: RwLock::new(cache),
            writer: Mutex::new(()),
            half_life: HALF_LIFE,
        }
    }

    /// Overrides the decay half-life.
    #[must_use]
    pub fn with_half_life(mut self, half_life: f64) -> Self {
        self.half_life = half_life;
        self
    }

    /// Returns the feedback store this scorer reads.
    pub fn feedback(&self) -> &Arc<FeedbackStore> {
        &self.feedback
    }

    /// Computes an agent's score from a snapshot of its history and
    /// refreshes the cache.
    pub fn compute_score(&self, agent_id: &str) -> AgentScore {
        let history = self.feedback.for_agent(agent_id);
        let score = score_history(agent_id, &history, self.half_life);
        debug!(
            agent_id,
            composite = score.composite_score,
            tasks = score.task_count,
            "computed agent score"
        );
        self.store(std::slice::from_ref(&score));
        score
    }

    /// Scores every agent with feedback, best first.
    pub fn rank_agents(&self) -> Vec<AgentScore> {
        let mut scores: Vec<AgentScore> = self
            .feedback
            .agent_ids()
            .iter()
            .map(|agent_id| {
                let history = self.feedback.for_agent(agent_id);
                score_history(agent_id, &history, self.half_life)
            })
            .collect();
        self.store(&scores);
        scores.sort_by(|a, b| {
            b.composite_score
                .total_cmp(&a.composite_score)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        scores
    }

    /// Last computed score for an agent, if any.
    pub fn cached(&self, agent_id: &str) -> Option<CachedScore> {
        self.cache.read().get(agent_id).cloned()
    }

    fn store(&self, scores: &[AgentScore]) {
        if scores.is_empty() {
            return;
        }
        let now = Utc::now();
        let _writer = self.writer.lock();
        let rows = {
            let mut cache = self.cache.write();
            for score in scores {
                cache.insert(
                    score.agent_id.clone(),
                    CachedScore {
                        score: score.clone(),
                        updated_at: now,
                    },
                );
            }
            Self::rows_of(&cache)
        };
        if let Err(e) = self.backend.save_scores(&rows) {
            warn!(error = %e, "failed to persist agent scores");
        }
    }

    /// Writes the score cache to the backend, surfacing any failure.
    pub fn flush(&self) -> Result<(), ReputationError> {
        let _writer = self.writer.lock();
        let rows = Self::rows_of(&self.cache.read());
        self.backend.save_scores(&rows)?;
        Ok(())
    }

    fn rows_of(cache: &HashMap<String, CachedScore>) -> Vec<CachedScore> {
        let mut rows: Vec<CachedScore> = cache.values().cloned().collect();
        rows.sort_by(|a, b| a.score.agent_id.cmp(&b.score.agent_id));
        rows
    }
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scorer")
            .field("half_life", &self.half_life)
            .field("cached", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}
