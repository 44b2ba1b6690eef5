//! Feedback ingestion and reputation queries behind one handle.

use std::sync::Arc;

use tracing::info;

use crate::config::ReputationConfig;
use crate::error::ReputationError;
use crate::feedback::{FeedbackRecord, FeedbackStore, Outcome, Upsert};
use crate::optimizer::{Optimizer, Recommendation};
use crate::scorer::{AgentScore, Scorer};
use crate::storage::{MemoryBackend, ReputationBackend};

/// Owns the feedback store, scorer and optimizer for one marketplace.
#[derive(Debug, Clone)]
pub struct ReputationService {
    feedback: Arc<FeedbackStore>,
    scorer: Arc<Scorer>,
    optimizer: Arc<Optimizer>,
}

impl ReputationService {
    /// Wires the reputation components over `backend`.
    pub fn new(
        config: &ReputationConfig,
        backend: Arc<dyn ReputationBackend>,
    ) -> Result<Self, ReputationError> {
        config.validate()?;
        let feedback = Arc::new(FeedbackStore::with_backend(backend.clone()));
        let scorer =
            Arc::new(Scorer::new(feedback.clone(), backend).with_half_life(config.half_life));
        let optimizer = Arc::new(Optimizer::from_config(scorer.clone(), config)?);
        Ok(Self {
            feedback,
            scorer,
            optimizer,
        })
    }

    /// Wires the reputation components with nothing persisted to disk.
    pub fn in_memory(config: &ReputationConfig) -> Result<Self, ReputationError> {
        Self::new(config, Arc::new(MemoryBackend::new()))
    }

    /// Records the outcome of a settled task and returns the agent's
    /// refreshed score.
    pub fn submit_feedback(
        &self,
        task_id: &str,
        agent_id: &str,
        outcome: Outcome,
        quality_score: f64,
        latency_secs: f64,
        cost: f64,
    ) -> Result<AgentScore, ReputationError> {
        self.record_feedback(FeedbackRecord::new(
            task_id,
            agent_id,
            outcome,
            quality_score,
            latency_secs,
            cost,
        ))
    }

    /// Records a prepared feedback record and returns the agent's refreshed
    /// score.
    pub fn record_feedback(&self, record: FeedbackRecord) -> Result<AgentScore, ReputationError> {
        let agent_id = record.agent_id.clone();
        let task_id = record.task_id.clone();
        let outcome = record.outcome;
        let upsert = self.feedback.record(record)?;
        let score = self.scorer.compute_score(&agent_id);
        info!(
            %agent_id,
            %task_id,
            %outcome,
            replaced = upsert == Upsert::Replaced,
            composite = score.composite_score,
            "feedback recorded"
        );
        Ok(score)
    }

    /// Current score for an agent.
    pub fn get_agent_score(&self, agent_id: &str) -> AgentScore {
        self.scorer.compute_score(agent_id)
    }

    /// Every agent with feedback, best first.
    pub fn rank_agents(&self) -> Vec<AgentScore> {
        self.scorer.rank_agents()
    }

    /// Which of `candidates` to hire next.
    pub fn get_hiring_recommendation(
        &self,
        candidates: &[String],
        skill: Option<&str>,
        budget: Option<f64>,
    ) -> Option<Recommendation> {
        self.optimizer.recommend_agent(candidates, skill, budget)
    }

    /// Writes both tables to the backend.
    ///
    /// Routine writes swallow storage failures; this is the call that
    /// reports them.
    pub fn flush(&self) -> Result<(), ReputationError> {
        self.feedback.flush()?;
        self.scorer.flush()
    }

    /// The feedback table.
    pub fn feedback(&self) -> &Arc<FeedbackStore> {
        &self.feedback
    }

    /// The scorer.
    pub fn scorer(&self) -> &Arc<Scorer> {
        &self.scorer
    }

    /// The hiring policy.
    pub fn optimizer(&self) -> &Arc<Optimizer> {
        &self.optimizer
    }
}
