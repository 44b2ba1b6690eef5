//! Composition root wiring every marketplace component together.

use std::sync::Arc;

use hire_core::Amount;
use hire_reputation::{
    AgentScore, JsonBackend, MemoryBackend, Outcome, Recommendation, ReputationBackend,
    ReputationService,
};
use tracing::info;

use crate::budget::BudgetTracker;
use crate::catalog::{AgentListing, Catalog};
use crate::config::MarketplaceConfig;
use crate::error::MarketError;
use crate::escrow::Escrow;
use crate::hiring::{CandidateSelector, HireRequest, HireResult, HireStatus, HiringManager, TaskExecutor};
use crate::ledger::Ledger;
use crate::verify::PaymentVerifier;

/// One buyer's marketplace: catalog, payments, hiring and reputation.
#[derive(Debug)]
pub struct Marketplace {
    config: MarketplaceConfig,
    ledger: Arc<Ledger>,
    reputation: ReputationService,
    hiring: HiringManager,
}

impl Marketplace {
    /// Builds a marketplace from `config`.
    ///
    /// Reputation tables live under `config.state_dir` when set, in memory
    /// otherwise.
    pub fn new(
        config: MarketplaceConfig,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self, MarketError> {
        let backend: Arc<dyn ReputationBackend> = match &config.state_dir {
            Some(dir) => Arc::new(JsonBackend::new(dir)),
            None => Arc::new(MemoryBackend::new()),
        };
        Self::with_backend(config, executor, backend)
    }

    /// Builds a marketplace persisting reputation through `backend`.
    pub fn with_backend(
        config: MarketplaceConfig,
        executor: Arc<dyn TaskExecutor>,
        backend: Arc<dyn ReputationBackend>,
    ) -> Result<Self, MarketError> {
        config.validate()?;

        let ledger = Arc::new(Ledger::new());
        let escrow = Arc::new(Escrow::new(ledger.clone()));
        let budget = Arc::new(BudgetTracker::new(config.total_budget));
        let catalog = Arc::new(Catalog::new());
        let reputation = ReputationService::new(&config.reputation, backend)?;

        let selector: Arc<dyn CandidateSelector> = reputation.optimizer().clone();
        let hiring = HiringManager::new(config.buyer_id.clone(), catalog, budget, escrow, executor)
            .with_config(config.hiring.clone())
            .with_selector(selector);

        info!(
            buyer_id = %config.buyer_id,
            total_budget = %config.total_budget,
            persistent = config.state_dir.is_some(),
            "marketplace ready"
        );
        Ok(Self {
            config,
            ledger,
            reputation,
            hiring,
        })
    }

    /// Replaces the payment verifier.
    #[must_use]
    pub fn with_verifier(self, verifier: Arc<dyn PaymentVerifier>) -> Self {
        Self {
            hiring: self.hiring.with_verifier(verifier),
            ..self
        }
    }

    /// Adds or replaces a listing.
    pub fn register_agent(&self, listing: AgentListing) -> Result<(), MarketError> {
        self.hiring.catalog().register(listing)
    }

    /// Hires one agent for `request`.
    pub fn hire(&self, request: &HireRequest) -> Result<HireResult, MarketError> {
        self.hiring.hire(request)
    }

    /// Hires one agent from loose arguments.
    pub fn hire_with<I, S>(
        &self,
        description: &str,
        required_skills: I,
        budget: Amount,
    ) -> Result<HireResult, MarketError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hiring.hire_with(description, required_skills, budget)
    }

    /// Records how a task went and returns the agent's refreshed score.
    pub fn submit_feedback(
        &self,
        task_id: &str,
        agent_id: &str,
        outcome: Outcome,
        quality_score: f64,
        latency_secs: f64,
        cost: f64,
    ) -> Result<AgentScore, MarketError> {
        Ok(self.reputation.submit_feedback(
            task_id,
            agent_id,
            outcome,
            quality_score,
            latency_secs,
            cost,
        )?)
    }

    /// Feeds a settled hire back into reputation. The outcome comes from its
    /// status; the cost is the agreed price if paid and zero if refunded.
    ///
    /// Hires that never reached escrow are rejected, since the agent never
    /// ran.
    pub fn submit_hire_feedback(
        &self,
        result: &HireResult,
        quality_score: f64,
        latency_secs: f64,
    ) -> Result<AgentScore, MarketError> {
        let agent_id = result
            .agent_id
            .as_deref()
            .filter(|_| result.escrow_id.is_some())
            .ok_or_else(|| {
                MarketError::Validation(format!("task {} never reached an agent", result.task_id))
            })?;
        let (outcome, cost) = match result.status {
            HireStatus::Completed => (Outcome::Success, result.agreed_price),
            _ => (Outcome::Failure, Amount::ZERO),
        };
        self.submit_feedback(
            &result.task_id,
            agent_id,
            outcome,
            quality_score,
            latency_secs,
            cost.as_f64(),
        )
    }

    /// Current reputation of an agent.
    pub fn get_agent_score(&self, agent_id: &str) -> AgentScore {
        self.reputation.get_agent_score(agent_id)
    }

    /// Every agent with feedback, best first.
    pub fn rank_agents(&self) -> Vec<AgentScore> {
        self.reputation.rank_agents()
    }

    /// Which of `candidates` to hire next.
    pub fn get_hiring_recommendation(
        &self,
        candidates: &[String],
        skill: Option<&str>,
        budget: Option<f64>,
    ) -> Option<Recommendation> {
        self.reputation
            .get_hiring_recommendation(candidates, skill, budget)
    }

    /// The catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        self.hiring.catalog()
    }

    /// The ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// The escrow book.
    pub fn escrow(&self) -> &Arc<Escrow> {
        self.hiring.escrow()
    }

    /// The global budget.
    pub fn budget(&self) -> &Arc<BudgetTracker> {
        self.hiring.budget()
    }

    /// The hiring manager.
    pub fn hiring(&self) -> &HiringManager {
        &self.hiring
    }

    /// The reputation service.
    pub fn reputation(&self) -> &ReputationService {
        &self.reputation
    }

    /// Active configuration.
    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }
}
