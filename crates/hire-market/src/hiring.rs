//! The hire state machine.
//!
//! A hire moves through `received -> matched -> budget_checked -> escrowed
//! -> settled`. Admission failures (no skill match, price over the request
//! budget, global budget exhausted) stop early without touching escrow or the
//! ledger. Once funds are held, the task runs and the escrow is either
//! released or refunded. Every accepted request yields exactly one
//! [`HireResult`], appended to the manager's history.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hire_core::Amount;
use hire_reputation::Optimizer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::BudgetTracker;
use crate::catalog::{AgentListing, Catalog};
use crate::config::HiringConfig;
use crate::error::{ExecutionError, MarketError};
use crate::escrow::{Escrow, EscrowId};
use crate::ledger::{LedgerEvent, LedgerEventType};
use crate::matcher::{AgentMatch, MatchQuery};
use crate::verify::{AcceptAllVerifier, PaymentRequest, PaymentVerifier};

/// `agent_name` reported when nobody was hired.
pub const NO_AGENT: &str = "none";

/// What an agent produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Whether the agent reports success.
    pub success: bool,
    /// Opaque output, passed through untouched.
    pub output: String,
}

impl TaskOutput {
    /// A successful output.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    /// An unsuccessful output.
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Runs a task on an agent.
pub trait TaskExecutor: Send + Sync {
    /// Executes `description` on `agent_id`, blocking until it settles.
    fn execute(&self, agent_id: &str, description: &str) -> Result<TaskOutput, ExecutionError>;
}

impl<F> TaskExecutor for F
where
    F: Fn(&str, &str) -> Result<TaskOutput, ExecutionError> + Send + Sync,
{
    fn execute(&self, agent_id: &str, description: &str) -> Result<TaskOutput, ExecutionError> {
        self(agent_id, description)
    }
}

/// Completes every task immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantExecutor;

impl TaskExecutor for InstantExecutor {
    fn execute(&self, agent_id: &str, description: &str) -> Result<TaskOutput, ExecutionError> {
        Ok(TaskOutput::success(format!("{agent_id} completed: {description}")))
    }
}

/// Picks one of several affordable candidates.
pub trait CandidateSelector: Send + Sync {
    /// `candidates` arrive best match first. Returning `None` or an id not in
    /// `candidates` falls back to the best match.
    fn select(&self, candidates: &[String], skill: Option<&str>, budget: Amount) -> Option<String>;
}

impl CandidateSelector for Optimizer {
    fn select(&self, candidates: &[String], skill: Option<&str>, budget: Amount) -> Option<String> {
        self.recommend_agent(candidates, skill, Some(budget.as_f64()))
            .map(|rec| {
                debug!(
                    agent_id = %rec.agent_id,
                    explored = rec.was_exploration,
                    reason = %rec.reason,
                    "optimizer recommendation"
                );
                rec.agent_id
            })
    }
}

/// Last stage a hire reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HireStage {
    /// Request accepted.
    Received,
    /// At least one agent covers the skills.
    Matched,
    /// Budget reserved for the chosen agent.
    BudgetChecked,
    /// Funds held in escrow.
    Escrowed,
    /// Escrow released or refunded.
    Settled,
}

impl fmt::Display for HireStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Matched => write!(f, "matched"),
            Self::BudgetChecked => write!(f, "budget_checked"),
            Self::Escrowed => write!(f, "escrowed"),
            Self::Settled => write!(f, "settled"),
        }
    }
}

/// Terminal outcome of a hire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HireStatus {
    /// Task ran and payment was released.
    Completed,
    /// Matching agents exist but none fits the request or global budget.
    BudgetExceeded,
    /// No agent covers the required skills.
    NoSuitableAgents,
    /// Payment was refused or the task failed; funds were refunded.
    Failed,
}

impl fmt::Display for HireStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::BudgetExceeded => write!(f, "budget_exceeded"),
            Self::NoSuitableAgents => write!(f, "no_suitable_agents"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A request to hire one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HireRequest {
    /// What the agent should do.
    pub description: String,
    /// Skills the agent must cover. Empty matches every agent.
    pub required_skills: Vec<String>,
    /// Most this request may pay.
    pub budget: Amount,
}

impl HireRequest {
    /// Creates a request.
    pub fn new<I, S>(description: impl Into<String>, required_skills: I, budget: Amount) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            description: description.into(),
            required_skills: required_skills.into_iter().map(Into::into).collect(),
            budget,
        }
    }

    /// Rejects a zero budget or an empty description.
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.budget.is_zero() {
            return Err(MarketError::Validation("budget must be positive".into()));
        }
        if self.description.trim().is_empty() {
            return Err(MarketError::Validation("description is empty".into()));
        }
        Ok(())
    }
}

/// Outcome of one hire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HireResult {
    /// Id assigned to the task.
    pub task_id: String,
    /// Terminal outcome.
    pub status: HireStatus,
    /// Hired agent.
    pub agent_id: Option<String>,
    /// Hired agent's display name, [`NO_AGENT`] if nobody was hired.
    pub agent_name: String,
    /// Price agreed with the agent, zero if nobody was hired.
    pub agreed_price: Amount,
    /// Wall time spent in `hire`.
    pub elapsed: Duration,
    /// Global budget left after this hire settled.
    pub budget_remaining: Amount,
    /// Escrow holding the payment, if one was created.
    pub escrow_id: Option<EscrowId>,
    /// Why the hire did not complete.
    pub error: Option<String>,
    /// Last stage reached.
    pub stage: HireStage,
    /// What the agent returned, if it ran.
    pub output: Option<String>,
}

impl HireResult {
    fn received(task_id: String) -> Self {
        Self {
            task_id,
            status: HireStatus::NoSuitableAgents,
            agent_id: None,
            agent_name: NO_AGENT.to_string(),
            agreed_price: Amount::ZERO,
            elapsed: Duration::ZERO,
            budget_remaining: Amount::ZERO,
            escrow_id: None,
            error: None,
            stage: HireStage::Received,
            output: None,
        }
    }

    fn hired(&mut self, listing: &AgentListing) {
        self.agent_id = Some(listing.agent_id.clone());
        self.agent_name = listing.name.clone();
        self.agreed_price = listing.price_per_unit;
    }

    fn fail(&mut self, status: HireStatus, error: impl Into<String>) {
        self.status = status;
        self.error = Some(error.into());
    }
}

/// Runs hires against shared catalog, budget and escrow state.
pub struct HiringManager {
    config: HiringConfig,
    buyer_id: String,
    catalog: Arc<Catalog>,
    budget: Arc<BudgetTracker>,
    escrow: Arc<Escrow>,
    verifier: Arc<dyn PaymentVerifier>,
    executor: Arc<dyn TaskExecutor>,
    selector: Option<Arc<dyn CandidateSelector>>,
    history: Mutex<Vec<HireResult>>,
}

impl HiringManager {
    /// Creates a manager with default config, no selector and a verifier
    /// that accepts everything.
    pub fn new(
        buyer_id: impl Into<String>,
        catalog: Arc<Catalog>,
        budget: Arc<BudgetTracker>,
        escrow: Arc<Escrow>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            config: HiringConfig::default(),
            buyer_id: buyer_id.into(),
            catalog,
            budget,
            escrow,
            verifier: Arc::new(AcceptAllVerifier),
            executor,
            selector: None,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the hiring config.
    #[must_use]
    pub fn with_config(mut self, config: HiringConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the payment verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn PaymentVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Delegates candidate selection, used when `use_optimizer` is set.
    #[must_use]
    pub fn with_selector(mut self, selector: Arc<dyn CandidateSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Convenience wrapper around [`hire`](Self::hire).
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
        self.hire(&HireRequest::new(description, required_skills, budget))
    }

    /// Runs one hire to completion.
    ///
    /// Returns `Err` only for a malformed request, in which case nothing is
    /// mutated. Every business outcome is reported through
    /// [`HireResult::status`].
    pub fn hire(&self, request: &HireRequest) -> Result<HireResult, MarketError> {
        request.validate()?;
        let started = Instant::now();
        let mut result = HireResult::received(format!("task-{}", Uuid::new_v4()));
        debug!(task_id = %result.task_id, skills = ?request.required_skills, "hire received");

        self.run(request, &mut result);

        result.elapsed = started.elapsed();
        result.budget_remaining = self.budget.remaining();
        info!(
            task_id = %result.task_id,
            status = %result.status,
            stage = %result.stage,
            agent = %result.agent_name,
            price = %result.agreed_price,
            remaining = %result.budget_remaining,
            "hire finished"
        );
        self.history.lock().push(result.clone());
        Ok(result)
    }

    fn run(&self, request: &HireRequest, result: &mut HireResult) {
        let matches = self.catalog.find_matches(
            &MatchQuery::new(request.required_skills.iter().cloned())
                .with_min_rating(self.config.min_rating)
                .with_top_n(usize::MAX),
        );
        if matches.is_empty() {
            result.fail(
                HireStatus::NoSuitableAgents,
                format!("no agent covers {:?}", request.required_skills),
            );
            return;
        }
        result.stage = HireStage::Matched;

        let affordable: Vec<AgentMatch> = matches
            .iter()
            .filter(|m| m.listing.price_per_unit <= request.budget)
            .take(self.config.candidate_pool)
            .cloned()
            .collect();
        if affordable.is_empty() {
            let cheapest = matches
                .iter()
                .map(|m| m.listing.price_per_unit)
                .min()
                .unwrap_or(Amount::ZERO);
            result.fail(
                HireStatus::BudgetExceeded,
                format!("cheapest match costs {cheapest}, request budget is {}", request.budget),
            );
            return;
        }

        let listing = self.select(&affordable, request);
        debug!(task_id = %result.task_id, agent_id = %listing.agent_id, "candidate selected");

        if !self.budget.reserve(listing.price_per_unit) {
            result.fail(
                HireStatus::BudgetExceeded,
                format!(
                    "{} costs {}, remaining global budget is {}",
                    listing.agent_id,
                    listing.price_per_unit,
                    self.budget.remaining()
                ),
            );
            return;
        }
        result.hired(&listing);
        result.stage = HireStage::BudgetChecked;

        if let Err(err) = self.authorize_payment(&result.task_id, &listing) {
            self.budget.release(listing.price_per_unit);
            warn!(task_id = %result.task_id, %err, "payment refused");
            result.fail(HireStatus::Failed, err.to_string());
            return;
        }

        let entry = self.escrow.hold(
            &self.buyer_id,
            &listing.agent_id,
            listing.price_per_unit,
            &result.task_id,
        );
        result.escrow_id = Some(entry.escrow_id.clone());
        result.stage = HireStage::Escrowed;

        let outcome = self.executor.execute(&listing.agent_id, &request.description);
        result.stage = HireStage::Settled;
        match outcome {
            Ok(output) if output.success => {
                self.escrow.release(&entry.escrow_id);
                self.note_completion(&listing.agent_id, true, listing.price_per_unit);
                result.status = HireStatus::Completed;
                result.output = Some(output.output);
            }
            Ok(output) => {
                self.settle_failure(&entry.escrow_id, &listing);
                result.fail(HireStatus::Failed, "agent reported failure");
                result.output = Some(output.output);
            }
            Err(err) => {
                self.settle_failure(&entry.escrow_id, &listing);
                result.fail(HireStatus::Failed, err.to_string());
            }
        }
    }

    fn select(&self, affordable: &[AgentMatch], request: &HireRequest) -> AgentListing {
        let best = &affordable[0].listing;
        let Some(selector) = self.selector.as_ref().filter(|_| self.config.use_optimizer) else {
            return best.clone();
        };

        let ids: Vec<String> = affordable
            .iter()
            .map(|m| m.listing.agent_id.clone())
            .collect();
        let skill = request.required_skills.first().map(String::as_str);
        selector
            .select(&ids, skill, request.budget)
            .and_then(|id| affordable.iter().find(|m| m.listing.agent_id == id))
            .map_or_else(|| best.clone(), |m| m.listing.clone())
    }

    fn authorize_payment(&self, task_id: &str, listing: &AgentListing) -> Result<(), MarketError> {
        let ledger = self.escrow.ledger();
        let event = |event_type| {
            LedgerEvent::new(
                event_type,
                self.buyer_id.as_str(),
                listing.agent_id.as_str(),
                listing.price_per_unit,
            )
            .with_task(task_id)
        };

        ledger.record(event(LedgerEventType::PaymentRequested));
        let verdict = self.verifier.verify(&PaymentRequest {
            task_id: task_id.to_string(),
            payer: self.buyer_id.clone(),
            payee: listing.agent_id.clone(),
            amount: listing.price_per_unit,
        });
        match &verdict {
            Ok(()) => ledger.record(event(LedgerEventType::PaymentVerified)),
            Err(err) => ledger.record(
                event(LedgerEventType::PaymentRejected).with_metadata("reason", err.to_string()),
            ),
        };
        verdict
    }

    fn settle_failure(&self, escrow_id: &EscrowId, listing: &AgentListing) {
        if self.escrow.refund(escrow_id).is_some() {
            self.budget.release(listing.price_per_unit);
        }
        self.note_completion(&listing.agent_id, false, Amount::ZERO);
    }

    fn note_completion(&self, agent_id: &str, success: bool, earnings: Amount) {
        if let Err(err) = self.catalog.record_job_completion(agent_id, success, earnings) {
            warn!(agent_id, %err, "could not update listing counters");
        }
    }

    /// Every result so far, oldest first.
    pub fn history(&self) -> Vec<HireResult> {
        self.history.lock().clone()
    }

    /// Sum of agreed prices over completed hires.
    pub fn total_spent(&self) -> Amount {
        self.history
            .lock()
            .iter()
            .filter(|r| r.status == HireStatus::Completed)
            .map(|r| r.agreed_price)
            .sum()
    }

    /// Shared catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Shared budget.
    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    /// Shared escrow book.
    pub fn escrow(&self) -> &Arc<Escrow> {
        &self.escrow
    }
}

impl fmt::Debug for HiringManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HiringManager")
            .field("buyer_id", &self.buyer_id)
            .field("config", &self.config)
            .field("has_selector", &self.selector.is_some())
            .field("hires", &self.history.lock().len())
            .finish_non_exhaustive()
    }
}
