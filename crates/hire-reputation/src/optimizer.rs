//! Explore/exploit hiring policy.
//!
//! Most of the time the optimizer exploits: it picks the candidate with the
//! best composite score. With probability `exploration_rate` it explores
//! with Thompson sampling instead, drawing from each candidate's
//! `Beta(1 + s·n, 1 + (1 - s)·n)` belief and picking the highest draw.
//! Candidates with little history have wide beliefs and so still get hired
//! now and then.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ReputationConfig, DEFAULT_EXPLORATION_RATE};
use crate::error::ReputationError;
use crate::scorer::{AgentScore, Scorer};

/// z-value for a two-sided 95% normal interval.
const Z_95: f64 = 1.96;

/// Approximate 95% band around a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound, at least 0.
    pub lower: f64,
    /// Upper bound, at most 1.
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Maximal interval for agents with no history.
    pub const UNKNOWN: Self = Self {
        lower: 0.0,
        upper: 1.0,
    };

    /// `score ± 1.96·0.5/√n`, clamped to `[0, 1]`.
    #[must_use]
    pub fn around(score: f64, task_count: usize) -> Self {
        if task_count == 0 {
            return Self::UNKNOWN;
        }
        let half_width = Z_95 * 0.5 / (task_count as f64).sqrt();
        Self {
            lower: (score - half_width).clamp(0.0, 1.0),
            upper: (score + half_width).clamp(0.0, 1.0),
        }
    }

    /// Width of the band.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// The optimizer's pick among a set of candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Recommended agent.
    pub agent_id: String,
    /// That agent's current score.
    pub score: AgentScore,
    /// Uncertainty around the composite.
    pub confidence_interval: ConfidenceInterval,
    /// True if picked by Thompson sampling rather than by best score.
    pub was_exploration: bool,
    /// Human-readable explanation.
    pub reason: String,
    /// Remaining eligible candidates, best composite first.
    pub alternatives: Vec<String>,
}

/// Chooses whom to hire from reputation data.
pub struct Optimizer {
    scorer: Arc<Scorer>,
    exploration_rate: f64,
    rng: Mutex<StdRng>,
}

impl Optimizer {
    /// Creates an optimizer with the default exploration rate, seeded from
    /// entropy.
    pub fn new(scorer: Arc<Scorer>) -> Self {
        Self {
            scorer,
            exploration_rate: DEFAULT_EXPLORATION_RATE,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates an optimizer from configuration.
    pub fn from_config(
        scorer: Arc<Scorer>,
        config: &ReputationConfig,
    ) -> Result<Self, ReputationError> {
        config.validate()?;
        let optimizer = Self::new(scorer).with_exploration_rate(config.exploration_rate)?;
        Ok(match config.seed {
            Some(seed) => optimizer.with_seed(seed),
            None => optimizer,
        })
    }

    /// Sets the exploration probability.
    pub fn with_exploration_rate(mut self, rate: f64) -> Result<Self, ReputationError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(ReputationError::InvalidConfig(format!(
                "exploration_rate must be within [0, 1], got {rate}"
            )));
        }
        self.exploration_rate = rate;
        Ok(self)
    }

    /// Makes the random source reproducible.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Probability of an exploration step.
    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    /// Picks one candidate, returning `(agent_id, was_exploration)`.
    pub fn explore_exploit(&self, candidates: &[String]) -> Option<(String, bool)> {
        let scores = self.score_all(candidates);
        self.choose(&scores)
            .map(|(index, explored)| (scores[index].agent_id.clone(), explored))
    }

    /// Recommends a candidate, skipping any whose mean observed cost exceeds
    /// `budget`. Candidates without cost history are never filtered. If the
    /// filter would drop everyone, all candidates stay eligible.
    pub fn recommend_agent(
        &self,
        candidates: &[String],
        skill: Option<&str>,
        budget: Option<f64>,
    ) -> Option<Recommendation> {
        let feedback = self.scorer.feedback();
        let mut eligible: Vec<String> = candidates
            .iter()
            .filter(|id| match (budget, feedback.mean_cost(id)) {
                (Some(limit), Some(mean)) => mean <= limit,
                _ => true,
            })
            .cloned()
            .collect();
        if eligible.is_empty() {
            debug!(
                candidates = candidates.len(),
                "every candidate over budget, ignoring cost filter"
            );
            eligible = candidates.to_vec();
        } else if eligible.len() < candidates.len() {
            debug!(
                dropped = candidates.len() - eligible.len(),
                "candidates filtered by mean cost"
            );
        }

        let scores = self.score_all(&eligible);
        let (index, was_exploration) = self.choose(&scores)?;
        let chosen = scores[index].clone();

        let mut others: Vec<&AgentScore> = scores
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != index)
            .map(|(_, s)| s)
            .collect();
        others.sort_by(|a, b| exploit_order(a, b));

        let mut reason = if was_exploration {
            format!(
                "exploring {} via Thompson sampling ({} prior tasks)",
                chosen.agent_id, chosen.task_count
            )
        } else {
            format!(
                "highest composite score {:.3} among {} candidates",
                chosen.composite_score,
                scores.len()
            )
        };
        if let Some(skill) = skill {
            reason.push_str(&format!(" for skill '{skill}'"));
        }

        Some(Recommendation {
            agent_id: chosen.agent_id.clone(),
            confidence_interval: ConfidenceInterval::around(
                chosen.composite_score,
                chosen.task_count,
            ),
            was_exploration,
            reason,
            alternatives: others.into_iter().map(|s| s.agent_id.clone()).collect(),
            score: chosen,
        })
    }

    fn score_all(&self, candidates: &[String]) -> Vec<AgentScore> {
        candidates
            .iter()
            .map(|id| self.scorer.compute_score(id))
            .collect()
    }

    fn choose(&self, scores: &[AgentScore]) -> Option<(usize, bool)> {
        if scores.is_empty() {
            return None;
        }
        // All beliefs are uniform without history; keep the caller's order.
        let has_history = scores.iter().any(|s| s.task_count > 0);
        let mut rng = self.rng.lock();
        if has_history && rng.gen_bool(self.exploration_rate) {
            let mut best: Option<(usize, f64)> = None;
            for (i, score) in scores.iter().enumerate() {
                let draw = thompson_draw(&mut *rng, score);
                if best.is_none_or(|(_, top)| draw > top) {
                    best = Some((i, draw));
                }
            }
            best.map(|(i, _)| (i, true))
        } else {
            scores
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| exploit_order(a, b))
                .map(|(i, _)| (i, false))
        }
    }
}

/// Best composite first, then more confident. Full ties keep the caller's
/// candidate order.
fn exploit_order(a: &AgentScore, b: &AgentScore) -> std::cmp::Ordering {
    b.composite_score
        .total_cmp(&a.composite_score)
        .then_with(|| b.confidence.total_cmp(&a.confidence))
}

fn thompson_draw<R: Rng + ?Sized>(rng: &mut R, score: &AgentScore) -> f64 {
    let n = score.task_count as f64;
    let alpha = 1.0 + score.success_rate * n;
    let beta = 1.0 + (1.0 - score.success_rate) * n;
    match Beta::new(alpha, beta) {
        Ok(dist) => dist.sample(rng),
        Err(_) => score.success_rate,
    }
}

impl fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("exploration_rate", &self.exploration_rate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackRecord, FeedbackStore, Outcome};
    use crate::storage::{MemoryBackend, ReputationBackend};
    use std::collections::HashSet;

    fn setup() -> (Arc<FeedbackStore>, Arc<Scorer>) {
        let backend: Arc<dyn ReputationBackend> = Arc::new(MemoryBackend::new());
        let store = Arc::new(FeedbackStore::with_backend(backend.clone()));
        let scorer = Arc::new(Scorer::new(store.clone(), backend));
        (store, scorer)
    }

    fn seed_history(store: &FeedbackStore, agent: &str, outcome: Outcome, quality: f64, cost: f64, n: usize) {
        for i in 0..n {
            store
                .record(FeedbackRecord::new(format!("{agent}-t{i}"), agent, outcome, quality, 1.0, cost))
                .unwrap();
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn empty_candidates_yield_nothing() {
        let (_, scorer) = setup();
        let optimizer = Optimizer::new(scorer);
        assert!(optimizer.explore_exploit(&[]).is_none());
        assert!(optimizer.recommend_agent(&[], None, None).is_none());
    }

    #[test]
    fn exploitation_picks_best_composite() {
        let (store, scorer) = setup();
        seed_history(&store, "strong", Outcome::Success, 0.9, 0.1, 5);
        seed_history(&store, "weak", Outcome::Failure, 0.2, 0.1, 5);

        let optimizer = Optimizer::new(scorer).with_exploration_rate(0.0).unwrap();
        for _ in 0..20 {
            let (agent, explored) = optimizer.explore_exploit(&ids(&["weak", "strong"])).unwrap();
            assert_eq!(agent, "strong");
            assert!(!explored);
        }
    }

    #[test]
    fn unknown_agents_tie_in_candidate_order() {
        let (_, scorer) = setup();
        let optimizer = Optimizer::new(scorer).with_exploration_rate(0.0).unwrap();
        let (agent, _) = optimizer.explore_exploit(&ids(&["zeta", "alpha"])).unwrap();
        assert_eq!(agent, "zeta");
    }

    #[test]
    fn thompson_sampling_reaches_every_candidate() {
        let (store, scorer) = setup();
        seed_history(&store, "veteran", Outcome::Success, 0.8, 0.1, 3);
        seed_history(&store, "shaky", Outcome::Partial, 0.5, 0.1, 1);

        let optimizer = Optimizer::new(scorer)
            .with_exploration_rate(1.0)
            .unwrap()
            .with_seed(7);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let (agent, explored) = optimizer.explore_exploit(&ids(&["veteran", "shaky"])).unwrap();
            assert!(explored);
            seen.insert(agent);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn budget_filters_expensive_agents_but_not_unknown_ones() {
        let (store, scorer) = setup();
        seed_history(&store, "pricey", Outcome::Success, 0.95, 2.0, 5);
        seed_history(&store, "cheap", Outcome::Partial, 0.5, 0.1, 5);

        let optimizer = Optimizer::new(scorer).with_exploration_rate(0.0).unwrap();

        let rec = optimizer
            .recommend_agent(&ids(&["pricey", "cheap"]), Some("design"), Some(1.0))
            .unwrap();
        assert_eq!(rec.agent_id, "cheap");
        assert!(rec.reason.contains("design"));

        // "newcomer" has no cost data, so it passes the filter.
        let rec = optimizer
            .recommend_agent(&ids(&["pricey", "newcomer"]), None, Some(1.0))
            .unwrap();
        assert_eq!(rec.agent_id, "newcomer");
        assert_eq!(rec.confidence_interval, ConfidenceInterval::UNKNOWN);
    }

    #[test]
    fn everything_filtered_falls_back_to_all_candidates() {
        let (store, scorer) = setup();
        seed_history(&store, "pricey", Outcome::Success, 0.95, 2.0, 3);
        seed_history(&store, "dearer", Outcome::Partial, 0.5, 3.0, 3);
        let optimizer = Optimizer::new(scorer).with_exploration_rate(0.0).unwrap();

        let rec = optimizer
            .recommend_agent(&ids(&["dearer", "pricey"]), None, Some(0.5))
            .unwrap();
        assert_eq!(rec.agent_id, "pricey");
        assert_eq!(rec.alternatives, vec!["dearer"]);
    }

    #[test]
    fn no_history_skips_exploration() {
        let (_, scorer) = setup();
        let optimizer = Optimizer::new(scorer)
            .with_exploration_rate(1.0)
            .unwrap()
            .with_seed(3);
        for _ in 0..50 {
            let (agent, explored) = optimizer.explore_exploit(&ids(&["first", "second"])).unwrap();
            assert_eq!(agent, "first");
            assert!(!explored);
        }
    }

    #[test]
    fn recommendation_lists_alternatives_best_first() {
        let (store, scorer) = setup();
        seed_history(&store, "a", Outcome::Success, 0.9, 0.1, 4);
        seed_history(&store, "b", Outcome::Partial, 0.5, 0.1, 4);
        seed_history(&store, "c", Outcome::Failure, 0.1, 0.1, 4);

        let optimizer = Optimizer::new(scorer).with_exploration_rate(0.0).unwrap();
        let rec = optimizer.recommend_agent(&ids(&["c", "a", "b"]), None, None).unwrap();
        assert_eq!(rec.agent_id, "a");
        assert_eq!(rec.alternatives, vec!["b", "c"]);
        assert!(!rec.was_exploration);
    }

    #[test]
    fn confidence_interval_shrinks_with_history() {
        let narrow = ConfidenceInterval::around(0.5, 100);
        let wide = ConfidenceInterval::around(0.5, 4);
        assert!(narrow.width() < wide.width());
        assert!((narrow.lower - (0.5 - 0.098)).abs() < 1e-9);

        let clamped = ConfidenceInterval::around(0.95, 1);
        assert!((clamped.upper - 1.0).abs() < f64::EPSILON);
        assert!(clamped.lower >= 0.0);
    }

    #[test]
    fn rejects_invalid_exploration_rate() {
        let (_, scorer) = setup();
        assert!(Optimizer::new(scorer.clone()).with_exploration_rate(-0.1).is_err());
        assert!(Optimizer::new(scorer).with_exploration_rate(1.01).is_err());
    }

    #[test]
    fn from_config_applies_rate_and_seed() {
        let (_, scorer) = setup();
        let config = ReputationConfig {
            exploration_rate: 0.4,
            seed: Some(42),
            ..Default::default()
        };
        let optimizer = Optimizer::from_config(scorer, &config).unwrap();
        assert!((optimizer.exploration_rate() - 0.4).abs() < f64::EPSILON);
    }
}
