//! Ranks catalog listings against required skills.
//!
//! Score = share of required skills the agent covers, plus a small rating
//! bonus (`rating / 100`, at most 0.05). A required skill is covered when any
//! advertised skill contains it, ignoring case. Listings that cover none of
//! a non-empty skill set are excluded, whatever their rating.

use hire_core::Amount;
use serde::{Deserialize, Serialize};

use crate::catalog::{AgentListing, Availability, Catalog, MAX_RATING};

/// Divisor turning a rating into a score bonus.
const RATING_BONUS_DIVISOR: f64 = 100.0;

/// Largest bonus a rating can contribute.
pub const MAX_RATING_BONUS: f64 = MAX_RATING / RATING_BONUS_DIVISOR;

/// Default number of matches returned.
pub const DEFAULT_TOP_N: usize = 10;

/// What a caller is looking for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchQuery {
    /// Skills the agent must cover. Empty matches everyone.
    pub required_skills: Vec<String>,
    /// Lowest acceptable rating.
    pub min_rating: f64,
    /// Highest acceptable price, unbounded when `None`.
    pub max_price: Option<Amount>,
    /// Maximum number of results.
    pub top_n: usize,
}

impl MatchQuery {
    /// Query for the given skills with no rating or price limit.
    pub fn new<I, S>(required_skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_skills: required_skills.into_iter().map(Into::into).collect(),
            min_rating: 0.0,
            max_price: None,
            top_n: DEFAULT_TOP_N,
        }
    }

    /// Sets the minimum rating.
    #[must_use]
    pub fn with_min_rating(mut self, min_rating: f64) -> Self {
        self.min_rating = min_rating;
        self
    }

    /// Sets the price ceiling.
    #[must_use]
    pub fn with_max_price(mut self, max_price: Amount) -> Self {
        self.max_price = Some(max_price);
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }
}

/// A ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMatch {
    /// The matched listing.
    pub listing: AgentListing,
    /// Coverage plus rating bonus.
    pub score: f64,
}

/// Scores one listing. `None` means the listing does not match at all.
pub fn score_listing(listing: &AgentListing, required_skills: &[String]) -> Option<f64> {
    let bonus = (listing.rating / RATING_BONUS_DIVISOR).clamp(0.0, MAX_RATING_BONUS);
    if required_skills.is_empty() {
        return Some(bonus);
    }
    let covered = required_skills
        .iter()
        .filter(|skill| listing.has_skill(skill))
        .count();
    if covered == 0 {
        return None;
    }
    Some(covered as f64 / required_skills.len() as f64 + bonus)
}

/// Best score first, then higher rating, then lower price.
pub fn rank_order(a: &AgentMatch, b: &AgentMatch) -> std::cmp::Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.listing.rating.total_cmp(&a.listing.rating))
        .then_with(|| a.listing.price_per_unit.cmp(&b.listing.price_per_unit))
        .then_with(|| a.listing.agent_id.cmp(&b.listing.agent_id))
}

impl Catalog {
    /// Finds available listings matching `query`, best first.
    pub fn find_matches(&self, query: &MatchQuery) -> Vec<AgentMatch> {
        let mut matches: Vec<AgentMatch> = self
            .snapshot()
            .into_iter()
            .filter(|l| l.availability == Availability::Available)
            .filter(|l| l.rating >= query.min_rating)
            .filter(|l| query.max_price.is_none_or(|max| l.price_per_unit <= max))
            .filter_map(|listing| {
                score_listing(&listing, &query.required_skills)
                    .map(|score| AgentMatch { listing, score })
            })
            .collect();
        matches.sort_by(rank_order);
        matches.truncate(query.top_n);
        matches
    }
}
