//! Agent capability listings.
//!
//! The catalog owns every [`AgentListing`]. Listings are upserted by id and
//! are only mutated afterwards by job-completion events and availability
//! changes.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hire_core::Amount;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MarketError;

/// Highest rating a listing may carry.
pub const MAX_RATING: f64 = 5.0;

/// Whether an agent can take work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Ready for new hires.
    #[default]
    Available,
    /// Listed but not taking hires right now.
    Busy,
    /// Soft-removed from the marketplace.
    Offline,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Busy => write!(f, "busy"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// An agent's marketplace listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentListing {
    /// Unique agent identifier.
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Free-text description, searched by [`Catalog::discover`].
    pub description: String,
    /// Advertised skills. Matching is case-insensitive.
    pub skills: Vec<String>,
    /// Price charged per hire.
    pub price_per_unit: Amount,
    /// Rating in `[0, 5]`.
    pub rating: f64,
    /// Current availability.
    pub availability: Availability,
    /// Jobs ever assigned.
    pub total_jobs: u64,
    /// Jobs completed successfully.
    pub completed_jobs: u64,
    /// Jobs that failed.
    pub failed_jobs: u64,
    /// Sum of released payments.
    pub total_earnings: Amount,
    /// When the listing was first registered.
    pub registered_at: DateTime<Utc>,
}

impl AgentListing {
    /// Creates an available listing with no skills, no rating and no history.
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>, price_per_unit: Amount) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            description: String::new(),
            skills: Vec::new(),
            price_per_unit,
            rating: 0.0,
            availability: Availability::Available,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            total_earnings: Amount::ZERO,
            registered_at: Utc::now(),
        }
    }

    /// Sets the skills.
    #[must_use]
    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the rating.
    #[must_use]
    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = rating;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the availability.
    #[must_use]
    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Share of jobs completed successfully, 0 without jobs.
    #[must_use]
    pub fn completion_rate(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        self.completed_jobs as f64 / self.total_jobs as f64
    }

    /// True if any advertised skill contains `skill`, ignoring case.
    #[must_use]
    pub fn has_skill(&self, skill: &str) -> bool {
        let needle = skill.to_lowercase();
        self.skills
            .iter()
            .any(|s| s.to_lowercase().contains(&needle))
    }

    fn validate(&self) -> Result<(), MarketError> {
        if self.agent_id.trim().is_empty() {
            return Err(MarketError::InvalidListing("agent_id is empty".into()));
        }
        if !(0.0..=MAX_RATING).contains(&self.rating) {
            return Err(MarketError::InvalidListing(format!(
                "rating {} outside [0, {MAX_RATING}]",
                self.rating
            )));
        }
        if self.completed_jobs.saturating_add(self.failed_jobs) > self.total_jobs {
            return Err(MarketError::InvalidListing(format!(
                "completed ({}) + failed ({}) exceeds total jobs ({})",
                self.completed_jobs, self.failed_jobs, self.total_jobs
            )));
        }
        Ok(())
    }

    fn matches_query(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(query)
            || self.description.to_lowercase().contains(query)
            || self.skills.iter().any(|s| s.to_lowercase().contains(query))
    }
}

/// Registry of agent listings.
#[derive(Debug, Default)]
pub struct Catalog {
    listings: RwLock<HashMap<String, AgentListing>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a listing by id.
    pub fn register(&self, listing: AgentListing) -> Result<(), MarketError> {
        listing.validate()?;
        info!(
            agent_id = %listing.agent_id,
            name = %listing.name,
            price = %listing.price_per_unit,
            "agent registered"
        );
        self.listings
            .write()
            .insert(listing.agent_id.clone(), listing);
        Ok(())
    }

    /// Removes a listing. Returns false if it was not registered.
    pub fn unregister(&self, agent_id: &str) -> bool {
        let removed = self.listings.write().remove(agent_id).is_some();
        if removed {
            info!(agent_id, "agent unregistered");
        }
        removed
    }

    /// Gets a listing by id.
    pub fn get(&self, agent_id: &str) -> Option<AgentListing> {
        self.listings.read().get(agent_id).cloned()
    }

    /// All listings, ordered by id.
    pub fn list(&self) -> Vec<AgentListing> {
        let mut listings: Vec<AgentListing> = self.listings.read().values().cloned().collect();
        listings.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        listings
    }

    /// First listing whose display name equals `name`, ignoring case.
    pub fn get_by_name(&self, name: &str) -> Option<AgentListing> {
        self.list()
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
    }

    /// Every listing, cheapest first. Ties fall back to id.
    pub fn sorted_by_price(&self) -> Vec<AgentListing> {
        let mut listings = self.list();
        listings.sort_by(|a, b| a.price_per_unit.cmp(&b.price_per_unit));
        listings
    }

    /// Every listing, highest rated first. Ties fall back to id.
    pub fn sorted_by_rating(&self) -> Vec<AgentListing> {
        let mut listings = self.list();
        listings.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        listings
    }

    /// Sets an agent's rating.
    pub fn update_rating(&self, agent_id: &str, rating: f64) -> Result<(), MarketError> {
        if !(0.0..=MAX_RATING).contains(&rating) {
            return Err(MarketError::InvalidListing(format!(
                "rating {rating} outside [0, {MAX_RATING}]"
            )));
        }
        let mut listings = self.listings.write();
        let listing = listings
            .get_mut(agent_id)
            .ok_or_else(|| MarketError::AgentNotFound(agent_id.to_string()))?;
        debug!(agent_id, from = listing.rating, to = rating, "rating updated");
        listing.rating = rating;
        Ok(())
    }

    /// Removes every listing.
    pub fn clear(&self) {
        let mut listings = self.listings.write();
        info!(removed = listings.len(), "catalog cleared");
        listings.clear();
    }

    /// Number of registered listings, including offline ones.
    pub fn len(&self) -> usize {
        self.listings.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.listings.read().is_empty()
    }

    /// Changes an agent's availability. Returns false if unknown.
    pub fn set_availability(&self, agent_id: &str, availability: Availability) -> bool {
        match self.listings.write().get_mut(agent_id) {
            Some(listing) => {
                debug!(agent_id, %availability, "availability changed");
                listing.availability = availability;
                true
            }
            None => false,
        }
    }

    /// Case-insensitive substring search over name, description and skills.
    ///
    /// Offline listings are never returned. An empty query matches every
    /// online listing. Results are cheapest first.
    pub fn discover(&self, query: &str, max_price: Option<Amount>) -> Vec<AgentListing> {
        let needle = query.trim().to_lowercase();
        let mut found: Vec<AgentListing> = self
            .listings
            .read()
            .values()
            .filter(|l| l.availability != Availability::Offline)
            .filter(|l| max_price.is_none_or(|max| l.price_per_unit <= max))
            .filter(|l| needle.is_empty() || l.matches_query(&needle))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.price_per_unit
                .cmp(&b.price_per_unit)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        found
    }

    /// Updates lifetime counters after a job settles.
    pub fn record_job_completion(
        &self,
        agent_id: &str,
        success: bool,
        earnings: Amount,
    ) -> Result<(), MarketError> {
        let mut listings = self.listings.write();
        let listing = listings
            .get_mut(agent_id)
            .ok_or_else(|| MarketError::AgentNotFound(agent_id.to_string()))?;

        listing.total_jobs = listing.total_jobs.saturating_add(1);
        if success {
            listing.completed_jobs = listing.completed_jobs.saturating_add(1);
            listing.total_earnings = listing.total_earnings.saturating_add(earnings);
        } else {
            listing.failed_jobs = listing.failed_jobs.saturating_add(1);
        }
        debug!(
            agent_id,
            success,
            total_jobs = listing.total_jobs,
            "job completion recorded"
        );
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> Vec<AgentListing> {
        self.listings.read().values().cloned().collect()
    }
}
