//! Marketplace configuration.

use std::path::{Path, PathBuf};

use hire_core::Amount;
use hire_reputation::ReputationConfig;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::matcher::DEFAULT_TOP_N;

/// Default buyer identity on ledger entries.
pub const DEFAULT_BUYER_ID: &str = "buyer";

/// Default global budget, in whole units.
pub const DEFAULT_TOTAL_BUDGET_UNITS: u64 = 5;

/// How the hiring manager picks candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiringConfig {
    /// Delegate selection to the reputation optimizer when one is wired in.
    pub use_optimizer: bool,
    /// Lowest catalog rating considered.
    pub min_rating: f64,
    /// Most candidates taken from the matcher per hire.
    pub candidate_pool: usize,
}

impl Default for HiringConfig {
    fn default() -> Self {
        Self {
            use_optimizer: true,
            min_rating: 0.0,
            candidate_pool: DEFAULT_TOP_N,
        }
    }
}

impl HiringConfig {
    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<(), MarketError> {
        if !(0.0..=crate::catalog::MAX_RATING).contains(&self.min_rating) {
            return Err(MarketError::Config(format!(
                "min_rating must be within [0, 5], got {}",
                self.min_rating
            )));
        }
        if self.candidate_pool == 0 {
            return Err(MarketError::Config("candidate_pool must be at least 1".into()));
        }
        Ok(())
    }
}

/// Top-level configuration for a [`Marketplace`](crate::Marketplace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// Identity that pays for hires.
    pub buyer_id: String,
    /// Global spending ceiling across every hire.
    pub total_budget: Amount,
    /// Directory for the reputation tables. In-memory when `None`.
    pub state_dir: Option<PathBuf>,
    /// Candidate selection.
    pub hiring: HiringConfig,
    /// Scoring and exploration.
    pub reputation: ReputationConfig,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            buyer_id: DEFAULT_BUYER_ID.to_string(),
            total_budget: Amount::from_units(DEFAULT_TOTAL_BUDGET_UNITS),
            state_dir: None,
            hiring: HiringConfig::default(),
            reputation: ReputationConfig::default(),
        }
    }
}

impl MarketplaceConfig {
    /// Checks every section.
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.buyer_id.trim().is_empty() {
            return Err(MarketError::Config("buyer_id is empty".into()));
        }
        self.hiring.validate()?;
        self.reputation.validate()?;
        Ok(())
    }

    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, MarketError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MarketError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, MarketError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| MarketError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = MarketplaceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.total_budget.to_string(), "5");
        assert!(config.hiring.use_optimizer);
        assert_eq!(config.hiring.candidate_pool, 10);
        assert!(config.state_dir.is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = MarketplaceConfig::from_json_str(
            r#"{ "total_budget": "12.5", "hiring": { "use_optimizer": false } }"#,
        )
        .unwrap();
        assert_eq!(config.total_budget, "12.5".parse().unwrap());
        assert!(!config.hiring.use_optimizer);
        assert_eq!(config.hiring.candidate_pool, 10);
        assert_eq!(config.buyer_id, "buyer");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(MarketplaceConfig::from_json_str(r#"{ "buyer_id": " " }"#).is_err());
        assert!(MarketplaceConfig::from_json_str(r#"{ "hiring": { "min_rating": 7.0 } }"#).is_err());
        assert!(
            MarketplaceConfig::from_json_str(r#"{ "hiring": { "candidate_pool": 0 } }"#).is_err()
        );
        assert!(matches!(
            MarketplaceConfig::from_json_str(r#"{ "reputation": { "exploration_rate": 2.0 } }"#),
            Err(MarketError::Reputation(_))
        ));
        assert!(matches!(
            MarketplaceConfig::from_json_str("not json"),
            Err(MarketError::Config(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "buyer_id": "acme", "state_dir": "/var/lib/hire" }}"#).unwrap();

        let config = MarketplaceConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.buyer_id, "acme");
        assert_eq!(config.state_dir, Some(PathBuf::from("/var/lib/hire")));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = MarketplaceConfig::from_json_file(Path::new("/nonexistent/hire.json")).unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
    }
}
