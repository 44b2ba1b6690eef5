//! Reputation configuration.

use serde::{Deserialize, Serialize};

use crate::error::ReputationError;
use crate::scorer::HALF_LIFE;

/// Default probability of taking an exploration step.
pub const DEFAULT_EXPLORATION_RATE: f64 = 0.15;

/// Configuration for scoring and the hiring policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Number of history positions after which a record's weight halves.
    pub half_life: f64,
    /// Probability of using Thompson sampling instead of pure exploitation.
    pub exploration_rate: f64,
    /// Seed for the optimizer's random source. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            half_life: HALF_LIFE,
            exploration_rate: DEFAULT_EXPLORATION_RATE,
            seed: None,
        }
    }
}

impl ReputationConfig {
    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<(), ReputationError> {
        if !(self.half_life.is_finite() && self.half_life > 0.0) {
            return Err(ReputationError::InvalidConfig(format!(
                "half_life must be positive, got {}",
                self.half_life
            )));
        }
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(ReputationError::InvalidConfig(format!(
                "exploration_rate must be within [0, 1], got {}",
                self.exploration_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ReputationConfig::default();
        assert!((config.half_life - 10.0).abs() < f64::EPSILON);
        assert!((config.exploration_rate - 0.15).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = ReputationConfig {
            exploration_rate: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ReputationConfig {
            half_life: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ReputationConfig =
            serde_json::from_str(r#"{"exploration_rate": 1.0}"#).expect("parse");
        assert!((config.exploration_rate - 1.0).abs() < f64::EPSILON);
        assert!((config.half_life - HALF_LIFE).abs() < f64::EPSILON);
        assert_eq!(config.seed, None);
    }
}
