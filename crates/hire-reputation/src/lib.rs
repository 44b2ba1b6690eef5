//! # hire-reputation
//!
//! Learns which agents are worth re-hiring.
//!
//! This crate provides:
//!
//! - [`FeedbackStore`] — Task outcomes keyed by `(task_id, agent_id)`
//! - [`Scorer`] — Recency-weighted composite reputation per agent
//! - [`Optimizer`] — Explore/exploit hiring policy using Thompson sampling
//! - [`ReputationBackend`] — Storage port with in-memory and JSON backends
//! - [`ReputationService`] — Feedback ingestion and reputation queries
//!
//! ## Example
//!
//! ```rust
//! use hire_reputation::{Outcome, ReputationConfig, ReputationService};
//!
//! let service = ReputationService::in_memory(&ReputationConfig::default()).unwrap();
//! let score = service
//!     .submit_feedback("task-1", "design-studio", Outcome::Success, 0.9, 12.0, 0.15)
//!     .unwrap();
//! assert_eq!(score.task_count, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod feedback;
pub mod optimizer;
pub mod scorer;
pub mod service;
pub mod storage;

pub use config::ReputationConfig;
pub use error::{ReputationError, StorageError};
pub use feedback::{FeedbackKey, FeedbackQuery, FeedbackRecord, FeedbackStore, Outcome, Upsert};
pub use optimizer::{ConfidenceInterval, Optimizer, Recommendation};
pub use scorer::{AgentScore, Scorer};
pub use service::ReputationService;
pub use storage::{CachedScore, JsonBackend, MemoryBackend, ReputationBackend};
