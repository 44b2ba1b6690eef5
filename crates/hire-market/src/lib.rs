//! # hire-market
//!
//! Hiring engine for an agent marketplace.
//!
//! This crate provides:
//!
//! - [`Catalog`] — Agent listings, discovery and skill matching
//! - [`Ledger`] — Append-only, hash-chained record of financial events
//! - [`Escrow`] — Funds held per task, released or refunded exactly once
//! - [`BudgetTracker`] — Global spending ceiling with atomic reservations
//! - [`HiringManager`] — The hire state machine
//! - [`Marketplace`] — Wires everything together with reputation
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hire_market::{AgentListing, HireStatus, InstantExecutor, Marketplace, MarketplaceConfig};
//!
//! let market = Marketplace::new(MarketplaceConfig::default(), Arc::new(InstantExecutor)).unwrap();
//! market
//!     .register_agent(
//!         AgentListing::new("pixel-forge", "PixelForge", "0.05".parse().unwrap())
//!             .with_skills(["design", "wireframe"])
//!             .with_rating(4.2),
//!     )
//!     .unwrap();
//!
//! let result = market
//!     .hire_with("Sketch a wireframe", ["wireframe"], "1.0".parse().unwrap())
//!     .unwrap();
//! assert_eq!(result.status, HireStatus::Completed);
//! assert_eq!(result.budget_remaining.to_string(), "4.95");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod budget;
pub mod catalog;
pub mod config;
pub mod error;
pub mod escrow;
pub mod hiring;
pub mod ledger;
pub mod marketplace;
pub mod matcher;
pub mod verify;

pub use budget::BudgetTracker;
pub use catalog::{AgentListing, Availability, Catalog};
pub use config::{HiringConfig, MarketplaceConfig};
pub use error::{ExecutionError, MarketError};
pub use escrow::{Escrow, EscrowEntry, EscrowId, EscrowStatus};
pub use hiring::{
    CandidateSelector, HireRequest, HireResult, HireStage, HireStatus, HiringManager,
    InstantExecutor, TaskExecutor, TaskOutput, NO_AGENT,
};
pub use ledger::{Ledger, LedgerEntry, LedgerEvent, LedgerEventType, LedgerQuery};
pub use marketplace::Marketplace;
pub use matcher::{AgentMatch, MatchQuery};
pub use verify::{AcceptAllVerifier, PaymentRequest, PaymentVerifier};

pub use hire_core::Amount;
