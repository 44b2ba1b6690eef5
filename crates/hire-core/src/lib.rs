//! # hire-core
//!
//! Shared primitives for the agent hiring engine.
//!
//! This crate provides:
//!
//! - [`Amount`] — Currency amount with fixed-point precision
//! - [`CoreError`] — Errors raised while constructing primitives

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod error;

pub use amount::Amount;
pub use error::CoreError;
