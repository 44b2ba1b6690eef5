//! Integration test crate for the hiring engine.
//!
//! This crate exists solely to run integration tests that span the hire-*
//! crates. It has no public API; everything lives in the test modules.

#![forbid(unsafe_code)]
