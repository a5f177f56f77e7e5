//! Domain model for the M-Pesewa peer-to-peer microloan platform.
//!
//! The [`lending`] module holds the loan ledger, eligibility rules, group
//! registry, subscription tiers and the service that composes them over an
//! injected repository.

pub mod config;
pub mod error;
pub mod lending;
pub mod telemetry;
