//! polyclaw
//!
//! Trade-idea ledger and order relay for Polymarket prediction markets.
//!
//! ## Architecture
//!
//! ```text
//! Ideation (LLM) → Bet Ledger (SQLite) → Order Submission (sign + transport chain)
//!                        ↑
//!        Reconciliation ← Market Resolution Lookup (Gamma)
//!                        ↓
//!                   Dashboard API (axum)
//! ```

pub mod client;
pub mod config;
pub mod cycle;
pub mod dashboard;
pub mod error;
pub mod execution;
pub mod ideation;
pub mod reconcile;
pub mod resolution;
pub mod settlement;
pub mod storage;
pub mod types;

#[cfg(test)]
mod config_tests;
