// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for the cluster operator
//!
//! This module contains unit tests for:
//! - Phase labeling
//! - Condition management (transition times, mirroring, latches)
//! - The generic external reconciler's pure pieces (pause, adoption,
//!   failure citations, field extraction)
//! - The resource inventory engine's filtering
//! - Status idempotence across repeated reconcile passes

#[path = "../common/mod.rs"]
mod common;

mod external;
mod inventory;
mod phase;
