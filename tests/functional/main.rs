// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the slot machinery.
//!
//! These drive the consistency checker, slot migrator, and key transfer
//! against an in-memory cluster simulation, with no live nodes required.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_migrate_slot_command_ordering
//! ```
//!
//! The simulation records every command in order, so the tests can assert
//! protocol-level properties like IMPORTING being sent before MIGRATING.

mod migration_tests;
mod mock_cluster;

pub use mock_cluster::*;
