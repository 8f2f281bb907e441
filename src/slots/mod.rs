//! Slot ownership, consistency checking, and migration.
//!
//! - `slot_set`: the 16384-slot ownership bitmap and its range grammar
//! - `consistency`: pairwise comparison of each master's topology view
//! - `migration`: the slot migration state machine and executor
//! - `transfer`: batched key movement for a single slot

pub mod consistency;
pub mod migration;
pub mod slot_set;
pub mod transfer;

pub use consistency::{
    ComparisonOutcome, ConsistencyChecker, ConsistencyError, ConsistencyReport, NodeComparison,
    SlotFinding, TopologySource,
};
pub use migration::{
    MigrationError, MigrationState, RebalanceOptions, RebalanceSummary, SlotMigrationTracker,
    SlotMigrator,
};
pub use slot_set::{SlotDiff, SlotSet, SlotSetError, TOTAL_SLOTS};
pub use transfer::{DEFAULT_BATCH_SIZE, DEFAULT_MIGRATE_TIMEOUT, KeyBatchTransfer, TransferAborted};
