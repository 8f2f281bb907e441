//! valkey-slot-admin library crate
//!
//! Control-plane tooling for slot ownership in Valkey/Redis clusters:
//! topology inspection, cross-node consistency checking, and slot migration.
//!
//! The `client` module wraps per-node connections and parsing; the `slots`
//! module holds the slot bitmap, the consistency checker, and the migration
//! state machine. Everything network-facing sits behind the `NodeCommands`
//! and `TopologySource` traits so the machinery can be tested without a
//! cluster.

pub mod client;
pub mod metrics;
pub mod slots;

pub use client::{
    ClusterNode, NodeCommands, SetSlotState, TopologySnapshot, ValkeyClient, ValkeyClientConfig,
    ValkeyConnector, ValkeyError,
};
pub use slots::{
    ConsistencyChecker, ConsistencyReport, KeyBatchTransfer, MigrationError, RebalanceOptions,
    SlotMigrator, SlotSet, TOTAL_SLOTS, TopologySource,
};
