//! Valkey client module for cluster control-plane operations.
//!
//! A type-safe wrapper around the `fred` Redis client for node-scoped
//! cluster commands. Connections are centralized (one per node, never
//! following redirects) because the tooling here needs each node's own view
//! of the cluster.
//!
//! - `valkey_client`: core client wrapper and connection configuration
//! - `commands`: the per-node command surface the slot machinery depends on
//! - `types`: parsed topology types (nodes, flags, slot ownership)
//! - `parsing`: `CLUSTER INFO` style key-value parsing
//! - `cluster_ops`: parsed high-level operations and the connection factory
//! - `keys`: key seeding and visibility probes

pub mod cluster_ops;
pub mod commands;
pub mod keys;
pub mod parsing;
pub mod types;
pub mod valkey_client;

pub use cluster_ops::{ValkeyConnector, close_all};
pub use commands::{NodeCommands, SetSlotState};
pub use keys::{KeyWaitError, gen_keys, wait_for_keys};
pub use parsing::ClusterInfo;
pub use types::{ClusterNode, NodeFlags, NodeMismatch, NodeRole, ParseError, TopologySnapshot};
pub use valkey_client::{ValkeyClient, ValkeyClientConfig, ValkeyError};
