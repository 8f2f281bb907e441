//! Per-node command surface used by the slot machinery.
//!
//! The consistency checker and migrator only need a handful of commands from
//! each node; the [`NodeCommands`] trait captures that surface so the
//! machinery can be driven against a live [`ValkeyClient`] or a test double.

use std::future::Future;
use std::time::Duration;

use super::valkey_client::ValkeyError;

/// State argument for `CLUSTER SETSLOT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetSlotState {
    /// Destination-side marker: the slot is being imported from the node with
    /// the given ID.
    Importing(String),
    /// Source-side marker: the slot is being migrated to the node with the
    /// given ID.
    Migrating(String),
    /// Final ownership assignment to the node with the given ID.
    Node(String),
    /// Clear any importing/migrating marker. Takes no node-id argument.
    Stable,
}

impl SetSlotState {
    /// The SETSLOT subcommand keyword.
    pub fn subcommand(&self) -> &'static str {
        match self {
            SetSlotState::Importing(_) => "IMPORTING",
            SetSlotState::Migrating(_) => "MIGRATING",
            SetSlotState::Node(_) => "NODE",
            SetSlotState::Stable => "STABLE",
        }
    }

    /// The node-id argument, if the subcommand takes one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            SetSlotState::Importing(id)
            | SetSlotState::Migrating(id)
            | SetSlotState::Node(id) => Some(id),
            SetSlotState::Stable => None,
        }
    }
}

impl std::fmt::Display for SetSlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.node_id() {
            Some(id) => write!(f, "{} {}", self.subcommand(), id),
            None => write!(f, "{}", self.subcommand()),
        }
    }
}

/// Commands a single cluster node exposes for topology inspection and slot
/// migration.
///
/// Each handle is logically owned by the invocation that opened it and is
/// released when that invocation finishes; nothing caches handles across
/// calls.
pub trait NodeCommands {
    /// The `host:port` this handle is connected to.
    fn address(&self) -> &str;

    /// Host part of the address.
    fn host(&self) -> &str;

    /// Client port.
    fn port(&self) -> u16;

    /// Raw `CLUSTER NODES` output.
    fn cluster_nodes_raw(&self) -> impl Future<Output = Result<String, ValkeyError>> + Send;

    /// Raw `CLUSTER INFO` output.
    fn cluster_info_raw(&self) -> impl Future<Output = Result<String, ValkeyError>> + Send;

    /// `CLUSTER SETSLOT <slot> <state>`.
    fn cluster_setslot(
        &self,
        slot: u16,
        state: SetSlotState,
    ) -> impl Future<Output = Result<(), ValkeyError>> + Send;

    /// `CLUSTER GETKEYSINSLOT <slot> <count>`: up to `count` keys currently
    /// resident in `slot` on this node.
    fn cluster_get_keys_in_slot(
        &self,
        slot: u16,
        count: u64,
    ) -> impl Future<Output = Result<Vec<String>, ValkeyError>> + Send;

    /// `MIGRATE <host> <port> "" 0 <timeout> KEYS <key...>`: atomic bulk
    /// transfer of the named keys to another node.
    fn migrate_keys(
        &self,
        host: &str,
        port: u16,
        keys: &[String],
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ValkeyError>> + Send;

    /// Probe which of the given keys do not exist on this node.
    fn missing_keys(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<String>, ValkeyError>> + Send;
}
