//! Slot migration.
//!
//! Models and drives the cluster slot migration protocol:
//! 1. SETSLOT IMPORTING on the destination
//! 2. SETSLOT MIGRATING on the source
//! 3. MIGRATE keys in batches until the slot is empty
//! 4. SETSLOT NODE on the destination, then the source, then best-effort on
//!    every other master
//!
//! The destination is marked first so that, if the process dies between the
//! two SETSLOT calls, clients redirected by ASK find a node that accepts the
//! keys.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::slot_set::SlotSet;
use super::transfer::{KeyBatchTransfer, TransferAborted};
use crate::client::commands::{NodeCommands, SetSlotState};
use crate::client::types::{ClusterNode, TopologySnapshot};
use crate::client::valkey_client::ValkeyError;
use crate::metrics::SharedMetrics;

/// State of a single slot migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MigrationState {
    /// Migration not started.
    #[default]
    Pending,
    /// Destination marked importing (SETSLOT IMPORTING sent).
    Importing,
    /// Source marked migrating (SETSLOT MIGRATING sent).
    Migrating,
    /// Keys are being transferred.
    TransferringKeys {
        /// Number of keys moved so far.
        moved: u64,
    },
    /// Ownership is being committed and propagated.
    Finalizing,
    /// Migration complete.
    Complete,
    /// Migration failed.
    Failed { error: String },
}

impl MigrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationState::Complete | MigrationState::Failed { .. }
        )
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, MigrationState::Complete)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MigrationState::Failed { .. })
    }

    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal() && !matches!(self, MigrationState::Pending)
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationState::Pending => write!(f, "pending"),
            MigrationState::Importing => write!(f, "importing"),
            MigrationState::Migrating => write!(f, "migrating"),
            MigrationState::TransferringKeys { moved } => write!(f, "transferring ({moved} moved)"),
            MigrationState::Finalizing => write!(f, "finalizing"),
            MigrationState::Complete => write!(f, "complete"),
            MigrationState::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Tracks one slot migration from source to destination.
#[derive(Debug, Clone)]
pub struct SlotMigrationTracker {
    pub slot: u16,
    pub source_id: String,
    pub dest_id: String,
    pub state: MigrationState,
    pub keys_migrated: u64,
}

impl SlotMigrationTracker {
    pub fn new(slot: u16, source_id: impl Into<String>, dest_id: impl Into<String>) -> Self {
        Self {
            slot,
            source_id: source_id.into(),
            dest_id: dest_id.into(),
            state: MigrationState::Pending,
            keys_migrated: 0,
        }
    }

    pub fn advance(&mut self, next: MigrationState) {
        debug!(slot = self.slot, from = %self.state, to = %next, "Migration state change");
        self.state = next;
    }

    pub fn record_keys_migrated(&mut self, count: u64) {
        self.keys_migrated += count;
        self.state = MigrationState::TransferringKeys {
            moved: self.keys_migrated,
        };
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = MigrationState::Failed {
            error: error.into(),
        };
    }

    pub fn complete(&mut self) {
        self.state = MigrationState::Complete;
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Node {0} not found in topology")]
    UnknownNode(String),

    #[error("Node {0} is not a master")]
    NotMaster(String),

    #[error("Slot {0} has no owner")]
    UnownedSlot(u16),

    #[error("No connection to node {0}")]
    MissingClient(String),

    #[error("CLUSTER SETSLOT {state} failed on {addr} for slot {slot}: {source}")]
    SetSlot {
        slot: u16,
        addr: String,
        state: String,
        #[source]
        source: ValkeyError,
    },

    #[error(transparent)]
    Transfer(#[from] TransferAborted),
}

/// Options for a rebalance run.
#[derive(Clone, Debug, Default)]
pub struct RebalanceOptions {
    /// Keep migrating remaining slots when one slot fails.
    pub continue_on_error: bool,
}

/// Result of a rebalance run.
#[derive(Debug, Default)]
pub struct RebalanceSummary {
    /// Slots migrated to the destination.
    pub slots_migrated: u64,
    /// Slots the destination already owned.
    pub slots_skipped: u64,
    /// Total keys moved across all migrated slots.
    pub keys_moved: u64,
    /// Slots that failed, with the error text. Only populated when
    /// `continue_on_error` is set.
    pub failed_slots: Vec<(u16, String)>,
}

impl RebalanceSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed_slots.is_empty()
    }
}

/// Drives slot migrations against a set of connected masters.
///
/// Connections are keyed by `host:port` address and must cover every master
/// that participates: the source, the destination, and any other master that
/// should learn the new ownership.
pub struct SlotMigrator<C: NodeCommands> {
    snapshot: TopologySnapshot,
    clients: HashMap<String, C>,
    transfer: KeyBatchTransfer,
    metrics: SharedMetrics,
}

impl<C: NodeCommands> SlotMigrator<C> {
    pub fn new(snapshot: TopologySnapshot, clients: HashMap<String, C>) -> Self {
        Self {
            snapshot,
            clients,
            transfer: KeyBatchTransfer::default(),
            metrics: crate::metrics::noop(),
        }
    }

    pub fn with_transfer(mut self, transfer: KeyBatchTransfer) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// The topology this migrator was built from.
    pub fn snapshot(&self) -> &TopologySnapshot {
        &self.snapshot
    }

    /// Hand the connections back so the caller can release them.
    pub fn into_clients(self) -> HashMap<String, C> {
        self.clients
    }

    /// Migrate one slot from its current owner to the master `dest_id`.
    ///
    /// Returns the number of keys moved. A slot the destination already owns
    /// is a no-op returning zero.
    #[instrument(skip(self), fields(slot, dest = %dest_id))]
    pub async fn migrate_slot(&self, slot: u16, dest_id: &str) -> Result<u64, MigrationError> {
        let dest = self.master(dest_id)?;
        let source = self
            .snapshot
            .owner_of_slot(slot)
            .ok_or(MigrationError::UnownedSlot(slot))?;

        if source.id == dest.id {
            debug!(slot, "Destination already owns slot");
            return Ok(0);
        }

        let mut tracker = SlotMigrationTracker::new(slot, &source.id, &dest.id);
        let result = self.run_migration(&mut tracker, source, dest).await;

        match &result {
            Ok(keys) => {
                info!(slot, keys, source = %source.address, dest = %dest.address, "Slot migrated");
                self.metrics.slot_migrated();
                self.metrics.keys_moved(*keys);
            }
            Err(e) => {
                tracker.fail(e.to_string());
                warn!(slot, error = %e, state = %tracker.state, "Slot migration failed");
            }
        }

        result
    }

    async fn run_migration(
        &self,
        tracker: &mut SlotMigrationTracker,
        source: &ClusterNode,
        dest: &ClusterNode,
    ) -> Result<u64, MigrationError> {
        let slot = tracker.slot;
        let source_client = self.client_for(source)?;
        let dest_client = self.client_for(dest)?;

        // Destination first, then source. Reversing this ordering would
        // leave a window where the source forwards ASK to a node that
        // refuses the slot.
        self.setslot(dest_client, slot, SetSlotState::Importing(source.id.clone()))
            .await?;
        tracker.advance(MigrationState::Importing);

        self.setslot(
            source_client,
            slot,
            SetSlotState::Migrating(dest.id.clone()),
        )
        .await?;
        tracker.advance(MigrationState::Migrating);

        tracker.advance(MigrationState::TransferringKeys { moved: 0 });
        let moved = self.transfer.run(slot, source_client, dest_client).await?;
        tracker.record_keys_migrated(moved);

        tracker.advance(MigrationState::Finalizing);
        self.setslot(dest_client, slot, SetSlotState::Node(dest.id.clone()))
            .await?;
        self.setslot(source_client, slot, SetSlotState::Node(dest.id.clone()))
            .await?;

        self.propagate_ownership(slot, source, dest).await;
        tracker.complete();

        Ok(moved)
    }

    /// Tell every other master about the new owner. Failures are logged and
    /// ignored; gossip will converge the stragglers.
    async fn propagate_ownership(&self, slot: u16, source: &ClusterNode, dest: &ClusterNode) {
        for master in self.snapshot.masters() {
            if master.id == source.id || master.id == dest.id {
                continue;
            }

            let Some(client) = self.clients.get(&master.address) else {
                warn!(slot, node = %master.address, "No connection for ownership propagation");
                continue;
            };

            if let Err(e) = client
                .cluster_setslot(slot, SetSlotState::Node(dest.id.clone()))
                .await
            {
                warn!(slot, node = %master.address, error = %e, "Ownership propagation failed");
            }
        }
    }

    /// Migrate slots until the master `dest_id` owns every slot in `target`.
    ///
    /// Slots the destination already owns are skipped. Slots it owns beyond
    /// the target set are left in place.
    #[instrument(skip(self, target, options), fields(dest = %dest_id, target = %target.to_range_string()))]
    pub async fn rebalance(
        &self,
        dest_id: &str,
        target: &SlotSet,
        options: &RebalanceOptions,
    ) -> Result<RebalanceSummary, MigrationError> {
        let dest = self.master(dest_id)?;
        let mut summary = RebalanceSummary::default();

        for slot in target.iter() {
            if dest.slots.is_set(slot) {
                summary.slots_skipped += 1;
                continue;
            }

            match self.migrate_slot(slot, dest_id).await {
                Ok(keys) => {
                    summary.slots_migrated += 1;
                    summary.keys_moved += keys;
                }
                Err(e) if options.continue_on_error => {
                    summary.failed_slots.push((slot, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            migrated = summary.slots_migrated,
            skipped = summary.slots_skipped,
            keys = summary.keys_moved,
            failed = summary.failed_slots.len(),
            "Rebalance complete"
        );

        Ok(summary)
    }

    fn master(&self, node_id: &str) -> Result<&ClusterNode, MigrationError> {
        let node = self
            .snapshot
            .get_node(node_id)
            .ok_or_else(|| MigrationError::UnknownNode(node_id.to_string()))?;

        if !node.is_master() {
            return Err(MigrationError::NotMaster(node_id.to_string()));
        }

        Ok(node)
    }

    fn client_for(&self, node: &ClusterNode) -> Result<&C, MigrationError> {
        self.clients
            .get(&node.address)
            .ok_or_else(|| MigrationError::MissingClient(node.address.clone()))
    }

    async fn setslot(
        &self,
        client: &C,
        slot: u16,
        state: SetSlotState,
    ) -> Result<(), MigrationError> {
        let state_text = state.to_string();
        client
            .cluster_setslot(slot, state)
            .await
            .map_err(|source| MigrationError::SetSlot {
                slot,
                addr: client.address().to_string(),
                state: state_text,
                source,
            })
    }
}
