//! Batched key transfer for a single slot.
//!
//! Drains every key in a slot from the source node to the destination using
//! `CLUSTER GETKEYSINSLOT` plus `MIGRATE ... KEYS`, one batch at a time.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::client::commands::NodeCommands;
use crate::client::valkey_client::ValkeyError;

/// Keys requested per `CLUSTER GETKEYSINSLOT` round.
pub const DEFAULT_BATCH_SIZE: u64 = 1000;

/// Timeout passed to each `MIGRATE` command.
pub const DEFAULT_MIGRATE_TIMEOUT: Duration = Duration::from_secs(300);

/// A transfer that failed partway. Carries how many keys had already been
/// moved, since those now live on the destination.
#[derive(Error, Debug)]
#[error("transferred {moved} keys from slot {slot} before failing: {source}")]
pub struct TransferAborted {
    pub slot: u16,
    pub moved: u64,
    #[source]
    pub source: ValkeyError,
}

/// Moves all keys in one slot between two nodes in fixed-size batches.
#[derive(Clone, Debug)]
pub struct KeyBatchTransfer {
    batch_size: u64,
    timeout: Duration,
}

impl Default for KeyBatchTransfer {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_MIGRATE_TIMEOUT,
        }
    }
}

impl KeyBatchTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size. Values below 1 are clamped to 1.
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the per-MIGRATE timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drain all keys in `slot` from `source` to `dest`.
    ///
    /// Loops until the source reports no keys left in the slot. Returns the
    /// total number of keys moved; on failure the error carries the count
    /// moved by the batches that did complete.
    #[instrument(skip(self, source, dest), fields(source = %source.address(), dest = %dest.address()))]
    pub async fn run<S, D>(&self, slot: u16, source: &S, dest: &D) -> Result<u64, TransferAborted>
    where
        S: NodeCommands,
        D: NodeCommands,
    {
        let mut moved: u64 = 0;

        loop {
            let keys = source
                .cluster_get_keys_in_slot(slot, self.batch_size)
                .await
                .map_err(|e| TransferAborted {
                    slot,
                    moved,
                    source: e,
                })?;

            if keys.is_empty() {
                break;
            }

            source
                .migrate_keys(dest.host(), dest.port(), &keys, self.timeout)
                .await
                .map_err(|e| TransferAborted {
                    slot,
                    moved,
                    source: e,
                })?;

            moved += keys.len() as u64;
            debug!(slot, batch = keys.len(), total = moved, "Moved key batch");
        }

        Ok(moved)
    }
}
