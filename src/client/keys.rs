//! Key probe helpers.
//!
//! Used to seed test keys into a cluster and to wait for migrated keys to
//! become visible on a destination node.

use std::time::Duration;

use fred::prelude::*;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::commands::NodeCommands;
use super::valkey_client::{ValkeyClient, ValkeyError};

/// Poll cadence for [`wait_for_keys`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum KeyWaitError {
    #[error("{} keys still missing after {waited:?}", outstanding.len())]
    Timeout {
        outstanding: Vec<String>,
        waited: Duration,
    },

    #[error(transparent)]
    Valkey(#[from] ValkeyError),
}

/// Generate `count` random keys with the given prefix.
///
/// No hash tags are used, so the keys spread across slots.
pub fn gen_keys(prefix: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|_| format!("{prefix}:{}", Uuid::new_v4()))
        .collect()
}

impl ValkeyClient {
    /// Write each key with its own name as the value, pipelined.
    #[instrument(skip(self, keys), fields(key_count = keys.len()))]
    pub async fn set_keys(&self, keys: &[String]) -> Result<(), ValkeyError> {
        if keys.is_empty() {
            return Ok(());
        }

        let pipeline = self.inner().pipeline();
        for key in keys {
            let _: () = pipeline
                .set(key.as_str(), key.as_str(), None, None, false)
                .await?;
        }
        let _: Vec<Value> = pipeline.all().await?;
        Ok(())
    }
}

/// Wait until every key in `keys` exists on `node`, polling once per second.
///
/// On timeout the error carries the keys that were still missing at the last
/// probe.
#[instrument(skip(node, keys), fields(node = %node.address(), key_count = keys.len()))]
pub async fn wait_for_keys<C: NodeCommands>(
    node: &C,
    keys: &[String],
    timeout: Duration,
) -> Result<(), KeyWaitError> {
    let start = std::time::Instant::now();
    let mut outstanding = node.missing_keys(keys).await?;

    while !outstanding.is_empty() {
        if start.elapsed() >= timeout {
            return Err(KeyWaitError::Timeout {
                outstanding,
                waited: start.elapsed(),
            });
        }

        debug!(missing = outstanding.len(), "Keys not yet visible");
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        outstanding = node.missing_keys(&outstanding).await?;
    }

    Ok(())
}
