//! High-level cluster operations built on the per-node command surface.
//!
//! These combine raw commands with parsing, and manage the short-lived
//! connections the checker and migrator open per node.

use std::collections::HashMap;

use tracing::{debug, instrument, warn};

use super::commands::NodeCommands;
use super::parsing::ClusterInfo;
use super::types::TopologySnapshot;
use super::valkey_client::{ValkeyClient, ValkeyClientConfig, ValkeyError};
use crate::slots::consistency::TopologySource;

impl ValkeyClient {
    /// Get parsed cluster info.
    #[instrument(skip(self))]
    pub async fn cluster_info(&self) -> Result<ClusterInfo, ValkeyError> {
        let raw = self.cluster_info_raw().await?;
        let info = ClusterInfo::parse(&raw)?;
        Ok(info)
    }

    /// Get the cluster topology as this node reports it.
    #[instrument(skip(self))]
    pub async fn topology(&self) -> Result<TopologySnapshot, ValkeyError> {
        let raw = self.cluster_nodes_raw().await?;
        let snapshot = TopologySnapshot::parse(&raw, self.address())?;
        Ok(snapshot)
    }
}

/// Factory for short-lived per-node connections.
///
/// Carries the shared credentials and timeouts so callers only name the
/// `host:port` they want to reach.
#[derive(Clone, Debug, Default)]
pub struct ValkeyConnector {
    username: Option<String>,
    password: Option<String>,
    config: ValkeyClientConfig,
}

impl ValkeyConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given connection settings as the template for every node.
    pub fn with_config(mut self, config: ValkeyClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Authenticate with a username and password on every connection.
    pub fn with_auth(mut self, username: Option<String>, password: String) -> Self {
        self.username = username;
        self.password = Some(password);
        self
    }

    /// Open a connection to the node at `addr`.
    #[instrument(skip(self))]
    pub async fn connect(&self, addr: &str) -> Result<ValkeyClient, ValkeyError> {
        let mut config = ValkeyClientConfig::from_addr(addr)?;
        config.username = self.username.clone();
        config.password = self.password.clone();
        config.connection_timeout = self.config.connection_timeout;
        config.command_timeout = self.config.command_timeout;
        ValkeyClient::connect(config).await
    }

    /// Fetch parsed cluster info from the node at `addr`, releasing the
    /// connection before returning.
    #[instrument(skip(self))]
    pub async fn fetch_cluster_info(&self, addr: &str) -> Result<ClusterInfo, ValkeyError> {
        let client = self.connect(addr).await?;
        let result = client.cluster_info().await;
        close_quietly(&client).await;
        result
    }

    /// Open a connection to every master in the snapshot, keyed by address.
    ///
    /// If any connection fails, the ones already opened are released before
    /// the error is returned.
    #[instrument(skip(self, snapshot), fields(observed_from = %snapshot.observed_from))]
    pub async fn connect_masters(
        &self,
        snapshot: &TopologySnapshot,
    ) -> Result<HashMap<String, ValkeyClient>, ValkeyError> {
        let mut clients = HashMap::new();

        for node in snapshot.masters() {
            match self.connect(&node.address).await {
                Ok(client) => {
                    clients.insert(node.address.clone(), client);
                }
                Err(e) => {
                    warn!(node = %node.address, error = %e, "Failed to connect to master");
                    close_all(clients).await;
                    return Err(e);
                }
            }
        }

        debug!(masters = clients.len(), "Connected to all masters");
        Ok(clients)
    }
}

impl TopologySource for ValkeyConnector {
    /// Fetch and parse `CLUSTER NODES` from the node at `addr`. The
    /// connection is released on every exit path.
    async fn fetch_topology(&self, addr: &str) -> Result<TopologySnapshot, ValkeyError> {
        let client = self.connect(addr).await?;
        let result = client.topology().await;
        close_quietly(&client).await;
        result
    }
}

/// Release every connection in the map, logging rather than propagating
/// close failures.
pub async fn close_all(clients: HashMap<String, ValkeyClient>) {
    for (addr, client) in clients {
        if let Err(e) = client.close().await {
            warn!(node = %addr, error = %e, "Error closing connection");
        }
    }
}

async fn close_quietly(client: &ValkeyClient) {
    if let Err(e) = client.close().await {
        warn!(node = %client.address(), error = %e, "Error closing connection");
    }
}
