//! Valkey client wrapper using the fred crate.
//!
//! Each client holds a single centralized connection to one cluster node.
//! Cluster-level work is done by connecting to individual nodes and issuing
//! node-scoped commands, never by letting the client follow redirects.

use std::time::Duration;

use fred::prelude::*;
use fred::types::{ClusterHash, CustomCommand};
use thiserror::Error;
use tracing::{debug, instrument};

use super::commands::{NodeCommands, SetSlotState};
use crate::client::types::ParseError;

/// Errors that can occur during Valkey operations.
#[derive(Error, Debug)]
pub enum ValkeyError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for connecting to a single cluster node.
#[derive(Clone, Debug)]
pub struct ValkeyClientConfig {
    /// Hostname or IP to connect to.
    pub host: String,
    /// Client port.
    pub port: u16,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Connection timeout.
    pub connection_timeout: Duration,
    /// Command timeout.
    pub command_timeout: Duration,
}

impl Default for ValkeyClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            connection_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl ValkeyClientConfig {
    /// Create a new configuration for a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Parse a `host:port` address into a configuration.
    pub fn from_addr(addr: &str) -> Result<Self, ValkeyError> {
        let (host, port) = split_addr(addr)?;
        Ok(Self::new(host, port))
    }

    /// Set username.
    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    /// Set password.
    pub fn with_password(mut self, password: String) -> Self {
        self.password = Some(password);
        self
    }

    /// Set connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// The `host:port` address this configuration points at.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Split a `host:port` string, taking the last colon so IPv6-ish hosts with
/// embedded colons still resolve the port correctly.
pub(crate) fn split_addr(addr: &str) -> Result<(String, u16), ValkeyError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ValkeyError::InvalidConfig(format!("Invalid address: {addr}")))?;

    if host.is_empty() {
        return Err(ValkeyError::InvalidConfig(format!(
            "Invalid address: {addr}"
        )));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| ValkeyError::InvalidConfig(format!("Invalid port in address: {addr}")))?;

    Ok((host.to_string(), port))
}

/// Client connected to a single Valkey cluster node.
pub struct ValkeyClient {
    client: Client,
    host: String,
    port: u16,
    address: String,
}

impl ValkeyClient {
    /// Create and connect a new client to one node.
    #[instrument(skip(config), fields(host = %config.host, port = %config.port))]
    pub async fn connect(config: ValkeyClientConfig) -> Result<Self, ValkeyError> {
        if config.host.is_empty() {
            return Err(ValkeyError::InvalidConfig("No host provided".to_string()));
        }

        let server_config = ServerConfig::Centralized {
            server: Server::new(config.host.clone(), config.port),
        };

        let mut redis_config = Config {
            server: server_config,
            ..Default::default()
        };

        if let Some(ref username) = config.username {
            redis_config.username = Some(username.clone());
        }

        if let Some(ref password) = config.password {
            redis_config.password = Some(password.clone());
        }

        let command_timeout = config.command_timeout;
        let connection_timeout = config.connection_timeout;

        let client = Builder::from_config(redis_config)
            .with_performance_config(|perf| {
                perf.default_command_timeout = command_timeout;
            })
            .with_connection_config(|conn| {
                conn.connection_timeout = connection_timeout;
            })
            .build()?;

        debug!("Connecting to node");
        client.init().await?;
        debug!("Connected to node");

        Ok(Self {
            client,
            address: config.address(),
            host: config.host,
            port: config.port,
        })
    }

    /// Connect to a node by `host:port` address with default timeouts.
    pub async fn connect_addr(addr: &str) -> Result<Self, ValkeyError> {
        Self::connect(ValkeyClientConfig::from_addr(addr)?).await
    }

    /// Get the underlying fred client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Check if the client is connected.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), ValkeyError> {
        self.client.quit().await?;
        Ok(())
    }
}

impl NodeCommands for ValkeyClient {
    fn address(&self) -> &str {
        &self.address
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    #[instrument(skip(self), fields(node = %self.address))]
    async fn cluster_nodes_raw(&self) -> Result<String, ValkeyError> {
        let response: String = self.client.cluster_nodes().await?;
        Ok(response)
    }

    #[instrument(skip(self), fields(node = %self.address))]
    async fn cluster_info_raw(&self) -> Result<String, ValkeyError> {
        let response: String = self.client.cluster_info().await?;
        Ok(response)
    }

    /// Execute CLUSTER SETSLOT to set slot state.
    ///
    /// Issued as a custom command because fred's IMPORTING and MIGRATING
    /// variants do not carry the node-id parameter.
    #[instrument(skip(self), fields(node = %self.address, state = %state))]
    async fn cluster_setslot(&self, slot: u16, state: SetSlotState) -> Result<(), ValkeyError> {
        let mut args: Vec<String> = vec![
            "SETSLOT".to_string(),
            slot.to_string(),
            state.subcommand().to_string(),
        ];
        if let Some(node_id) = state.node_id() {
            args.push(node_id.to_string());
        }

        let cmd = CustomCommand::new_static("CLUSTER", ClusterHash::Random, false);
        let _: () = self.client.custom(cmd, args).await?;
        Ok(())
    }

    /// Execute CLUSTER GETKEYSINSLOT to get keys in a slot.
    #[instrument(skip(self), fields(node = %self.address))]
    async fn cluster_get_keys_in_slot(
        &self,
        slot: u16,
        count: u64,
    ) -> Result<Vec<String>, ValkeyError> {
        let keys: Vec<String> = self.client.cluster_get_keys_in_slot(slot, count).await?;
        Ok(keys)
    }

    /// Execute MIGRATE with the KEYS option to move a batch of keys to
    /// another node. A no-op for an empty batch.
    #[instrument(skip(self, keys), fields(node = %self.address, key_count = keys.len()))]
    async fn migrate_keys(
        &self,
        host: &str,
        port: u16,
        keys: &[String],
        timeout: Duration,
    ) -> Result<(), ValkeyError> {
        if keys.is_empty() {
            return Ok(());
        }

        // MIGRATE host port "" 0 timeout KEYS key1 key2 ...
        let mut args: Vec<String> = vec![
            host.to_string(),
            port.to_string(),
            String::new(),
            "0".to_string(),
            timeout.as_millis().to_string(),
            "KEYS".to_string(),
        ];
        args.extend(keys.iter().cloned());

        let cmd = CustomCommand::new_static("MIGRATE", ClusterHash::Random, false);
        let _: () = self.client.custom(cmd, args).await?;
        Ok(())
    }

    /// Probe which of the given keys do not exist on this node, using a
    /// pipelined EXISTS per key.
    #[instrument(skip(self, keys), fields(node = %self.address, key_count = keys.len()))]
    async fn missing_keys(&self, keys: &[String]) -> Result<Vec<String>, ValkeyError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let pipeline = self.client.pipeline();
        for key in keys {
            let _: () = pipeline.exists(key.as_str()).await?;
        }
        let counts: Vec<u64> = pipeline.all().await?;

        Ok(keys
            .iter()
            .zip(counts)
            .filter(|(_, count)| *count == 0)
            .map(|(key, _)| key.clone())
            .collect())
    }
}
