//! Types for parsed Valkey cluster topology.
//!
//! These types represent the parsed output of `CLUSTER NODES`: one
//! [`ClusterNode`] row per line, bundled into a [`TopologySnapshot`] that
//! remembers which node produced the report. Slot ownership is safety
//! critical, so a malformed config epoch or slot token invalidates the whole
//! snapshot instead of being skipped.

use thiserror::Error;

use crate::slots::slot_set::{SlotSet, SlotSetError, TOTAL_SLOTS};

/// Errors that can occur when parsing cluster topology data.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid cluster nodes line: {0}")]
    InvalidClusterNodes(String),

    #[error("invalid config epoch {value:?} for node {node_id}")]
    InvalidEpoch { node_id: String, value: String },

    #[error("invalid cluster info format: {0}")]
    InvalidClusterInfo(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid slot data: {0}")]
    Slot(#[from] SlotSetError),
}

/// Role of a cluster node as reported in its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    /// Node is a master serving hash slots.
    Master,
    /// Node is a replica of a master.
    Replica,
    /// Role not present in the flags (handshake, junk row).
    #[default]
    None,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Replica => write!(f, "slave"),
            NodeRole::None => write!(f, "none"),
        }
    }
}

/// State bits for a cluster node, from the comma-separated flags field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlags {
    /// This row describes the node that produced the report.
    pub myself: bool,
    /// Node is suspected failed by the reporting node (`fail?`).
    pub pfail: bool,
    /// Node is confirmed failed.
    pub fail: bool,
    /// Node has no known address.
    pub noaddr: bool,
    /// Node is in the handshake phase.
    pub handshake: bool,
}

impl NodeFlags {
    /// Check that no failure-related bits are set.
    pub fn is_normal(&self) -> bool {
        !self.pfail && !self.fail && !self.noaddr && !self.handshake
    }
}

/// Parse the flags field, yielding the role and the state bits.
fn parse_flags(flags_str: &str) -> (NodeRole, NodeFlags) {
    let mut role = NodeRole::None;
    let mut flags = NodeFlags::default();

    for flag in flags_str.split(',') {
        match flag.trim() {
            "master" => role = NodeRole::Master,
            "slave" => role = NodeRole::Replica,
            "myself" => flags.myself = true,
            "fail?" => flags.pfail = true,
            "fail" => flags.fail = true,
            "noaddr" => flags.noaddr = true,
            "handshake" => flags.handshake = true,
            _ => {}
        }
    }

    (role, flags)
}

/// One row from a `CLUSTER NODES` report.
#[derive(Debug, Clone)]
pub struct ClusterNode {
    /// Opaque node identifier, stable across restarts.
    pub id: String,
    /// IP address and client port (cluster bus port stripped).
    pub address: String,
    /// Role from the flags field.
    pub role: NodeRole,
    /// State bits from the flags field.
    pub flags: NodeFlags,
    /// Master node ID if this is a replica.
    pub master_id: Option<String>,
    /// Ping sent timestamp.
    pub ping_sent: i64,
    /// Pong received timestamp.
    pub pong_recv: i64,
    /// Config epoch, used to break ties on ownership claims.
    pub config_epoch: i64,
    /// Whether the reporting node has a live link to this node.
    pub connected: bool,
    /// Slots owned by this node (empty for replicas).
    pub slots: SlotSet,
}

/// First field-level difference between two node rows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field} not the same ({left}, {right})")]
pub struct NodeMismatch {
    pub field: &'static str,
    pub left: String,
    pub right: String,
}

impl ClusterNode {
    /// Check if this is a master node.
    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    /// Check if this is a replica node.
    pub fn is_replica(&self) -> bool {
        self.role == NodeRole::Replica
    }

    /// Check if this row describes the reporting node itself.
    pub fn is_myself(&self) -> bool {
        self.flags.myself
    }

    /// Check if the node is connected and free of failure bits.
    pub fn is_healthy(&self) -> bool {
        self.flags.is_normal() && self.connected
    }

    /// Number of slots this node owns.
    pub fn slot_count(&self) -> usize {
        self.slots.count()
    }

    /// Compare two rows field by field, reporting the first difference.
    ///
    /// The config epoch of a replica comes from its master, so epochs are
    /// only compared for masters.
    pub fn check_equal(&self, other: &ClusterNode) -> Result<(), NodeMismatch> {
        fn mismatch(
            field: &'static str,
            left: impl std::fmt::Display,
            right: impl std::fmt::Display,
        ) -> Result<(), NodeMismatch> {
            Err(NodeMismatch {
                field,
                left: left.to_string(),
                right: right.to_string(),
            })
        }

        if self.id != other.id {
            return mismatch("id", &self.id, &other.id);
        }
        if self.address != other.address {
            return mismatch("address", &self.address, &other.address);
        }
        if self.role != other.role {
            return mismatch("role", self.role, other.role);
        }
        if self.master_id != other.master_id {
            return mismatch(
                "master_id",
                self.master_id.as_deref().unwrap_or("-"),
                other.master_id.as_deref().unwrap_or("-"),
            );
        }
        if self.connected != other.connected {
            return mismatch("connected", self.connected, other.connected);
        }
        if self.is_master() && self.config_epoch != other.config_epoch {
            return mismatch("config_epoch", self.config_epoch, other.config_epoch);
        }
        if self.slots != other.slots {
            return mismatch(
                "slots",
                self.slots.to_range_string(),
                other.slots.to_range_string(),
            );
        }
        Ok(())
    }

    /// Parse a single line from `CLUSTER NODES` output.
    ///
    /// Layout: `id address@busport flags master-id ping-sent pong-recv
    /// config-epoch link-state [slot-ranges...]`. Rows with fewer than 8
    /// fields come from replicas without slot data and are kept with an empty
    /// slot set. Trailing tokens up to an optional bracketed migration
    /// annotation are slot ranges.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(id) = parts.first() else {
            return Err(ParseError::InvalidClusterNodes(format!(
                "empty line: {line:?}"
            )));
        };
        let id = id.to_string();

        // Bus port is separated by '@'; only the client address matters here.
        let address = parts
            .get(1)
            .map(|a| a.split('@').next().unwrap_or(a).to_string())
            .unwrap_or_default();

        if parts.len() < 8 {
            let (role, flags) = parts
                .get(2)
                .map(|f| parse_flags(f))
                .unwrap_or((NodeRole::Replica, NodeFlags::default()));
            return Ok(ClusterNode {
                id,
                address,
                role: if role == NodeRole::None {
                    NodeRole::Replica
                } else {
                    role
                },
                flags,
                master_id: None,
                ping_sent: 0,
                pong_recv: 0,
                config_epoch: 0,
                connected: false,
                slots: SlotSet::new(),
            });
        }

        let (role, flags) = parse_flags(parts[2]);

        let master_id = if parts[3] == "-" {
            None
        } else {
            Some(parts[3].to_string())
        };

        let ping_sent = parts[4].parse().unwrap_or(0);
        let pong_recv = parts[5].parse().unwrap_or(0);

        // Epoch correctness is safety-critical for ownership decisions, so a
        // malformed epoch aborts the parse rather than defaulting.
        let config_epoch = parts[6].parse().map_err(|_| ParseError::InvalidEpoch {
            node_id: id.clone(),
            value: parts[6].to_string(),
        })?;

        let connected = parts[7] == "connected";

        let mut slots = SlotSet::new();
        for token in &parts[8..] {
            // A bracketed token is an importing/migrating annotation, not an
            // owned range.
            if token.starts_with('[') {
                break;
            }
            slots.parse_range(token)?;
        }

        Ok(ClusterNode {
            id,
            address,
            role,
            flags,
            master_id,
            ping_sent,
            pong_recv,
            config_epoch,
            connected,
            slots,
        })
    }
}

/// Parsed `CLUSTER NODES` output from one node, at a point in time.
///
/// Two snapshots taken from different nodes may legitimately disagree while
/// gossip converges; deciding whether a disagreement is drift is the
/// consistency checker's job.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    /// Address of the node that produced this report.
    pub observed_from: String,
    /// All node rows in the report.
    pub nodes: Vec<ClusterNode>,
}

impl TopologySnapshot {
    /// Parse raw `CLUSTER NODES` output.
    pub fn parse(raw: &str, observed_from: impl Into<String>) -> Result<Self, ParseError> {
        let nodes: Vec<ClusterNode> = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ClusterNode::parse_line)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TopologySnapshot {
            observed_from: observed_from.into(),
            nodes,
        })
    }

    /// All master rows.
    pub fn masters(&self) -> Vec<&ClusterNode> {
        self.nodes.iter().filter(|n| n.is_master()).collect()
    }

    /// All replica rows.
    pub fn replicas(&self) -> Vec<&ClusterNode> {
        self.nodes.iter().filter(|n| n.is_replica()).collect()
    }

    /// The row describing the reporting node, if flagged.
    pub fn myself(&self) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.is_myself())
    }

    /// Look up a row by node ID. Node order is not guaranteed to match across
    /// two reports, so matching is always by ID.
    pub fn get_node(&self, node_id: &str) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// The master currently claiming a slot, if any.
    pub fn owner_of_slot(&self, slot: u16) -> Option<&ClusterNode> {
        self.nodes
            .iter()
            .find(|n| n.is_master() && n.slots.is_set(slot))
    }

    /// Total slots claimed across all masters.
    pub fn total_slots_assigned(&self) -> usize {
        self.masters().iter().map(|m| m.slot_count()).sum()
    }

    /// Check if every slot has a claimed owner in this view.
    pub fn all_slots_assigned(&self) -> bool {
        self.total_slots_assigned() == TOTAL_SLOTS as usize
    }
}
