//! Mock infrastructure for driving the slot machinery without a cluster.
//!
//! `ClusterSim` holds the simulated key placement plus an ordered log of
//! every command the machinery issued. `MockNode` implements `NodeCommands`
//! against that shared state, and `MockTopologySource` serves canned
//! `CLUSTER NODES` views per address.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use valkey_slot_admin::client::{NodeCommands, SetSlotState, TopologySnapshot, ValkeyError};
use valkey_slot_admin::slots::{SlotSet, TopologySource};

/// Shared simulated cluster state.
#[derive(Debug, Default)]
pub struct ClusterSim {
    /// Key placement: address -> slot -> keys.
    pub keys: HashMap<String, HashMap<u16, Vec<String>>>,
    /// Slot ownership per registered node: address -> owned slots.
    pub owned: HashMap<String, SlotSet>,
    /// Node IDs for registered nodes: address -> node ID.
    pub ids: HashMap<String, String>,
    /// Ordered log of commands issued against any node.
    pub ops: Vec<String>,
    /// Fail the Nth MIGRATE call (1-based) with a connection error.
    pub fail_migrate_at: Option<u64>,
    migrate_calls: u64,
}

pub type SharedSim = Arc<Mutex<ClusterSim>>;

pub fn new_sim() -> SharedSim {
    Arc::new(Mutex::new(ClusterSim::default()))
}

/// Seed `count` keys into a slot on a node, returning the key names.
pub fn seed_keys(sim: &SharedSim, addr: &str, slot: u16, count: usize) -> Vec<String> {
    let keys: Vec<String> = (0..count).map(|i| format!("key-{slot}-{i}")).collect();
    sim.lock()
        .unwrap()
        .keys
        .entry(addr.to_string())
        .or_default()
        .entry(slot)
        .or_default()
        .extend(keys.iter().cloned());
    keys
}

/// Keys currently on a node, across all slots.
pub fn keys_on(sim: &SharedSim, addr: &str) -> usize {
    sim.lock()
        .unwrap()
        .keys
        .get(addr)
        .map(|slots| slots.values().map(Vec::len).sum())
        .unwrap_or(0)
}

/// Register a node's ID and starting slot ownership so the simulation
/// tracks SETSLOT NODE assignments against it. Unregistered nodes only
/// get their commands logged.
pub fn register_owner(sim: &SharedSim, addr: &str, id: &str, slot_tokens: &str) {
    let slots = if slot_tokens.is_empty() {
        SlotSet::new()
    } else {
        SlotSet::from_range_tokens(slot_tokens).expect("valid slot tokens")
    };
    let mut sim = sim.lock().unwrap();
    sim.ids.insert(addr.to_string(), id.to_string());
    sim.owned.insert(addr.to_string(), slots);
}

/// Whether a registered node currently considers itself the owner of a slot.
pub fn owns(sim: &SharedSim, addr: &str, slot: u16) -> bool {
    sim.lock()
        .unwrap()
        .owned
        .get(addr)
        .is_some_and(|slots| slots.is_set(slot))
}

/// The recorded op log.
pub fn ops(sim: &SharedSim) -> Vec<String> {
    sim.lock().unwrap().ops.clone()
}

/// Index of the first op containing `needle`, panicking when absent.
pub fn op_index(ops: &[String], needle: &str) -> usize {
    ops.iter()
        .position(|op| op.contains(needle))
        .unwrap_or_else(|| panic!("op containing {needle:?} not found in {ops:#?}"))
}

/// A `NodeCommands` handle into the simulation.
pub struct MockNode {
    addr: String,
    host: String,
    port: u16,
    sim: SharedSim,
}

impl MockNode {
    pub fn new(addr: &str, sim: SharedSim) -> Self {
        let (host, port) = addr.rsplit_once(':').expect("addr must be host:port");
        Self {
            addr: addr.to_string(),
            host: host.to_string(),
            port: port.parse().expect("port must be numeric"),
            sim,
        }
    }
}

impl NodeCommands for MockNode {
    fn address(&self) -> &str {
        &self.addr
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    async fn cluster_nodes_raw(&self) -> Result<String, ValkeyError> {
        Err(ValkeyError::Connection("not simulated".to_string()))
    }

    async fn cluster_info_raw(&self) -> Result<String, ValkeyError> {
        Err(ValkeyError::Connection("not simulated".to_string()))
    }

    async fn cluster_setslot(&self, slot: u16, state: SetSlotState) -> Result<(), ValkeyError> {
        let mut sim = self.sim.lock().unwrap();
        sim.ops.push(format!("{} SETSLOT {slot} {state}", self.addr));

        // Registered nodes apply final NODE assignments to their simulated
        // ownership view: gain the slot when the assigned ID is their own,
        // drop it otherwise.
        if let SetSlotState::Node(ref dest_id) = state
            && let Some(own_id) = sim.ids.get(&self.addr).cloned()
            && let Some(slots) = sim.owned.get_mut(&self.addr)
        {
            if own_id == *dest_id {
                if !slots.is_set(slot) {
                    slots.set(slot).expect("slot in range");
                }
            } else if slots.is_set(slot) {
                slots.unset(slot).expect("slot in range");
            }
        }
        Ok(())
    }

    async fn cluster_get_keys_in_slot(
        &self,
        slot: u16,
        count: u64,
    ) -> Result<Vec<String>, ValkeyError> {
        let mut sim = self.sim.lock().unwrap();
        sim.ops.push(format!("{} GETKEYS {slot} {count}", self.addr));
        let keys = sim
            .keys
            .get(&self.addr)
            .and_then(|slots| slots.get(&slot))
            .map(|keys| keys.iter().take(count as usize).cloned().collect())
            .unwrap_or_default();
        Ok(keys)
    }

    async fn migrate_keys(
        &self,
        host: &str,
        port: u16,
        keys: &[String],
        _timeout: Duration,
    ) -> Result<(), ValkeyError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut sim = self.sim.lock().unwrap();
        sim.migrate_calls += 1;
        if Some(sim.migrate_calls) == sim.fail_migrate_at {
            sim.ops.push(format!("{} MIGRATE-FAIL", self.addr));
            return Err(ValkeyError::Connection(
                "simulated migrate failure".to_string(),
            ));
        }

        let dest_addr = format!("{host}:{port}");
        sim.ops
            .push(format!("{} MIGRATE {} -> {dest_addr}", self.addr, keys.len()));

        let wanted: HashSet<&String> = keys.iter().collect();
        let mut moved: Vec<(u16, Vec<String>)> = Vec::new();

        if let Some(slots) = sim.keys.get_mut(&self.addr) {
            for (slot, resident) in slots.iter_mut() {
                let (taken, kept): (Vec<String>, Vec<String>) =
                    resident.drain(..).partition(|k| wanted.contains(k));
                *resident = kept;
                if !taken.is_empty() {
                    moved.push((*slot, taken));
                }
            }
        }

        let dest = sim.keys.entry(dest_addr).or_default();
        for (slot, taken) in moved {
            dest.entry(slot).or_default().extend(taken);
        }

        Ok(())
    }

    async fn missing_keys(&self, keys: &[String]) -> Result<Vec<String>, ValkeyError> {
        let sim = self.sim.lock().unwrap();
        let present: HashSet<&String> = sim
            .keys
            .get(&self.addr)
            .map(|slots| slots.values().flatten().collect())
            .unwrap_or_default();
        Ok(keys
            .iter()
            .filter(|k| !present.contains(*k))
            .cloned()
            .collect())
    }
}

/// Serves canned `CLUSTER NODES` text per address.
#[derive(Debug, Default)]
pub struct MockTopologySource {
    views: HashMap<String, String>,
}

impl MockTopologySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_view(mut self, addr: &str, raw: &str) -> Self {
        self.views.insert(addr.to_string(), raw.to_string());
        self
    }
}

impl TopologySource for MockTopologySource {
    async fn fetch_topology(&self, addr: &str) -> Result<TopologySnapshot, ValkeyError> {
        let raw = self
            .views
            .get(addr)
            .ok_or_else(|| ValkeyError::Connection(format!("no route to {addr}")))?;
        Ok(TopologySnapshot::parse(raw, addr)?)
    }
}

/// Parse a topology snapshot for migrator tests.
pub fn snapshot(raw: &str) -> TopologySnapshot {
    TopologySnapshot::parse(raw, "test:0").expect("valid topology")
}

/// Build `MockNode` clients for every address, all sharing one simulation.
pub fn clients_for(sim: &SharedSim, addrs: &[&str]) -> HashMap<String, MockNode> {
    addrs
        .iter()
        .map(|addr| (addr.to_string(), MockNode::new(addr, sim.clone())))
        .collect()
}
