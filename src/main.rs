//! valkey-slot-admin - cluster slot administration for Valkey/Redis clusters.
//!
//! Subcommands:
//! - `nodes`: show the topology as one node reports it
//! - `check`: compare slot ownership views across all masters
//! - `migrate`: move one slot to a destination master
//! - `rebalance`: move slots until a master owns a target slot set
//! - `seed`: write random probe keys to a node
//!
//! Exit codes: 0 on success, 1 on error, 2 when a check finds divergence or
//! a rebalance run with `--continue-on-error` leaves failed slots.

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::error;

use valkey_slot_admin::client::{close_all, gen_keys, wait_for_keys};
use valkey_slot_admin::{
    ConsistencyChecker, ConsistencyReport, KeyBatchTransfer, RebalanceOptions, SlotMigrator,
    SlotSet, TopologySource, ValkeyConnector,
};

const EXIT_DIVERGED: i32 = 2;

#[derive(Parser)]
#[command(name = "valkey-slot-admin", version, about = "Slot administration for Valkey/Redis clusters")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Username for AUTH
    #[arg(long, global = true)]
    username: Option<String>,

    /// Password for AUTH
    #[arg(long, global = true, env = "VALKEY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show the cluster topology as one node reports it
    Nodes {
        /// Any node in the cluster, as host:port
        addr: String,
    },

    /// Compare slot ownership views across all masters
    Check {
        /// Any node in the cluster, as host:port
        addr: String,
    },

    /// Migrate a single slot to a destination master
    Migrate {
        /// Any node in the cluster, as host:port
        addr: String,

        /// Slot to move
        #[arg(long)]
        slot: u16,

        /// Node ID of the destination master
        #[arg(long)]
        dest: String,

        /// Keys per MIGRATE batch
        #[arg(long, default_value_t = valkey_slot_admin::slots::DEFAULT_BATCH_SIZE)]
        batch_size: u64,

        /// Per-MIGRATE timeout in seconds
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },

    /// Seed random probe keys into a node
    Seed {
        /// Node to write to, as host:port
        addr: String,

        /// Number of keys to write
        #[arg(long, default_value_t = 1000)]
        count: usize,

        /// Key name prefix
        #[arg(long, default_value = "probe")]
        prefix: String,

        /// Wait up to this many seconds for the keys to become visible
        #[arg(long)]
        verify_secs: Option<u64>,
    },

    /// Migrate slots until the destination master owns the whole target set
    Rebalance {
        /// Any node in the cluster, as host:port
        addr: String,

        /// Node ID of the destination master
        #[arg(long)]
        dest: String,

        /// Target slots, e.g. "0-4095 12000"
        #[arg(long)]
        slots: String,

        /// Keep going when a slot fails to migrate
        #[arg(long)]
        continue_on_error: bool,

        /// Keys per MIGRATE batch
        #[arg(long, default_value_t = valkey_slot_admin::slots::DEFAULT_BATCH_SIZE)]
        batch_size: u64,

        /// Per-MIGRATE timeout in seconds
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("valkey_slot_admin=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut connector = ValkeyConnector::new();
    if let Some(password) = cli.password.clone() {
        connector = connector.with_auth(cli.username.clone(), password);
    }

    match cli.command {
        Command::Nodes { addr } => {
            let snapshot = connector.fetch_topology(&addr).await?;
            print_topology(&snapshot, cli.json);
        }

        Command::Check { addr } => {
            let checker = ConsistencyChecker::new(connector);
            let report = checker.check(&addr).await?;
            print_report(&report, cli.json)?;
            if !report.is_consistent() {
                std::process::exit(EXIT_DIVERGED);
            }
        }

        Command::Migrate {
            addr,
            slot,
            dest,
            batch_size,
            timeout_secs,
        } => {
            let transfer = KeyBatchTransfer::new()
                .with_batch_size(batch_size)
                .with_timeout(Duration::from_secs(timeout_secs));

            let snapshot = connector.fetch_topology(&addr).await?;
            let clients = connector.connect_masters(&snapshot).await?;
            let migrator = SlotMigrator::new(snapshot, clients).with_transfer(transfer);

            let result = migrator.migrate_slot(slot, &dest).await;
            close_all(migrator.into_clients()).await;
            let keys = result?;

            if cli.json {
                println!("{}", json!({ "slot": slot, "dest": dest, "keys_moved": keys }));
            } else {
                println!("slot {slot} -> {dest}: {keys} keys moved");
            }
        }

        Command::Seed {
            addr,
            count,
            prefix,
            verify_secs,
        } => {
            let client = connector.connect(&addr).await?;
            let keys = gen_keys(&prefix, count);
            let result = async {
                client.set_keys(&keys).await?;
                if let Some(secs) = verify_secs {
                    wait_for_keys(&client, &keys, Duration::from_secs(secs)).await?;
                }
                Ok::<_, Box<dyn std::error::Error>>(())
            }
            .await;
            client.close().await?;
            result?;

            if cli.json {
                println!("{}", json!({ "addr": addr, "keys_written": count }));
            } else {
                println!("wrote {count} keys to {addr}");
            }
        }

        Command::Rebalance {
            addr,
            dest,
            slots,
            continue_on_error,
            batch_size,
            timeout_secs,
        } => {
            let target = SlotSet::from_range_tokens(&slots)?;
            let transfer = KeyBatchTransfer::new()
                .with_batch_size(batch_size)
                .with_timeout(Duration::from_secs(timeout_secs));
            let options = RebalanceOptions { continue_on_error };

            let snapshot = connector.fetch_topology(&addr).await?;
            let clients = connector.connect_masters(&snapshot).await?;
            let migrator = SlotMigrator::new(snapshot, clients).with_transfer(transfer);

            let result = migrator.rebalance(&dest, &target, &options).await;
            close_all(migrator.into_clients()).await;
            let summary = result?;

            if cli.json {
                println!(
                    "{}",
                    json!({
                        "dest": dest,
                        "slots_migrated": summary.slots_migrated,
                        "slots_skipped": summary.slots_skipped,
                        "keys_moved": summary.keys_moved,
                        "failed_slots": summary.failed_slots,
                    })
                );
            } else {
                println!(
                    "migrated {} slots ({} keys), skipped {}, failed {}",
                    summary.slots_migrated,
                    summary.keys_moved,
                    summary.slots_skipped,
                    summary.failed_slots.len()
                );
                for (slot, err) in &summary.failed_slots {
                    error!(slot = *slot, error = %err, "Slot failed");
                }
            }

            if summary.has_failures() {
                std::process::exit(EXIT_DIVERGED);
            }
        }
    }

    Ok(())
}

fn print_topology(snapshot: &valkey_slot_admin::TopologySnapshot, as_json: bool) {
    if as_json {
        let nodes: Vec<_> = snapshot
            .nodes
            .iter()
            .map(|n| {
                json!({
                    "id": n.id,
                    "address": n.address,
                    "role": n.role.to_string(),
                    "master_id": n.master_id,
                    "config_epoch": n.config_epoch,
                    "connected": n.connected,
                    "slots": n.slots.to_range_string(),
                })
            })
            .collect();
        println!(
            "{}",
            json!({ "observed_from": snapshot.observed_from, "nodes": nodes })
        );
        return;
    }

    for node in &snapshot.nodes {
        let slots = node.slots.to_range_string();
        let slots = if slots.is_empty() { "-".to_string() } else { slots };
        println!(
            "{} {} {} epoch={} {}",
            node.id, node.address, node.role, node.config_epoch, slots
        );
    }
}

fn print_report(report: &ConsistencyReport, as_json: bool) -> Result<(), serde_json::Error> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("baseline: {} ({})", report.baseline_id, report.baseline_addr);
    for comparison in &report.comparisons {
        let status = if comparison.outcome.is_consistent() {
            "ok"
        } else {
            "DIVERGED"
        };
        println!(
            "observer {} ({}): {status}",
            comparison.observer_id, comparison.observer_addr
        );

        use valkey_slot_admin::slots::ComparisonOutcome;
        match &comparison.outcome {
            ComparisonOutcome::Findings { findings } => {
                for finding in findings.iter().filter(|f| !f.equal) {
                    println!("  {} {}", finding.node_id, finding.diff);
                }
            }
            ComparisonOutcome::MasterCountMismatch { observed, baseline } => {
                println!("  sees {observed} masters, baseline sees {baseline}");
            }
            ComparisonOutcome::MissingNode { node_id } => {
                println!("  does not know node {node_id}");
            }
        }
    }

    Ok(())
}
