//! Topology consistency checking.
//!
//! Every master in a cluster gossips its own view of slot ownership. This
//! module fetches each master's view and compares them pairwise against a
//! deterministic baseline, reporting per-node slot differences.

use std::future::Future;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::client::types::{ClusterNode, TopologySnapshot};
use crate::client::valkey_client::ValkeyError;
use crate::metrics::SharedMetrics;

/// Source of per-node topology views.
///
/// The live implementation connects to the node and runs `CLUSTER NODES`;
/// tests substitute canned snapshots.
pub trait TopologySource {
    fn fetch_topology(
        &self,
        addr: &str,
    ) -> impl Future<Output = Result<TopologySnapshot, ValkeyError>> + Send;
}

#[derive(Error, Debug)]
pub enum ConsistencyError {
    #[error("Failed to fetch topology from {addr}: {source}")]
    Fetch {
        addr: String,
        #[source]
        source: ValkeyError,
    },

    #[error("No master nodes visible from {0}")]
    NoMasters(String),
}

/// Slot comparison for one master, as seen by one observer versus the
/// baseline.
#[derive(Debug, Clone, Serialize)]
pub struct SlotFinding {
    /// ID of the master whose slots were compared.
    pub node_id: String,
    /// Address of that master, from the baseline view.
    pub address: String,
    /// Whether the observer and baseline agree on this master's slots.
    pub equal: bool,
    /// Difference rendered as `-[missing] +[extra]` relative to the
    /// baseline. Empty when equal.
    pub diff: String,
}

/// Outcome of comparing one observer's view against the baseline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    /// Per-master slot comparisons. Consistent when every entry is equal.
    Findings { findings: Vec<SlotFinding> },
    /// The observer sees a different number of masters than the baseline.
    MasterCountMismatch { observed: usize, baseline: usize },
    /// A master from the baseline view is absent from the observer's view.
    MissingNode { node_id: String },
}

impl ComparisonOutcome {
    pub fn is_consistent(&self) -> bool {
        match self {
            ComparisonOutcome::Findings { findings } => findings.iter().all(|f| f.equal),
            _ => false,
        }
    }
}

/// One observer's comparison against the baseline.
#[derive(Debug, Clone, Serialize)]
pub struct NodeComparison {
    pub observer_id: String,
    pub observer_addr: String,
    #[serde(flatten)]
    pub outcome: ComparisonOutcome,
}

/// Full result of a consistency check.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    /// Address of the baseline master whose view the others are compared to.
    pub baseline_addr: String,
    /// Node ID of the baseline master.
    pub baseline_id: String,
    /// One comparison per non-baseline master.
    pub comparisons: Vec<NodeComparison>,
}

impl ConsistencyReport {
    /// True when every observer agrees with the baseline.
    pub fn is_consistent(&self) -> bool {
        self.comparisons.iter().all(|c| c.outcome.is_consistent())
    }
}

/// Compares slot ownership views across all masters in a cluster.
pub struct ConsistencyChecker<S: TopologySource> {
    source: S,
    metrics: SharedMetrics,
}

impl<S: TopologySource> ConsistencyChecker<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            metrics: crate::metrics::noop(),
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run a consistency check, entering the cluster through `entry_addr`.
    ///
    /// The master with the lexicographically smallest node ID serves as the
    /// baseline, so repeated checks against the same cluster compare the
    /// same views. Divergent views are recorded and the check continues;
    /// only fetch and parse failures abort it.
    #[instrument(skip(self))]
    pub async fn check(&self, entry_addr: &str) -> Result<ConsistencyReport, ConsistencyError> {
        let entry = self.fetch(entry_addr).await?;

        let mut masters = entry.masters();
        masters.sort_by(|a, b| a.id.cmp(&b.id));

        let Some(baseline_node) = masters.first().copied() else {
            return Err(ConsistencyError::NoMasters(entry_addr.to_string()));
        };
        let baseline = self.fetch(&baseline_node.address).await?;
        let baseline_masters = {
            let mut m = baseline.masters();
            m.sort_by(|a, b| a.id.cmp(&b.id));
            m
        };

        debug!(
            baseline = %baseline_node.address,
            masters = masters.len(),
            "Comparing views against baseline"
        );

        let mut comparisons = Vec::new();

        for observer in masters.iter().skip(1) {
            let view = self.fetch(&observer.address).await?;
            let outcome = compare_views(&baseline_masters, &view);

            if !outcome.is_consistent() {
                warn!(observer = %observer.address, "Observer disagrees with baseline");
            }

            comparisons.push(NodeComparison {
                observer_id: observer.id.clone(),
                observer_addr: observer.address.clone(),
                outcome,
            });
        }

        let report = ConsistencyReport {
            baseline_addr: baseline_node.address.clone(),
            baseline_id: baseline_node.id.clone(),
            comparisons,
        };

        self.metrics.check_completed(report.is_consistent());
        info!(
            consistent = report.is_consistent(),
            observers = report.comparisons.len(),
            "Consistency check complete"
        );

        Ok(report)
    }

    async fn fetch(&self, addr: &str) -> Result<TopologySnapshot, ConsistencyError> {
        self.source
            .fetch_topology(addr)
            .await
            .map_err(|source| ConsistencyError::Fetch {
                addr: addr.to_string(),
                source,
            })
    }
}

/// Compare one observer's view against the baseline's sorted master list.
fn compare_views(
    baseline_masters: &[&ClusterNode],
    view: &TopologySnapshot,
) -> ComparisonOutcome {
    let observed = view.masters().len();
    if observed != baseline_masters.len() {
        return ComparisonOutcome::MasterCountMismatch {
            observed,
            baseline: baseline_masters.len(),
        };
    }

    let mut findings = Vec::with_capacity(baseline_masters.len());

    for expected in baseline_masters {
        let Some(seen) = view.get_node(&expected.id) else {
            return ComparisonOutcome::MissingNode {
                node_id: expected.id.clone(),
            };
        };

        let diff = seen.slots.diff(&expected.slots);
        findings.push(SlotFinding {
            node_id: expected.id.clone(),
            address: expected.address.clone(),
            equal: diff.is_equal(),
            diff: diff.to_string(),
        });
    }

    ComparisonOutcome::Findings { findings }
}
