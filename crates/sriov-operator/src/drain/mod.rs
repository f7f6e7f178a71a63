//! Per-node drain state machine bounded by a fleet-wide drain budget.
//!
//! The per-node agent asks for a drain through the Node's intent annotation;
//! the operator records how far it got in the node state's progress
//! annotation and walks `Idle -> MCP_Paused | Draining -> Complete -> Idle`.

pub mod budget;
pub mod executor;
pub mod reconciler;
pub mod state;

use sriov_api::DrainProgress;
use thiserror::Error;

pub use budget::Admission;
pub use budget::FleetSnapshot;
pub use executor::KubeDrainer;
pub use executor::NodeDrainer;
pub use reconciler::DrainOutcome;
pub use reconciler::DrainReconciler;
pub use state::next_step;
pub use state::DrainStep;

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("Failed to read cluster state while reconciling node {node}")]
    Snapshot { node: String },
    #[error("Invalid operator configuration")]
    InvalidConfig,
    #[error("Failed to record drain progress {progress} for node {node}")]
    RecordProgress {
        node: String,
        progress: DrainProgress,
    },
    #[error("Failed to cordon node {node}")]
    Cordon { node: String },
    #[error("Failed to uncordon node {node}")]
    Uncordon { node: String },
    #[error("Failed to list pods on node {node}")]
    ListPods { node: String },
    #[error("Cannot drain node {node}: {reasons}")]
    Undrainable { node: String, reasons: String },
    #[error("Failed to evict pod {namespace}/{pod}")]
    Evict { namespace: String, pod: String },
    #[error("Pods on node {node} still present after {timeout_secs}s")]
    Timeout { node: String, timeout_secs: u64 },
    #[error("Cordon and drain of node {node} failed after {attempts} attempts")]
    RetriesExhausted { node: String, attempts: usize },
    #[error("Failed to pause the machine config pool of node {node}")]
    PoolPause { node: String },
}
