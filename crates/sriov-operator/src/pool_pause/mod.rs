//! Pausing machine config pools around a node drain.
//!
//! On OpenShift the machine config operator reboots nodes on its own when a
//! pool's rendered config changes. Draining a node while its pool is rolling
//! out would race with that, so the pool is paused first and resumed once the
//! drain is undone.

pub mod coordinator;
pub mod machine;

use thiserror::Error;

pub use coordinator::PoolPauseCoordinator;
pub use machine::PauseAction;
pub use machine::PausePhase;
pub use machine::PauseStateMachine;

#[derive(Debug, Error)]
pub enum PoolPauseError {
    #[error("Failed to list machine config pools")]
    ListPools,
    #[error("Node {node} matches no machine config pool")]
    NoPool { node: String },
    #[error("Node {node} matches several machine config pools: {pools}")]
    AmbiguousPool { node: String, pools: String },
    #[error("Watch of machine config pool {pool} ended before the pause was confirmed")]
    WatchEnded { pool: String },
    #[error("Pausing machine config pool {pool} was cancelled")]
    Cancelled { pool: String },
}
