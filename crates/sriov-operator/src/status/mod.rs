//! Fleet-level status of policies and pool configs.
//!
//! [`aggregator`] rolls per-node conditions up into parent conditions,
//! [`patcher`] commits them with conflict retries and [`transitions`] turns
//! the condition diff into events.

pub mod aggregator;
pub mod patcher;
pub mod transitions;

use thiserror::Error;

pub use aggregator::compute_aggregated_status;
pub use aggregator::AggregationOutcome;
pub use aggregator::AggregationTarget;
pub use aggregator::StatusAggregator;
pub use patcher::update_status_with_events;
pub use patcher::MAX_STATUS_UPDATE_ATTEMPTS;
pub use transitions::detect_transitions;
pub use transitions::EventType;
pub use transitions::Transition;
pub use transitions::TransitionKind;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Failed to read nodes and node states for {kind} {name}")]
    SnapshotFailed { kind: String, name: String },
    #[error("Failed to update status of {kind} {name}")]
    UpdateFailed { kind: String, name: String },
    #[error("Status of {kind} {name} still conflicting after {attempts} attempts")]
    ConflictRetriesExhausted {
        kind: String,
        name: String,
        attempts: usize,
    },
}
