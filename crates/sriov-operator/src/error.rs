use error_stack::Report;
use thiserror::Error;

use crate::drain::DrainError;
use crate::status::StatusError;

/// Errors returned by the API seams in [`crate::client`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[error("Conflicting write to {kind} {name}")]
    Conflict { kind: String, name: String },
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },
    #[error("Request on {kind} {name} failed")]
    RequestFailed { kind: String, name: String },
    #[error("Failed to watch {kind} {name}: {message}")]
    WatchFailed {
        kind: String,
        name: String,
        message: String,
    },
}

impl ClientError {
    /// Maps a kube error on one object to the matching context.
    pub fn from_kube(err: &kube::Error, kind: &str, name: &str) -> Self {
        let kind = kind.to_string();
        let name = name.to_string();
        match err {
            kube::Error::Api(response) if response.code == 409 => Self::Conflict { kind, name },
            kube::Error::Api(response) if response.code == 404 => Self::NotFound { kind, name },
            _ => Self::RequestFailed { kind, name },
        }
    }
}

/// Whether the report was caused by an optimistic-concurrency conflict.
pub fn is_conflict(report: &Report<ClientError>) -> bool {
    matches!(report.current_context(), ClientError::Conflict { .. })
}

/// Error handed to the kube-runtime controller, naming the failed operation
/// and the object key.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("drain reconcile of node {key} failed: {report:?}")]
    Drain {
        key: String,
        report: Report<DrainError>,
    },
    #[error("status aggregation of {key} failed: {report:?}")]
    Status {
        key: String,
        report: Report<StatusError>,
    },
}
