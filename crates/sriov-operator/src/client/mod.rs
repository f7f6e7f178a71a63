//! Narrow seams between the operator core and the API server.
//!
//! Every component talks to the cluster through one of these traits so that
//! reconcile logic runs unchanged against the kube-backed implementations in
//! [`kube_client`] and the in-memory fakes used by tests.

pub mod kube_client;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use error_stack::Report;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::ObjectReference;
use sriov_api::DrainProgress;
use sriov_api::MachineConfigPool;
use sriov_api::SriovNetworkNodeState;
use sriov_api::SriovOperatorConfig;

use crate::error::ClientError;
use crate::status::EventType;

pub use self::kube_client::init_kube_client;
pub use self::kube_client::KubeClusterClient;
pub use self::kube_client::KubeEventSink;
pub use self::kube_client::KubePoolClient;
pub use self::kube_client::KubeStatusApi;

/// Nodes, node states and the operator config singleton.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>, Report<ClientError>>;

    async fn get_node(&self, name: &str) -> Result<Option<Node>, Report<ClientError>>;

    /// Node states in the operator namespace.
    async fn list_node_states(&self) -> Result<Vec<SriovNetworkNodeState>, Report<ClientError>>;

    async fn get_node_state(
        &self,
        name: &str,
    ) -> Result<Option<SriovNetworkNodeState>, Report<ClientError>>;

    /// Writes the drain progress annotation of one node state.
    async fn set_drain_progress(
        &self,
        name: &str,
        progress: DrainProgress,
    ) -> Result<(), Report<ClientError>>;

    async fn get_operator_config(&self) -> Result<Option<SriovOperatorConfig>, Report<ClientError>>;
}

/// Machine config pools owned by the machine config operator.
#[async_trait]
pub trait PoolClient: Send + Sync {
    async fn list_pools(&self) -> Result<Vec<MachineConfigPool>, Report<ClientError>>;

    async fn set_paused(&self, name: &str, paused: bool) -> Result<(), Report<ClientError>>;

    /// Stream of observations of one pool, starting with its current state.
    fn watch_pool(
        &self,
        name: &str,
    ) -> BoxStream<'static, Result<MachineConfigPool, Report<ClientError>>>;
}

/// Status subresource access for one parent kind.
#[async_trait]
pub trait StatusApi<K>: Send + Sync {
    async fn get(&self, name: &str) -> Result<K, Report<ClientError>>;

    /// Merge-patches the status of `updated`, guarded by the resource version
    /// of `base`. A stale base yields [`ClientError::Conflict`].
    async fn patch_status(&self, base: &K, updated: &K) -> Result<K, Report<ClientError>>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        object: &ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Report<ClientError>>;
}
