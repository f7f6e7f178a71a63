use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use sriov_api::consts::WORKER_POOL;
use sriov_api::DrainProgress;
use sriov_api::MachineConfigPool;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::PauseAction;
use super::PauseStateMachine;
use super::PoolPauseError;
use crate::client::ClusterClient;
use crate::client::PoolClient;
use crate::labels::selector_matches;

/// Acquires and releases machine config pool pauses on behalf of node drains.
pub struct PoolPauseCoordinator {
    pools: Arc<dyn PoolClient>,
    cluster: Arc<dyn ClusterClient>,
    shutdown: CancellationToken,
}

impl PoolPauseCoordinator {
    pub fn new(
        pools: Arc<dyn PoolClient>,
        cluster: Arc<dyn ClusterClient>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pools,
            cluster,
            shutdown,
        }
    }

    pub async fn list_pools(&self) -> Result<Vec<MachineConfigPool>, Report<PoolPauseError>> {
        self.pools
            .list_pools()
            .await
            .change_context(PoolPauseError::ListPools)
    }

    /// Name of the pool the node belongs to.
    pub async fn pool_for_node(&self, node: &Node) -> Result<String, Report<PoolPauseError>> {
        pool_for_node(&self.list_pools().await?, node)
    }

    /// Pauses `pool` for the drain of `node` and records `MCP_Paused` on the
    /// node state. Returns once the pause is confirmed.
    ///
    /// There is no timeout: a pool that never quiesces keeps the drain
    /// waiting. Operator shutdown aborts the wait.
    #[tracing::instrument(skip(self))]
    pub async fn pause(&self, node: &str, pool: &str) -> Result<(), Report<PoolPauseError>> {
        let confirmed = CancellationToken::new();
        let mut machine = PauseStateMachine::default();
        let mut observations = self.pools.watch_pool(pool);

        loop {
            tokio::select! {
                biased;
                _ = confirmed.cancelled() => {
                    info!("machine config pool pause confirmed");
                    return Ok(());
                }
                _ = self.shutdown.cancelled() => {
                    return Err(Report::new(PoolPauseError::Cancelled {
                        pool: pool.to_string(),
                    }));
                }
                next = observations.next() => match next {
                    Some(Ok(observed)) => {
                        self.handle_observation(&mut machine, node, &observed).await;
                        if machine.is_confirmed() {
                            confirmed.cancel();
                        }
                    }
                    Some(Err(e)) => debug!("machine config pool watch error: {e:?}"),
                    None => {
                        return Err(Report::new(PoolPauseError::WatchEnded {
                            pool: pool.to_string(),
                        }));
                    }
                },
            }
        }
    }

    /// Failures are logged and leave the machine untouched; the next
    /// observation retries.
    async fn handle_observation(
        &self,
        machine: &mut PauseStateMachine,
        node: &str,
        pool: &MachineConfigPool,
    ) {
        let name = pool.name_any();
        match machine.observe(pool) {
            PauseAction::Wait => debug!(pool = %name, "waiting for machine config pool to settle"),
            PauseAction::Pause { already_paused } => {
                if !already_paused {
                    if let Err(e) = self.pools.set_paused(&name, true).await {
                        debug!(pool = %name, "failed to pause machine config pool: {e:?}");
                        return;
                    }
                }
                if let Err(e) = self
                    .cluster
                    .set_drain_progress(node, DrainProgress::McpPaused)
                    .await
                {
                    debug!(pool = %name, "failed to record paused drain progress: {e:?}");
                    return;
                }
                machine.pause_recorded(already_paused);
            }
            PauseAction::Confirm => machine.confirm(),
        }
    }

    /// Unpauses the pool. Failures are logged only.
    pub async fn resume(&self, pool: &str) {
        match self.pools.set_paused(pool, false).await {
            Ok(()) => info!(pool, "machine config pool resumed"),
            Err(e) => warn!(pool, "failed to resume machine config pool: {e:?}"),
        }
    }
}

/// A custom pool wins over `worker`, which selects every worker node.
pub fn pool_for_node(
    pools: &[MachineConfigPool],
    node: &Node,
) -> Result<String, Report<PoolPauseError>> {
    let labels = node.labels();
    let mut matching: Vec<String> = pools
        .iter()
        .filter(|pool| {
            pool.spec
                .node_selector
                .as_ref()
                .is_some_and(|selector| selector_matches(selector, labels))
        })
        .map(|pool| pool.name_any())
        .collect();

    if matching.len() > 1 {
        matching.retain(|name| name != WORKER_POOL);
    }

    match matching.len() {
        0 => Err(Report::new(PoolPauseError::NoPool {
            node: node.name_any(),
        })),
        1 => Ok(matching.remove(0)),
        _ => {
            matching.sort();
            Err(Report::new(PoolPauseError::AmbiguousPool {
                node: node.name_any(),
                pools: matching.join(", "),
            }))
        }
    }
}
