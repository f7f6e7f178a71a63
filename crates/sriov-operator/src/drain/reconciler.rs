use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use sriov_api::consts::DEFAULT_OPERATOR_CONFIG_NAME;
use sriov_api::DrainIntent;
use sriov_api::DrainProgress;
use sriov_api::SriovOperatorConfig;
use tokio_retry::Retry;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::next_step;
use super::Admission;
use super::DrainError;
use super::DrainStep;
use super::FleetSnapshot;
use super::NodeDrainer;
use crate::client::ClusterClient;
use crate::config::validate_configuration_mode;
use crate::config::OperatorSettings;
use crate::pool_pause::coordinator::pool_for_node;
use crate::pool_pause::PoolPauseCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing to do for this node right now.
    Nothing,
    /// Drain budget exhausted; try again later.
    Deferred { in_flight: usize },
    /// Progress moved to the given value.
    Progressed(DrainProgress),
}

/// Drives one node through the drain state machine per call.
pub struct DrainReconciler {
    cluster: Arc<dyn ClusterClient>,
    drainer: Arc<dyn NodeDrainer>,
    /// Set on platforms that pause machine config pools around drains.
    pools: Option<PoolPauseCoordinator>,
    settings: OperatorSettings,
}

impl DrainReconciler {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        drainer: Arc<dyn NodeDrainer>,
        pools: Option<PoolPauseCoordinator>,
        settings: OperatorSettings,
    ) -> Self {
        Self {
            cluster,
            drainer,
            pools,
            settings,
        }
    }

    pub fn settings(&self) -> &OperatorSettings {
        &self.settings
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile_node(&self, name: &str) -> Result<DrainOutcome, Report<DrainError>> {
        let snapshot_error = || DrainError::Snapshot {
            node: name.to_string(),
        };

        let Some(node) = self
            .cluster
            .get_node(name)
            .await
            .change_context_lazy(snapshot_error)?
        else {
            debug!("node is gone");
            return Ok(DrainOutcome::Nothing);
        };
        let Some(state) = self
            .cluster
            .get_node_state(name)
            .await
            .change_context_lazy(snapshot_error)?
        else {
            debug!("node has no node state yet");
            return Ok(DrainOutcome::Nothing);
        };

        let intent = match DrainIntent::from_annotations(node.metadata.annotations.as_ref()) {
            Ok(intent) => intent,
            Err(raw) => {
                warn!(intent = %raw, "ignoring unknown drain intent");
                return Ok(DrainOutcome::Nothing);
            }
        };

        let progress = match state.drain_progress() {
            Some(progress) => progress,
            None => {
                self.record(name, DrainProgress::Idle).await?;
                DrainProgress::Idle
            }
        };

        let config = self
            .cluster
            .get_operator_config()
            .await
            .change_context_lazy(snapshot_error)?
            .unwrap_or_else(|| SriovOperatorConfig::new(DEFAULT_OPERATOR_CONFIG_NAME, Default::default()));
        validate_configuration_mode(config.spec.configuration_mode, self.settings.flavor)
            .change_context(DrainError::InvalidConfig)?;

        let step = next_step(intent, progress);
        debug!(%intent, %progress, ?step, "evaluated drain step");

        match step {
            DrainStep::Idle | DrainStep::AwaitAgent => Ok(DrainOutcome::Nothing),
            DrainStep::Ignore => {
                debug!("legacy agent drains on its own");
                Ok(DrainOutcome::Nothing)
            }
            DrainStep::Admit => {
                self.admit(&node, config.spec.max_parallel_node_configuration)
                    .await
            }
            DrainStep::Drain => self.drain(name, config.spec.disable_drain).await,
            DrainStep::Complete => self.complete(&node, config.spec.disable_drain).await,
        }
    }

    async fn admit(&self, node: &Node, max_parallel: u32) -> Result<DrainOutcome, Report<DrainError>> {
        let name = node.name_any();
        let pool_error = || DrainError::PoolPause { node: name.clone() };

        // resolved before admission so a node outside every pool never
        // takes a slot
        let pool = match &self.pools {
            Some(pools) => Some(pools.pool_for_node(node).await.change_context_lazy(pool_error)?),
            None => None,
        };

        let snapshot = self.fleet(&name).await?;
        if let Admission::Defer { in_flight } = snapshot.admission(&name, max_parallel) {
            info!(in_flight, max_parallel, "drain deferred, budget exhausted");
            return Ok(DrainOutcome::Deferred { in_flight });
        }

        match (&self.pools, pool) {
            (Some(pools), Some(pool)) => {
                info!(%pool, "drain admitted, pausing machine config pool");
                pools
                    .pause(&name, &pool)
                    .await
                    .change_context_lazy(pool_error)?;
                Ok(DrainOutcome::Progressed(DrainProgress::McpPaused))
            }
            _ => {
                info!("drain admitted");
                self.record(&name, DrainProgress::Draining).await?;
                Ok(DrainOutcome::Progressed(DrainProgress::Draining))
            }
        }
    }

    async fn drain(&self, name: &str, disable_drain: bool) -> Result<DrainOutcome, Report<DrainError>> {
        if disable_drain {
            info!("drain disabled in operator config, skipping cordon and eviction");
        } else {
            let retry = &self.settings.drain.retry;
            Retry::start(retry.delays(), || async {
                let attempt = async {
                    self.drainer.cordon_or_uncordon(name, true).await?;
                    self.drainer.drain(name).await
                };
                attempt.await.inspect_err(|e| warn!("cordon and drain attempt failed: {e:?}"))
            })
            .await
            .change_context_lazy(|| DrainError::RetriesExhausted {
                node: name.to_string(),
                attempts: retry.attempts,
            })?;
        }

        self.record(name, DrainProgress::Complete).await?;
        Ok(DrainOutcome::Progressed(DrainProgress::Complete))
    }

    async fn complete(&self, node: &Node, disable_drain: bool) -> Result<DrainOutcome, Report<DrainError>> {
        let name = node.name_any();

        if !disable_drain {
            self.drainer.cordon_or_uncordon(&name, false).await?;
        }

        if let Some(pools) = &self.pools {
            if let Err(e) = self.resume_pool(pools, node).await {
                warn!("machine config pool not resumed: {e:?}");
            }
        }

        self.record(&name, DrainProgress::Idle).await?;
        info!("drain released");
        Ok(DrainOutcome::Progressed(DrainProgress::Idle))
    }

    /// Leaves the pool paused while another of its nodes still drains.
    async fn resume_pool(&self, pools: &PoolPauseCoordinator, node: &Node) -> Result<(), Report<DrainError>> {
        let name = node.name_any();
        let pool_error = || DrainError::PoolPause { node: name.clone() };

        let all_pools = pools.list_pools().await.change_context_lazy(pool_error)?;
        let pool = pool_for_node(&all_pools, node).change_context_lazy(pool_error)?;

        let nodes = self
            .cluster
            .list_nodes()
            .await
            .change_context_lazy(|| DrainError::Snapshot { node: name.clone() })?;
        let states = self
            .cluster
            .list_node_states()
            .await
            .change_context_lazy(|| DrainError::Snapshot { node: name.clone() })?;
        let snapshot = FleetSnapshot::build(&nodes, &states);

        let sibling = nodes.iter().find(|other| {
            let other_name = other.name_any();
            other_name != name
                && snapshot
                    .get(&other_name)
                    .is_some_and(|entry| entry.progress.is_in_flight())
                && pool_for_node(&all_pools, other).is_ok_and(|p| p == pool)
        });

        match sibling {
            Some(other) => info!(
                %pool,
                sibling = %other.name_any(),
                "machine config pool left paused for another drain"
            ),
            None => pools.resume(&pool).await,
        }
        Ok(())
    }

    async fn fleet(&self, name: &str) -> Result<FleetSnapshot, Report<DrainError>> {
        let snapshot_error = || DrainError::Snapshot {
            node: name.to_string(),
        };
        let nodes = self
            .cluster
            .list_nodes()
            .await
            .change_context_lazy(snapshot_error)?;
        let states = self
            .cluster
            .list_node_states()
            .await
            .change_context_lazy(snapshot_error)?;
        let mut snapshot = FleetSnapshot::build(&nodes, &states);

        if let Some(pools) = &self.pools {
            let all_pools = pools
                .list_pools()
                .await
                .change_context_lazy(|| DrainError::PoolPause {
                    node: name.to_string(),
                })?;
            for other in &nodes {
                if pool_for_node(&all_pools, other).is_err() {
                    debug!(node = %other.name_any(), "no machine config pool, not competing for a drain slot");
                    snapshot.exclude(&other.name_any());
                }
            }
        }
        Ok(snapshot)
    }

    async fn record(&self, name: &str, progress: DrainProgress) -> Result<(), Report<DrainError>> {
        self.cluster
            .set_drain_progress(name, progress)
            .await
            .change_context_lazy(|| DrainError::RecordProgress {
                node: name.to_string(),
                progress,
            })?;
        info!(%progress, "drain progress recorded");
        Ok(())
    }
}
