//! Rolls per-node conditions up into policy and pool-config status.

use std::collections::HashMap;
use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::Resource;
use kube::ResourceExt;
use sriov_api::consts::*;
use sriov_api::AggregatedStatus;
use sriov_api::SriovNetworkNodePolicy;
use sriov_api::SriovNetworkNodeState;
use sriov_api::SriovNetworkPoolConfig;
use tracing::debug;
use tracing::info;

use super::update_status_with_events;
use super::StatusError;
use crate::client::ClusterClient;
use crate::client::EventSink;
use crate::client::StatusApi;
use crate::conditions::conditions_equal;
use crate::conditions::is_condition_true;
use crate::conditions::set_condition;
use crate::labels::optional_selector_matches;
use crate::labels::selector_from_map;

/// Parent resource carrying an aggregated node status.
pub trait AggregationTarget: Resource<DynamicType = ()> + Clone + Send + Sync + 'static {
    /// `None` selects every node.
    fn node_selector(&self) -> Option<LabelSelector>;

    fn aggregated_status(&self) -> Option<&AggregatedStatus>;

    fn set_aggregated_status(&mut self, status: AggregatedStatus);

    /// Whether this object takes part in node status aggregation at all.
    fn is_aggregated(&self) -> bool {
        true
    }

    fn conditions(&self) -> &[Condition] {
        self.aggregated_status()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        let mut status = self.aggregated_status().cloned().unwrap_or_default();
        status.conditions = conditions;
        self.set_aggregated_status(status);
    }
}

impl AggregationTarget for SriovNetworkNodePolicy {
    fn node_selector(&self) -> Option<LabelSelector> {
        Some(selector_from_map(&self.spec.node_selector))
    }

    fn aggregated_status(&self) -> Option<&AggregatedStatus> {
        self.status.as_ref()
    }

    fn set_aggregated_status(&mut self, status: AggregatedStatus) {
        self.status = Some(status);
    }
}

impl AggregationTarget for SriovNetworkPoolConfig {
    fn node_selector(&self) -> Option<LabelSelector> {
        self.spec.node_selector.clone()
    }

    fn aggregated_status(&self) -> Option<&AggregatedStatus> {
        self.status.as_ref()
    }

    fn set_aggregated_status(&mut self, status: AggregatedStatus) {
        self.status = Some(status);
    }

    fn is_aggregated(&self) -> bool {
        !self.is_ovs_hardware_offload()
    }
}

/// Computes matched and ready counts plus the three fleet conditions.
///
/// Matched nodes without a node state count as matched but never as ready,
/// progressing or degraded.
pub fn compute_aggregated_status(
    nodes: &[Node],
    node_states: &[SriovNetworkNodeState],
    selector: Option<&LabelSelector>,
    generation: i64,
) -> AggregatedStatus {
    let states: HashMap<String, &SriovNetworkNodeState> = node_states
        .iter()
        .map(|state| (state.name_any(), state))
        .collect();
    let empty = Default::default();

    let mut matched = 0;
    let mut ready = 0;
    let mut progressing = 0;
    let mut degraded = 0;

    for node in nodes {
        let labels = node.metadata.labels.as_ref().unwrap_or(&empty);
        if !optional_selector_matches(selector, labels) {
            continue;
        }
        matched += 1;

        let Some(state) = states.get(&node.name_any()) else {
            continue;
        };
        let conditions = state.conditions();
        if is_condition_true(conditions, CONDITION_READY) {
            ready += 1;
        }
        if is_condition_true(conditions, CONDITION_PROGRESSING) {
            progressing += 1;
        }
        if is_condition_true(conditions, CONDITION_DEGRADED) {
            degraded += 1;
        }
    }

    let mut conditions = Vec::new();
    if matched == 0 {
        let message = "No nodes match the node selector";
        for type_ in [CONDITION_READY, CONDITION_PROGRESSING, CONDITION_DEGRADED] {
            set_condition(
                &mut conditions,
                type_,
                STATUS_FALSE,
                REASON_NO_MATCHING_NODES,
                message,
                generation,
            );
        }
    } else {
        if ready == matched {
            set_condition(
                &mut conditions,
                CONDITION_READY,
                STATUS_TRUE,
                REASON_POLICY_READY,
                &format!("All {matched} matched nodes are ready"),
                generation,
            );
        } else {
            let reason = if ready > 0 {
                REASON_PARTIALLY_APPLIED
            } else {
                REASON_POLICY_NOT_READY
            };
            set_condition(
                &mut conditions,
                CONDITION_READY,
                STATUS_FALSE,
                reason,
                &format!("{ready} of {matched} matched nodes are ready"),
                generation,
            );
        }

        if progressing > 0 {
            set_condition(
                &mut conditions,
                CONDITION_PROGRESSING,
                STATUS_TRUE,
                REASON_SOME_NODES_PROGRESSING,
                &format!("{progressing} of {matched} matched nodes are progressing"),
                generation,
            );
        } else {
            set_condition(
                &mut conditions,
                CONDITION_PROGRESSING,
                STATUS_FALSE,
                REASON_NOT_PROGRESSING,
                "No matched nodes are progressing",
                generation,
            );
        }

        if degraded > 0 {
            set_condition(
                &mut conditions,
                CONDITION_DEGRADED,
                STATUS_TRUE,
                REASON_SOME_NODES_FAILED,
                &format!("{degraded} of {matched} matched nodes are degraded"),
                generation,
            );
        } else {
            set_condition(
                &mut conditions,
                CONDITION_DEGRADED,
                STATUS_FALSE,
                REASON_NOT_DEGRADED,
                "No matched nodes are degraded",
                generation,
            );
        }
    }

    AggregatedStatus {
        matched_node_count: matched,
        ready_node_count: ready,
        conditions,
    }
}

/// Layers freshly computed conditions over the stored ones so unchanged
/// statuses keep their transition time.
fn merge_conditions(previous: &[Condition], computed: &[Condition]) -> Vec<Condition> {
    let mut merged = previous.to_vec();
    for c in computed {
        set_condition(
            &mut merged,
            &c.type_,
            &c.status,
            &c.reason,
            &c.message,
            c.observed_generation.unwrap_or_default(),
        );
    }
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOutcome {
    /// Object does not take part in aggregation.
    Skipped,
    Unchanged,
    Updated,
}

/// Recomputes and commits the aggregated status of one parent object.
pub struct StatusAggregator {
    cluster: Arc<dyn ClusterClient>,
    events: Arc<dyn EventSink>,
}

impl StatusAggregator {
    pub fn new(cluster: Arc<dyn ClusterClient>, events: Arc<dyn EventSink>) -> Self {
        Self { cluster, events }
    }

    #[tracing::instrument(skip_all, fields(kind = %K::kind(&()), name = %parent.name_any()))]
    pub async fn reconcile<K: AggregationTarget>(
        &self,
        api: &dyn StatusApi<K>,
        parent: &K,
    ) -> Result<AggregationOutcome, Report<StatusError>> {
        if !parent.is_aggregated() {
            debug!("object excluded from node status aggregation");
            return Ok(AggregationOutcome::Skipped);
        }

        let snapshot_error = || StatusError::SnapshotFailed {
            kind: K::kind(&()).to_string(),
            name: parent.name_any(),
        };
        let nodes = self
            .cluster
            .list_nodes()
            .await
            .change_context_lazy(snapshot_error)?;
        let node_states = self
            .cluster
            .list_node_states()
            .await
            .change_context_lazy(snapshot_error)?;

        let generation = parent.meta().generation.unwrap_or_default();
        let selector = parent.node_selector();
        let computed =
            compute_aggregated_status(&nodes, &node_states, selector.as_ref(), generation);

        let stored = parent.aggregated_status().cloned().unwrap_or_default();
        let conditions = merge_conditions(&stored.conditions, &computed.conditions);

        if stored.matched_node_count == computed.matched_node_count
            && stored.ready_node_count == computed.ready_node_count
            && conditions_equal(&stored.conditions, &conditions)
        {
            debug!("aggregated status unchanged");
            return Ok(AggregationOutcome::Unchanged);
        }

        let desired = AggregatedStatus {
            matched_node_count: computed.matched_node_count,
            ready_node_count: computed.ready_node_count,
            conditions: conditions.clone(),
        };
        update_status_with_events(
            api,
            self.events.as_ref(),
            parent,
            &stored.conditions,
            &conditions,
            |obj: &mut K| obj.set_aggregated_status(desired.clone()),
        )
        .await?;

        info!(
            matched = desired.matched_node_count,
            ready = desired.ready_node_count,
            "aggregated status updated"
        );
        Ok(AggregationOutcome::Updated)
    }
}
