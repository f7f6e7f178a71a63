//! In-memory implementations of the client seams and object builders for
//! tests.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use error_stack::Report;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kube::Resource;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sriov_api::consts::*;
use sriov_api::ConfigurationMode;
use sriov_api::DrainIntent;
use sriov_api::DrainProgress;
use sriov_api::MachineConfigPool;
use sriov_api::MachineConfigPoolSpec;
use sriov_api::MachineConfigPoolStatus;
use sriov_api::PoolCondition;
use sriov_api::SriovNetworkNodePolicy;
use sriov_api::SriovNetworkNodePolicySpec;
use sriov_api::SriovNetworkNodeState;
use sriov_api::SriovNetworkNodeStateSpec;
use sriov_api::SriovNetworkNodeStateStatus;
use sriov_api::SriovNetworkPoolConfig;
use sriov_api::SriovNetworkPoolConfigSpec;
use sriov_api::SriovOperatorConfig;
use sriov_api::SriovOperatorConfigSpec;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::ClusterClient;
use super::EventSink;
use super::PoolClient;
use super::StatusApi;
use crate::conditions::set_condition;
use crate::drain::DrainError;
use crate::drain::NodeDrainer;
use crate::error::ClientError;
use crate::status::EventType;

pub const TEST_NAMESPACE: &str = "sriov";

#[derive(Default)]
struct ClusterState {
    nodes: BTreeMap<String, Node>,
    node_states: BTreeMap<String, SriovNetworkNodeState>,
    operator_config: Option<SriovOperatorConfig>,
    pools: BTreeMap<String, MachineConfigPool>,
    pool_watchers: HashMap<String, Vec<mpsc::UnboundedSender<MachineConfigPool>>>,
    pool_watch_count: HashMap<String, usize>,
    progress_writes: Vec<(String, DrainProgress)>,
    pause_writes: Vec<(String, bool)>,
    failing_progress_writes: usize,
}

impl ClusterState {
    fn notify_pool(&mut self, name: &str) {
        let Some(pool) = self.pools.get(name).cloned() else {
            return;
        };
        if let Some(watchers) = self.pool_watchers.get_mut(name) {
            watchers.retain(|tx| tx.send(pool.clone()).is_ok());
        }
    }
}

/// Nodes, node states, the operator config and machine config pools.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn insert_node(&self, node: Node) {
        let mut state = self.state.lock().unwrap();
        state.nodes.insert(node.name_any(), node);
    }

    pub fn insert_node_state(&self, node_state: SriovNetworkNodeState) {
        let mut state = self.state.lock().unwrap();
        state.node_states.insert(node_state.name_any(), node_state);
    }

    pub fn set_operator_config(&self, config: SriovOperatorConfig) {
        self.state.lock().unwrap().operator_config = Some(config);
    }

    pub fn set_intent(&self, node: &str, intent: DrainIntent) {
        self.set_raw_intent(node, &intent.to_string());
    }

    pub fn set_raw_intent(&self, node: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.get_mut(node).unwrap();
        node.annotations_mut()
            .insert(NODE_DRAIN_ANNOTATION.to_string(), value.to_string());
    }

    pub fn drain_progress(&self, node: &str) -> Option<DrainProgress> {
        let state = self.state.lock().unwrap();
        state.node_states.get(node)?.drain_progress()
    }

    pub fn progress_writes(&self) -> Vec<(String, DrainProgress)> {
        self.state.lock().unwrap().progress_writes.clone()
    }

    /// The next `count` progress writes fail.
    pub fn fail_progress_writes(&self, count: usize) {
        self.state.lock().unwrap().failing_progress_writes = count;
    }

    pub fn insert_pool(&self, pool: MachineConfigPool) {
        let mut state = self.state.lock().unwrap();
        state.pools.insert(pool.name_any(), pool);
    }

    /// Replaces a pool and delivers the new version to its watchers.
    pub fn update_pool(&self, pool: MachineConfigPool) {
        let mut state = self.state.lock().unwrap();
        let name = pool.name_any();
        state.pools.insert(name.clone(), pool);
        state.notify_pool(&name);
    }

    pub fn pool(&self, name: &str) -> Option<MachineConfigPool> {
        self.state.lock().unwrap().pools.get(name).cloned()
    }

    pub fn pool_pause_writes(&self) -> Vec<(String, bool)> {
        self.state.lock().unwrap().pause_writes.clone()
    }

    /// Returns once `count` watches on the pool were opened, closed ones included.
    pub async fn wait_for_pool_watchers(&self, name: &str, count: usize) {
        loop {
            let opened = {
                let state = self.state.lock().unwrap();
                state.pool_watch_count.get(name).copied().unwrap_or_default()
            };
            if opened >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>, Report<ClientError>> {
        Ok(self.state.lock().unwrap().nodes.values().cloned().collect())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, Report<ClientError>> {
        Ok(self.state.lock().unwrap().nodes.get(name).cloned())
    }

    async fn list_node_states(&self) -> Result<Vec<SriovNetworkNodeState>, Report<ClientError>> {
        Ok(self.state.lock().unwrap().node_states.values().cloned().collect())
    }

    async fn get_node_state(
        &self,
        name: &str,
    ) -> Result<Option<SriovNetworkNodeState>, Report<ClientError>> {
        Ok(self.state.lock().unwrap().node_states.get(name).cloned())
    }

    async fn set_drain_progress(
        &self,
        name: &str,
        progress: DrainProgress,
    ) -> Result<(), Report<ClientError>> {
        let mut state = self.state.lock().unwrap();
        if state.failing_progress_writes > 0 {
            state.failing_progress_writes -= 1;
            return Err(Report::new(ClientError::RequestFailed {
                kind: "SriovNetworkNodeState".to_string(),
                name: name.to_string(),
            }));
        }
        let Some(node_state) = state.node_states.get_mut(name) else {
            return Err(Report::new(ClientError::NotFound {
                kind: "SriovNetworkNodeState".to_string(),
                name: name.to_string(),
            }));
        };
        node_state
            .annotations_mut()
            .insert(NODE_STATE_DRAIN_ANNOTATION.to_string(), progress.to_string());
        state.progress_writes.push((name.to_string(), progress));
        Ok(())
    }

    async fn get_operator_config(&self) -> Result<Option<SriovOperatorConfig>, Report<ClientError>> {
        Ok(self.state.lock().unwrap().operator_config.clone())
    }
}

#[async_trait]
impl PoolClient for FakeCluster {
    async fn list_pools(&self) -> Result<Vec<MachineConfigPool>, Report<ClientError>> {
        Ok(self.state.lock().unwrap().pools.values().cloned().collect())
    }

    async fn set_paused(&self, name: &str, paused: bool) -> Result<(), Report<ClientError>> {
        let mut state = self.state.lock().unwrap();
        let Some(pool) = state.pools.get_mut(name) else {
            return Err(Report::new(ClientError::NotFound {
                kind: "MachineConfigPool".to_string(),
                name: name.to_string(),
            }));
        };
        pool.spec.paused = paused;
        state.pause_writes.push((name.to_string(), paused));
        state.notify_pool(name);
        Ok(())
    }

    fn watch_pool(
        &self,
        name: &str,
    ) -> BoxStream<'static, Result<MachineConfigPool, Report<ClientError>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        if let Some(pool) = state.pools.get(name) {
            let _ = tx.send(pool.clone());
        }
        state
            .pool_watchers
            .entry(name.to_string())
            .or_default()
            .push(tx);
        *state.pool_watch_count.entry(name.to_string()).or_default() += 1;
        UnboundedReceiverStream::new(rx).map(Ok).boxed()
    }
}

struct StatusStore<K> {
    objects: BTreeMap<String, K>,
    pending_conflicts: usize,
    pending_failures: usize,
    patch_attempts: usize,
}

/// Status subresource with resource-version checks.
pub struct FakeStatusApi<K> {
    store: Mutex<StatusStore<K>>,
}

fn bump_resource_version<K: Resource>(obj: &mut K) {
    let next = obj
        .meta()
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or_default()
        + 1;
    obj.meta_mut().resource_version = Some(next.to_string());
}

impl<K> FakeStatusApi<K>
where
    K: Resource<DynamicType = ()> + Clone,
{
    pub fn with_objects(objects: impl IntoIterator<Item = K>) -> Self {
        let objects = objects
            .into_iter()
            .map(|mut obj| {
                obj.meta_mut().resource_version = Some("1".to_string());
                (obj.name_any(), obj)
            })
            .collect();
        Self {
            store: Mutex::new(StatusStore {
                objects,
                pending_conflicts: 0,
                pending_failures: 0,
                patch_attempts: 0,
            }),
        }
    }

    pub fn stored(&self, name: &str) -> Option<K> {
        self.store.lock().unwrap().objects.get(name).cloned()
    }

    /// The next `count` patches conflict as if someone else wrote first.
    pub fn inject_conflicts(&self, count: usize) {
        self.store.lock().unwrap().pending_conflicts = count;
    }

    /// The next `count` patches fail with a non-conflict error.
    pub fn inject_failures(&self, count: usize) {
        self.store.lock().unwrap().pending_failures = count;
    }

    pub fn patch_attempts(&self) -> usize {
        self.store.lock().unwrap().patch_attempts
    }
}

#[async_trait]
impl<K> StatusApi<K> for FakeStatusApi<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, name: &str) -> Result<K, Report<ClientError>> {
        self.stored(name).ok_or_else(|| {
            Report::new(ClientError::NotFound {
                kind: K::kind(&()).to_string(),
                name: name.to_string(),
            })
        })
    }

    async fn patch_status(&self, base: &K, updated: &K) -> Result<K, Report<ClientError>> {
        let kind = K::kind(&()).to_string();
        let name = base.name_any();
        let mut guard = self.store.lock().unwrap();
        let store = &mut *guard;
        store.patch_attempts += 1;

        let conflict = || {
            Report::new(ClientError::Conflict {
                kind: kind.clone(),
                name: name.clone(),
            })
        };
        if store.pending_failures > 0 {
            store.pending_failures -= 1;
            return Err(Report::new(ClientError::RequestFailed {
                kind: kind.clone(),
                name: name.clone(),
            }));
        }
        let injected = store.pending_conflicts > 0;
        let Some(current) = store.objects.get_mut(&name) else {
            return Err(Report::new(ClientError::NotFound {
                kind: kind.clone(),
                name: name.clone(),
            }));
        };
        if injected {
            bump_resource_version(current);
            store.pending_conflicts -= 1;
            return Err(conflict());
        }
        if current.resource_version() != base.resource_version() {
            return Err(conflict());
        }

        let mut merged = serde_json::to_value(&*current).unwrap();
        let mut patch = serde_json::to_value(updated).unwrap();
        merged["status"] = patch["status"].take();
        let mut next: K = serde_json::from_value(merged).unwrap();
        bump_resource_version(&mut next);
        *current = next.clone();
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub object: ObjectReference,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

#[derive(Default)]
pub struct FakeEventSink {
    events: Mutex<Vec<PublishedEvent>>,
    failing: AtomicBool,
}

impl FakeEventSink {
    pub fn published(&self) -> Vec<PublishedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Every publish is rejected from now on.
    pub fn fail_publishing(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventSink for FakeEventSink {
    async fn publish(
        &self,
        object: &ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Report<ClientError>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Report::new(ClientError::RequestFailed {
                kind: "Event".to_string(),
                name: reason.to_string(),
            }));
        }
        self.events.lock().unwrap().push(PublishedEvent {
            object: object.clone(),
            event_type,
            reason: reason.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// Records cordon and drain calls as `"cordon n1"`, `"uncordon n1"` and
/// `"drain n1"`.
#[derive(Default)]
pub struct FakeDrainer {
    calls: Mutex<Vec<String>>,
    failing_drains: Mutex<usize>,
}

impl FakeDrainer {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn drain_attempts(&self, node: &str) -> usize {
        let call = format!("drain {node}");
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    /// The next `count` drains time out.
    pub fn fail_drains(&self, count: usize) {
        *self.failing_drains.lock().unwrap() = count;
    }
}

#[async_trait]
impl NodeDrainer for FakeDrainer {
    async fn cordon_or_uncordon(&self, node: &str, cordon: bool) -> Result<(), Report<DrainError>> {
        let verb = if cordon { "cordon" } else { "uncordon" };
        self.calls.lock().unwrap().push(format!("{verb} {node}"));
        Ok(())
    }

    async fn drain(&self, node: &str) -> Result<(), Report<DrainError>> {
        self.calls.lock().unwrap().push(format!("drain {node}"));
        let mut failing = self.failing_drains.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(Report::new(DrainError::Timeout {
                node: node.to_string(),
                timeout_secs: 90,
            }));
        }
        Ok(())
    }
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn test_node(name: &str, node_labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels(node_labels)),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn with_intent(mut node: Node, intent: DrainIntent) -> Node {
    node.annotations_mut()
        .insert(NODE_DRAIN_ANNOTATION.to_string(), intent.to_string());
    node
}

/// Node state reporting the given Ready, Progressing and Degraded flags, with
/// no drain progress recorded.
pub fn test_node_state(
    name: &str,
    ready: bool,
    progressing: bool,
    degraded: bool,
) -> SriovNetworkNodeState {
    let mut conditions = Vec::new();
    for (type_, flag) in [
        (CONDITION_READY, ready),
        (CONDITION_PROGRESSING, progressing),
        (CONDITION_DEGRADED, degraded),
    ] {
        let status = if flag { STATUS_TRUE } else { STATUS_FALSE };
        set_condition(&mut conditions, type_, status, "Test", "", 1);
    }

    let mut state = SriovNetworkNodeState::new(name, SriovNetworkNodeStateSpec::default());
    state.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    state.status = Some(SriovNetworkNodeStateStatus {
        conditions,
        ..Default::default()
    });
    state
}

pub fn with_progress(mut state: SriovNetworkNodeState, progress: DrainProgress) -> SriovNetworkNodeState {
    state
        .annotations_mut()
        .insert(NODE_STATE_DRAIN_ANNOTATION.to_string(), progress.to_string());
    state
}

pub fn test_policy(name: &str, node_selector: BTreeMap<String, String>) -> SriovNetworkNodePolicy {
    let mut policy = SriovNetworkNodePolicy::new(
        name,
        SriovNetworkNodePolicySpec {
            resource_name: "intelnics".to_string(),
            node_selector,
            num_vfs: 4,
            ..Default::default()
        },
    );
    policy.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    policy.metadata.generation = Some(1);
    policy
}

pub fn test_pool_config(name: &str, node_selector: Option<LabelSelector>) -> SriovNetworkPoolConfig {
    let mut pool_config = SriovNetworkPoolConfig::new(
        name,
        SriovNetworkPoolConfigSpec {
            node_selector,
            ..Default::default()
        },
    );
    pool_config.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    pool_config.metadata.generation = Some(1);
    pool_config
}

pub fn test_operator_config(
    max_parallel_node_configuration: u32,
    disable_drain: bool,
    configuration_mode: ConfigurationMode,
) -> SriovOperatorConfig {
    let mut config = SriovOperatorConfig::new(
        DEFAULT_OPERATOR_CONFIG_NAME,
        SriovOperatorConfigSpec {
            max_parallel_node_configuration,
            disable_drain,
            configuration_mode,
            log_level: None,
        },
    );
    config.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    config
}

/// A quiesced pool is done updating; otherwise it is mid rollout.
pub fn test_pool(name: &str, quiesced: bool, paused: bool) -> MachineConfigPool {
    let condition = |type_: &str, status: &str| PoolCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: None,
        message: None,
    };
    let (updated, updating) = if quiesced {
        (STATUS_TRUE, STATUS_FALSE)
    } else {
        (STATUS_FALSE, STATUS_TRUE)
    };

    let mut pool = MachineConfigPool::new(
        name,
        MachineConfigPoolSpec {
            paused,
            node_selector: None,
        },
    );
    pool.status = Some(MachineConfigPoolStatus {
        conditions: vec![
            condition(MCP_CONDITION_DEGRADED, STATUS_FALSE),
            condition(MCP_CONDITION_UPDATED, updated),
            condition(MCP_CONDITION_UPDATING, updating),
        ],
    });
    pool
}

/// Pool selecting nodes that carry `label` with an empty value.
pub fn with_pool_selector(mut pool: MachineConfigPool, label: &str) -> MachineConfigPool {
    pool.spec.node_selector = Some(LabelSelector {
        match_labels: Some(labels(&[(label, "")])),
        match_expressions: None,
    });
    pool
}
