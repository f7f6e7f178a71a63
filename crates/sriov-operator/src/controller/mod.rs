//! kube-runtime controllers wiring watches to the reconcile logic.
//!
//! Each `build_*` function returns a boxed future running one controller
//! until the process receives a shutdown signal.

pub mod predicates;

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::controller::Action;
use kube::runtime::reflector;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use kube::ResourceExt;
use sriov_api::SriovNetworkNodePolicy;
use sriov_api::SriovNetworkNodeState;
use sriov_api::SriovNetworkPoolConfig;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::client::KubeStatusApi;
use crate::drain::DrainOutcome;
use crate::drain::DrainReconciler;
use crate::error::ReconcileError;
use crate::status::AggregationTarget;
use crate::status::StatusAggregator;

pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Failed reconciles are retried after this delay.
const ERROR_REQUEUE: Duration = Duration::from_secs(10);
/// Shorter than the client read timeout, so idle watches are closed by the
/// server first.
const WATCH_TIMEOUT_SECS: u32 = 25;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

pub struct DrainContext {
    pub reconciler: DrainReconciler,
}

pub struct StatusContext<K> {
    pub aggregator: StatusAggregator,
    pub api: KubeStatusApi<K>,
}

async fn reconcile_node(node: Arc<Node>, ctx: Arc<DrainContext>) -> Result<Action, ReconcileError> {
    let name = node.name_any();
    match ctx.reconciler.reconcile_node(&name).await {
        Ok(DrainOutcome::Deferred { .. }) => Ok(Action::requeue(
            ctx.reconciler.settings().drain.requeue_after,
        )),
        Ok(_) => Ok(Action::await_change()),
        Err(report) => Err(ReconcileError::Drain { key: name, report }),
    }
}

async fn reconcile_status<K>(parent: Arc<K>, ctx: Arc<StatusContext<K>>) -> Result<Action, ReconcileError>
where
    K: AggregationTarget + Debug + serde::Serialize + serde::de::DeserializeOwned,
{
    match ctx.aggregator.reconcile(&ctx.api, parent.as_ref()).await {
        Ok(outcome) => {
            debug!(?outcome, "status reconcile finished");
            Ok(Action::await_change())
        }
        Err(report) => Err(ReconcileError::Status {
            key: format!(
                "{}/{}",
                parent.namespace().unwrap_or_default(),
                parent.name_any()
            ),
            report,
        }),
    }
}

fn error_policy<K, C>(obj: Arc<K>, error: &ReconcileError, _ctx: Arc<C>) -> Action
where
    K: ResourceExt,
{
    warn!(name = %obj.name_any(), "reconcile failed, retrying in {}s: {error}", ERROR_REQUEUE.as_secs());
    Action::requeue(ERROR_REQUEUE)
}

fn log_reconcile_result<T: Debug, E: Debug>(
    controller: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(object) => debug!(?object, "{controller} reconcile completed"),
            Err(e) => warn!(error = ?e, "{controller} reconcile error"),
        }
        std::future::ready(())
    }
}

/// Drain controller over nodes, woken by drain intent changes on the node
/// and drain progress changes on its node state.
pub fn build_drain_controller(
    client: Client,
    namespace: &str,
    reconciler: DrainReconciler,
) -> ControllerFuture {
    let (reader, writer) = reflector::store();
    let nodes = reflector(writer, watcher(Api::<Node>::all(client.clone()), watcher_config()))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::drain_intent);

    let node_states = watcher(
        Api::<SriovNetworkNodeState>::namespaced(client, namespace),
        watcher_config(),
    )
    .default_backoff()
    .applied_objects()
    .predicate_filter(predicates::drain_progress);

    info!("- drain controller");
    Box::pin(
        Controller::for_stream(nodes, reader)
            .watches_stream(node_states, |state| {
                Some(ObjectRef::<Node>::new(&state.name_any()))
            })
            .shutdown_on_signal()
            .run(
                reconcile_node,
                error_policy,
                Arc::new(DrainContext { reconciler }),
            )
            .for_each(log_reconcile_result("drain")),
    )
}

/// Status controller for one parent kind, re-aggregating every parent when a
/// node's conditions or labels change.
fn build_status_controller<K>(
    client: Client,
    namespace: &str,
    aggregator: StatusAggregator,
    controller: &'static str,
) -> ControllerFuture
where
    K: AggregationTarget
        + kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Debug
        + serde::Serialize
        + serde::de::DeserializeOwned,
{
    let parents: Api<K> = Api::namespaced(client.clone(), namespace);
    let ctrl = Controller::new(parents, watcher_config());
    let store = ctrl.store();

    let node_states = watcher(
        Api::<SriovNetworkNodeState>::namespaced(client.clone(), namespace),
        watcher_config(),
    )
    .default_backoff()
    .applied_objects()
    .predicate_filter(predicates::node_conditions);
    let nodes = watcher(Api::<Node>::all(client.clone()), watcher_config())
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::node_labels);

    let all_parents = move || {
        store
            .state()
            .iter()
            .filter(|parent| parent.is_aggregated())
            .map(|parent| ObjectRef::from_obj(&**parent))
            .collect::<Vec<_>>()
    };
    let on_node_state = all_parents.clone();

    let ctx = Arc::new(StatusContext {
        aggregator,
        api: KubeStatusApi::namespaced(client, namespace),
    });

    info!("- {controller} status controller");
    Box::pin(
        ctrl.watches_stream(node_states, move |_| on_node_state())
            .watches_stream(nodes, move |_| all_parents())
            .shutdown_on_signal()
            .run(reconcile_status::<K>, error_policy, ctx)
            .for_each(log_reconcile_result(controller)),
    )
}

pub fn build_policy_controller(
    client: Client,
    namespace: &str,
    aggregator: StatusAggregator,
) -> ControllerFuture {
    build_status_controller::<SriovNetworkNodePolicy>(client, namespace, aggregator, "policy")
}

pub fn build_pool_config_controller(
    client: Client,
    namespace: &str,
    aggregator: StatusAggregator,
) -> ControllerFuture {
    build_status_controller::<SriovNetworkPoolConfig>(client, namespace, aggregator, "pool config")
}
