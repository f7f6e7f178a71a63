//! Cordon and pod eviction, roughly what `kubectl drain` does client side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use futures::stream;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DeleteParams;
use kube::api::EvictParams;
use kube::api::ListParams;
use kube::Api;
use kube::ResourceExt;
use tokio::time::sleep;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::DrainError;
use crate::config::DrainSettings;

const CONCURRENT_EVICTIONS: usize = 5;
/// `kubectl drain` also waits 5 seconds between eviction attempts blocked by
/// a PodDisruptionBudget.
const EVICTION_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DELETION_CHECK_INTERVAL: Duration = Duration::from_secs(2);
const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

#[async_trait]
pub trait NodeDrainer: Send + Sync {
    /// Marks the node unschedulable (`cordon == true`) or schedulable again.
    /// Reaching a state the node is already in is a no-op.
    async fn cordon_or_uncordon(&self, node: &str, cordon: bool) -> Result<(), Report<DrainError>>;

    /// Evicts every evictable pod from the node and waits for them to go.
    async fn drain(&self, node: &str) -> Result<(), Report<DrainError>>;
}

/// What a drain does with one pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodDisposition {
    Evict,
    Skip(&'static str),
    /// The pod blocks the drain under the current settings.
    Refuse(&'static str),
}

pub fn classify_pod(pod: &Pod, settings: &DrainSettings) -> PodDisposition {
    let annotations = pod.annotations();
    if annotations.contains_key(MIRROR_POD_ANNOTATION) {
        return PodDisposition::Skip("static mirror pod");
    }

    let finished = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Succeeded" || phase == "Failed");
    if finished {
        return PodDisposition::Evict;
    }

    let controller = pod
        .owner_references()
        .iter()
        .find(|r| r.controller == Some(true));
    match controller {
        Some(owner) if owner.kind == "DaemonSet" => {
            return if settings.ignore_daemonsets {
                PodDisposition::Skip("managed by a DaemonSet")
            } else {
                PodDisposition::Refuse("managed by a DaemonSet")
            };
        }
        Some(_) => {}
        None if !settings.force => {
            return PodDisposition::Refuse("not managed by a controller");
        }
        None => {}
    }

    let uses_empty_dir = pod
        .spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .is_some_and(|volumes| volumes.iter().any(|v| v.empty_dir.is_some()));
    if uses_empty_dir && !settings.delete_emptydir_data {
        return PodDisposition::Refuse("uses emptyDir local storage");
    }

    PodDisposition::Evict
}

/// Splits the pods of a node into the ones to evict, or fails listing every
/// pod that blocks the drain.
pub fn select_pods(pods: Vec<Pod>, settings: &DrainSettings) -> Result<Vec<Pod>, Vec<String>> {
    let mut evict = Vec::new();
    let mut refused = Vec::new();

    for pod in pods {
        let key = format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any());
        match classify_pod(&pod, settings) {
            PodDisposition::Evict => evict.push(pod),
            PodDisposition::Skip(reason) => debug!(pod = %key, reason, "not evicting pod"),
            PodDisposition::Refuse(reason) => refused.push(format!("{key} ({reason})")),
        }
    }

    if refused.is_empty() {
        Ok(evict)
    } else {
        Err(refused)
    }
}

pub type PodEvictedCallback = Arc<dyn Fn(&Pod) + Send + Sync>;

pub struct KubeDrainer {
    client: kube::Client,
    settings: DrainSettings,
    on_pod_evicted: PodEvictedCallback,
}

impl KubeDrainer {
    pub fn new(client: kube::Client, settings: DrainSettings) -> Self {
        Self {
            client,
            settings,
            on_pod_evicted: Arc::new(|pod: &Pod| {
                info!(
                    namespace = %pod.namespace().unwrap_or_default(),
                    pod = %pod.name_any(),
                    "evicted pod"
                );
            }),
        }
    }

    pub fn with_on_pod_evicted(mut self, callback: PodEvictedCallback) -> Self {
        self.on_pod_evicted = callback;
        self
    }

    async fn evict_all(&self, pods: Vec<Pod>) -> Result<(), Report<DrainError>> {
        stream::iter(pods.into_iter().map(Ok::<_, Report<DrainError>>))
            .try_for_each_concurrent(CONCURRENT_EVICTIONS, |pod| async move {
                if self.evict_pod(&pod).await? {
                    (self.on_pod_evicted)(&pod);
                    self.wait_for_deletion(&pod).await;
                }
                Ok(())
            })
            .await
    }

    /// Returns `false` when the pod was already gone.
    async fn evict_pod(&self, pod: &Pod) -> Result<bool, Report<DrainError>> {
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let params = EvictParams {
            delete_options: Some(DeleteParams {
                grace_period_seconds: self.settings.grace_period,
                ..DeleteParams::default()
            }),
            ..EvictParams::default()
        };

        loop {
            match api.evict(&name, &params).await {
                Ok(_) => return Ok(true),
                Err(kube::Error::Api(e)) if e.code == 404 => return Ok(false),
                Err(kube::Error::Api(e)) if e.code == 429 => {
                    warn!(
                        %namespace,
                        pod = %name,
                        "eviction blocked, likely by a PodDisruptionBudget: {}; retrying in {}s",
                        e.message,
                        EVICTION_RETRY_INTERVAL.as_secs()
                    );
                    sleep(EVICTION_RETRY_INTERVAL).await;
                }
                Err(e) => {
                    return Err(Report::new(e).change_context(DrainError::Evict {
                        namespace,
                        pod: name,
                    }));
                }
            }
        }
    }

    /// Polls until the pod is gone or replaced by a new one of the same name.
    /// The caller bounds the wait.
    async fn wait_for_deletion(&self, pod: &Pod) {
        let namespace = pod.namespace().unwrap_or_default();
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let name = pod.name_any();

        loop {
            match api.get_opt(&name).await {
                Ok(None) => return,
                Ok(Some(current)) if current.uid() != pod.uid() => return,
                Ok(Some(_)) => {}
                Err(e) => {
                    debug!(%namespace, pod = %name, "could not check pod deletion: {e}");
                }
            }
            sleep(DELETION_CHECK_INTERVAL).await;
        }
    }
}

#[async_trait]
impl NodeDrainer for KubeDrainer {
    #[tracing::instrument(skip(self))]
    async fn cordon_or_uncordon(&self, node: &str, cordon: bool) -> Result<(), Report<DrainError>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let context = || {
            if cordon {
                DrainError::Cordon {
                    node: node.to_string(),
                }
            } else {
                DrainError::Uncordon {
                    node: node.to_string(),
                }
            }
        };

        let current = api.get(node).await.map_err(Report::new).change_context_lazy(context)?;
        let unschedulable = current
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false);
        if unschedulable == cordon {
            debug!("node already in requested schedulability");
            return Ok(());
        }

        let patched = if cordon {
            api.cordon(node).await
        } else {
            api.uncordon(node).await
        };
        patched.map_err(Report::new).change_context_lazy(context)?;

        info!(cordon, "node schedulability changed");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn drain(&self, node: &str) -> Result<(), Report<DrainError>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods
            .list(&ListParams::default().fields(&format!("spec.nodeName={node}")))
            .await
            .map_err(Report::new)
            .change_context_lazy(|| DrainError::ListPods {
                node: node.to_string(),
            })?;

        let targets = select_pods(list.items, &self.settings).map_err(|refused| {
            Report::new(DrainError::Undrainable {
                node: node.to_string(),
                reasons: refused.join(", "),
            })
        })?;
        info!(pods = targets.len(), "evicting pods");

        tokio::time::timeout(self.settings.timeout, self.evict_all(targets))
            .await
            .map_err(|_| {
                Report::new(DrainError::Timeout {
                    node: node.to_string(),
                    timeout_secs: self.settings.timeout.as_secs(),
                })
            })??;

        info!("node drained");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::EmptyDirVolumeSource;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::api::core::v1::Volume;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;
    use similar_asserts::assert_eq;

    use super::*;

    fn pod(name: &str, owner_kind: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                owner_references: owner_kind.map(|kind| {
                    vec![OwnerReference {
                        api_version: "apps/v1".to_string(),
                        kind: kind.to_string(),
                        name: format!("{name}-owner"),
                        uid: "uid".to_string(),
                        controller: Some(true),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn with_empty_dir(mut pod: Pod) -> Pod {
        pod.spec = Some(PodSpec {
            volumes: Some(vec![Volume {
                name: "scratch".to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }]),
            ..Default::default()
        });
        pod
    }

    fn strict() -> DrainSettings {
        DrainSettings {
            force: false,
            ignore_daemonsets: false,
            delete_emptydir_data: false,
            ..DrainSettings::default()
        }
    }

    #[test]
    fn mirror_pods_are_always_skipped() {
        let mut mirror = pod("etcd", None);
        mirror
            .annotations_mut()
            .insert(MIRROR_POD_ANNOTATION.to_string(), "hash".to_string());

        assert_eq!(
            classify_pod(&mirror, &DrainSettings::default()),
            PodDisposition::Skip("static mirror pod")
        );
        assert!(matches!(classify_pod(&mirror, &strict()), PodDisposition::Skip(_)));
    }

    #[test]
    fn finished_pods_are_evicted_regardless_of_settings() {
        let mut done = with_empty_dir(pod("job", None));
        done.status = Some(PodStatus {
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        });
        assert_eq!(classify_pod(&done, &strict()), PodDisposition::Evict);
    }

    #[test]
    fn daemonset_pods_follow_ignore_daemonsets() {
        let ds = pod("device-plugin", Some("DaemonSet"));
        assert!(matches!(
            classify_pod(&ds, &DrainSettings::default()),
            PodDisposition::Skip(_)
        ));
        assert!(matches!(classify_pod(&ds, &strict()), PodDisposition::Refuse(_)));
    }

    #[test]
    fn unmanaged_pods_need_force() {
        let bare = pod("bare", None);
        assert_eq!(classify_pod(&bare, &DrainSettings::default()), PodDisposition::Evict);
        assert_eq!(
            classify_pod(&bare, &strict()),
            PodDisposition::Refuse("not managed by a controller")
        );
    }

    #[test]
    fn empty_dir_pods_need_delete_emptydir_data() {
        let cache = with_empty_dir(pod("cache", Some("ReplicaSet")));
        assert_eq!(classify_pod(&cache, &DrainSettings::default()), PodDisposition::Evict);
        assert_eq!(
            classify_pod(&cache, &strict()),
            PodDisposition::Refuse("uses emptyDir local storage")
        );
    }

    #[test]
    fn select_pods_reports_every_blocking_pod() {
        let pods = vec![
            pod("web", Some("ReplicaSet")),
            pod("bare", None),
            pod("agent", Some("DaemonSet")),
        ];

        let selected = select_pods(pods.clone(), &DrainSettings::default()).unwrap();
        let names: Vec<_> = selected.iter().map(|p| p.name_any()).collect();
        assert_eq!(names, vec!["web", "bare"]);

        let refused = select_pods(pods, &strict()).unwrap_err();
        assert_eq!(
            refused,
            vec![
                "default/bare (not managed by a controller)".to_string(),
                "default/agent (managed by a DaemonSet)".to_string(),
            ]
        );
    }
}
