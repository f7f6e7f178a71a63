use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use futures::stream::BoxStream;
use futures::StreamExt;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ListParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::runtime::events::Event;
use kube::runtime::events::EventType as KubeEventType;
use kube::runtime::events::Recorder;
use kube::runtime::events::Reporter;
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use kube::Config;
use kube::Resource;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use sriov_api::consts::DEFAULT_OPERATOR_CONFIG_NAME;
use sriov_api::consts::NODE_STATE_DRAIN_ANNOTATION;
use sriov_api::DrainProgress;
use sriov_api::MachineConfigPool;
use sriov_api::SriovNetworkNodeState;
use sriov_api::SriovOperatorConfig;

use super::ClusterClient;
use super::EventSink;
use super::PoolClient;
use super::StatusApi;
use crate::error::ClientError;
use crate::status::EventType;

pub async fn init_kube_client(kubeconfig: Option<PathBuf>) -> Result<Client, Report<ClientError>> {
    let client = match kubeconfig {
        Some(kubeconfig_path) => {
            // Load kubeconfig from the specified file
            let kubeconfig = Kubeconfig::read_from(&kubeconfig_path).change_context(
                ClientError::ConnectionFailed {
                    message: format!(
                        "Failed to read kubeconfig file: {}",
                        kubeconfig_path.display()
                    ),
                },
            )?;

            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .change_context(ClientError::ConnectionFailed {
                    message: format!(
                        "Failed to create config from kubeconfig: {}",
                        kubeconfig_path.display()
                    ),
                })?;

            Client::try_from(config).change_context(ClientError::ConnectionFailed {
                message: "Failed to create Kubernetes client from custom kubeconfig".to_string(),
            })?
        }
        None => {
            // Use default configuration (in-cluster or ~/.kube/config)
            Client::try_default()
                .await
                .change_context(ClientError::ConnectionFailed {
                    message: "Failed to create Kubernetes client".to_string(),
                })?
        }
    };
    Ok(client)
}

fn request_error(err: kube::Error, kind: &str, name: &str) -> Report<ClientError> {
    let context = ClientError::from_kube(&err, kind, name);
    Report::new(err).change_context(context)
}

/// [`ClusterClient`] backed by the API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    namespace: String,
}

impl KubeClusterClient {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn node_states(&self) -> Api<SriovNetworkNodeState> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_nodes(&self) -> Result<Vec<Node>, Report<ClientError>> {
        self.nodes()
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| request_error(e, "Node", "*"))
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, Report<ClientError>> {
        self.nodes()
            .get_opt(name)
            .await
            .map_err(|e| request_error(e, "Node", name))
    }

    async fn list_node_states(&self) -> Result<Vec<SriovNetworkNodeState>, Report<ClientError>> {
        self.node_states()
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| request_error(e, "SriovNetworkNodeState", "*"))
    }

    async fn get_node_state(
        &self,
        name: &str,
    ) -> Result<Option<SriovNetworkNodeState>, Report<ClientError>> {
        self.node_states()
            .get_opt(name)
            .await
            .map_err(|e| request_error(e, "SriovNetworkNodeState", name))
    }

    async fn set_drain_progress(
        &self,
        name: &str,
        progress: DrainProgress,
    ) -> Result<(), Report<ClientError>> {
        let patch = json!({
            "metadata": {
                "annotations": {
                    NODE_STATE_DRAIN_ANNOTATION: progress.to_string(),
                }
            }
        });
        self.node_states()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| request_error(e, "SriovNetworkNodeState", name))?;
        Ok(())
    }

    async fn get_operator_config(&self) -> Result<Option<SriovOperatorConfig>, Report<ClientError>> {
        let api: Api<SriovOperatorConfig> = Api::namespaced(self.client.clone(), &self.namespace);
        api.get_opt(DEFAULT_OPERATOR_CONFIG_NAME)
            .await
            .map_err(|e| request_error(e, "SriovOperatorConfig", DEFAULT_OPERATOR_CONFIG_NAME))
    }
}

/// [`PoolClient`] for OpenShift machine config pools.
#[derive(Clone)]
pub struct KubePoolClient {
    api: Api<MachineConfigPool>,
}

impl KubePoolClient {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl PoolClient for KubePoolClient {
    async fn list_pools(&self) -> Result<Vec<MachineConfigPool>, Report<ClientError>> {
        self.api
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| request_error(e, "MachineConfigPool", "*"))
    }

    async fn set_paused(&self, name: &str, paused: bool) -> Result<(), Report<ClientError>> {
        let patch = json!({ "spec": { "paused": paused } });
        self.api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| request_error(e, "MachineConfigPool", name))?;
        Ok(())
    }

    fn watch_pool(
        &self,
        name: &str,
    ) -> BoxStream<'static, Result<MachineConfigPool, Report<ClientError>>> {
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let name = name.to_string();
        watcher(self.api.clone(), config)
            .default_backoff()
            .applied_objects()
            .map_err(move |e| {
                let message = e.to_string();
                Report::new(e).change_context(ClientError::WatchFailed {
                    kind: "MachineConfigPool".to_string(),
                    name: name.clone(),
                    message,
                })
            })
            .boxed()
    }
}

/// [`StatusApi`] over a namespaced custom resource.
#[derive(Clone)]
pub struct KubeStatusApi<K> {
    api: Api<K>,
}

impl<K> KubeStatusApi<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl<K> StatusApi<K> for KubeStatusApi<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<K, Report<ClientError>> {
        self.api
            .get(name)
            .await
            .map_err(|e| request_error(e, &K::kind(&()), name))
    }

    async fn patch_status(&self, base: &K, updated: &K) -> Result<K, Report<ClientError>> {
        let kind = K::kind(&()).to_string();
        let name = base.name_any();

        let mut value = serde_json::to_value(updated).change_context(ClientError::RequestFailed {
            kind: kind.clone(),
            name: name.clone(),
        })?;
        let status = value
            .get_mut("status")
            .map(Value::take)
            .unwrap_or(Value::Null);

        // carrying the base resourceVersion turns the merge patch into a
        // conditional write
        let patch = json!({
            "metadata": { "resourceVersion": base.resource_version() },
            "status": status,
        });

        self.api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| request_error(e, &kind, &name))
    }
}

/// [`EventSink`] publishing through the kube-runtime event recorder.
#[derive(Clone)]
pub struct KubeEventSink {
    client: Client,
    reporter: Reporter,
}

impl KubeEventSink {
    pub fn new(client: Client, controller: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(
        &self,
        object: &ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Report<ClientError>> {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), object.clone());
        let type_ = match event_type {
            EventType::Normal => KubeEventType::Normal,
            EventType::Warning => KubeEventType::Warning,
        };
        recorder
            .publish(Event {
                type_,
                reason: reason.to_string(),
                note: Some(message.to_string()),
                action: "StatusUpdate".to_string(),
                secondary: None,
            })
            .await
            .map_err(|e| {
                request_error(
                    e,
                    object.kind.as_deref().unwrap_or("Object"),
                    object.name.as_deref().unwrap_or_default(),
                )
            })
    }
}
