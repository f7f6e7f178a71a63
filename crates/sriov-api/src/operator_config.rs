//! Cluster-wide operator configuration singleton.

use derive_more::Display;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovOperatorConfig",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SriovOperatorConfigSpec {
    /// Maximum number of nodes drained at the same time, 0 means unlimited.
    #[serde(default = "default_max_parallel_node_configuration")]
    pub max_parallel_node_configuration: u32,
    /// Skip cordon and drain; nodes go straight to drain completion.
    #[serde(default)]
    pub disable_drain: bool,
    #[serde(default)]
    pub configuration_mode: ConfigurationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<u8>,
}

fn default_max_parallel_node_configuration() -> u32 {
    1
}

impl Default for SriovOperatorConfigSpec {
    fn default() -> Self {
        Self {
            max_parallel_node_configuration: default_max_parallel_node_configuration(),
            disable_drain: false,
            configuration_mode: ConfigurationMode::default(),
            log_level: None,
        }
    }
}

/// How the per-node agent applies configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationMode {
    #[default]
    #[display("daemon")]
    Daemon,
    #[display("systemd")]
    Systemd,
}
