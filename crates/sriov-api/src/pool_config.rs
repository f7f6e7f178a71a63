//! Pool configuration grouping nodes for parallel reconfiguration.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::AggregatedStatus;

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovNetworkPoolConfig",
    namespaced,
    status = "AggregatedStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkPoolConfigSpec {
    /// Absent selects every node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovs_hardware_offload_config: Option<OvsHardwareOffloadConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvsHardwareOffloadConfig {
    /// Machine config pool carrying the offload configuration.
    #[serde(default)]
    pub name: String,
}

impl SriovNetworkPoolConfig {
    /// Pool configs for OVS hardware offload are managed on another path and
    /// never carry aggregated node status.
    pub fn is_ovs_hardware_offload(&self) -> bool {
        self.spec.ovs_hardware_offload_config.is_some()
    }
}
