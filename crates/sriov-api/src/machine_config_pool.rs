//! Subset of the OpenShift MachineConfigPool kind the operator touches.
//!
//! The pool is owned by the machine config operator; only `spec.paused` is
//! ever written from here.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::consts::MCP_CONDITION_DEGRADED;
use crate::consts::MCP_CONDITION_UPDATED;
use crate::consts::MCP_CONDITION_UPDATING;
use crate::consts::STATUS_FALSE;
use crate::consts::STATUS_TRUE;

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    status = "MachineConfigPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    #[serde(default)]
    pub conditions: Vec<PoolCondition>,
}

/// Pool conditions omit `observedGeneration` and may omit reason and message,
/// so they do not fit the meta/v1 `Condition` shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MachineConfigPool {
    fn condition_status(&self, type_: &str) -> Option<&str> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.type_ == type_)
            .map(|c| c.status.as_str())
    }

    /// Not degraded, fully updated and not rolling out a new config.
    pub fn is_quiesced(&self) -> bool {
        self.condition_status(MCP_CONDITION_DEGRADED) == Some(STATUS_FALSE)
            && self.condition_status(MCP_CONDITION_UPDATED) == Some(STATUS_TRUE)
            && self.condition_status(MCP_CONDITION_UPDATING) == Some(STATUS_FALSE)
    }

    pub fn is_paused(&self) -> bool {
        self.spec.paused
    }
}
