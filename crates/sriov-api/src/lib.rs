//! Shared API type definitions
//!
//! This crate contains the custom resources watched by the SR-IOV operator,
//! the external machine config pool kind it coordinates with, and the
//! annotation and condition vocabulary shared with the per-node agent.

pub mod consts;
pub mod drain;
pub mod machine_config_pool;
pub mod node_state;
pub mod operator_config;
pub mod policy;
pub mod pool_config;

pub use drain::DrainIntent;
pub use drain::DrainProgress;
pub use machine_config_pool::MachineConfigPool;
pub use machine_config_pool::MachineConfigPoolSpec;
pub use machine_config_pool::MachineConfigPoolStatus;
pub use machine_config_pool::PoolCondition;
pub use node_state::SriovNetworkNodeState;
pub use node_state::SriovNetworkNodeStateSpec;
pub use node_state::SriovNetworkNodeStateStatus;
pub use operator_config::ConfigurationMode;
pub use operator_config::SriovOperatorConfig;
pub use operator_config::SriovOperatorConfigSpec;
pub use policy::SriovNetworkNodePolicy;
pub use policy::SriovNetworkNodePolicySpec;
pub use pool_config::SriovNetworkPoolConfig;
pub use pool_config::SriovNetworkPoolConfigSpec;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Fleet-level status shared by policies and pool configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedStatus {
    #[serde(default)]
    pub matched_node_count: i32,
    #[serde(default)]
    pub ready_node_count: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
