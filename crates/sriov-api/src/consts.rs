//! Annotation keys, condition types and reasons.

pub const GROUP: &str = "sriovnetwork.openshift.io";

/// Drain intent written on the Node by the per-node agent.
pub const NODE_DRAIN_ANNOTATION: &str = "sriovnetwork.openshift.io/state";
/// Drain progress written on the SriovNetworkNodeState by the operator.
pub const NODE_STATE_DRAIN_ANNOTATION: &str = "sriovnetwork.openshift.io/current-state";

pub const DEFAULT_OPERATOR_CONFIG_NAME: &str = "default";

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_PROGRESSING: &str = "Progressing";
pub const CONDITION_DEGRADED: &str = "Degraded";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";
pub const STATUS_UNKNOWN: &str = "Unknown";

// Aggregated reasons on policies and pool configs.
pub const REASON_POLICY_READY: &str = "PolicyReady";
pub const REASON_POLICY_NOT_READY: &str = "PolicyNotReady";
pub const REASON_PARTIALLY_APPLIED: &str = "PartiallyApplied";
pub const REASON_NO_MATCHING_NODES: &str = "NoMatchingNodes";
pub const REASON_SOME_NODES_PROGRESSING: &str = "SomeNodesProgressing";
pub const REASON_NOT_PROGRESSING: &str = "NotProgressing";
pub const REASON_SOME_NODES_FAILED: &str = "SomeNodesFailed";
pub const REASON_NOT_DEGRADED: &str = "NotDegraded";

// Per-node reasons reported by the config daemon.
pub const REASON_NODE_READY: &str = "NodeReady";
pub const REASON_APPLYING_CONFIGURATION: &str = "ApplyingConfiguration";
pub const REASON_DRAINING_NODE: &str = "DrainingNode";
pub const REASON_PROVISIONING_FAILED: &str = "ProvisioningFailed";
pub const REASON_NAMESPACE_NOT_FOUND: &str = "NamespaceNotFound";

// Machine config pool condition types.
pub const MCP_CONDITION_DEGRADED: &str = "Degraded";
pub const MCP_CONDITION_UPDATED: &str = "Updated";
pub const MCP_CONDITION_UPDATING: &str = "Updating";

/// Pool that every OpenShift worker belongs to unless a custom pool claims it.
pub const WORKER_POOL: &str = "worker";
