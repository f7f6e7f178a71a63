//! Hash predicates for `predicate_filter`: an object passes when the hashed
//! part changed since the last time it was seen.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use sriov_api::consts::NODE_DRAIN_ANNOTATION;
use sriov_api::consts::NODE_STATE_DRAIN_ANNOTATION;
use sriov_api::SriovNetworkNodeState;

fn hash_of(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

pub fn drain_intent(node: &Node) -> Option<u64> {
    Some(hash_of(node.annotations().get(NODE_DRAIN_ANNOTATION)))
}

pub fn drain_progress(state: &SriovNetworkNodeState) -> Option<u64> {
    Some(hash_of(state.annotations().get(NODE_STATE_DRAIN_ANNOTATION)))
}

pub fn node_labels(node: &Node) -> Option<u64> {
    Some(hash_of(node.labels()))
}

/// Ignores transition times, which change without the condition changing.
pub fn node_conditions(state: &SriovNetworkNodeState) -> Option<u64> {
    let mut conditions: Vec<_> = state
        .conditions()
        .iter()
        .map(|c| (&c.type_, &c.status, &c.reason, &c.message))
        .collect();
    conditions.sort();
    Some(hash_of(conditions))
}
