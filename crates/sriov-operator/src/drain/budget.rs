//! Fleet-wide parallel drain budget.
//!
//! There is no lock: every reconcile rebuilds the snapshot from the API and
//! decides on its own. Nodes are walked in name order so two reconciles that
//! see the same snapshot hand the free slots to the same nodes. Two reconciles
//! racing on different snapshots can still over-admit briefly; the next
//! snapshot corrects it.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use sriov_api::DrainIntent;
use sriov_api::DrainProgress;
use sriov_api::SriovNetworkNodeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetEntry {
    pub intent: DrainIntent,
    pub progress: DrainProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// Budget is used up, or the free slots belong to nodes earlier in name
    /// order.
    Defer { in_flight: usize },
}

/// Drain intent and progress of every node with a node state, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSnapshot {
    entries: BTreeMap<String, FleetEntry>,
    /// Nodes that cannot start a drain, e.g. outside every machine config
    /// pool. They never take a slot ahead of other candidates.
    excluded: BTreeSet<String>,
}

impl FleetSnapshot {
    pub fn build(nodes: &[Node], node_states: &[SriovNetworkNodeState]) -> Self {
        let intents: BTreeMap<String, DrainIntent> = nodes
            .iter()
            .map(|node| {
                let intent = DrainIntent::from_annotations(node.metadata.annotations.as_ref())
                    .unwrap_or(DrainIntent::Idle);
                (node.name_any(), intent)
            })
            .collect();

        let entries = node_states
            .iter()
            .map(|state| {
                let name = state.name_any();
                let entry = FleetEntry {
                    intent: intents.get(&name).copied().unwrap_or(DrainIntent::Idle),
                    progress: state.drain_progress().unwrap_or(DrainProgress::Idle),
                };
                (name, entry)
            })
            .collect();

        Self {
            entries,
            excluded: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, name: &str, intent: DrainIntent, progress: DrainProgress) {
        self.entries
            .insert(name.to_string(), FleetEntry { intent, progress });
    }

    pub fn exclude(&mut self, name: &str) {
        self.excluded.insert(name.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&FleetEntry> {
        self.entries.get(name)
    }

    /// Nodes currently holding a budget slot.
    pub fn in_flight(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.progress.is_in_flight())
            .count()
    }

    /// Names, in order, of nodes waiting for a slot.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.intent == DrainIntent::DrainRequired && e.progress == DrainProgress::Idle)
            .map(|(name, _)| name.as_str())
            .filter(|name| !self.excluded.contains(*name))
    }

    /// Decides whether `node` may start draining. `max_parallel == 0` is
    /// unlimited.
    pub fn admission(&self, node: &str, max_parallel: u32) -> Admission {
        if max_parallel == 0 {
            return Admission::Admit;
        }

        let in_flight = self.in_flight();
        let free = (max_parallel as usize).saturating_sub(in_flight);
        if free == 0 {
            return Admission::Defer { in_flight };
        }

        match self.candidates().position(|name| name == node) {
            Some(rank) if rank < free => Admission::Admit,
            // not a candidate in this snapshot (stale read): only admit when
            // no earlier candidate competes for the slots
            None if self.candidates().count() < free => Admission::Admit,
            _ => Admission::Defer { in_flight },
        }
    }
}
