//! Drain intent and drain progress values.

use std::collections::BTreeMap;

use derive_more::Display;

use crate::consts::NODE_DRAIN_ANNOTATION;
use crate::consts::NODE_STATE_DRAIN_ANNOTATION;

/// What the per-node agent asks for, read from the Node annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DrainIntent {
    #[display("Idle")]
    Idle,
    #[display("Drain_Required")]
    DrainRequired,
    /// Written by older agents that drained on their own.
    #[display("Draining")]
    Draining,
}

impl DrainIntent {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Idle" => Some(Self::Idle),
            "Drain_Required" => Some(Self::DrainRequired),
            "Draining" => Some(Self::Draining),
            _ => None,
        }
    }

    /// Reads the intent annotation; a missing annotation means `Idle`.
    ///
    /// Returns `Err` with the raw value when it is not part of the vocabulary.
    pub fn from_annotations(annotations: Option<&BTreeMap<String, String>>) -> Result<Self, String> {
        match annotations.and_then(|a| a.get(NODE_DRAIN_ANNOTATION)) {
            None => Ok(Self::Idle),
            Some(value) => Self::parse(value).ok_or_else(|| value.clone()),
        }
    }
}

/// Drain bookkeeping owned by the operator, stored on the node state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DrainProgress {
    #[display("Idle")]
    Idle,
    #[display("Draining_MCP_Paused")]
    McpPaused,
    #[display("Draining")]
    Draining,
    #[display("DrainComplete")]
    Complete,
}

impl DrainProgress {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Idle" => Some(Self::Idle),
            "Draining_MCP_Paused" => Some(Self::McpPaused),
            "Draining" => Some(Self::Draining),
            "DrainComplete" => Some(Self::Complete),
            _ => None,
        }
    }

    /// `None` when the annotation is missing or holds an unknown value.
    pub fn from_annotations(annotations: Option<&BTreeMap<String, String>>) -> Option<Self> {
        annotations
            .and_then(|a| a.get(NODE_STATE_DRAIN_ANNOTATION))
            .and_then(|v| Self::parse(v))
    }

    /// Whether this node occupies a slot of the parallel drain budget.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::McpPaused | Self::Draining)
    }
}
