//! Condition list diffing and the events emitted for each transition.

use derive_more::Display;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use sriov_api::consts::STATUS_TRUE;

use crate::conditions::find_condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TransitionKind {
    Added,
    Changed,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EventType {
    Normal,
    Warning,
}

/// One condition type that differs between two lists.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub type_: String,
    pub kind: TransitionKind,
    pub old: Option<Condition>,
    pub new: Option<Condition>,
}

impl Transition {
    /// `Normal` when the condition lands on `True`, `Warning` otherwise.
    pub fn event_type(&self) -> EventType {
        match (&self.kind, &self.new) {
            (TransitionKind::Added | TransitionKind::Changed, Some(new))
                if new.status == STATUS_TRUE =>
            {
                EventType::Normal
            }
            _ => EventType::Warning,
        }
    }

    /// e.g. `ReadyChanged`
    pub fn reason(&self) -> String {
        format!("{}{}", self.type_, self.kind)
    }

    pub fn message(&self) -> &str {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|c| c.message.as_str())
            .unwrap_or_default()
    }
}

/// Lists the transitions from `old` to `new`. Order is unspecified.
pub fn detect_transitions(old: &[Condition], new: &[Condition]) -> Vec<Transition> {
    let mut transitions = Vec::new();

    for condition in new {
        match find_condition(old, &condition.type_) {
            None => transitions.push(Transition {
                type_: condition.type_.clone(),
                kind: TransitionKind::Added,
                old: None,
                new: Some(condition.clone()),
            }),
            Some(previous)
                if previous.status != condition.status
                    || previous.reason != condition.reason
                    || previous.message != condition.message =>
            {
                transitions.push(Transition {
                    type_: condition.type_.clone(),
                    kind: TransitionKind::Changed,
                    old: Some(previous.clone()),
                    new: Some(condition.clone()),
                })
            }
            Some(_) => {}
        }
    }

    for condition in old {
        if find_condition(new, &condition.type_).is_none() {
            transitions.push(Transition {
                type_: condition.type_.clone(),
                kind: TransitionKind::Removed,
                old: Some(condition.clone()),
                new: None,
            });
        }
    }

    transitions
}
