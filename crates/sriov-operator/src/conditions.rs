//! Ordered list of typed status conditions.
//!
//! A list holds at most one condition per type. `lastTransitionTime` moves only
//! when the status of a type flips and is ignored when comparing lists, so an
//! unchanged list never causes a status write.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use sriov_api::consts::STATUS_TRUE;

/// Inserts or updates the condition of `type_`.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    generation: i64,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = Time(Utc::now());
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = Some(generation);
        return;
    }

    conditions.push(Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation: Some(generation),
        last_transition_time: Time(Utc::now()),
    });
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn remove_condition(conditions: &mut Vec<Condition>, type_: &str) {
    conditions.retain(|c| c.type_ != type_);
}

pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == STATUS_TRUE)
}

/// Compares two lists ignoring order and `lastTransitionTime`.
pub fn conditions_equal(a: &[Condition], b: &[Condition]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().all(|left| {
        find_condition(b, &left.type_).is_some_and(|right| {
            left.status == right.status
                && left.reason == right.reason
                && left.message == right.message
                && left.observed_generation == right.observed_generation
        })
    })
}

/// True when `type_` is absent or its status, reason or message differ.
pub fn has_condition_changed(
    conditions: &[Condition],
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> bool {
    match find_condition(conditions, type_) {
        None => true,
        Some(c) => c.status != status || c.reason != reason || c.message != message,
    }
}
