//! Status writes with optimistic-concurrency retries.

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::Resource;
use kube::ResourceExt;
use tracing::debug;
use tracing::warn;

use super::detect_transitions;
use super::StatusError;
use crate::client::EventSink;
use crate::client::StatusApi;
use crate::error::is_conflict;

pub const MAX_STATUS_UPDATE_ATTEMPTS: usize = 3;

/// Applies `mutate` to `obj` and writes its status, then emits one event per
/// condition transition from `old_conditions` to `new_conditions`.
///
/// A conflicting write re-fetches the object and runs `mutate` again on the
/// fresh copy, up to [`MAX_STATUS_UPDATE_ATTEMPTS`] attempts. Events are only
/// emitted once a write succeeds.
///
/// # Errors
///
/// - [`StatusError::ConflictRetriesExhausted`] wrapping the last conflict
/// - [`StatusError::UpdateFailed`] for any other write or re-fetch failure
pub async fn update_status_with_events<K, F>(
    api: &dyn StatusApi<K>,
    events: &dyn EventSink,
    obj: &K,
    old_conditions: &[Condition],
    new_conditions: &[Condition],
    mut mutate: F,
) -> Result<K, Report<StatusError>>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync,
    F: FnMut(&mut K) + Send,
{
    let kind = K::kind(&()).to_string();
    let name = obj.name_any();
    let mut current = obj.clone();

    let mut attempt = 0;
    let updated = loop {
        attempt += 1;
        let mut working = current.clone();
        mutate(&mut working);

        match api.patch_status(&current, &working).await {
            Ok(updated) => break updated,
            Err(report) if is_conflict(&report) && attempt < MAX_STATUS_UPDATE_ATTEMPTS => {
                debug!(%kind, %name, attempt, "status update conflicted, re-fetching");
                current = api
                    .get(&name)
                    .await
                    .change_context(StatusError::UpdateFailed {
                        kind: kind.clone(),
                        name: name.clone(),
                    })?;
            }
            Err(report) if is_conflict(&report) => {
                return Err(report.change_context(StatusError::ConflictRetriesExhausted {
                    kind,
                    name,
                    attempts: attempt,
                }));
            }
            Err(report) => {
                return Err(report.change_context(StatusError::UpdateFailed { kind, name }));
            }
        }
    };

    publish_transitions(events, &obj.object_ref(&()), old_conditions, new_conditions).await;
    Ok(updated)
}

async fn publish_transitions(
    events: &dyn EventSink,
    object: &ObjectReference,
    old_conditions: &[Condition],
    new_conditions: &[Condition],
) {
    for transition in detect_transitions(old_conditions, new_conditions) {
        let reason = transition.reason();
        if let Err(e) = events
            .publish(object, transition.event_type(), &reason, transition.message())
            .await
        {
            warn!(
                object = ?object.name,
                %reason,
                "Failed to publish condition event: {e:?}"
            );
        }
    }
}
