//! Condition management for Cluster resources
//!
//! Conditions are keyed by type with at most one entry per type. The
//! transition time only moves when the status value actually changes, so a
//! reconcile that re-asserts the same state leaves the timestamp alone.

use chrono::Utc;
use kube::api::DynamicObject;

use crate::controller::unstructured::nested_value;
use crate::crd::{condition_severity, condition_status, condition_types, Cluster, Condition};

/// Look up a condition by type.
pub fn get<'a>(cluster: &'a Cluster, type_: &str) -> Option<&'a Condition> {
    cluster
        .status
        .as_ref()?
        .conditions
        .iter()
        .find(|c| c.type_ == type_)
}

/// True iff the condition exists with status True.
pub fn is_true(cluster: &Cluster, type_: &str) -> bool {
    get(cluster, type_).is_some_and(|c| c.status == condition_status::TRUE)
}

/// Set a condition, replacing any existing entry of the same type. The
/// lastTransitionTime is carried over when the status value is unchanged.
/// Conditions are kept sorted with `Ready` first, then lexicographically.
pub fn set(cluster: &mut Cluster, mut condition: Condition) {
    let status = cluster.status.get_or_insert_with(Default::default);

    if let Some(existing) = status
        .conditions
        .iter_mut()
        .find(|c| c.type_ == condition.type_)
    {
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time.clone();
        }
        *existing = condition;
    } else {
        status.conditions.push(condition);
    }

    status.conditions.sort_by(|a, b| {
        let rank = |c: &Condition| (c.type_ != condition_types::READY, c.type_.clone());
        rank(a).cmp(&rank(b))
    });
}

/// Mark a condition True.
pub fn mark_true(cluster: &mut Cluster, type_: &str) {
    set(
        cluster,
        Condition {
            type_: type_.to_string(),
            status: condition_status::TRUE.to_string(),
            severity: None,
            reason: None,
            message: None,
            last_transition_time: Utc::now().to_rfc3339(),
        },
    );
}

/// Mark a condition False with a reason and severity.
pub fn mark_false(cluster: &mut Cluster, type_: &str, reason: &str, severity: &str, message: &str) {
    set(
        cluster,
        Condition {
            type_: type_.to_string(),
            status: condition_status::FALSE.to_string(),
            severity: Some(severity.to_string()),
            reason: Some(reason.to_string()),
            message: if message.is_empty() {
                None
            } else {
                Some(message.to_string())
            },
            last_transition_time: Utc::now().to_rfc3339(),
        },
    );
}

/// Read the `Ready` condition from a provider object's status, if the
/// provider publishes conditions at all.
pub fn ready_condition_of(obj: &DynamicObject) -> Option<Condition> {
    let conditions = nested_value(&obj.data, &["status", "conditions"])?.as_array()?;
    let source = conditions
        .iter()
        .filter_map(|c| c.as_object())
        .find(|c| c.get("type").and_then(|t| t.as_str()) == Some("Ready"))?;

    let field = |key: &str| {
        source
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    Some(Condition {
        type_: "Ready".to_string(),
        status: field("status")?,
        severity: field("severity"),
        reason: field("reason"),
        message: field("message"),
        last_transition_time: field("lastTransitionTime").unwrap_or_default(),
    })
}

/// Mirror a provider object's `Ready` condition into `target_type` on the
/// Cluster. When the provider does not publish one, synthesize a fallback
/// from the extracted ready bit with the given waiting reason.
pub fn set_mirror(
    cluster: &mut Cluster,
    target_type: &str,
    source: &DynamicObject,
    fallback_ready: bool,
    fallback_reason: &str,
) {
    match ready_condition_of(source) {
        Some(mirrored) => set(
            cluster,
            Condition {
                type_: target_type.to_string(),
                last_transition_time: Utc::now().to_rfc3339(),
                ..mirrored
            },
        ),
        None => {
            if fallback_ready {
                mark_true(cluster, target_type);
            } else {
                mark_false(
                    cluster,
                    target_type,
                    fallback_reason,
                    condition_severity::INFO,
                    "",
                );
            }
        }
    }
}
