//! Field extraction from provider objects of unknown schema
//!
//! Provider objects referenced by a Cluster are free-form trees; the
//! controller only understands a handful of well-known paths. Extraction is
//! by path: a missing path is not an error for optional fields, while a
//! present-but-misshapen field always is.

use std::collections::BTreeMap;

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::controller::error::{Error, Result};
use crate::crd::{ApiEndpoint, FailureDomainSpec};

/// Walk `path` through a free-form tree, returning the node it lands on.
pub fn nested_value<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

/// A human-readable handle for error messages: `<kind>/<name>` when the
/// object carries type information, `<name>` otherwise.
pub fn describe(obj: &DynamicObject) -> String {
    match &obj.types {
        Some(t) => format!("{}/{}", t.kind, obj.name_any()),
        None => obj.name_any(),
    }
}

fn nested_bool(obj: &DynamicObject, path: &[&str]) -> Result<Option<bool>> {
    match nested_value(&obj.data, path) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(Error::MalformedField {
            object: describe(obj),
            path: path.join("."),
            reason: format!("expected bool, found {other}"),
        }),
    }
}

fn nested_string(obj: &DynamicObject, path: &[&str]) -> Result<Option<String>> {
    match nested_value(&obj.data, path) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::MalformedField {
            object: describe(obj),
            path: path.join("."),
            reason: format!("expected string, found {other}"),
        }),
    }
}

fn nested_typed<T: DeserializeOwned>(obj: &DynamicObject, path: &[&str]) -> Result<Option<T>> {
    match nested_value(&obj.data, path) {
        None => Ok(None),
        Some(value) => {
            serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::MalformedField {
                    object: describe(obj),
                    path: path.join("."),
                    reason: e.to_string(),
                })
        }
    }
}

/// Read `status.ready` from a provider object. An absent field reads as
/// not-ready; a non-boolean field is an error.
pub fn is_ready(obj: &DynamicObject) -> Result<bool> {
    Ok(nested_bool(obj, &["status", "ready"])?.unwrap_or(false))
}

/// Read `status.initialized` from a provider object, with the same absence
/// semantics as [`is_ready`].
pub fn is_initialized(obj: &DynamicObject) -> Result<bool> {
    Ok(nested_bool(obj, &["status", "initialized"])?.unwrap_or(false))
}

/// Read `status.failureReason` and `status.failureMessage` from a provider
/// object. Both fields are optional.
pub fn failures_from(obj: &DynamicObject) -> Result<(Option<String>, Option<String>)> {
    let reason = nested_string(obj, &["status", "failureReason"])?;
    let message = nested_string(obj, &["status", "failureMessage"])?;
    Ok((reason, message))
}

/// Read `spec.controlPlaneEndpoint` from an infrastructure object. The
/// field is required once the object reports ready; absence is an error.
pub fn control_plane_endpoint(obj: &DynamicObject) -> Result<ApiEndpoint> {
    nested_typed::<ApiEndpoint>(obj, &["spec", "controlPlaneEndpoint"])?.ok_or_else(|| {
        Error::MissingField {
            object: describe(obj),
            path: "spec.controlPlaneEndpoint".into(),
        }
    })
}

/// Read `status.failureDomains` from an infrastructure object. Absence is
/// benign; a present field that does not parse is an error.
pub fn failure_domains(
    obj: &DynamicObject,
) -> Result<Option<BTreeMap<String, FailureDomainSpec>>> {
    nested_typed(obj, &["status", "failureDomains"])
}
