//! Enumeration of every live API resource installed by a component
//!
//! Walks the server's preferred API resources, filters to kinds that can be
//! listed and deleted, and returns all objects matching a label selector.
//! Payloads of CRDs owned by the component itself are excluded: their
//! definitions may already be mid-deletion, and listing them would fail or
//! return objects the CRD removal will collect anyway.

use std::collections::{BTreeMap, HashSet};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DynamicObject, ListParams};
use kube::core::ApiResource;
use kube::discovery::{verbs, Discovery, Scope};
use kube::Client;
use tracing::debug;

use crate::controller::error::{retry_with_backoff, BackoffConfig, Error, Result};
use crate::crd::{CORE_COMPONENT_CERT_MANAGER, CORE_COMPONENT_LABEL, PROVIDER_LABEL};

/// Resource plurals that `extensions/v1beta1` duplicates from their modern
/// API groups; the modern group wins.
const DEPRECATED_EXTENSIONS_RESOURCES: [&str; 5] = [
    "daemonsets",
    "deployments",
    "replicasets",
    "networkpolicies",
    "ingresses",
];

/// Render a label map as an API list selector.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// True for the `extensions/v1beta1` aliases that must be dropped in favor
/// of their modern groups.
pub fn is_deprecated_extensions_alias(resource: &ApiResource) -> bool {
    resource.api_version == "extensions/v1beta1"
        && DEPRECATED_EXTENSIONS_RESOURCES.contains(&resource.plural.as_str())
}

/// Compute the `(group, version, kind)` triples whose payloads must not be
/// listed: every declared version of each CRD that either belongs to
/// cert-manager (when the query targets the cert-manager core component) or
/// carries a provider label.
pub fn crd_exclusion_set(
    crds: &[CustomResourceDefinition],
    labels: &BTreeMap<String, String>,
) -> HashSet<(String, String, String)> {
    let targets_cert_manager = labels
        .get(CORE_COMPONENT_LABEL)
        .is_some_and(|component| component == CORE_COMPONENT_CERT_MANAGER);

    let mut excluded = HashSet::new();
    for crd in crds {
        let is_provider_resource = crd
            .metadata
            .labels
            .as_ref()
            .is_some_and(|l| l.contains_key(PROVIDER_LABEL));
        if targets_cert_manager || is_provider_resource {
            for version in &crd.spec.versions {
                excluded.insert((
                    crd.spec.group.clone(),
                    version.name.clone(),
                    crd.spec.names.kind.clone(),
                ));
            }
        }
    }
    excluded
}

/// List namespaced and cluster-wide resources for a component matching the
/// labels. Namespaced resources are only listed in the given namespaces.
pub async fn list_resources(
    client: &Client,
    labels: &BTreeMap<String, String>,
    namespaces: &[String],
) -> Result<Vec<DynamicObject>> {
    let backoff = BackoffConfig::read();

    let discovery = retry_with_backoff(&backoff, || async {
        Discovery::new(client.clone()).run().await.map_err(Error::from)
    })
    .await?;

    let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crds = retry_with_backoff(&backoff, || async {
        crd_api
            .list(&ListParams::default())
            .await
            .map_err(Error::from)
    })
    .await?;
    let excluded = crd_exclusion_set(&crds.items, labels);

    let selector = label_selector(labels);
    let mut ret = Vec::new();

    for group in discovery.groups() {
        for (resource, capabilities) in group.recommended_resources() {
            if !(capabilities.supports_operation(verbs::LIST)
                && capabilities.supports_operation(verbs::DELETE))
            {
                continue;
            }
            if is_deprecated_extensions_alias(&resource) {
                continue;
            }
            if excluded.contains(&(
                resource.group.clone(),
                resource.version.clone(),
                resource.kind.clone(),
            )) {
                debug!(kind = %resource.kind, "skipping component-owned CRD payloads");
                continue;
            }

            match capabilities.scope {
                Scope::Namespaced => {
                    for namespace in namespaces {
                        let api: Api<DynamicObject> =
                            Api::namespaced_with(client.clone(), namespace, &resource);
                        append_list(&backoff, &api, &selector, &mut ret).await?;
                    }
                }
                Scope::Cluster => {
                    let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
                    append_list(&backoff, &api, &selector, &mut ret).await?;
                }
            }
        }
    }

    Ok(ret)
}

/// List one resource kind by selector. A 404 is benign: the resource can
/// vanish between discovery and the list call.
async fn append_list(
    backoff: &BackoffConfig,
    api: &Api<DynamicObject>,
    selector: &str,
    out: &mut Vec<DynamicObject>,
) -> Result<()> {
    let params = ListParams::default().labels(selector);
    let list = retry_with_backoff(backoff, || async {
        match api.list(&params).await {
            Ok(list) => Ok(Some(list)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    })
    .await?;

    if let Some(list) = list {
        out.extend(list.items);
    }
    Ok(())
}
