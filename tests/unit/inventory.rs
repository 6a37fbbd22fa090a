//! Unit tests for the resource inventory engine's filtering

use std::collections::BTreeMap;

use cluster_operator::crd::{CORE_COMPONENT_CERT_MANAGER, CORE_COMPONENT_LABEL, PROVIDER_LABEL};
use cluster_operator::inventory::resources::{
    crd_exclusion_set, is_deprecated_extensions_alias, label_selector,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionNames, CustomResourceDefinitionSpec,
    CustomResourceDefinitionVersion,
};
use kube::core::{ApiResource, GroupVersionKind};

fn crd(
    group: &str,
    kind: &str,
    plural: &str,
    versions: &[&str],
    labels: &[(&str, &str)],
) -> CustomResourceDefinition {
    CustomResourceDefinition {
        metadata: kube::core::ObjectMeta {
            name: Some(format!("{plural}.{group}")),
            labels: if labels.is_empty() {
                None
            } else {
                Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                )
            },
            ..Default::default()
        },
        spec: CustomResourceDefinitionSpec {
            group: group.to_string(),
            names: CustomResourceDefinitionNames {
                kind: kind.to_string(),
                plural: plural.to_string(),
                ..Default::default()
            },
            scope: "Namespaced".to_string(),
            versions: versions
                .iter()
                .map(|name| CustomResourceDefinitionVersion {
                    name: name.to_string(),
                    served: true,
                    storage: *name == versions[versions.len() - 1],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        },
        status: None,
    }
}

fn provider_labels(provider: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(PROVIDER_LABEL.to_string(), provider.to_string())])
}

#[test]
fn provider_crds_are_excluded_in_every_version() {
    let crds = vec![crd(
        "infrastructure.cluster.x-k8s.io",
        "AWSCluster",
        "awsclusters",
        &["v1", "v2"],
        &[(PROVIDER_LABEL, "aws")],
    )];

    let excluded = crd_exclusion_set(&crds, &provider_labels("aws"));
    assert!(excluded.contains(&(
        "infrastructure.cluster.x-k8s.io".to_string(),
        "v1".to_string(),
        "AWSCluster".to_string()
    )));
    assert!(excluded.contains(&(
        "infrastructure.cluster.x-k8s.io".to_string(),
        "v2".to_string(),
        "AWSCluster".to_string()
    )));
}

#[test]
fn unlabeled_crds_are_not_excluded() {
    let crds = vec![crd(
        "example.com",
        "Widget",
        "widgets",
        &["v1"],
        &[],
    )];
    let excluded = crd_exclusion_set(&crds, &provider_labels("aws"));
    assert!(excluded.is_empty());
}

#[test]
fn cert_manager_component_excludes_all_crds() {
    // When the query targets the cert-manager core component, even CRDs
    // without a provider label are its own payload definitions.
    let crds = vec![crd(
        "cert-manager.io",
        "Certificate",
        "certificates",
        &["v1"],
        &[],
    )];

    let core_labels = BTreeMap::from([(
        CORE_COMPONENT_LABEL.to_string(),
        CORE_COMPONENT_CERT_MANAGER.to_string(),
    )]);
    let excluded = crd_exclusion_set(&crds, &core_labels);
    assert!(excluded.contains(&(
        "cert-manager.io".to_string(),
        "v1".to_string(),
        "Certificate".to_string()
    )));

    // The same CRD set queried for a provider component stays listable.
    let excluded = crd_exclusion_set(&crds, &provider_labels("aws"));
    assert!(excluded.is_empty());
}

#[test]
fn deprecated_extensions_aliases_are_dropped() {
    let deployments = ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("extensions", "v1beta1", "Deployment"),
        "deployments",
    );
    assert!(is_deprecated_extensions_alias(&deployments));

    let modern = ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("apps", "v1", "Deployment"),
        "deployments",
    );
    assert!(!is_deprecated_extensions_alias(&modern));

    // Other extensions/v1beta1 resources are kept; only the duplicated
    // five are dropped.
    let psp = ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("extensions", "v1beta1", "PodSecurityPolicy"),
        "podsecuritypolicies",
    );
    assert!(!is_deprecated_extensions_alias(&psp));
}

#[test]
fn label_selector_rendering() {
    let labels = BTreeMap::from([
        (PROVIDER_LABEL.to_string(), "aws".to_string()),
        ("app".to_string(), "controller".to_string()),
    ]);
    // BTreeMap iteration is ordered, so the selector is deterministic.
    assert_eq!(
        label_selector(&labels),
        "app=controller,cluster.x-k8s.io/provider=aws"
    );
    assert_eq!(label_selector(&BTreeMap::new()), "");
}
