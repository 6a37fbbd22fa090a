//! Unit tests for the generic external reconciler's pure pieces

use cluster_operator::controller::error::Error;
use cluster_operator::controller::external::{
    adopt, failure_message_citation, has_paused_annotation, is_paused, ContractCache,
};
use cluster_operator::controller::unstructured;
use cluster_operator::crd::{CLUSTER_NAME_LABEL, PAUSED_ANNOTATION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use serde_json::json;

use crate::common::fixtures::{
    infrastructure_ref, provider_object, ready_infrastructure, ClusterBuilder,
    INFRASTRUCTURE_API_VERSION,
};

#[test]
fn pause_is_a_predicate_over_annotations() {
    let cluster = ClusterBuilder::new("c1", "default").build();
    let obj = provider_object(INFRASTRUCTURE_API_VERSION, "FooCluster", "foo1", json!({}));
    assert!(!is_paused(&cluster, &obj));

    let paused_cluster = ClusterBuilder::new("c1", "default")
        .with_annotation(PAUSED_ANNOTATION, "")
        .build();
    assert!(is_paused(&paused_cluster, &obj));

    let mut paused_obj = provider_object(INFRASTRUCTURE_API_VERSION, "FooCluster", "foo1", json!({}));
    paused_obj
        .annotations_mut()
        .insert(PAUSED_ANNOTATION.to_string(), "true".to_string());
    assert!(has_paused_annotation(&paused_obj));
    assert!(is_paused(&cluster, &paused_obj));
}

#[test]
fn adopt_sets_controller_owner_and_label() {
    let cluster = ClusterBuilder::new("c1", "default").build();
    let mut obj = provider_object(INFRASTRUCTURE_API_VERSION, "FooCluster", "foo1", json!({}));

    adopt(&cluster, &mut obj).unwrap();

    let owners = obj.metadata.owner_references.as_ref().unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "Cluster");
    assert_eq!(owners[0].name, "c1");
    assert_eq!(owners[0].controller, Some(true));
    assert_eq!(obj.labels()[CLUSTER_NAME_LABEL], "c1");
}

#[test]
fn adopt_is_idempotent() {
    let cluster = ClusterBuilder::new("c1", "default").build();
    let mut obj = provider_object(INFRASTRUCTURE_API_VERSION, "FooCluster", "foo1", json!({}));

    adopt(&cluster, &mut obj).unwrap();
    adopt(&cluster, &mut obj).unwrap();

    assert_eq!(obj.metadata.owner_references.as_ref().unwrap().len(), 1);
}

#[test]
fn adopt_rejects_foreign_controller_owner() {
    let cluster = ClusterBuilder::new("c1", "default").build();
    let mut obj = provider_object(INFRASTRUCTURE_API_VERSION, "FooCluster", "foo1", json!({}));
    obj.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "cluster.x-k8s.io/v1beta1".to_string(),
        kind: "Cluster".to_string(),
        name: "someone-else".to_string(),
        uid: "other-uid".to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]);

    assert!(matches!(
        adopt(&cluster, &mut obj),
        Err(Error::OwnerConflict(_))
    ));
}

#[test]
fn adopt_keeps_non_controller_owners() {
    let cluster = ClusterBuilder::new("c1", "default").build();
    let mut obj = provider_object(INFRASTRUCTURE_API_VERSION, "FooCluster", "foo1", json!({}));
    obj.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "v1".to_string(),
        kind: "ConfigMap".to_string(),
        name: "unrelated".to_string(),
        uid: "cm-uid".to_string(),
        controller: None,
        block_owner_deletion: None,
    }]);

    adopt(&cluster, &mut obj).unwrap();
    let owners = obj.metadata.owner_references.as_ref().unwrap();
    assert_eq!(owners.len(), 2);
    assert!(owners.iter().any(|o| o.name == "unrelated"));
}

#[test]
fn contract_cache_is_keyed_by_group_and_kind() {
    let cache = ContractCache::default();
    assert_eq!(
        cache.get("infrastructure.cluster.x-k8s.io", "FooCluster"),
        None
    );

    cache.insert(
        "infrastructure.cluster.x-k8s.io",
        "FooCluster",
        "infrastructure.cluster.x-k8s.io/v1beta1",
    );
    assert_eq!(
        cache.get("infrastructure.cluster.x-k8s.io", "FooCluster"),
        Some("infrastructure.cluster.x-k8s.io/v1beta1".to_string())
    );

    // Other kinds in the same group still resolve through discovery.
    assert_eq!(
        cache.get("infrastructure.cluster.x-k8s.io", "FooMachine"),
        None
    );

    // A later resolution replaces the cached contract.
    cache.insert(
        "infrastructure.cluster.x-k8s.io",
        "FooCluster",
        "infrastructure.cluster.x-k8s.io/v1beta2",
    );
    assert_eq!(
        cache.get("infrastructure.cluster.x-k8s.io", "FooCluster"),
        Some("infrastructure.cluster.x-k8s.io/v1beta2".to_string())
    );
}

#[test]
fn failure_citation_names_the_reporting_object() {
    let reference = infrastructure_ref("foo1");
    let message = failure_message_citation(&reference, "not found");
    assert_eq!(
        message,
        "Failure detected from referenced resource infrastructure.cluster.x-k8s.io/v1beta1, \
         Kind=FooCluster with name \"foo1\": not found"
    );
}

#[test]
fn ready_infrastructure_provides_endpoint() {
    let infra = ready_infrastructure("foo1", "1.2.3.4", 6443);
    assert!(unstructured::is_ready(&infra).unwrap());
    let endpoint = unstructured::control_plane_endpoint(&infra).unwrap();
    assert_eq!(endpoint.host, "1.2.3.4");
    assert_eq!(endpoint.port, 6443);
    assert!(endpoint.is_valid());
}

#[test]
fn provider_failures_surface_verbatim() {
    let obj = provider_object(
        INFRASTRUCTURE_API_VERSION,
        "FooCluster",
        "foo1",
        json!({"status": {
            "failureReason": "InvalidImage",
            "failureMessage": "not found",
        }}),
    );
    let (reason, message) = unstructured::failures_from(&obj).unwrap();
    assert_eq!(reason.as_deref(), Some("InvalidImage"));
    assert_eq!(message.as_deref(), Some("not found"));
}
