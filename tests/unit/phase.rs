//! Unit tests for the lifecycle phase labeler

use cluster_operator::controller::reconcile_phase;
use cluster_operator::crd::ClusterStatus;

use crate::common::fixtures::ClusterBuilder;

fn phase_of(cluster: &cluster_operator::crd::Cluster) -> &str {
    &cluster.status.as_ref().unwrap().phase
}

#[test]
fn fresh_cluster_is_pending() {
    let mut cluster = ClusterBuilder::new("c1", "default").build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Pending");
}

#[test]
fn empty_phase_string_is_always_overwritten() {
    let mut cluster = ClusterBuilder::new("c1", "default")
        .with_status(ClusterStatus {
            phase: String::new(),
            ..Default::default()
        })
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Pending");
}

#[test]
fn infrastructure_ref_means_provisioning() {
    let mut cluster = ClusterBuilder::new("c1", "default")
        .with_infrastructure_ref("foo1")
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Provisioning");
}

#[test]
fn ready_infrastructure_with_endpoint_means_provisioned() {
    let mut cluster = ClusterBuilder::new("c1", "default")
        .with_infrastructure_ref("foo1")
        .with_endpoint("1.2.3.4", 6443)
        .with_status(ClusterStatus {
            infrastructure_ready: true,
            ..Default::default()
        })
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Provisioned");
}

#[test]
fn invalid_endpoint_keeps_provisioning() {
    // Port zero never counts as a usable endpoint.
    let mut cluster = ClusterBuilder::new("c1", "default")
        .with_infrastructure_ref("foo1")
        .with_endpoint("1.2.3.4", 0)
        .with_status(ClusterStatus {
            infrastructure_ready: true,
            ..Default::default()
        })
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Provisioning");
}

#[test]
fn failure_fields_mean_failed() {
    let mut cluster = ClusterBuilder::new("c1", "default")
        .with_infrastructure_ref("foo1")
        .with_endpoint("1.2.3.4", 6443)
        .with_status(ClusterStatus {
            infrastructure_ready: true,
            failure_reason: Some("InvalidImage".to_string()),
            ..Default::default()
        })
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Failed");

    let mut cluster = ClusterBuilder::new("c2", "default")
        .with_status(ClusterStatus {
            failure_message: Some("boom".to_string()),
            ..Default::default()
        })
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Failed");
}

#[test]
fn deletion_dominates_failure() {
    // The clauses overwrite in order, so a failed cluster that is also
    // being deleted lands in Deleting.
    let mut cluster = ClusterBuilder::new("c1", "default")
        .with_infrastructure_ref("foo1")
        .with_status(ClusterStatus {
            failure_reason: Some("InvalidImage".to_string()),
            ..Default::default()
        })
        .deleting()
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Deleting");
}

#[test]
fn unknown_phase_is_preserved_when_no_clause_fires() {
    let mut cluster = ClusterBuilder::new("c1", "default")
        .with_status(ClusterStatus {
            phase: "Hibernated".to_string(),
            ..Default::default()
        })
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Hibernated");
}

#[test]
fn unknown_phase_is_overwritten_by_later_clause() {
    let mut cluster = ClusterBuilder::new("c1", "default")
        .with_infrastructure_ref("foo1")
        .with_status(ClusterStatus {
            phase: "Hibernated".to_string(),
            ..Default::default()
        })
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Provisioning");
}

#[test]
fn missing_infrastructure_ref_stays_out_of_provisioning() {
    // Without an infrastructure reference the cluster can only be
    // Pending, Failed, or Deleting.
    let mut cluster = ClusterBuilder::new("c1", "default").build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Pending");
    assert!(!cluster.status.as_ref().unwrap().infrastructure_ready);

    let mut cluster = ClusterBuilder::new("c2", "default")
        .with_status(ClusterStatus {
            failure_reason: Some("x".to_string()),
            ..Default::default()
        })
        .build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Failed");

    let mut cluster = ClusterBuilder::new("c3", "default").deleting().build();
    reconcile_phase(&mut cluster);
    assert_eq!(phase_of(&cluster), "Deleting");
}
