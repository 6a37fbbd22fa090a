//! Reconciliation of the managed external etcd object referenced by a Cluster

use kube::api::{Api, DynamicObject, PostParams};
use kube::ResourceExt;
use tracing::{error, info};

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::external::{self, reconcile_external};
use crate::controller::reconciler::PhaseResult;
use crate::controller::{conditions, unstructured};
use crate::crd::{
    condition_reasons, condition_severity, condition_types, Cluster, PAUSED_ANNOTATION,
};

/// Reconcile `spec.managedExternalEtcdRef`: adopt and mirror the etcd
/// object, and unpause the control plane once etcd reports ready.
pub async fn reconcile_etcd_cluster(ctx: &Context, cluster: &mut Cluster) -> Result<PhaseResult> {
    let Some(etcd_ref) = cluster.spec.managed_external_etcd_ref.clone() else {
        return Ok(PhaseResult::default());
    };

    let outcome = reconcile_external(ctx, cluster, &etcd_ref).await?;
    if outcome.requeue_after.is_some() {
        return Ok(PhaseResult {
            requeue_after: outcome.requeue_after,
            ..Default::default()
        });
    }
    if outcome.paused {
        return Ok(PhaseResult::default());
    }
    let Some(etcd) = outcome.result else {
        return Ok(PhaseResult::default());
    };

    if etcd.metadata.deletion_timestamp.is_some() {
        return Ok(PhaseResult::default());
    }

    let ready = unstructured::is_ready(&etcd)?;
    cluster
        .status
        .get_or_insert_with(Default::default)
        .managed_external_etcd_ready = ready;

    if ready {
        // Etcd is up; let the control plane provider proceed by clearing
        // the pause annotation the gating path wrote.
        if let Some(cp_ref) = cluster.spec.control_plane_ref.clone() {
            let namespace = cluster.namespace().unwrap_or_default();
            let Some(mut control_plane) =
                external::get(&ctx.client, &cp_ref, &namespace).await?
            else {
                info!(
                    kind = %cp_ref.kind,
                    name = %cp_ref.name,
                    "Could not find control plane for cluster, requeuing"
                );
                return Ok(PhaseResult::requeue_external());
            };

            if external::has_paused_annotation(&control_plane) {
                control_plane.annotations_mut().remove(PAUSED_ANNOTATION);
                let api: Api<DynamicObject> = Api::namespaced_with(
                    ctx.client.clone(),
                    &namespace,
                    &cp_ref.api_resource(),
                );
                if let Err(err) = api
                    .replace(&cp_ref.name, &PostParams::default(), &control_plane)
                    .await
                {
                    error!(error = %err, "error resuming control plane");
                    return Err(err.into());
                }
                ctx.publish_normal_event(
                    cluster,
                    "ControlPlaneResumed",
                    "Resume",
                    Some(format!(
                        "Resumed control plane {} now that etcd cluster {} is ready",
                        cp_ref.name, etcd_ref.name
                    )),
                )
                .await;
            }
        }
    }

    conditions::set_mirror(
        cluster,
        condition_types::MANAGED_ETCD_READY,
        &etcd,
        ready,
        condition_reasons::WAITING_FOR_ETCD_INITIALIZED,
    );

    if !conditions::is_true(cluster, condition_types::MANAGED_ETCD_INITIALIZED) {
        if unstructured::is_initialized(&etcd)? {
            info!("Marking etcd cluster initialized");
            cluster
                .status
                .get_or_insert_with(Default::default)
                .managed_external_etcd_initialized = true;
            conditions::mark_true(cluster, condition_types::MANAGED_ETCD_INITIALIZED);
        } else {
            conditions::mark_false(
                cluster,
                condition_types::MANAGED_ETCD_INITIALIZED,
                condition_reasons::WAITING_FOR_ETCD_INITIALIZED,
                condition_severity::INFO,
                "Waiting for etcd cluster provider to indicate the etcd has been initialized",
            );
        }
    }

    Ok(PhaseResult::default())
}
