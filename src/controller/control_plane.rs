//! Reconciliation of the control plane provider object referenced by a Cluster

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

/// Reconcile `spec.controlPlaneRef`. When a managed external etcd is also
/// referenced and not yet ready, the control plane object is held paused so
/// the provider does not start provisioning against a missing etcd.
pub async fn reconcile_control_plane(ctx: &Context, cluster: &mut Cluster) -> Result<PhaseResult> {
    let Some(cp_ref) = cluster.spec.control_plane_ref.clone() else {
        return Ok(PhaseResult::default());
    };
    let namespace = cluster.namespace().unwrap_or_default();

    if let Some(etcd_ref) = cluster.spec.managed_external_etcd_ref.clone() {
        let Some(etcd) = external::get(&ctx.client, &etcd_ref, &namespace).await? else {
            info!(
                kind = %etcd_ref.kind,
                name = %etcd_ref.name,
                "Could not find external etcd object for cluster, requeuing"
            );
            return Ok(PhaseResult::requeue_external());
        };

        if !unstructured::is_ready(&etcd)? {
            // Etcd is not up yet; suspend control plane provisioning by
            // annotating the control plane object.
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

            if !external::has_paused_annotation(&control_plane) {
                control_plane
                    .annotations_mut()
                    .insert(PAUSED_ANNOTATION.to_string(), "true".to_string());
                let api: Api<DynamicObject> = Api::namespaced_with(
                    ctx.client.clone(),
                    &namespace,
                    &cp_ref.api_resource(),
                );
                if let Err(err) = api
                    .replace(&cp_ref.name, &PostParams::default(), &control_plane)
                    .await
                {
                    // The queue redrives on error; the explicit requeue flag
                    // carried alongside it in the original wiring is
                    // subsumed by that.
                    error!(error = %err, "error pausing control plane");
                    return Err(err.into());
                }
                ctx.publish_normal_event(
                    cluster,
                    "ControlPlanePaused",
                    "Pause",
                    Some(format!(
                        "Paused control plane {} until etcd cluster {} is ready",
                        cp_ref.name, etcd_ref.name
                    )),
                )
                .await;
            }
        }
    }

    let outcome = reconcile_external(ctx, cluster, &cp_ref).await?;
    if outcome.requeue_after.is_some() {
        return Ok(PhaseResult {
            requeue_after: outcome.requeue_after,
            ..Default::default()
        });
    }
    if outcome.paused {
        return Ok(PhaseResult::default());
    }
    let Some(control_plane) = outcome.result else {
        return Ok(PhaseResult::default());
    };

    if control_plane.metadata.deletion_timestamp.is_some() {
        return Ok(PhaseResult::default());
    }

    let ready = unstructured::is_ready(&control_plane)?;
    cluster
        .status
        .get_or_insert_with(Default::default)
        .control_plane_ready = ready;

    conditions::set_mirror(
        cluster,
        condition_types::CONTROL_PLANE_READY,
        &control_plane,
        ready,
        condition_reasons::WAITING_FOR_CONTROL_PLANE,
    );

    // Initialization latches: once observed true it is never re-evaluated,
    // so a provider briefly regressing its initialized field cannot
    // un-initialize the cluster.
    if !conditions::is_true(cluster, condition_types::CONTROL_PLANE_INITIALIZED) {
        if unstructured::is_initialized(&control_plane)? {
            conditions::mark_true(cluster, condition_types::CONTROL_PLANE_INITIALIZED);
        } else {
            conditions::mark_false(
                cluster,
                condition_types::CONTROL_PLANE_INITIALIZED,
                condition_reasons::WAITING_FOR_CONTROL_PLANE_INITIALIZED,
                condition_severity::INFO,
                "Waiting for control plane provider to indicate the control plane has been initialized",
            );
        }
    }

    Ok(PhaseResult::default())
}
