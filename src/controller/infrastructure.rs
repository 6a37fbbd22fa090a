//! Reconciliation of the infrastructure provider object referenced by a Cluster

use tracing::debug;

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::external::reconcile_external;
use crate::controller::reconciler::PhaseResult;
use crate::controller::{conditions, unstructured};
use crate::crd::{condition_reasons, condition_types, Cluster};

/// Reconcile `spec.infrastructureRef`: adopt the object, mirror its
/// readiness, and pull the control plane endpoint and failure domains out
/// of it once it is ready.
pub async fn reconcile_infrastructure(ctx: &Context, cluster: &mut Cluster) -> Result<PhaseResult> {
    let Some(reference) = cluster.spec.infrastructure_ref.clone() else {
        return Ok(PhaseResult::default());
    };

    let outcome = reconcile_external(ctx, cluster, &reference).await?;
    if outcome.requeue_after.is_some() {
        return Ok(PhaseResult {
            requeue_after: outcome.requeue_after,
            ..Default::default()
        });
    }
    if outcome.paused {
        return Ok(PhaseResult::default());
    }
    let Some(infra) = outcome.result else {
        return Ok(PhaseResult::default());
    };

    // The object is going away; leave the last observed state untouched.
    if infra.metadata.deletion_timestamp.is_some() {
        return Ok(PhaseResult::default());
    }

    let ready = unstructured::is_ready(&infra)?;
    cluster
        .status
        .get_or_insert_with(Default::default)
        .infrastructure_ready = ready;

    conditions::set_mirror(
        cluster,
        condition_types::INFRASTRUCTURE_READY,
        &infra,
        ready,
        condition_reasons::WAITING_FOR_INFRASTRUCTURE,
    );

    if !ready {
        debug!("Infrastructure provider is not ready yet");
        return Ok(PhaseResult::default());
    }

    // The endpoint is required from a ready infrastructure object unless the
    // user already set one.
    if !cluster.spec.control_plane_endpoint.is_valid() {
        cluster.spec.control_plane_endpoint = unstructured::control_plane_endpoint(&infra)?;
    }

    if let Some(domains) = unstructured::failure_domains(&infra)? {
        cluster
            .status
            .get_or_insert_with(Default::default)
            .failure_domains = domains;
    }

    Ok(PhaseResult::default())
}
