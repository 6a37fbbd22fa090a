//! Reconciliation logic for Cluster resources
//!
//! One level-triggered pass: fetch the Cluster, run the sub-reconcilers in
//! fixed order (infrastructure, etcd, control plane, kubeconfig), relabel
//! the lifecycle phase, and commit the accumulated mutations as a two-way
//! merge patch against the snapshot taken at entry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::controller::context::{Context, FIELD_MANAGER};
use crate::controller::control_plane::reconcile_control_plane;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::etcd::reconcile_etcd_cluster;
use crate::controller::external::EXTERNAL_REQUEUE_AFTER;
use crate::controller::infrastructure::reconcile_infrastructure;
use crate::controller::kubeconfig::reconcile_kubeconfig;
use crate::controller::conditions;
use crate::crd::{
    condition_reasons, condition_severity, condition_types, Cluster, ClusterPhase,
};

/// Resync interval for clusters with nothing outstanding.
const RESYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Outcome of one sub-reconciler.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PhaseResult {
    /// Requeue hint for soft misses; the smallest hint across
    /// sub-reconcilers wins.
    pub requeue_after: Option<Duration>,
}

impl PhaseResult {
    /// Standard soft-miss result: the referenced object (or a dependent
    /// secret) is not observable yet.
    pub fn requeue_external() -> Self {
        Self {
            requeue_after: Some(EXTERNAL_REQUEUE_AFTER),
        }
    }

    fn merge_into(self, requeue_after: &mut Option<Duration>) {
        if let Some(after) = self.requeue_after {
            *requeue_after = Some(match *requeue_after {
                Some(existing) => existing.min(after),
                None => after,
            });
        }
    }
}

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let ns = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();

    info!("Reconciling Cluster");

    // All mutations are local to this copy until the final patch.
    let mut cluster = (*cluster).clone();
    let spec_snapshot = serde_json::to_value(&cluster.spec)?;
    let status_snapshot = serde_json::to_value(&cluster.status)?;

    if cluster.metadata.deletion_timestamp.is_some() {
        conditions::mark_false(
            &mut cluster,
            condition_types::READY,
            condition_reasons::DELETING,
            condition_severity::INFO,
            "",
        );
        reconcile_phase(&mut cluster);
        patch_cluster(&ctx, &ns, &name, &cluster, &spec_snapshot, &status_snapshot).await?;
        // Subordinates are garbage collected through their owner references.
        return Ok(Action::await_change());
    }

    let mut requeue_after: Option<Duration> = None;

    // Fixed order; the first error aborts the pass and neither the phase
    // labeler nor the patch runs.
    reconcile_infrastructure(&ctx, &mut cluster)
        .await?
        .merge_into(&mut requeue_after);
    reconcile_etcd_cluster(&ctx, &mut cluster)
        .await?
        .merge_into(&mut requeue_after);
    reconcile_control_plane(&ctx, &mut cluster)
        .await?
        .merge_into(&mut requeue_after);
    reconcile_kubeconfig(&ctx, &mut cluster)
        .await?
        .merge_into(&mut requeue_after);

    reconcile_phase(&mut cluster);
    cluster
        .status
        .get_or_insert_with(Default::default)
        .observed_generation = cluster.metadata.generation;

    patch_cluster(&ctx, &ns, &name, &cluster, &spec_snapshot, &status_snapshot).await?;

    ctx.record_reconcile(&ns, &name, start.elapsed().as_secs_f64());

    match requeue_after {
        Some(after) => Ok(Action::requeue(after)),
        None => Ok(Action::requeue(RESYNC_INTERVAL)),
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(cluster: Arc<Cluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();
    let ns = cluster.namespace().unwrap_or_default();
    let backoff = BackoffConfig::default();

    ctx.record_error(&ns, &name);
    let delay = backoff.delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {:?}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

/// Derive the lifecycle phase from the observed Cluster fields.
///
/// Each clause sets the phase unconditionally, so later clauses override
/// earlier ones; in particular a failed cluster that is also being deleted
/// lands in Deleting. Unknown phase strings already present are preserved
/// unless a clause fires.
pub fn reconcile_phase(cluster: &mut Cluster) {
    let deleting = cluster.metadata.deletion_timestamp.is_some();
    let has_infrastructure_ref = cluster.spec.infrastructure_ref.is_some();
    let endpoint_valid = cluster.spec.control_plane_endpoint.is_valid();
    let status = cluster.status.get_or_insert_with(Default::default);

    if status.phase.is_empty() {
        status.phase = ClusterPhase::Pending.to_string();
    }

    if has_infrastructure_ref {
        status.phase = ClusterPhase::Provisioning.to_string();
    }

    if status.infrastructure_ready && endpoint_valid {
        status.phase = ClusterPhase::Provisioned.to_string();
    }

    if status.failure_reason.is_some() || status.failure_message.is_some() {
        status.phase = ClusterPhase::Failed.to_string();
    }

    if deleting {
        status.phase = ClusterPhase::Deleting.to_string();
    }
}

/// Commit local mutations: a merge patch on the spec when the endpoint was
/// filled in, and a status patch when anything in the status moved. Both
/// diffs are computed against the entry snapshot; concurrent writers show
/// up as API conflicts and are retried through the queue.
async fn patch_cluster(
    ctx: &Context,
    ns: &str,
    name: &str,
    cluster: &Cluster,
    spec_snapshot: &Value,
    status_snapshot: &Value,
) -> Result<()> {
    let api: Api<Cluster> = Api::namespaced(ctx.client.clone(), ns);

    let spec_now = serde_json::to_value(&cluster.spec)?;
    if spec_now != *spec_snapshot {
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&json!({ "spec": &cluster.spec })),
        )
        .await?;
    }

    let status_now = serde_json::to_value(&cluster.status)?;
    if status_now != *status_snapshot {
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&json!({ "status": &cluster.status })),
        )
        .await?;
    }

    Ok(())
}
