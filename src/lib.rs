pub mod controller;
pub mod crd;
pub mod health;
pub mod inventory;

pub use controller::{error_policy, reconcile, BackoffConfig, Context, Error, Result};
pub use crd::Cluster;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use crate::controller::external::ExternalTracker;
use crate::health::HealthState;

/// Run the operator controller
///
/// This is the main controller loop that watches Cluster resources and
/// reconciles them. Provider objects referenced by a Cluster have kinds
/// that are unknown until runtime, so their watches are registered lazily
/// by the reconciler through the [`ExternalTracker`]; its trigger stream is
/// wired in here so that provider changes re-enqueue the owning Cluster.
pub async fn run_controller(client: Client, health_state: Option<Arc<HealthState>>) {
    tracing::info!("Starting controller for Cluster resources");

    let (external_tracker, external_triggers) = ExternalTracker::new(client.clone());
    let ctx = Arc::new(Context::new(client.clone(), external_tracker, health_state.clone()));

    let clusters: Api<Cluster> = Api::all(client.clone());

    // Configure watcher to handle dynamic resource creation
    let watcher_config = WatcherConfig::default().any_semantic();

    if let Some(state) = health_state {
        tokio::spawn(run_phase_metrics(client.clone(), state));
    }

    Controller::new(clusters, watcher_config)
        .reconcile_on(external_triggers)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    tracing::error!("Reconciliation error: {:?}", e);
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("Controller stream ended unexpectedly");
}

/// Periodically refresh the clusters-by-phase gauge from a full list.
async fn run_phase_metrics(client: Client, state: Arc<HealthState>) {
    let clusters: Api<Cluster> = Api::all(client);
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        match clusters.list(&ListParams::default()).await {
            Ok(list) => {
                let mut counts = std::collections::BTreeMap::<String, i64>::new();
                for cluster in &list.items {
                    let phase = cluster
                        .status
                        .as_ref()
                        .map(|s| s.phase.clone())
                        .unwrap_or_default();
                    *counts.entry(phase).or_default() += 1;
                }
                for (phase, count) in counts {
                    state.metrics.set_clusters_by_phase(&phase, count);
                }
            }
            Err(e) => {
                tracing::warn!("failed to list clusters for phase metrics: {}", e);
            }
        }
    }
}
