//! Generic reconciliation of provider objects referenced by a Cluster
//!
//! Every referenced provider object is handled uniformly: rewrite the
//! reference to the preferred served API version, fetch, gate on the pause
//! annotation, adopt (controller owner reference plus cluster-name label),
//! patch, register a watch so future changes re-trigger the owning Cluster,
//! then surface any provider-reported failure into the Cluster status.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use futures::channel::mpsc;
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::core::ApiResource;
use kube::discovery;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::unstructured::{describe, failures_from};
use crate::crd::{Cluster, ObjectReference, CLUSTER_NAME_LABEL, PAUSED_ANNOTATION};

/// Requeue interval while a referenced object is not yet observable.
pub const EXTERNAL_REQUEUE_AFTER: Duration = Duration::from_secs(30);

/// Outcome of reconciling one referenced provider object.
#[derive(Default)]
pub struct ReconcileOutput {
    /// The fetched object, when it was alive and unpaused
    pub result: Option<DynamicObject>,
    /// Requeue hint for soft misses
    pub requeue_after: Option<Duration>,
    /// The object (or the Cluster) carries the pause annotation
    pub paused: bool,
}

impl ReconcileOutput {
    fn requeue() -> Self {
        Self {
            requeue_after: Some(EXTERNAL_REQUEUE_AFTER),
            ..Default::default()
        }
    }

    fn paused() -> Self {
        Self {
            paused: true,
            ..Default::default()
        }
    }
}

/// Whether an object carries the pause annotation.
pub fn has_paused_annotation<K: Resource>(obj: &K) -> bool {
    obj.annotations().contains_key(PAUSED_ANNOTATION)
}

/// Pause is a predicate over the latest observed annotations of the Cluster
/// and the referenced object, never persisted state.
pub fn is_paused(cluster: &Cluster, obj: &DynamicObject) -> bool {
    has_paused_annotation(cluster) || has_paused_annotation(obj)
}

fn format_api_version(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_string()
    } else {
        format!("{group}/{version}")
    }
}

/// Cache of resolved API contracts keyed by group/kind. A provider's served
/// contract only moves when its CRD is upgraded, so one discovery
/// round-trip per kind covers the lifetime of the process.
#[derive(Default)]
pub struct ContractCache {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl ContractCache {
    pub fn get(&self, group: &str, kind: &str) -> Option<String> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .get(&(group.to_string(), kind.to_string()))
            .cloned()
    }

    pub fn insert(&self, group: &str, kind: &str, api_version: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(
            (group.to_string(), kind.to_string()),
            api_version.to_string(),
        );
    }
}

/// Rewrite a reference's apiVersion to the preferred served version of its
/// group/kind, falling back to any served version. No served version at all
/// is an error that fails the whole reconcile. Resolutions are looked up in
/// the context's contract cache before going to discovery.
pub async fn resolve_api_contract(
    ctx: &Context,
    reference: &ObjectReference,
) -> Result<ObjectReference> {
    let group_name = reference.group();
    if let Some(api_version) = ctx.contract_cache.get(group_name, &reference.kind) {
        return Ok(reference.with_api_version(&api_version));
    }

    let apigroup = discovery::group(&ctx.client, group_name).await?;
    let Some(resolved) = select_served_version(&apigroup, group_name, &reference.kind) else {
        return Err(Error::InvalidReference(format!(
            "no served version of {}/{} found on the API server",
            group_name, reference.kind
        )));
    };

    ctx.contract_cache
        .insert(group_name, &reference.kind, &resolved);
    Ok(reference.with_api_version(&resolved))
}

/// Pick the group's preferred version when it serves the kind, else the
/// first other version that does.
fn select_served_version(
    apigroup: &discovery::ApiGroup,
    group: &str,
    kind: &str,
) -> Option<String> {
    let serves = |version: &str| {
        apigroup
            .versioned_resources(version)
            .iter()
            .any(|(ar, _)| ar.kind == kind)
    };

    let preferred = apigroup.preferred_version_or_latest();
    if serves(preferred) {
        return Some(format_api_version(group, preferred));
    }
    for version in apigroup.versions() {
        let version: &str = version.as_ref();
        if serves(version) {
            return Some(format_api_version(group, version));
        }
    }
    None
}

/// Fetch a referenced object from the cluster's namespace. A missing object
/// reads as `None`; callers turn that into a soft requeue.
pub async fn get(
    client: &Client,
    reference: &ObjectReference,
    namespace: &str,
) -> Result<Option<DynamicObject>> {
    let resource = reference.api_resource();
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &resource);
    Ok(api.get_opt(&reference.name).await?)
}

/// Set a controller-type owner reference from the Cluster onto the object
/// and apply the cluster-name label. Fails when a different controller
/// already owns the object.
pub fn adopt(cluster: &Cluster, obj: &mut DynamicObject) -> Result<()> {
    let uid = cluster.uid().ok_or_else(|| {
        Error::InvalidReference("cluster has no uid; cannot own referenced objects".into())
    })?;
    let desired = OwnerReference {
        api_version: Cluster::api_version(&()).into_owned(),
        kind: Cluster::kind(&()).into_owned(),
        name: cluster.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    };

    let owners = obj.metadata.owner_references.get_or_insert_with(Vec::new);
    if let Some(existing) = owners.iter_mut().find(|o| o.controller == Some(true)) {
        if existing.uid != desired.uid {
            return Err(Error::OwnerConflict(describe(obj)));
        }
        *existing = desired;
    } else {
        owners.push(desired);
    }

    obj.labels_mut()
        .insert(CLUSTER_NAME_LABEL.to_string(), cluster.name_any());
    Ok(())
}

/// Failure messages copied from a provider object cite the reporting
/// object so the user can find it.
pub fn failure_message_citation(reference: &ObjectReference, message: &str) -> String {
    format!(
        "Failure detected from referenced resource {}, Kind={} with name \"{}\": {}",
        reference.api_version, reference.kind, reference.name, message
    )
}

/// Generic external reconciler for any object referenced from a Cluster.
pub async fn reconcile_external(
    ctx: &Context,
    cluster: &mut Cluster,
    reference: &ObjectReference,
) -> Result<ReconcileOutput> {
    let reference = resolve_api_contract(ctx, reference).await?;
    let namespace = cluster.namespace().unwrap_or_default();
    let resource = reference.api_resource();
    let api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), &namespace, &resource);

    let Some(mut obj) = api.get_opt(&reference.name).await? else {
        info!(
            api_version = %reference.api_version,
            kind = %reference.kind,
            name = %reference.name,
            "Could not find external object for cluster, requeuing"
        );
        return Ok(ReconcileOutput::requeue());
    };

    if is_paused(cluster, &obj) {
        debug!(name = %reference.name, "External object referenced is paused");
        return Ok(ReconcileOutput::paused());
    }

    adopt(cluster, &mut obj)?;

    // Two-way merge against the object as fetched: only adoption metadata
    // is ever mutated here.
    let patch = json!({
        "metadata": {
            "ownerReferences": obj.metadata.owner_references,
            "labels": { CLUSTER_NAME_LABEL: cluster.name_any() },
        }
    });
    api.patch(&reference.name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    ctx.external_tracker.watch(&resource)?;

    let (failure_reason, failure_message) = failures_from(&obj)?;
    if failure_reason.is_some() || failure_message.is_some() {
        let status = cluster.status.get_or_insert_with(Default::default);
        if let Some(reason) = failure_reason {
            status.failure_reason = Some(reason);
        }
        if let Some(message) = failure_message {
            status.failure_message = Some(failure_message_citation(&reference, &message));
        }
    }

    Ok(ReconcileOutput {
        result: Some(obj),
        ..Default::default()
    })
}

/// Watches referenced provider kinds and translates their events into
/// reconcile triggers for the owning Cluster. Registration is idempotent
/// per group/version/kind; each new kind gets one long-lived watch task.
pub struct ExternalTracker {
    client: Client,
    trigger: mpsc::UnboundedSender<ObjectRef<Cluster>>,
    watched: Mutex<HashSet<String>>,
}

impl ExternalTracker {
    /// Returns the tracker plus the trigger stream to hand to the
    /// controller's reconcile-on input.
    pub fn new(client: Client) -> (Self, mpsc::UnboundedReceiver<ObjectRef<Cluster>>) {
        let (trigger, receiver) = mpsc::unbounded();
        (
            Self {
                client,
                trigger,
                watched: Mutex::new(HashSet::new()),
            },
            receiver,
        )
    }

    /// Start watching a provider kind if it is not watched already.
    pub fn watch(&self, resource: &ApiResource) -> Result<()> {
        let key = format!("{}/{}", resource.api_version, resource.kind);
        {
            let mut watched = self
                .watched
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !watched.insert(key.clone()) {
                return Ok(());
            }
        }
        info!(gvk = %key, "Watching external object kind for cluster changes");

        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), resource);
        let sender = self.trigger.clone();
        tokio::spawn(async move {
            let stream = watcher(api, watcher::Config::default().any_semantic())
                .default_backoff()
                .touched_objects();
            futures::pin_mut!(stream);
            while let Some(event) = stream.next().await {
                match event {
                    Ok(obj) => {
                        let namespace = obj.namespace().unwrap_or_default();
                        for owner in obj.owner_references() {
                            if owner.kind == "Cluster"
                                && owner.api_version.starts_with("cluster.x-k8s.io/")
                            {
                                let cluster =
                                    ObjectRef::<Cluster>::new(&owner.name).within(&namespace);
                                if sender.unbounded_send(cluster).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(gvk = %key, error = %e, "external watch error");
                    }
                }
            }
        });
        Ok(())
    }
}
