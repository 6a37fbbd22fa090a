//! Bootstrap kubeconfig secret for clusters without a control plane provider
//!
//! When a control plane provider is referenced it owns the kubeconfig; this
//! sub-reconciler only exists for the legacy case where the endpoint comes
//! straight from the infrastructure object.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, PostParams};
use kube::core::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde_json::json;
use tracing::info;

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::reconciler::PhaseResult;
use crate::crd::{Cluster, CLUSTER_NAME_LABEL};

/// Secret name suffixes, one per purpose, keyed off the cluster name.
pub const KUBECONFIG_SECRET_SUFFIX: &str = "kubeconfig";
pub const CLUSTER_CA_SECRET_SUFFIX: &str = "ca";

pub fn secret_name(cluster_name: &str, suffix: &str) -> String {
    format!("{cluster_name}-{suffix}")
}

enum MintOutcome {
    Created,
    MissingCa,
}

/// Ensure the bootstrap kubeconfig secret exists when this controller is
/// responsible for it.
pub async fn reconcile_kubeconfig(ctx: &Context, cluster: &mut Cluster) -> Result<PhaseResult> {
    if !cluster.spec.control_plane_endpoint.is_valid() {
        return Ok(PhaseResult::default());
    }
    // A control plane provider manages the kubeconfig itself.
    if cluster.spec.control_plane_ref.is_some() {
        return Ok(PhaseResult::default());
    }

    let namespace = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);

    if secrets
        .get_opt(&secret_name(&name, KUBECONFIG_SECRET_SUFFIX))
        .await?
        .is_some()
    {
        return Ok(PhaseResult::default());
    }

    match mint_kubeconfig_secret(&secrets, cluster).await? {
        MintOutcome::Created => Ok(PhaseResult::default()),
        MintOutcome::MissingCa => {
            info!(
                secret = %secret_name(&name, CLUSTER_CA_SECRET_SUFFIX),
                "could not find CA secret for cluster, requeuing"
            );
            Ok(PhaseResult::requeue_external())
        }
    }
}

/// Build and create the kubeconfig secret from the cluster CA secret. The
/// CA pair doubles as the client credential; certificate issuance itself is
/// out of this controller's hands.
async fn mint_kubeconfig_secret(secrets: &Api<Secret>, cluster: &Cluster) -> Result<MintOutcome> {
    let name = cluster.name_any();
    let Some(ca) = secrets
        .get_opt(&secret_name(&name, CLUSTER_CA_SECRET_SUFFIX))
        .await?
    else {
        return Ok(MintOutcome::MissingCa);
    };

    let ca_data = ca.data.unwrap_or_default();
    let cert = ca_data.get("tls.crt").ok_or_else(|| Error::MissingField {
        object: secret_name(&name, CLUSTER_CA_SECRET_SUFFIX),
        path: "data.tls.crt".into(),
    })?;
    let key = ca_data.get("tls.key").ok_or_else(|| Error::MissingField {
        object: secret_name(&name, CLUSTER_CA_SECRET_SUFFIX),
        path: "data.tls.key".into(),
    })?;

    let server = format!("https://{}", cluster.spec.control_plane_endpoint);
    let user = format!("{name}-admin");
    // ByteString serializes to its base64 form, which is exactly what the
    // *-data kubeconfig fields carry.
    let kubeconfig = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": name,
            "cluster": {
                "server": server,
                "certificate-authority-data": cert,
            },
        }],
        "users": [{
            "name": user,
            "user": {
                "client-certificate-data": cert,
                "client-key-data": key,
            },
        }],
        "contexts": [{
            "name": format!("{user}@{name}"),
            "context": {
                "cluster": name,
                "user": user,
            },
        }],
        "current-context": format!("{user}@{name}"),
    });

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name(&name, KUBECONFIG_SECRET_SUFFIX)),
            namespace: cluster.namespace(),
            labels: Some(BTreeMap::from([(
                CLUSTER_NAME_LABEL.to_string(),
                name.clone(),
            )])),
            owner_references: cluster.uid().map(|uid| {
                vec![OwnerReference {
                    api_version: Cluster::api_version(&()).into_owned(),
                    kind: Cluster::kind(&()).into_owned(),
                    name: name.clone(),
                    uid,
                    controller: Some(true),
                    block_owner_deletion: Some(true),
                }]
            }),
            ..Default::default()
        },
        type_: Some("cluster.x-k8s.io/secret".to_string()),
        string_data: Some(BTreeMap::from([(
            "value".to_string(),
            serde_json::to_string_pretty(&kubeconfig)?,
        )])),
        ..Default::default()
    };

    secrets.create(&PostParams::default(), &secret).await?;
    info!(cluster = %name, "created bootstrap kubeconfig secret");
    Ok(MintOutcome::Created)
}
