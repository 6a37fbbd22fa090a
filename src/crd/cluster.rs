use std::collections::BTreeMap;

use kube::api::{ApiResource, GroupVersionKind};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label set on every adopted provider object, valued with the owning
/// Cluster's name.
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Label identifying provider-owned CustomResourceDefinitions.
pub const PROVIDER_LABEL: &str = "cluster.x-k8s.io/provider";

/// Label identifying core tooling components on CustomResourceDefinitions.
pub const CORE_COMPONENT_LABEL: &str = "clusterctl.cluster.x-k8s.io/core";

/// Value of [`CORE_COMPONENT_LABEL`] marking cert-manager's own CRDs.
pub const CORE_COMPONENT_CERT_MANAGER: &str = "cert-manager";

/// Annotation suppressing reconciliation of the carrying object. The etcd
/// reconciler writes it onto the control plane object and removes it again
/// once etcd reports ready.
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

/// Condition types persisted on the Cluster status.
pub mod condition_types {
    /// Summarizes the operational state of the Cluster.
    pub const READY: &str = "Ready";
    /// Mirrored from the Ready condition of the infrastructure object.
    pub const INFRASTRUCTURE_READY: &str = "InfrastructureReady";
    /// Mirrored from the Ready condition of the control plane object.
    pub const CONTROL_PLANE_READY: &str = "ControlPlaneReady";
    /// Latched once the control plane provider reports initialization.
    pub const CONTROL_PLANE_INITIALIZED: &str = "ControlPlaneInitialized";
    /// Mirrored from the Ready condition of the managed etcd object.
    pub const MANAGED_ETCD_READY: &str = "ManagedEtcdReady";
    /// Latched once the etcd provider reports initialization.
    pub const MANAGED_ETCD_INITIALIZED: &str = "ManagedEtcdInitialized";
}

/// Condition reason strings persisted on the Cluster status.
pub mod condition_reasons {
    pub const WAITING_FOR_INFRASTRUCTURE: &str = "WaitingForInfrastructure";
    pub const WAITING_FOR_CONTROL_PLANE: &str = "WaitingForControlPlane";
    pub const WAITING_FOR_CONTROL_PLANE_INITIALIZED: &str =
        "WaitingForControlPlaneProviderInitialized";
    pub const WAITING_FOR_ETCD_INITIALIZED: &str = "WaitingForEtcdClusterProviderInitialized";
    pub const DELETING: &str = "Deleting";
    pub const DELETED: &str = "Deleted";
    pub const DELETION_FAILED: &str = "DeletionFailed";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Condition severity values
pub mod condition_severity {
    pub const INFO: &str = "Info";
    pub const WARNING: &str = "Warning";
    pub const ERROR: &str = "Error";
}

/// Cluster is the Schema for the clusters API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    plural = "clusters",
    shortname = "cl",
    namespaced,
    status = "ClusterStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Reference to the provider-specific infrastructure object for this
    /// cluster. The schema of the referenced object is provider-defined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ObjectReference>,

    /// Reference to the provider-specific control plane object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ObjectReference>,

    /// Reference to a managed external etcd provider object. When set, the
    /// control plane is held paused until etcd reports ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_external_etcd_ref: Option<ObjectReference>,

    /// Endpoint used to reach the cluster's API server. Populated from the
    /// infrastructure object once it is ready, unless set by the user.
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,
}

/// Typed reference to an API object in the Cluster's namespace.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// API version of the referenced object, e.g. "infrastructure.cluster.x-k8s.io/v1beta1"
    pub api_version: String,

    /// Kind of the referenced object
    pub kind: String,

    /// Name of the referenced object
    pub name: String,

    /// Namespace of the referenced object; defaults to the Cluster's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectReference {
    /// The API group portion of `api_version` ("" for the core group).
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    /// The version portion of `api_version`.
    pub fn version(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((_, version)) => version,
            None => &self.api_version,
        }
    }

    pub fn group_version_kind(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(self.group(), self.version(), &self.kind)
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk(&self.group_version_kind())
    }

    /// Returns a copy of the reference with `api_version` rewritten.
    pub fn with_api_version(&self, api_version: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            ..self.clone()
        }
    }
}

/// Host and port of the cluster's API server.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// Hostname or IP address of the endpoint
    #[serde(default)]
    pub host: String,

    /// Port of the endpoint
    #[serde(default)]
    pub port: i32,
}

impl ApiEndpoint {
    /// An endpoint is valid iff the host is non-empty and the port non-zero.
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && self.port != 0
    }
}

impl std::fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Observed state of a Cluster.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Current phase of the cluster lifecycle. Unknown strings are preserved
    /// as-is; the reconciler only ever writes the [`ClusterPhase`] vocabulary.
    #[serde(default)]
    pub phase: String,

    /// Mirrored from the infrastructure object's status.ready
    #[serde(default)]
    pub infrastructure_ready: bool,

    /// Mirrored from the control plane object's status.ready
    #[serde(default)]
    pub control_plane_ready: bool,

    /// Mirrored from the managed etcd object's status.ready
    #[serde(default)]
    pub managed_external_etcd_ready: bool,

    /// Latched true once the etcd provider reports initialization
    #[serde(default)]
    pub managed_external_etcd_initialized: bool,

    /// Failure reason surfaced from a provider object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Failure message surfaced from a provider object, prefixed with a
    /// citation of the reporting object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,

    /// Failure domains mirrored from the infrastructure object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failure_domains: BTreeMap<String, FailureDomainSpec>,

    /// Kubernetes-style conditions, at most one entry per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// A failure domain reported by the infrastructure provider.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailureDomainSpec {
    /// Whether control plane machines may be placed in this domain
    #[serde(default)]
    pub control_plane: bool,

    /// Provider-defined attributes of the domain
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// Lifecycle phases written into `status.phase`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ClusterPhase {
    /// Cluster has been accepted but has no infrastructure reference yet
    #[default]
    Pending,
    /// Infrastructure has been referenced and is being provisioned
    Provisioning,
    /// Infrastructure is ready and the control plane endpoint is set
    Provisioned,
    /// A provider reported an unrecoverable failure
    Failed,
    /// Cluster is being deleted
    Deleting,
}

impl ClusterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterPhase::Pending => "Pending",
            ClusterPhase::Provisioning => "Provisioning",
            ClusterPhase::Provisioned => "Provisioned",
            ClusterPhase::Failed => "Failed",
            ClusterPhase::Deleting => "Deleting",
        }
    }
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Severity when status is not True: Info, Warning, or Error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Reason for the condition's last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned between statuses
    pub last_transition_time: String,
}
