//! Test fixtures and builders for Cluster resources and provider objects
//!
//! Provider objects referenced by a Cluster have user-defined schemas, so
//! the fixtures build them as free-form [`DynamicObject`] trees with only
//! the well-known fields populated.

use cluster_operator::crd::{
    ApiEndpoint, Cluster, ClusterSpec, ClusterStatus, ObjectReference,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kube::core::{ObjectMeta, TypeMeta};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const INFRASTRUCTURE_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta1";
pub const CONTROL_PLANE_API_VERSION: &str = "controlplane.cluster.x-k8s.io/v1beta1";
pub const ETCD_API_VERSION: &str = "etcdcluster.cluster.x-k8s.io/v1beta1";

pub fn infrastructure_ref(name: &str) -> ObjectReference {
    ObjectReference {
        api_version: INFRASTRUCTURE_API_VERSION.to_string(),
        kind: "FooCluster".to_string(),
        name: name.to_string(),
        namespace: None,
    }
}

pub fn control_plane_ref(name: &str) -> ObjectReference {
    ObjectReference {
        api_version: CONTROL_PLANE_API_VERSION.to_string(),
        kind: "BarControlPlane".to_string(),
        name: name.to_string(),
        namespace: None,
    }
}

pub fn etcd_ref(name: &str) -> ObjectReference {
    ObjectReference {
        api_version: ETCD_API_VERSION.to_string(),
        kind: "BazEtcdCluster".to_string(),
        name: name.to_string(),
        namespace: None,
    }
}

/// Builder for Cluster resources used across the unit tests.
pub struct ClusterBuilder {
    name: String,
    namespace: String,
    spec: ClusterSpec,
    status: Option<ClusterStatus>,
    annotations: BTreeMap<String, String>,
    deleting: bool,
}

impl ClusterBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec: ClusterSpec {
                infrastructure_ref: None,
                control_plane_ref: None,
                managed_external_etcd_ref: None,
                control_plane_endpoint: ApiEndpoint::default(),
            },
            status: None,
            annotations: BTreeMap::new(),
            deleting: false,
        }
    }

    pub fn with_infrastructure_ref(mut self, name: &str) -> Self {
        self.spec.infrastructure_ref = Some(infrastructure_ref(name));
        self
    }

    pub fn with_control_plane_ref(mut self, name: &str) -> Self {
        self.spec.control_plane_ref = Some(control_plane_ref(name));
        self
    }

    pub fn with_etcd_ref(mut self, name: &str) -> Self {
        self.spec.managed_external_etcd_ref = Some(etcd_ref(name));
        self
    }

    pub fn with_endpoint(mut self, host: &str, port: i32) -> Self {
        self.spec.control_plane_endpoint = ApiEndpoint {
            host: host.to_string(),
            port,
        };
        self
    }

    pub fn with_status(mut self, status: ClusterStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn build(self) -> Cluster {
        Cluster {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                uid: Some("test-uid-12345".to_string()),
                generation: Some(1),
                annotations: if self.annotations.is_empty() {
                    None
                } else {
                    Some(self.annotations)
                },
                deletion_timestamp: if self.deleting {
                    Some(Time(chrono::Utc::now()))
                } else {
                    None
                },
                ..Default::default()
            },
            spec: self.spec,
            status: self.status,
        }
    }
}

/// A minimal test cluster with no references.
pub fn create_test_cluster(name: &str, namespace: &str) -> Cluster {
    ClusterBuilder::new(name, namespace).build()
}

/// Build a provider object of the given kind with a free-form payload.
pub fn provider_object(api_version: &str, kind: &str, name: &str, data: Value) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some("provider-uid-67890".to_string()),
            ..Default::default()
        },
        data,
    }
}

/// An infrastructure object reporting ready with an endpoint.
pub fn ready_infrastructure(name: &str, host: &str, port: i32) -> DynamicObject {
    provider_object(
        INFRASTRUCTURE_API_VERSION,
        "FooCluster",
        name,
        json!({
            "spec": { "controlPlaneEndpoint": { "host": host, "port": port } },
            "status": { "ready": true },
        }),
    )
}
