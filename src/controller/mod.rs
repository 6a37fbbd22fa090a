//! Cluster controller: reconciliation of Cluster resources and the
//! provider objects they reference.

pub mod conditions;
pub mod context;
pub mod control_plane;
pub mod error;
pub mod etcd;
pub mod external;
pub mod infrastructure;
pub mod kubeconfig;
pub mod reconciler;
pub mod unstructured;

pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use reconciler::{error_policy, reconcile, reconcile_phase, PhaseResult};
