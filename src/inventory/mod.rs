//! Discovery-driven enumeration of the API resources a component installed.
//!
//! Used by uninstallation tooling against the same API server the
//! controller reconciles through.

pub mod proxy;
pub mod resources;

pub use proxy::{KubeconfigOptions, Proxy};
pub use resources::list_resources;
