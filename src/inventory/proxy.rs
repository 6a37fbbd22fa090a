//! Connection layer for the administrative tooling
//!
//! Builds clients from a kubeconfig file with explicit overrides, and
//! refuses to talk to API servers below the minimum supported version.

use std::path::PathBuf;
use std::time::Duration;

use http::header::{HeaderValue, USER_AGENT};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::controller::error::{retry_with_backoff, BackoffConfig, Error, Result};

/// Oldest management cluster version the tooling supports.
pub const MINIMUM_SERVER_VERSION: (u32, u32) = (1, 20);

/// Kubeconfig loading options recognized by the tooling.
#[derive(Clone, Debug)]
pub struct KubeconfigOptions {
    /// Kubeconfig file to load; standard loading rules apply when unset
    pub path: Option<PathBuf>,
    /// Context name override; the file's current-context when unset
    pub context: Option<String>,
    /// Per-request deadline
    pub timeout: Duration,
}

impl Default for KubeconfigOptions {
    fn default() -> Self {
        Self {
            path: None,
            context: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Access point to the management cluster for out-of-band tooling.
pub struct Proxy {
    options: KubeconfigOptions,
}

impl Proxy {
    pub fn new(options: KubeconfigOptions) -> Self {
        Self { options }
    }

    /// Build the client configuration from the kubeconfig file.
    pub async fn config(&self) -> Result<Config> {
        let kubeconfig = match &self.options.path {
            Some(path) => Kubeconfig::read_from(path),
            None => Kubeconfig::read(),
        }
        .map_err(|e| Error::KubeconfigError(e.to_string()))?;

        let overrides = KubeConfigOptions {
            context: self.options.context.clone(),
            cluster: None,
            user: None,
        };
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &overrides)
            .await
            .map_err(|e| Error::KubeconfigError(e.to_string()))?;

        config.connect_timeout = Some(self.options.timeout);
        config.read_timeout = Some(self.options.timeout);
        config.headers.push((
            USER_AGENT,
            HeaderValue::from_str(&user_agent())
                .map_err(|e| Error::KubeconfigError(e.to_string()))?,
        ));

        Ok(config)
    }

    /// Build a client, retrying transient connection problems, and enforce
    /// the minimum server version on first use.
    pub async fn client(&self) -> Result<Client> {
        let config = self.config().await?;
        let client = retry_with_backoff(&BackoffConfig::connect(), || {
            let config = config.clone();
            async move { Client::try_from(config).map_err(Error::from) }
        })
        .await?;

        validate_server_version(&client).await?;
        Ok(client)
    }

    /// List every resource the component identified by `labels` installed.
    pub async fn list_resources(
        &self,
        labels: &std::collections::BTreeMap<String, String>,
        namespaces: &[String],
    ) -> Result<Vec<kube::api::DynamicObject>> {
        let client = self.client().await?;
        crate::inventory::resources::list_resources(&client, labels, namespaces).await
    }
}

fn user_agent() -> String {
    format!(
        "cluster-operator/{} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

async fn validate_server_version(client: &Client) -> Result<()> {
    let version = client.apiserver_version().await?;
    let found = if version.git_version.is_empty() {
        format!("v{}.{}", version.major, version.minor)
    } else {
        version.git_version.clone()
    };

    let Some(observed) = parse_major_minor(&version.major, &version.minor) else {
        return Err(Error::UnsupportedServerVersion {
            found,
            minimum: minimum_version_string(),
        });
    };

    if observed < MINIMUM_SERVER_VERSION {
        return Err(Error::UnsupportedServerVersion {
            found,
            minimum: minimum_version_string(),
        });
    }
    Ok(())
}

fn minimum_version_string() -> String {
    format!("v{}.{}", MINIMUM_SERVER_VERSION.0, MINIMUM_SERVER_VERSION.1)
}

/// Parse the discovery version strings; minor versions on managed offerings
/// come with a trailing "+" that must not fail the comparison.
pub fn parse_major_minor(major: &str, minor: &str) -> Option<(u32, u32)> {
    let digits = |s: &str| -> Option<u32> {
        let trimmed: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
        trimmed.parse().ok()
    };
    Some((digits(major)?, digits(minor)?))
}
