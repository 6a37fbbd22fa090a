//! Error types for the Cluster controller and the inventory engine

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("object {0} is already owned by another controller")]
    OwnerConflict(String),

    #[error("required field {path} missing from {object}")]
    MissingField { object: String, path: String },

    #[error("malformed field {path} on {object}: {reason}")]
    MalformedField {
        object: String,
        path: String,
        reason: String,
    },

    #[error("invalid kubeconfig file: {0}")]
    KubeconfigError(String),

    #[error("unsupported management cluster server version: {found} - minimum required version is {minimum}")]
    UnsupportedServerVersion { found: String, minimum: String },
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    // 5xx errors are retryable
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            Error::SerializationError(_) => false,
            Error::InvalidReference(_) => false,
            Error::OwnerConflict(_) => false,
            Error::MissingField { .. } => false,
            Error::MalformedField { .. } => false,
            Error::KubeconfigError(_) => false,
            Error::UnsupportedServerVersion { .. } => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
    /// Bounded number of attempts for wrapped operations
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: 5,
        }
    }
}

impl BackoffConfig {
    /// Profile for establishing the first connection to an API server.
    pub fn connect() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_attempts: 8,
            ..Self::default()
        }
    }

    /// Profile for read operations (discovery, listing) against a reachable
    /// but possibly flaky API server.
    pub fn read() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            max_attempts: 6,
            ..Self::default()
        }
    }

    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        // Apply jitter
        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Non-retryable errors get a long fixed delay so that manual
            // intervention or an external change can resolve them
            self.max_delay
        }
    }
}

/// Run `op` until it succeeds, the error stops being retryable, or the
/// attempts are exhausted. The inventory engine wraps connection and list
/// calls in this to tolerate transient API server unavailability.
pub async fn retry_with_backoff<T, F, Fut>(backoff: &BackoffConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= backoff.max_attempts || !err.is_retryable() {
                    return Err(err);
                }
                let delay = backoff.delay_for_attempt(attempt - 1);
                tracing::debug!(attempt, ?delay, error = %err, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
