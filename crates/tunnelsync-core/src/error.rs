//! Error types for the tunnel sync system
//!
//! This module defines all error types used throughout the crate.
//!
//! No variant is process-fatal. The engine decides, per variant, whether a
//! failure aborts the current cycle or only the item being processed:
//!
//! | Variant                | Scope                         |
//! |------------------------|-------------------------------|
//! | `DiscoveryUnavailable` | aborts cycle                  |
//! | `Config`               | aborts cycle                  |
//! | `RuleParse`            | skips one router              |
//! | `Transient`            | retried by `RetryPolicy`      |
//! | `Rejected`             | fails one item, no retry      |
//! | `RetryExhausted`       | fails one item                |
//! | `ZoneNotFound`         | fails one hostname            |

use thiserror::Error;

/// Result type alias for tunnel sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the tunnel sync system
#[derive(Error, Debug)]
pub enum Error {
    /// The router discovery API could not be reached or returned garbage
    #[error("Router discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// A router rule could not be parsed
    #[error("Rule parse error in router {router}: {message}")]
    RuleParse {
        /// Router name
        router: String,
        /// What went wrong
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// External API failure that is worth retrying (timeouts, 5xx, 429)
    #[error("Transient error ({provider}): {message}")]
    Transient {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// External API refused the request (auth, validation)
    #[error("Request rejected ({provider}, status {status:?}): {message}")]
    Rejected {
        /// Provider name
        provider: String,
        /// HTTP status, when the failure came from a response
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// All retry attempts failed
    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetryExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error returned by the final attempt
        last: Box<Error>,
    },

    /// No managed zone covers the hostname
    #[error("No managed zone for hostname: {0}")]
    ZoneNotFound(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::DiscoveryUnavailable(msg.into())
    }

    /// Create a rule parse error
    pub fn rule_parse(router: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleParse {
            router: router.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transient (retryable) provider error
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a non-retryable provider error
    pub fn rejected(
        provider: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a "no zone" error
    pub fn zone_not_found(hostname: impl Into<String>) -> Self {
        Self::ZoneNotFound(hostname.into())
    }

    /// Classify a failed HTTP response
    ///
    /// 429 and 5xx are transient, every other status is a rejection.
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::rejected(
                provider,
                Some(status),
                format!(
                    "Authentication failed: invalid API token or insufficient permissions. {}",
                    body
                ),
            ),
            404 => Self::rejected(provider, Some(status), format!("Not found: {}", body)),
            429 => Self::transient(
                provider,
                format!("Rate limit exceeded (status {}): {}", status, body),
            ),
            500..=599 => Self::transient(
                provider,
                format!("Server error (status {}): {}", status, body),
            ),
            _ => Self::rejected(provider, Some(status), body.to_string()),
        }
    }

    /// Whether the retry policy should try again after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error aborts the whole cycle rather than a single item
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, Self::DiscoveryUnavailable(_) | Self::Config(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
