//! Error types for the gatesync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for gatesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the gatesync system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (missing credentials, account id, bad limits)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain count exceeds the quota of the configured accounts
    #[error(
        "Not enough accounts configured. Need {accounts_required} accounts for {domains} domains \
         ({per_account} per account), but only {accounts_configured} accounts are configured."
    )]
    Capacity {
        /// Number of domains that were handed to the partitioner
        domains: usize,
        /// Usable domains per account
        per_account: usize,
        /// Accounts needed to hold every domain
        accounts_required: usize,
        /// Accounts actually configured
        accounts_configured: usize,
    },

    /// Transport-level failure (connection, timeout, unreadable body)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Remote service answered with a server error
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Creating the list for one chunk failed; remaining chunks were not attempted
    #[error("Could not create \"{list}\" after creating {created} list(s): {source}")]
    ListCreate {
        /// Name of the list that failed
        list: String,
        /// Lists created for the account before the failure
        created: usize,
        /// Underlying remote error
        #[source]
        source: Box<Error>,
    },

    /// A sequential delete stopped before every resource was removed
    #[error("Deleted {deleted} {resource}(s) before failing, {remaining} left in place: {source}")]
    PartialDelete {
        /// Kind of resource ("list" or "rule")
        resource: &'static str,
        /// Resources deleted before the failure
        deleted: usize,
        /// Resources not deleted
        remaining: usize,
        /// Underlying remote error
        #[source]
        source: Box<Error>,
    },

    /// Filesystem errors (domain source files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a server-side unavailability error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a retry of the same remote call may succeed.
    ///
    /// Only the transport client acts on this; the engine never retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimited(_) | Self::Unavailable(_)
        )
    }

    /// Whether this error is fatal before any remote call is made
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Capacity { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_message_states_required_and_configured() {
        let err = Error::Capacity {
            domains: 600_000,
            per_account: 299_999,
            accounts_required: 3,
            accounts_configured: 2,
        };

        let msg = err.to_string();
        assert!(msg.contains("Need 3 accounts"));
        assert!(msg.contains("only 2 accounts are configured"));
        assert!(err.is_preflight());
    }

    #[test]
    fn transient_classification() {
        assert!(Error::http("reset").is_transient());
        assert!(Error::rate_limited("429").is_transient());
        assert!(Error::unavailable("503").is_transient());
        assert!(!Error::auth("403").is_transient());
        assert!(!Error::provider("cloudflare", "bad request").is_transient());
    }

    #[test]
    fn list_create_keeps_source() {
        let err = Error::ListCreate {
            list: "Gatesync List - Chunk 2".to_string(),
            created: 1,
            source: Box::new(Error::unavailable("502 Bad Gateway")),
        };

        assert!(err.to_string().contains("Gatesync List - Chunk 2"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
