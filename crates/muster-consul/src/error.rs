//! Error types for registration against the discovery backend.
//!
//! ## Error Cases
//! - `BackendUnavailable`: the backend could not be reached or returned an
//!   unreadable response.
//! - `Rejected`: the backend answered with a non-success status.
//! - `Configuration`: the service description is malformed.
//! - `IdGeneration`: the Snowflake generator refused to mint an ID.

pub type Result<T> = core::result::Result<T, Error>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for service registration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Query or mutation against the discovery backend failed in transport.
    #[error("discovery backend unavailable: {0}")]
    BackendUnavailable(#[source] BoxError),

    /// The discovery backend refused the request.
    #[error("discovery backend rejected {operation} ({status}): {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The service description cannot be turned into a registration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Minting the registration ID failed.
    #[error("ID generation failed: {0}")]
    IdGeneration(#[from] muster::Error),
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::BackendUnavailable(Box::new(err))
    }
}
