//! Code Verify Networking
//!
//! HTTP loading and root hash attestation lookups.

pub mod attestation;
mod fetch;
mod loader;
pub mod retry;

pub use attestation::{AttestationError, HttpAttestation, RootHashSource};
pub use fetch::FetchResponse;
pub use loader::{Request, ResourceLoader};
pub use retry::RetryPolicy;
pub use url::Url;

/// HTTP Response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Network error
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Malformed body: {0}")]
    MalformedBody(String),
}
