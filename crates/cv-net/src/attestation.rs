//! Root hash attestation
//!
//! Looks up the published root hash for a `(host, version)` pair from the
//! attestation service: `GET {endpoint}/hash/{host}/{version}` answering
//! `{ "root_hash": "<hex, optionally 0x-prefixed>" }`.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::{FetchResponse, NetError, ResourceLoader, Request, RetryPolicy};

/// Why a trusted root hash could not be obtained
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttestationError {
    /// Service unreachable or answered with a non-2xx status
    #[error("attestation endpoint failure: {0}")]
    EndpointFailure(String),

    /// Service answered but the body was not a usable root hash
    #[error("unknown attestation endpoint issue: {0}")]
    UnknownEndpointIssue(String),
}

/// Source of trusted root hashes
pub trait RootHashSource {
    fn fetch_root_hash(&self, host: &str, version: &str)
        -> impl Future<Output = Result<String, AttestationError>>;
}

#[derive(Debug, Deserialize)]
struct RootHashBody {
    root_hash: String,
}

/// Attestation over HTTP with bounded retry
#[derive(Debug, Clone)]
pub struct HttpAttestation {
    endpoint: Url,
    loader: ResourceLoader,
    retry: RetryPolicy,
}

impl HttpAttestation {
    pub fn new(endpoint: &str, request_timeout: Duration, retry: RetryPolicy) -> Result<Self, NetError> {
        let endpoint = Url::parse(endpoint).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
        if endpoint.cannot_be_a_base() {
            return Err(NetError::InvalidUrl(endpoint.to_string()));
        }
        Ok(Self {
            endpoint,
            loader: ResourceLoader::new(request_timeout)?,
            retry,
        })
    }

    /// `{endpoint}/hash/{host}/{version}`
    pub fn lookup_url(&self, host: &str, version: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["hash", host, version]);
        }
        url
    }

    async fn fetch_once(&self, url: &Url) -> Result<String, AttestationError> {
        let response = self
            .loader
            .request(Request::get(url.as_str()).with_header("Accept", "application/json"))
            .await
            .map(FetchResponse::from)
            .map_err(|e| AttestationError::EndpointFailure(e.to_string()))?;

        if !response.ok() {
            let err = NetError::HttpError { status: response.status() };
            return Err(AttestationError::EndpointFailure(err.to_string()));
        }

        let body: RootHashBody = response.json().map_err(|e| {
            let content_type = response.header("content-type").unwrap_or("none");
            AttestationError::UnknownEndpointIssue(format!("{e} (content-type {content_type})"))
        })?;

        parse_root_hash(&body.root_hash)
    }
}

impl RootHashSource for HttpAttestation {
    async fn fetch_root_hash(&self, host: &str, version: &str) -> Result<String, AttestationError> {
        let url = self.lookup_url(host, version);
        self.retry.run(|_| self.fetch_once(&url)).await
    }
}

/// Validate an attested root hash and normalise it to bare lowercase hex.
pub fn parse_root_hash(raw: &str) -> Result<String, AttestationError> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AttestationError::UnknownEndpointIssue(format!("invalid root hash {raw:?}")));
    }
    Ok(hex.to_ascii_lowercase())
}
