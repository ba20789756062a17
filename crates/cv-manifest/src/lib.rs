//! Code Verify Manifests
//!
//! Authenticates the list of expected script hashes a site publishes and
//! answers per-script integrity questions once a manifest is trusted.
//!
//! # Example
//! ```rust,ignore
//! use cv_manifest::{validate_manifest, BackupHashPolicy, ManifestStore};
//!
//! validate_manifest(&payload, &attestation, BackupHashPolicy::Allow).await?;
//! store.record("WHATSAPP", &payload, ttl, Instant::now());
//! store.check_source("WHATSAPP", &payload.version, script_body)?;
//! ```

pub mod digest;
pub mod dynamic;
pub mod merkle;
mod node;
mod store;
mod verifier;

pub use digest::{normalize_hash, sha256_hex};
pub use dynamic::{strip_dynamic_strings, walk_string_literals, LiteralVisitor, DYNAMIC_STRING_MARKER};
pub use merkle::{merkle_root, MerkleError};
pub use node::parse_manifest_node;
pub use store::{ManifestRecord, ManifestStore};
pub use verifier::{
    validate_company_manifest, validate_manifest, BackupHashPolicy, ManifestPayload, OtherHashes,
};

use cv_net::AttestationError;
use serde::{Deserialize, Serialize};

/// Why a manifest or a script failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error, Serialize, Deserialize)]
pub enum ManifestFailure {
    #[serde(rename = "ENDPOINT_FAILURE")]
    #[error("attestation endpoint unreachable")]
    EndpointFailure,

    #[serde(rename = "UNKNOWN_ENDPOINT_ISSUE")]
    #[error("attestation endpoint returned an unusable answer")]
    UnknownEndpointIssue,

    #[serde(rename = "ROOT_HASH_VERIFY_FAIL_3RD_PARTY")]
    #[error("root hash does not match the attested root")]
    RootHashVerifyFail3rdParty,

    #[serde(rename = "ROOT_HASH_VERIFY_FAIL_IN_PAGE")]
    #[error("manifest leaves do not rebuild the claimed root")]
    RootHashVerifyFailInPage,

    #[serde(rename = "no matching origin")]
    #[error("no matching origin")]
    NoMatchingOrigin,

    #[serde(rename = "no matching manifest")]
    #[error("no matching manifest")]
    NoMatchingManifest,

    #[serde(rename = "hash does not match")]
    #[error("hash does not match")]
    HashDoesNotMatch,

    #[serde(rename = "manifest JSON unparsable")]
    #[error("manifest JSON unparsable")]
    ManifestUnparsable,
}

impl ManifestFailure {
    /// Reason code as carried on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::EndpointFailure => "ENDPOINT_FAILURE",
            Self::UnknownEndpointIssue => "UNKNOWN_ENDPOINT_ISSUE",
            Self::RootHashVerifyFail3rdParty => "ROOT_HASH_VERIFY_FAIL_3RD_PARTY",
            Self::RootHashVerifyFailInPage => "ROOT_HASH_VERIFY_FAIL_IN_PAGE",
            Self::NoMatchingOrigin => "no matching origin",
            Self::NoMatchingManifest => "no matching manifest",
            Self::HashDoesNotMatch => "hash does not match",
            Self::ManifestUnparsable => "manifest JSON unparsable",
        }
    }

    /// Failures of the attestation infrastructure rather than of integrity
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::EndpointFailure | Self::UnknownEndpointIssue)
    }
}

impl From<AttestationError> for ManifestFailure {
    fn from(err: AttestationError) -> Self {
        match err {
            AttestationError::EndpointFailure(_) => Self::EndpointFailure,
            AttestationError::UnknownEndpointIssue(_) => Self::UnknownEndpointIssue,
        }
    }
}
