//! Manifest verification
//!
//! Two trust modes: a per-origin Merkle manifest whose root is attested by a
//! third party, and a company-wide manifest whose leaves hash into one of two
//! auxiliary hashes that combine into the attested root.

use cv_net::RootHashSource;
use serde::{Deserialize, Serialize};

use crate::digest::{normalize_hash, sha256_hex};
use crate::merkle::merkle_root;
use crate::ManifestFailure;

/// Manifest submitted for verification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPayload {
    pub root_hash: String,
    pub leaves: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_hashes: Option<OtherHashes>,
    #[serde(default)]
    pub host: String,
    pub version: String,
    /// Raw backup payload whose hash may stand in for the root hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workaround: Option<String>,
}

/// Auxiliary hashes of a company-wide manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherHashes {
    pub main: String,
    pub longtail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_hash: Option<String>,
}

/// Whether a mismatching root hash may be rescued by the workaround payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackupHashPolicy {
    #[default]
    Allow,
    Deny,
}

async fn trusted_root<S: RootHashSource>(
    payload: &ManifestPayload,
    source: &S,
) -> Result<String, ManifestFailure> {
    match source.fetch_root_hash(&payload.host, &payload.version).await {
        Ok(root) => Ok(normalize_hash(&root)),
        Err(err) => {
            tracing::warn!("root hash lookup for {} v{} failed: {}", payload.host, payload.version, err);
            Err(err.into())
        }
    }
}

/// Verify a per-origin Merkle manifest against its attested root.
pub async fn validate_manifest<S: RootHashSource>(
    payload: &ManifestPayload,
    source: &S,
    backup: BackupHashPolicy,
) -> Result<(), ManifestFailure> {
    let trusted = trusted_root(payload, source).await?;
    let claimed = normalize_hash(&payload.root_hash);

    if claimed != trusted {
        let rescued = match (backup, payload.workaround.as_deref()) {
            (BackupHashPolicy::Allow, Some(workaround)) => sha256_hex(workaround.as_bytes()) == trusted,
            _ => false,
        };
        if !rescued {
            tracing::warn!("root hash for {} v{} does not match attested root", payload.host, payload.version);
            return Err(ManifestFailure::RootHashVerifyFail3rdParty);
        }
        tracing::warn!(
            "root hash for {} v{} accepted through backup payload hash",
            payload.host,
            payload.version
        );
    }

    match merkle_root(&payload.leaves) {
        Ok(root) if root == claimed => {
            tracing::debug!("manifest {} v{} verified ({} leaves)", payload.host, payload.version, payload.leaves.len());
            Ok(())
        }
        Ok(root) => {
            tracing::warn!("rebuilt root {} differs from claimed root {}", root, claimed);
            Err(ManifestFailure::RootHashVerifyFailInPage)
        }
        Err(err) => {
            tracing::warn!("cannot rebuild manifest root: {}", err);
            Err(ManifestFailure::RootHashVerifyFailInPage)
        }
    }
}

/// Verify a company-wide manifest.
///
/// The leaf list, serialised as a JSON array, must hash to the `main` or
/// `longtail` auxiliary hash, and `sha256(longtail ++ main)` must equal the
/// attested root. There is no backup payload in this mode.
pub async fn validate_company_manifest<S: RootHashSource>(
    payload: &ManifestPayload,
    source: &S,
) -> Result<(), ManifestFailure> {
    let trusted = trusted_root(payload, source).await?;

    let Some(other) = &payload.other_hashes else {
        tracing::warn!("company manifest {} v{} has no auxiliary hashes", payload.host, payload.version);
        return Err(ManifestFailure::RootHashVerifyFailInPage);
    };

    let leaves_json = serde_json::to_string(&payload.leaves).map_err(|_| ManifestFailure::ManifestUnparsable)?;
    let mega_hash = sha256_hex(leaves_json.as_bytes());
    if mega_hash != normalize_hash(&other.main) && mega_hash != normalize_hash(&other.longtail) {
        tracing::warn!("leaf list hash {} matches neither auxiliary hash", mega_hash);
        return Err(ManifestFailure::RootHashVerifyFailInPage);
    }

    let combined = sha256_hex(format!("{}{}", other.longtail.trim(), other.main.trim()).as_bytes());
    if let Some(declared) = &other.combined_hash {
        if normalize_hash(declared) != combined {
            tracing::warn!("declared combined hash {} differs from computed {}", declared, combined);
        }
    }

    if combined != trusted {
        tracing::warn!("combined hash for {} v{} does not match attested root", payload.host, payload.version);
        return Err(ManifestFailure::RootHashVerifyFail3rdParty);
    }

    tracing::debug!("company manifest {} v{} verified", payload.host, payload.version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_net::AttestationError;

    struct FixedRoot(Result<String, AttestationError>);

    impl RootHashSource for FixedRoot {
        async fn fetch_root_hash(&self, _host: &str, _version: &str) -> Result<String, AttestationError> {
            self.0.clone()
        }
    }

    fn leaves() -> Vec<String> {
        ["one", "two", "three"].iter().map(|s| sha256_hex(s.as_bytes())).collect()
    }

    fn payload() -> ManifestPayload {
        let leaves = leaves();
        ManifestPayload {
            root_hash: merkle_root(&leaves).unwrap(),
            leaves,
            host: "web.whatsapp.com".into(),
            version: "2.3000.1".into(),
            ..Default::default()
        }
    }

    fn run<F: std::future::Future>(f: F) -> F::Output {
        smol::block_on(f)
    }

    #[test]
    fn test_valid_manifest() {
        let p = payload();
        let source = FixedRoot(Ok(format!("0x{}", p.root_hash.to_uppercase())));
        assert_eq!(run(validate_manifest(&p, &source, BackupHashPolicy::Allow)), Ok(()));
    }

    #[test]
    fn test_endpoint_failures_are_distinct() {
        let p = payload();
        let down = FixedRoot(Err(AttestationError::EndpointFailure("refused".into())));
        assert_eq!(run(validate_manifest(&p, &down, BackupHashPolicy::Allow)), Err(ManifestFailure::EndpointFailure));
        let garbled = FixedRoot(Err(AttestationError::UnknownEndpointIssue("html".into())));
        assert_eq!(
            run(validate_manifest(&p, &garbled, BackupHashPolicy::Allow)),
            Err(ManifestFailure::UnknownEndpointIssue)
        );
    }

    #[test]
    fn test_third_party_mismatch() {
        let p = payload();
        let source = FixedRoot(Ok(sha256_hex(b"something else")));
        assert_eq!(
            run(validate_manifest(&p, &source, BackupHashPolicy::Allow)),
            Err(ManifestFailure::RootHashVerifyFail3rdParty)
        );
    }

    #[test]
    fn test_backup_payload_rescue() {
        let mut p = payload();
        p.workaround = Some("published bundle".into());
        let source = FixedRoot(Ok(sha256_hex(b"published bundle")));
        assert_eq!(run(validate_manifest(&p, &source, BackupHashPolicy::Allow)), Ok(()));
        assert_eq!(
            run(validate_manifest(&p, &source, BackupHashPolicy::Deny)),
            Err(ManifestFailure::RootHashVerifyFail3rdParty)
        );
    }

    #[test]
    fn test_in_page_mismatch() {
        let mut p = payload();
        p.leaves.swap(0, 1);
        let source = FixedRoot(Ok(p.root_hash.clone()));
        assert_eq!(
            run(validate_manifest(&p, &source, BackupHashPolicy::Allow)),
            Err(ManifestFailure::RootHashVerifyFailInPage)
        );
    }

    #[test]
    fn test_in_page_mismatch_after_backup_rescue() {
        let mut p = payload();
        p.root_hash = sha256_hex(b"wrong root");
        p.workaround = Some("bundle".into());
        let source = FixedRoot(Ok(sha256_hex(b"bundle")));
        assert_eq!(
            run(validate_manifest(&p, &source, BackupHashPolicy::Allow)),
            Err(ManifestFailure::RootHashVerifyFailInPage)
        );
    }

    fn company_payload() -> (ManifestPayload, String) {
        let leaves = leaves();
        let main = sha256_hex(serde_json::to_string(&leaves).unwrap().as_bytes());
        let longtail = sha256_hex(b"longtail leaves");
        let combined = sha256_hex(format!("{longtail}{main}").as_bytes());
        let p = ManifestPayload {
            root_hash: String::new(),
            leaves,
            other_hashes: Some(OtherHashes { main, longtail, combined_hash: Some(combined.clone()) }),
            host: "www.facebook.com".into(),
            version: "1009592080".into(),
            workaround: None,
        };
        (p, combined)
    }

    #[test]
    fn test_company_manifest_valid() {
        let (p, combined) = company_payload();
        assert_eq!(run(validate_company_manifest(&p, &FixedRoot(Ok(combined)))), Ok(()));
    }

    #[test]
    fn test_company_manifest_longtail_leaves() {
        let (mut p, _) = company_payload();
        let other = p.other_hashes.as_mut().unwrap();
        std::mem::swap(&mut other.main, &mut other.longtail);
        let combined = sha256_hex(format!("{}{}", other.longtail, other.main).as_bytes());
        assert_eq!(run(validate_company_manifest(&p, &FixedRoot(Ok(combined)))), Ok(()));
    }

    #[test]
    fn test_company_manifest_leaf_tampering() {
        let (mut p, combined) = company_payload();
        p.leaves.push(sha256_hex(b"injected"));
        assert_eq!(
            run(validate_company_manifest(&p, &FixedRoot(Ok(combined)))),
            Err(ManifestFailure::RootHashVerifyFailInPage)
        );
    }

    #[test]
    fn test_company_manifest_root_mismatch() {
        let (p, _) = company_payload();
        assert_eq!(
            run(validate_company_manifest(&p, &FixedRoot(Ok(sha256_hex(b"other"))))),
            Err(ManifestFailure::RootHashVerifyFail3rdParty)
        );
    }

    #[test]
    fn test_company_manifest_requires_aux_hashes() {
        let (mut p, combined) = company_payload();
        p.other_hashes = None;
        assert_eq!(
            run(validate_company_manifest(&p, &FixedRoot(Ok(combined)))),
            Err(ManifestFailure::RootHashVerifyFailInPage)
        );
    }

    #[test]
    fn test_payload_wire_format() {
        let p: ManifestPayload = serde_json::from_str(
            r#"{"rootHash":"0xab","leaves":["0x01"],"host":"a.com","version":"7",
                "otherHashes":{"main":"m","longtail":"l","combined_hash":"c"}}"#,
        ).unwrap();
        assert_eq!(p.root_hash, "0xab");
        assert_eq!(p.other_hashes.unwrap().combined_hash.as_deref(), Some("c"));
        assert!(p.workaround.is_none());
    }
}
