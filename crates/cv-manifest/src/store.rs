//! Manifest store
//!
//! Verified manifests keyed by origin and version. Leaves for the same
//! version are merged in arrival order without duplicates; records older
//! than the origin's TTL are evicted whenever a new manifest for that origin
//! is recorded.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::digest::{normalize_hash, sha256_hex};
use crate::verifier::ManifestPayload;
use crate::ManifestFailure;

/// One verified manifest version
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    pub root_hash: String,
    pub leaves: Vec<String>,
    pub created_at: Instant,
    index: HashSet<String>,
}

impl ManifestRecord {
    fn new(root_hash: String, created_at: Instant) -> Self {
        Self {
            root_hash,
            leaves: Vec::new(),
            created_at,
            index: HashSet::new(),
        }
    }

    fn merge<S: AsRef<str>>(&mut self, leaves: &[S]) {
        for leaf in leaves {
            let leaf = normalize_hash(leaf.as_ref());
            if self.index.insert(leaf.clone()) {
                self.leaves.push(leaf);
            }
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.index.contains(&normalize_hash(hash))
    }
}

/// Verified manifests, owned by the coordinating component
#[derive(Debug, Default)]
pub struct ManifestStore {
    origins: HashMap<String, HashMap<String, ManifestRecord>>,
}

impl ManifestStore {
    pub fn new() -> Self { Self::default() }

    /// Record a verified manifest, evicting stale versions of the origin first.
    pub fn record(&mut self, origin: &str, payload: &ManifestPayload, ttl: Duration, now: Instant) {
        let versions = self.origins.entry(origin.to_string()).or_default();

        let before = versions.len();
        versions.retain(|_, record| now.saturating_duration_since(record.created_at) <= ttl);
        if versions.len() != before {
            tracing::debug!("evicted {} stale manifest(s) for {}", before - versions.len(), origin);
        }

        versions
            .entry(payload.version.clone())
            .or_insert_with(|| ManifestRecord::new(normalize_hash(&payload.root_hash), now))
            .merge(&payload.leaves);
    }

    pub fn get(&self, origin: &str, version: &str) -> Result<&ManifestRecord, ManifestFailure> {
        self.origins
            .get(origin)
            .ok_or(ManifestFailure::NoMatchingOrigin)?
            .get(version)
            .ok_or(ManifestFailure::NoMatchingManifest)
    }

    /// Check a hash against the recorded leaves.
    pub fn check_hash(&self, origin: &str, version: &str, hash: &str) -> Result<(), ManifestFailure> {
        if self.get(origin, version)?.contains(hash) {
            Ok(())
        } else {
            Err(ManifestFailure::HashDoesNotMatch)
        }
    }

    /// Hash a raw resource body and check it against the recorded leaves.
    pub fn check_source(&self, origin: &str, version: &str, source: &str) -> Result<(), ManifestFailure> {
        self.check_hash(origin, version, &sha256_hex(source.as_bytes()))
    }

    pub fn versions(&self, origin: &str) -> Vec<&str> {
        self.origins
            .get(origin)
            .map(|versions| versions.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}
