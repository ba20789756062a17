//! Engine configuration
//!
//! Monitored origins, attestation endpoint, timeouts and retry limits. Loaded
//! from JSON; every field has a default so partial files are accepted.

use cv_manifest::BackupHashPolicy;
use cv_net::RetryPolicy;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const HOUR_MS: u64 = 60 * 60 * 1000;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no monitored origins configured")]
    NoOrigins,

    #[error("origin {0} configured twice")]
    DuplicateOrigin(String),

    #[error("retry policy needs at least one attempt")]
    NoRetryAttempts,

    #[error("invalid attestation endpoint: {0}")]
    InvalidEndpoint(String),
}

/// A site whose pages are verified
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginConfig {
    /// Name used in messages, e.g. `FACEBOOK`
    pub name: String,
    /// Registrable host, e.g. `facebook.com`
    pub host: String,
    /// How long older manifest versions are kept once a newer one verifies
    #[serde(default)]
    pub manifest_ttl_ms: u64,
    /// Whether the origin publishes company-wide combined-hash manifests
    #[serde(default)]
    pub company_manifest: bool,
}

impl OriginConfig {
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            manifest_ttl_ms: 0,
            company_manifest: false,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.manifest_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn company(mut self) -> Self {
        self.company_manifest = true;
        self
    }

    pub fn manifest_ttl(&self) -> Duration {
        Duration::from_millis(self.manifest_ttl_ms)
    }

    /// Whether `host` is this origin's host or one of its subdomains
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        let own = self.host.to_lowercase();
        host == own || host.strip_suffix(&own).is_some_and(|rest| rest.ends_with('.'))
    }
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub attestation_endpoint: String,
    pub manifest_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub retry: RetryPolicy,
    pub allow_backup_hash: bool,
    pub origins: Vec<OriginConfig>,
    pub extension_allowlist: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let company_ttl = Duration::from_millis(49 * HOUR_MS);
        Self {
            attestation_endpoint: "https://api.privacy-auditability.cloudflare.com/v1".into(),
            manifest_timeout_ms: 45_000,
            request_timeout_ms: 10_000,
            retry: RetryPolicy::default(),
            allow_backup_hash: true,
            origins: vec![
                OriginConfig::new("FACEBOOK", "facebook.com").with_ttl(company_ttl).company(),
                OriginConfig::new("MESSENGER", "messenger.com").with_ttl(company_ttl).company(),
                OriginConfig::new("INSTAGRAM", "instagram.com").with_ttl(company_ttl).company(),
                OriginConfig::new("WHATSAPP", "whatsapp.com"),
            ],
            extension_allowlist: Vec::new(),
        }
    }
}

impl Config {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origins.is_empty() {
            return Err(ConfigError::NoOrigins);
        }

        let mut seen = HashSet::new();
        for origin in &self.origins {
            if !seen.insert(origin.name.as_str()) {
                return Err(ConfigError::DuplicateOrigin(origin.name.clone()));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoRetryAttempts);
        }

        match url::Url::parse(&self.attestation_endpoint) {
            Ok(url) if !url.cannot_be_a_base() => Ok(()),
            _ => Err(ConfigError::InvalidEndpoint(self.attestation_endpoint.clone())),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.attestation_endpoint = endpoint.to_string();
        self
    }

    pub fn with_manifest_timeout(mut self, timeout: Duration) -> Self {
        self.manifest_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_backup_hash(mut self, allow: bool) -> Self {
        self.allow_backup_hash = allow;
        self
    }

    pub fn with_origins(mut self, origins: Vec<OriginConfig>) -> Self {
        self.origins = origins;
        self
    }

    pub fn with_extension(mut self, prefix: &str) -> Self {
        self.extension_allowlist.push(prefix.to_string());
        self
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backup_policy(&self) -> BackupHashPolicy {
        if self.allow_backup_hash {
            BackupHashPolicy::Allow
        } else {
            BackupHashPolicy::Deny
        }
    }

    /// Origin by name, case-insensitive
    pub fn origin(&self, name: &str) -> Option<&OriginConfig> {
        self.origins.iter().find(|o| o.name.eq_ignore_ascii_case(name))
    }

    /// Monitored origin a page URL belongs to
    pub fn origin_for_url(&self, url: &str) -> Option<&OriginConfig> {
        let host = url::Url::parse(url).ok()?.host_str()?.to_string();
        self.origins.iter().find(|o| o.matches_host(&host))
    }

    /// Whether a resource URL belongs to an allow-listed extension
    pub fn is_allowlisted(&self, url: &str) -> bool {
        self.extension_allowlist.iter().any(|prefix| url.starts_with(prefix.as_str()))
    }
}
