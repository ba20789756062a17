//! Content Security Policy
//!
//! CSP header parsing into directive → source-list maps.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

/// Set of source-list tokens for one directive
pub type SourceList = HashSet<String>;

/// One parsed CSP header value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    pub directives: HashMap<String, SourceList>,
}

/// CSP directive names
pub const DEFAULT_SRC: &str = "default-src";
pub const SCRIPT_SRC: &str = "script-src";
pub const WORKER_SRC: &str = "worker-src";

/// CSP source keywords
pub const SELF: &str = "'self'";
pub const NONE: &str = "'none'";
pub const UNSAFE_INLINE: &str = "'unsafe-inline'";
pub const UNSAFE_EVAL: &str = "'unsafe-eval'";

/// Scheme sources that grant arbitrary worker code
pub const DATA_SCHEME: &str = "data:";
pub const BLOB_SCHEME: &str = "blob:";

impl ContentSecurityPolicy {
    pub fn new() -> Self { Self::default() }

    /// Parse one CSP header value.
    ///
    /// Directive names and tokens are lower-cased. Only the first occurrence
    /// of a directive is kept; later duplicates are ignored the way browsers
    /// ignore them.
    pub fn parse(header: &str) -> Self {
        let mut policy = Self::new();

        for directive_str in header.split(';') {
            let directive_str = directive_str.trim().to_lowercase();
            let mut parts = directive_str.split_whitespace();
            let Some(name) = parts.next() else {
                continue;
            };

            if policy.directives.contains_key(name) {
                tracing::debug!("Ignoring duplicate CSP directive {}", name);
                continue;
            }

            let values: SourceList = parts.map(str::to_string).collect();
            policy.directives.insert(name.to_string(), values);
        }

        policy
    }

    /// Source list of a directive, without `default-src` fallback
    pub fn directive(&self, name: &str) -> Option<&SourceList> {
        self.directives.get(name)
    }

    pub fn has_directive(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    /// Source list governing scripts: `script-src`, else `default-src`
    pub fn script_sources(&self) -> Option<&SourceList> {
        self.directive(SCRIPT_SRC)
            .or_else(|| self.directive(DEFAULT_SRC))
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// All CSP headers delivered with one document
#[derive(Debug, Clone, Default)]
pub struct CspHeaders {
    /// `Content-Security-Policy` values
    pub enforce: Vec<ContentSecurityPolicy>,
    /// `Content-Security-Policy-Report-Only` values
    pub report_only: Vec<ContentSecurityPolicy>,
}

impl CspHeaders {
    /// Parse raw header values for both dispositions
    pub fn parse<E, R>(enforce: &[E], report_only: &[R]) -> Self
    where
        E: AsRef<str>,
        R: AsRef<str>,
    {
        Self {
            enforce: enforce.iter().map(|h| ContentSecurityPolicy::parse(h.as_ref())).collect(),
            report_only: report_only.iter().map(|h| ContentSecurityPolicy::parse(h.as_ref())).collect(),
        }
    }

    /// Split a response header list by name
    pub fn from_response_headers(headers: &[(String, String)]) -> Self {
        let mut enforce = Vec::new();
        let mut report_only = Vec::new();
        for (name, value) in headers {
            match name.to_lowercase().as_str() {
                "content-security-policy" => enforce.push(value.as_str()),
                "content-security-policy-report-only" => report_only.push(value.as_str()),
                _ => {}
            }
        }
        Self::parse(&enforce, &report_only)
    }
}

/// Disposition of the policy that produced a violation report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Enforce,
    Report,
}

/// CSP violation report, as delivered by a `securitypolicyviolation` event
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CspViolation {
    #[serde(rename = "documentURI")]
    pub document_uri: String,
    pub violated_directive: String,
    pub effective_directive: String,
    pub original_policy: String,
    #[serde(rename = "blockedURI")]
    pub blocked_uri: String,
    pub disposition: Disposition,
    pub sample: String,
    pub status_code: u16,
}

impl CspViolation {
    /// Whether this report was raised by a string-to-code compilation
    pub fn is_eval(&self) -> bool {
        self.blocked_uri == "eval"
            || (self.effective_directive == SCRIPT_SRC && self.sample.starts_with("eval"))
    }
}
