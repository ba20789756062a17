//! Code Verify Security
//!
//! Content Security Policy analysis for integrity verification.
//!
//! Features:
//! - CSP header parsing (first directive wins)
//! - Enforce / report-only precedence for `eval`, inline script and workers
//! - Worker endpoint conformance against `worker-src` source lists

pub mod csp;
pub mod evaluator;
pub mod source_match;

pub use csp::{ContentSecurityPolicy, CspHeaders, CspViolation, Disposition, SourceList};
pub use evaluator::{
    check_document_csp_headers, check_evals, check_nested_worker_csp, check_unsafe_inline,
    check_worker_endpoint, check_worker_src, worker_scopes, CspCheck, EvalReportHook,
};
pub use source_match::{url_conforms_to_all, url_conforms_to_sources};

/// Reason a document's CSP is not strict enough
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CspFailure {
    #[error("CSP does not exclude 'unsafe-inline' for scripts")]
    UnsafeInline,

    #[error("CSP allows 'unsafe-eval' and no report-only header is present")]
    MissingReportHeader,

    #[error("CSP allows 'unsafe-eval' and report-only headers do not report it")]
    EvalNotReported,

    #[error("CSP has no enforced worker-src directive")]
    MissingWorkerSrc,

    #[error("CSP worker-src is too broad")]
    WorkerSrcTooBroad,

    #[error("nested worker-src {0} does not conform to document worker scopes")]
    NestedWorkerNonConformant(String),

    #[error("worker {0} does not conform to document worker scopes")]
    WorkerEndpointNonConformant(String),
}

/// Host of a document origin such as `https://www.facebook.com`.
///
/// Bare hosts are returned lower-cased as given.
pub fn origin_host(origin: &str) -> Option<String> {
    let origin = origin.trim();
    if !origin.contains("://") {
        return (!origin.is_empty()).then(|| origin.to_lowercase());
    }
    url::Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
}
