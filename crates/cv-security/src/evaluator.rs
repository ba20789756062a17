//! CSP policy evaluation
//!
//! Decides whether the policies delivered with a document restrict inline
//! script, `eval` and worker spawning tightly enough for integrity checks to
//! hold. Browsers enforce the intersection of all policies, so one
//! sufficiently strict enforced policy is enough for each property.

use crate::csp::{
    ContentSecurityPolicy, CspHeaders, SourceList, BLOB_SCHEME, DATA_SCHEME, DEFAULT_SRC, NONE,
    SCRIPT_SRC, UNSAFE_EVAL, UNSAFE_INLINE, WORKER_SRC,
};
use crate::source_match::url_conforms_to_all;
use crate::CspFailure;

/// Outcome of a single policy check
pub type CspCheck = Result<(), CspFailure>;

/// Receives the request to watch runtime violation reports for `eval`.
///
/// Called when `eval` is not blocked by enforced policies but report-only
/// policies would report it; from then on an `eval` report must invalidate
/// the document.
pub trait EvalReportHook {
    fn watch_eval_reports(&mut self);
}

impl<F: FnMut()> EvalReportHook for F {
    fn watch_eval_reports(&mut self) {
        self()
    }
}

/// Inline script must be excluded by at least one enforced policy.
pub fn check_unsafe_inline(enforce: &[ContentSecurityPolicy]) -> CspCheck {
    let restricted = enforce.iter().any(|policy| {
        policy
            .script_sources()
            .is_some_and(|sources| !sources.contains(UNSAFE_INLINE))
    });

    if restricted {
        Ok(())
    } else {
        Err(CspFailure::UnsafeInline)
    }
}

/// `script-src` takes precedence over `default-src` across the whole set:
/// `default-src` is consulted only when no policy declares `script-src`.
fn blocks_eval(policies: &[ContentSecurityPolicy]) -> bool {
    let script_src: Vec<&SourceList> = policies
        .iter()
        .filter_map(|policy| policy.directive(SCRIPT_SRC))
        .collect();

    if !script_src.is_empty() {
        return script_src.iter().any(|sources| !sources.contains(UNSAFE_EVAL));
    }

    policies
        .iter()
        .filter_map(|policy| policy.directive(DEFAULT_SRC))
        .any(|sources| !sources.contains(UNSAFE_EVAL))
}

/// `eval` must be blocked by enforced policies or reported by report-only ones.
///
/// A pass that relies on reporting calls `hook` so violation reports are
/// watched at runtime.
pub fn check_evals(headers: &CspHeaders, hook: &mut impl EvalReportHook) -> CspCheck {
    if blocks_eval(&headers.enforce) {
        return Ok(());
    }

    if headers.report_only.is_empty() {
        return Err(CspFailure::MissingReportHeader);
    }

    if !blocks_eval(&headers.report_only) {
        return Err(CspFailure::EvalNotReported);
    }

    tracing::debug!("eval permitted by enforced CSP, relying on report-only policy");
    hook.watch_eval_reports();
    Ok(())
}

/// Whether a worker-src source list names finite endpoints only.
fn worker_sources_restricted(sources: &SourceList, host: &str) -> bool {
    if sources.contains(DATA_SCHEME) || sources.contains(BLOB_SCHEME) {
        return false;
    }

    let subdomain = format!(".{host}");
    let subdomain_root = format!(".{host}/");
    !sources.iter().any(|token| {
        token == "*"
            || token == host
            || token.ends_with(&subdomain)
            || token.ends_with(&subdomain_root)
    })
}

/// At least one enforced policy must carry a narrowly scoped `worker-src`.
pub fn check_worker_src(enforce: &[ContentSecurityPolicy], host: &str) -> CspCheck {
    let host = host.to_lowercase();
    let declared: Vec<&SourceList> = enforce
        .iter()
        .filter_map(|policy| policy.directive(WORKER_SRC))
        .collect();

    if declared.is_empty() {
        return Err(CspFailure::MissingWorkerSrc);
    }

    if declared.iter().any(|sources| worker_sources_restricted(sources, &host)) {
        Ok(())
    } else {
        Err(CspFailure::WorkerSrcTooBroad)
    }
}

/// `worker-src` source lists of all enforced policies
pub fn worker_scopes(enforce: &[ContentSecurityPolicy]) -> Vec<SourceList> {
    enforce
        .iter()
        .filter_map(|policy| policy.directive(WORKER_SRC))
        .cloned()
        .collect()
}

/// Run every document-level check, stopping at the first failure.
///
/// On success returns the worker scopes to validate later workers against.
pub fn check_document_csp_headers(
    headers: &CspHeaders,
    host: &str,
    hook: &mut impl EvalReportHook,
) -> Result<Vec<SourceList>, CspFailure> {
    let result = check_unsafe_inline(&headers.enforce)
        .and_then(|()| check_evals(headers, hook))
        .and_then(|()| check_worker_src(&headers.enforce, host));

    match result {
        Ok(()) => {
            tracing::debug!("CSP headers for {} passed", host);
            Ok(worker_scopes(&headers.enforce))
        }
        Err(failure) => {
            tracing::warn!("CSP headers for {} rejected: {}", host, failure);
            Err(failure)
        }
    }
}

/// A worker script URL must fit every captured worker scope.
pub fn check_worker_endpoint(scopes: &[SourceList], url: &str) -> CspCheck {
    if url_conforms_to_all(scopes, url) {
        Ok(())
    } else {
        Err(CspFailure::WorkerEndpointNonConformant(url.to_string()))
    }
}

/// A worker's own `worker-src` must stay inside the document's worker scopes.
pub fn check_nested_worker_csp(
    scopes: &[SourceList],
    worker_enforce: &[ContentSecurityPolicy],
) -> CspCheck {
    let nested = worker_scopes(worker_enforce);
    if nested.is_empty() {
        return Err(CspFailure::MissingWorkerSrc);
    }

    for token in nested.iter().flatten() {
        if token == NONE {
            continue;
        }
        if !url_conforms_to_all(scopes, token) {
            return Err(CspFailure::NestedWorkerNonConformant(token.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(enforce: &[&str], report: &[&str]) -> CspHeaders {
        CspHeaders::parse(enforce, report)
    }

    fn policies(raw: &[&str]) -> Vec<ContentSecurityPolicy> {
        raw.iter().map(|h| ContentSecurityPolicy::parse(h)).collect()
    }

    #[test]
    fn test_unsafe_inline() {
        assert!(check_unsafe_inline(&policies(&["script-src 'self'"])).is_ok());
        assert!(check_unsafe_inline(&policies(&["default-src 'self'"])).is_ok());
        assert_eq!(
            check_unsafe_inline(&policies(&["script-src 'self' 'unsafe-inline'"])),
            Err(CspFailure::UnsafeInline)
        );
        assert_eq!(check_unsafe_inline(&policies(&["img-src 'self'"])), Err(CspFailure::UnsafeInline));
        assert_eq!(check_unsafe_inline(&[]), Err(CspFailure::UnsafeInline));
    }

    #[test]
    fn test_unsafe_inline_script_src_shadows_default() {
        let p = policies(&["default-src 'self'; script-src 'unsafe-inline'"]);
        assert_eq!(check_unsafe_inline(&p), Err(CspFailure::UnsafeInline));
    }

    #[test]
    fn test_eval_script_src_precedence() {
        let h = headers(&["default-src 'unsafe-eval'", "script-src 'self'"], &[]);
        let mut watched = false;
        assert!(check_evals(&h, &mut || watched = true).is_ok());
        assert!(!watched);
    }

    #[test]
    fn test_eval_falls_back_to_default_src() {
        let h = headers(&["default-src 'self'"], &[]);
        assert!(check_evals(&h, &mut || {}).is_ok());
    }

    #[test]
    fn test_eval_script_src_permissive_ignores_default() {
        let h = headers(&["script-src 'unsafe-eval'", "default-src 'self'"], &[]);
        assert_eq!(check_evals(&h, &mut || {}), Err(CspFailure::MissingReportHeader));
    }

    #[test]
    fn test_eval_report_only_rescue() {
        let h = headers(&[], &["script-src 'self'"]);
        let mut watched = false;
        assert!(check_evals(&h, &mut || watched = true).is_ok());
        assert!(watched);
    }

    #[test]
    fn test_eval_report_only_inadequate() {
        let h = headers(&["script-src 'unsafe-eval'"], &["script-src 'unsafe-eval'"]);
        assert_eq!(check_evals(&h, &mut || {}), Err(CspFailure::EvalNotReported));
    }

    #[test]
    fn test_worker_src_required() {
        assert_eq!(
            check_worker_src(&policies(&["script-src 'self'"]), "example.com"),
            Err(CspFailure::MissingWorkerSrc)
        );
    }

    #[test]
    fn test_worker_src_schemes_rejected() {
        let p = policies(&["worker-src https://example.com/w/ blob:"]);
        assert_eq!(check_worker_src(&p, "example.com"), Err(CspFailure::WorkerSrcTooBroad));
        let p = policies(&["worker-src data:"]);
        assert_eq!(check_worker_src(&p, "example.com"), Err(CspFailure::WorkerSrcTooBroad));
    }

    #[test]
    fn test_worker_src_domain_wide_rejected() {
        for token in ["*.example.com", "example.com", "https://*.example.com/", "*"] {
            let p = policies(&[format!("worker-src {token}").as_str()]);
            assert_eq!(
                check_worker_src(&p, "example.com"),
                Err(CspFailure::WorkerSrcTooBroad),
                "{token} should be too broad"
            );
        }
    }

    #[test]
    fn test_worker_src_any_policy_suffices() {
        let p = policies(&[
            "worker-src *.example.com",
            "worker-src https://example.com/worker.js",
        ]);
        assert!(check_worker_src(&p, "example.com").is_ok());
    }

    #[test]
    fn test_document_checks_fail_fast() {
        let h = headers(&["script-src 'unsafe-inline' 'unsafe-eval'"], &[]);
        let mut watched = false;
        let result = check_document_csp_headers(&h, "example.com", &mut || watched = true);
        assert_eq!(result, Err(CspFailure::UnsafeInline));
        assert!(!watched);
    }

    #[test]
    fn test_document_checks_return_worker_scopes() {
        let h = headers(
            &["script-src 'self'; worker-src https://example.com/w/"],
            &[],
        );
        let scopes = check_document_csp_headers(&h, "example.com", &mut || {}).unwrap();
        assert_eq!(scopes.len(), 1);
        assert!(scopes[0].contains("https://example.com/w/"));
    }

    #[test]
    fn test_nested_worker_csp() {
        let scopes = worker_scopes(&policies(&["worker-src https://example.com/w/"]));
        assert!(check_nested_worker_csp(&scopes, &policies(&["worker-src https://example.com/w/inner.js"])).is_ok());
        assert!(check_nested_worker_csp(&scopes, &policies(&["worker-src 'none'"])).is_ok());
        assert_eq!(
            check_nested_worker_csp(&scopes, &policies(&["worker-src blob:"])),
            Err(CspFailure::NestedWorkerNonConformant("blob:".into()))
        );
        assert_eq!(
            check_nested_worker_csp(&scopes, &policies(&["script-src 'self'"])),
            Err(CspFailure::MissingWorkerSrc)
        );
    }

    #[test]
    fn test_worker_endpoint() {
        let scopes = worker_scopes(&policies(&["worker-src https://example.com/w/"]));
        assert!(check_worker_endpoint(&scopes, "https://example.com/w/a.js").is_ok());
        assert!(check_worker_endpoint(&scopes, "https://evil.com/w/a.js").is_err());
    }
}
