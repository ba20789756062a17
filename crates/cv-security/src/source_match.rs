//! Source-list URL matching
//!
//! Decides whether an observed URL falls inside a CSP source list. Tokens
//! ending in `/` admit the path and all descendants; any other token must
//! match the URL exactly. Query strings and fragments are ignored. `*` matches
//! any run of characters anywhere in the token, `/` included.

use crate::csp::SourceList;

/// Whether `url` conforms to at least one token in `sources`.
///
/// An empty source list or empty URL never conforms.
pub fn url_conforms_to_sources(sources: &SourceList, url: &str) -> bool {
    let candidate = strip_query(url.trim());
    if sources.is_empty() || candidate.is_empty() {
        return false;
    }
    let candidate = candidate.to_lowercase();

    sources.iter().any(|token| token_matches(token, &candidate))
}

/// Whether `url` conforms to every captured source list.
///
/// Browsers enforce the intersection of all policies, so a URL that loaded
/// under several policies must fit each of them.
pub fn url_conforms_to_all(scopes: &[SourceList], url: &str) -> bool {
    !scopes.is_empty() && scopes.iter().all(|sources| url_conforms_to_sources(sources, url))
}

fn token_matches(token: &str, candidate: &str) -> bool {
    let token = token.to_lowercase();

    // Keywords ('self', 'none', nonces) never describe a concrete endpoint
    if token.starts_with('\'') {
        return false;
    }

    if is_scheme_source(&token) {
        return candidate.starts_with(&token);
    }

    // Scheme-less host sources match regardless of scheme
    let subject = if token.contains("://") {
        candidate
    } else {
        candidate.split_once("://").map_or(candidate, |(_, rest)| rest)
    };

    pattern_variants(&token).iter().any(|pattern| {
        if pattern.ends_with('/') {
            glob_match(&format!("{pattern}*"), subject)
        } else {
            glob_match(pattern, subject)
        }
    })
}

/// `https:` style tokens
fn is_scheme_source(token: &str) -> bool {
    token.ends_with(':')
        && token.len() > 1
        && token[..token.len() - 1]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// A `:*` port wildcard also admits URLs with no explicit port.
fn pattern_variants(token: &str) -> Vec<String> {
    let mut variants = vec![token.to_string()];
    if token.contains(":*/") {
        variants.push(token.replacen(":*/", "/", 1));
    } else if let Some(stripped) = token.strip_suffix(":*") {
        variants.push(stripped.to_string());
    }
    variants
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Wildcard match where `*` matches any sequence, including the empty one.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == b'*')
}
