//! Message contract
//!
//! JSON messages sent by content scripts to the coordinator, and the verdict
//! returned for each.

use cv_manifest::{strip_dynamic_strings, ManifestPayload};
use cv_security::CspViolation;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Resource found in a document whose body is checked against the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FoundResource {
    /// `<script>`; inline scripts carry no `src`
    Script {
        #[serde(default)]
        src: Option<String>,
    },
    /// `<link rel=stylesheet>`
    Link { href: String },
    /// Inline `<style>`
    Style,
}

impl FoundResource {
    /// URL the resource was loaded from
    pub fn url(&self) -> Option<&str> {
        match self {
            FoundResource::Script { src } => src.as_deref(),
            FoundResource::Link { href } => Some(href),
            FoundResource::Style => None,
        }
    }

    /// Body as it is hashed. Scripts have dynamic strings emptied.
    pub fn hashed_body<'a>(&self, source: &'a str) -> Cow<'a, str> {
        match self {
            FoundResource::Script { .. } => Cow::Owned(strip_dynamic_strings(source)),
            FoundResource::Link { .. } | FoundResource::Style => Cow::Borrowed(source),
        }
    }
}

/// Inbound message from a frame
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Per-origin Merkle manifest
    LoadManifest {
        origin: String,
        manifest: ManifestPayload,
    },
    /// Company-wide combined-hash manifest
    LoadCompanyManifest {
        origin: String,
        manifest: ManifestPayload,
    },
    /// Body of a found resource
    RawSrc {
        origin: String,
        version: String,
        resource: FoundResource,
        source: String,
    },
    /// Frame-driven state change, by wire name
    UpdateState { state: String },
    /// Worker created by the document
    WorkerFound {
        url: String,
        /// Enforced CSP headers served with the worker script
        #[serde(default)]
        csp: Vec<String>,
    },
    /// CSP violation report delivered to the frame
    CspViolation { report: CspViolation },
}

/// Response to a [`Message`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn valid() -> Self {
        Self { valid: true, reason: None }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_message() {
        let msg: Message = serde_json::from_str(
            r#"{"type":"LOAD_MANIFEST","origin":"FACEBOOK",
                "manifest":{"rootHash":"0xab","leaves":["ab"],"version":"7"}}"#,
        )
        .unwrap();
        match msg {
            Message::LoadManifest { origin, manifest } => {
                assert_eq!(origin, "FACEBOOK");
                assert_eq!(manifest.version, "7");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_raw_source_variants() {
        let msg: Message = serde_json::from_str(
            r#"{"type":"RAW_SRC","origin":"FACEBOOK","version":"7",
                "resource":{"type":"link","href":"https://static.xx.fbcdn.net/a.css"},
                "source":"body{}"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            Message::RawSrc { resource: FoundResource::Link { .. }, .. }
        ));

        let inline: FoundResource = serde_json::from_str(r#"{"type":"script"}"#).unwrap();
        assert_eq!(inline, FoundResource::Script { src: None });
        assert_eq!(inline.url(), None);
    }

    #[test]
    fn test_only_scripts_strip_dynamic_strings() {
        let body = r#"x=/*BTDS*/"abc""#;
        let script = FoundResource::Script { src: None };
        assert_eq!(script.hashed_body(body), r#"x=/*BTDS*/"""#);
        assert_eq!(FoundResource::Style.hashed_body(body), body);
    }

    #[test]
    fn test_verdict_json() {
        assert_eq!(serde_json::to_string(&Verdict::valid()).unwrap(), r#"{"valid":true}"#);
        assert_eq!(
            serde_json::to_string(&Verdict::invalid("hash does not match")).unwrap(),
            r#"{"valid":false,"reason":"hash does not match"}"#
        );
    }
}
