//! Verification states
//!
//! Every frame and every tab carries one of these states. Moves between them
//! are resolved through a fixed table: some are accepted, some are redirected
//! to `Invalid`, the rest are rejected and leave the state unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integrity state of a frame or tab
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationState {
    #[default]
    Start,
    Processing,
    Ignore,
    Invalid,
    Risk,
    Valid,
    Timeout,
}

/// How a requested transition resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to the requested state
    Accept(VerificationState),
    /// Move to a different state than requested
    Redirect(VerificationState),
    /// Stay put
    Reject,
}

impl VerificationState {
    pub const ALL: [VerificationState; 7] = [
        Self::Start,
        Self::Processing,
        Self::Ignore,
        Self::Invalid,
        Self::Risk,
        Self::Valid,
        Self::Timeout,
    ];

    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Processing => "PROCESSING",
            Self::Ignore => "IGNORE",
            Self::Invalid => "INVALID",
            Self::Risk => "RISK",
            Self::Valid => "VALID",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Parse a state name; anything unrecognised is treated as `Invalid`.
    pub fn parse_or_invalid(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(name.trim()))
            .unwrap_or_else(|| {
                tracing::warn!("unknown verification state {:?}, treating as INVALID", name);
                Self::Invalid
            })
    }

    /// No further transition is ever accepted
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    /// Resolve a move from `self` to `target`.
    pub fn resolve(self, target: VerificationState) -> Transition {
        use Transition::*;
        use VerificationState::*;

        if self == target {
            return Accept(target);
        }

        match (self, target) {
            (Start, _) => Accept(target),

            (Processing, Start) => Reject,
            (Processing, Ignore) => Redirect(Invalid),
            (Processing, _) => Accept(target),

            (Ignore, Invalid) => Accept(Invalid),
            (Ignore, _) => Redirect(Invalid),

            (Invalid, _) => Reject,

            (Risk, Invalid) => Accept(Invalid),
            (Risk, _) => Reject,

            (Valid, Start) => Reject,
            (Valid, Ignore) => Redirect(Invalid),
            (Valid, _) => Accept(target),

            (Timeout, Valid | Invalid | Risk) => Accept(target),
            (Timeout, _) => Reject,
        }
    }
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
