//! Code Verify Engine
//!
//! Combines CSP evaluation and manifest verification into one trust verdict
//! per tab.
//!
//! Features:
//! - Verification state table with redirecting transitions
//! - Generic state machine shared by frames and tabs
//! - Tab aggregation that holds back `Valid` until every frame agrees
//! - Coordinator owning manifests, CSP headers, timeouts and lifecycle
//! - Manifest verifications that run without holding the coordinator
//!
//! # Example
//! ```rust,ignore
//! use cv_engine::{Config, Coordinator};
//!
//! let (mut coordinator, verdicts) = Coordinator::connect(Config::default())?;
//! coordinator.on_tab_navigated(tab_id, MAIN_FRAME, url);
//! let verdict = coordinator.handle_json(tab_id, frame_id, message).await?;
//!
//! // Or keep other frames moving while the attestation endpoint answers
//! if let Dispatch::Verify(pending) = coordinator.accept(tab_id, frame_id, message) {
//!     let verified = pending.verify().await;
//!     coordinator.finish_manifest(verified);
//! }
//! ```

pub mod config;
mod coordinator;
pub mod indicator;
pub mod machine;
pub mod messages;
pub mod pending;
pub mod state;
pub mod tab;
pub mod timeout;

pub use config::{Config, ConfigError, OriginConfig};
pub use coordinator::Coordinator;
pub use indicator::Indicator;
pub use machine::{StateMachine, StateObserver};
pub use messages::{FoundResource, Message, Verdict};
pub use pending::{Dispatch, PendingManifest, VerifiedManifest};
pub use state::{Transition, VerificationState};
pub use tab::{FrameId, TabId, TabVerdict, TabVerification, MAIN_FRAME};
pub use timeout::ManifestTimeouts;

/// Engine error
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Net(#[from] cv_net::NetError),

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),
}
