//! Manifest verifications in flight
//!
//! Verifying a manifest waits on the attestation endpoint. A
//! [`PendingManifest`] carries everything that wait needs, so the
//! coordinator stays free to handle other frames until the result is handed
//! back through [`Coordinator::finish_manifest`](crate::Coordinator::finish_manifest).

use std::sync::Arc;

use cv_manifest::{
    validate_company_manifest, validate_manifest, BackupHashPolicy, ManifestFailure, ManifestPayload,
};
use cv_net::RootHashSource;

use crate::config::OriginConfig;
use crate::messages::Verdict;
use crate::tab::{FrameId, TabId};

/// Result of accepting a message
pub enum Dispatch<S> {
    /// Fully handled
    Done(Verdict),
    /// Waiting on the trusted root
    Verify(PendingManifest<S>),
}

/// A manifest accepted for verification
pub struct PendingManifest<S> {
    pub(crate) tab_id: TabId,
    pub(crate) frame_id: FrameId,
    pub(crate) origin: OriginConfig,
    pub(crate) payload: ManifestPayload,
    pub(crate) company: bool,
    pub(crate) backup: BackupHashPolicy,
    pub(crate) attestation: Arc<S>,
    /// Whether the tab was tracked when the manifest arrived
    pub(crate) tracked: bool,
}

impl<S: RootHashSource> PendingManifest<S> {
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn origin(&self) -> &str {
        &self.origin.name
    }

    /// Fetch the trusted root and check the manifest against it.
    pub async fn verify(self) -> VerifiedManifest {
        let result = if self.company {
            validate_company_manifest(&self.payload, self.attestation.as_ref()).await
        } else {
            validate_manifest(&self.payload, self.attestation.as_ref(), self.backup).await
        };

        VerifiedManifest {
            tab_id: self.tab_id,
            frame_id: self.frame_id,
            origin: self.origin,
            payload: self.payload,
            tracked: self.tracked,
            result,
        }
    }
}

/// Outcome of a [`PendingManifest`], ready to apply
#[derive(Debug)]
pub struct VerifiedManifest {
    pub(crate) tab_id: TabId,
    pub(crate) frame_id: FrameId,
    pub(crate) origin: OriginConfig,
    pub(crate) payload: ManifestPayload,
    pub(crate) tracked: bool,
    pub(crate) result: Result<(), ManifestFailure>,
}

impl VerifiedManifest {
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn result(&self) -> &Result<(), ManifestFailure> {
        &self.result
    }
}
