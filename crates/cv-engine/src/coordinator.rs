//! Verification coordinator
//!
//! Owns every piece of mutable verification state: trusted manifests, the
//! CSP headers and worker scopes of each document, tab and frame machines and
//! pending manifest deadlines. Content-side messages are applied one at a
//! time, so no locking is needed. Manifest verification is split around the
//! attestation fetch: [`Coordinator::accept`] hands back a
//! [`PendingManifest`] that can be awaited while other messages are applied,
//! and [`Coordinator::finish_manifest`] applies its outcome.

use cv_manifest::{parse_manifest_node, ManifestFailure, ManifestPayload, ManifestStore};
use cv_net::{HttpAttestation, RootHashSource};
use cv_security::{
    check_document_csp_headers, check_nested_worker_csp, check_worker_endpoint,
    ContentSecurityPolicy, CspHeaders, CspViolation, SourceList,
};
use smol::channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::messages::{FoundResource, Message, Verdict};
use crate::pending::{Dispatch, PendingManifest, VerifiedManifest};
use crate::state::VerificationState;
use crate::tab::{FrameId, TabId, TabVerdict, TabVerification, MAIN_FRAME};
use crate::timeout::ManifestTimeouts;
use crate::EngineError;

/// CSP state captured for one document
#[derive(Debug, Default)]
struct DocumentPolicy {
    headers: CspHeaders,
    worker_scopes: Vec<SourceList>,
    watch_eval_reports: bool,
}

/// Single owner of verification state
pub struct Coordinator<S> {
    config: Config,
    attestation: Arc<S>,
    manifests: ManifestStore,
    tabs: HashMap<TabId, TabVerification>,
    documents: HashMap<(TabId, FrameId), DocumentPolicy>,
    timeouts: ManifestTimeouts,
    events: Sender<TabVerdict>,
}

impl Coordinator<HttpAttestation> {
    /// Coordinator backed by the configured attestation endpoint.
    pub fn connect(config: Config) -> Result<(Self, Receiver<TabVerdict>), EngineError> {
        config.validate()?;
        let attestation = HttpAttestation::new(
            &config.attestation_endpoint,
            config.request_timeout(),
            config.retry,
        )?;
        Ok(Self::new(config, attestation))
    }
}

impl<S: RootHashSource> Coordinator<S> {
    /// Create a coordinator and the channel its tab verdicts are sent on.
    pub fn new(config: Config, attestation: S) -> (Self, Receiver<TabVerdict>) {
        let (events, verdicts) = smol::channel::unbounded();
        let coordinator = Self {
            config,
            attestation: Arc::new(attestation),
            manifests: ManifestStore::new(),
            tabs: HashMap::new(),
            documents: HashMap::new(),
            timeouts: ManifestTimeouts::new(),
            events,
        };
        (coordinator, verdicts)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    pub fn tab_state(&self, tab_id: TabId) -> Option<VerificationState> {
        self.tabs.get(&tab_id).map(TabVerification::state)
    }

    pub fn frame_state(&self, tab_id: TabId, frame_id: FrameId) -> Option<VerificationState> {
        self.tabs.get(&tab_id)?.frame_state(frame_id)
    }

    pub fn has_pending_timeout(&self, tab_id: TabId, frame_id: FrameId) -> bool {
        self.timeouts.is_pending(tab_id, frame_id)
    }

    fn tab_entry(&mut self, tab_id: TabId) -> &mut TabVerification {
        let events = self.events.clone();
        self.tabs
            .entry(tab_id)
            .or_insert_with(|| TabVerification::new(tab_id, None, events))
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Apply one message from a frame.
    ///
    /// Manifest messages come back as [`Dispatch::Verify`]; await
    /// [`PendingManifest::verify`] and pass the outcome to
    /// [`finish_manifest`](Self::finish_manifest).
    pub fn accept(&mut self, tab_id: TabId, frame_id: FrameId, message: Message) -> Dispatch<S> {
        let verdict = match message {
            Message::LoadManifest { origin, manifest } => {
                return self.begin_manifest(tab_id, frame_id, &origin, manifest, false);
            }
            Message::LoadCompanyManifest { origin, manifest } => {
                return self.begin_manifest(tab_id, frame_id, &origin, manifest, true);
            }
            Message::RawSrc {
                origin,
                version,
                resource,
                source,
            } => self.validate_raw_source(tab_id, frame_id, &origin, &version, &resource, &source),
            Message::UpdateState { state } => {
                self.update_frame_state(tab_id, frame_id, VerificationState::parse_or_invalid(&state));
                Verdict::valid()
            }
            Message::WorkerFound { url, csp } => {
                self.check_worker(tab_id, frame_id, &url, csp.as_slice())
            }
            Message::CspViolation { report } => {
                if self.on_csp_violation(tab_id, frame_id, &report) {
                    Verdict::invalid("eval reported by CSP violation")
                } else {
                    Verdict::valid()
                }
            }
        };
        Dispatch::Done(verdict)
    }

    /// Apply one message and wait for any manifest verification it starts.
    pub async fn handle_message(&mut self, tab_id: TabId, frame_id: FrameId, message: Message) -> Verdict {
        match self.accept(tab_id, frame_id, message) {
            Dispatch::Done(verdict) => verdict,
            Dispatch::Verify(pending) => {
                let verified = pending.verify().await;
                self.finish_manifest(verified)
            }
        }
    }

    /// Decode and apply a JSON message.
    pub async fn handle_json(
        &mut self,
        tab_id: TabId,
        frame_id: FrameId,
        json: &str,
    ) -> Result<Verdict, EngineError> {
        let message: Message = serde_json::from_str(json)?;
        Ok(self.handle_message(tab_id, frame_id, message).await)
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Move a frame and fan the change into its tab.
    ///
    /// Entering `Processing` arms the manifest deadline; leaving it disarms.
    pub fn update_frame_state(
        &mut self,
        tab_id: TabId,
        frame_id: FrameId,
        target: VerificationState,
    ) -> Option<VerificationState> {
        let changed = self.tab_entry(tab_id).update_frame_state(frame_id, target);

        match changed {
            Some(VerificationState::Processing) => {
                self.timeouts
                    .schedule(tab_id, frame_id, Instant::now(), self.config.manifest_timeout());
            }
            Some(_) => {
                self.timeouts.cancel(tab_id, frame_id);
            }
            None => {}
        }

        self.escalate_ignored(tab_id);
        changed
    }

    /// A tab on a monitored origin must never sit in `Ignore`.
    fn escalate_ignored(&mut self, tab_id: TabId) {
        let Some(tab) = self.tabs.get_mut(&tab_id) else {
            return;
        };
        if tab.state() != VerificationState::Ignore {
            return;
        }

        let monitored = tab
            .url
            .as_deref()
            .and_then(|url| self.config.origin_for_url(url))
            .is_some();
        if monitored {
            tracing::warn!("tab {} ignored on a monitored origin, escalating", tab_id);
            tab.update_state_if_valid(VerificationState::Invalid);
        }
    }

    fn fail_frame(&mut self, tab_id: TabId, frame_id: FrameId, failure: ManifestFailure) -> Verdict {
        let target = if failure.is_infrastructure() {
            VerificationState::Timeout
        } else {
            VerificationState::Invalid
        };
        tracing::warn!("tab {} frame {}: {} -> {}", tab_id, frame_id, failure.code(), target);
        self.update_frame_state(tab_id, frame_id, target);
        Verdict::invalid(failure.code())
    }

    // ========================================================================
    // Manifests
    // ========================================================================

    /// Resolve a manifest's origin and detach its verification.
    pub fn begin_manifest(
        &mut self,
        tab_id: TabId,
        frame_id: FrameId,
        origin: &str,
        mut payload: ManifestPayload,
        company: bool,
    ) -> Dispatch<S> {
        let Some(origin) = self.config.origin(origin).cloned() else {
            return Dispatch::Done(self.fail_frame(tab_id, frame_id, ManifestFailure::NoMatchingOrigin));
        };
        if company && !origin.company_manifest {
            tracing::warn!("{} does not publish company manifests", origin.name);
            return Dispatch::Done(self.fail_frame(tab_id, frame_id, ManifestFailure::NoMatchingManifest));
        }
        if payload.host.is_empty() {
            payload.host = origin.host.clone();
        }

        tracing::debug!("tab {} frame {}: verifying {} v{}", tab_id, frame_id, origin.name, payload.version);
        Dispatch::Verify(PendingManifest {
            tab_id,
            frame_id,
            origin,
            payload,
            company,
            backup: self.config.backup_policy(),
            attestation: Arc::clone(&self.attestation),
            tracked: self.tabs.contains_key(&tab_id),
        })
    }

    /// Apply a finished verification: trust the leaves or fail the frame.
    ///
    /// A tab closed while its manifest was verifying is not brought back.
    pub fn finish_manifest(&mut self, verified: VerifiedManifest) -> Verdict {
        let VerifiedManifest {
            tab_id,
            frame_id,
            origin,
            payload,
            tracked,
            result,
        } = verified;

        match result {
            Ok(()) => {
                self.manifests
                    .record(&origin.name, &payload, origin.manifest_ttl(), Instant::now());
                self.timeouts.cancel(tab_id, frame_id);
                tracing::info!(
                    "manifest {} v{} trusted ({} leaves)",
                    origin.name,
                    payload.version,
                    payload.leaves.len()
                );
                Verdict::valid()
            }
            Err(failure) if tracked && !self.tabs.contains_key(&tab_id) => {
                tracing::debug!("tab {} gone before {} resolved", tab_id, failure.code());
                Verdict::invalid(failure.code())
            }
            Err(failure) => self.fail_frame(tab_id, frame_id, failure),
        }
    }

    /// Verify a manifest and, on success, trust its leaves for the origin.
    pub async fn load_manifest(
        &mut self,
        tab_id: TabId,
        frame_id: FrameId,
        origin: &str,
        payload: ManifestPayload,
        company: bool,
    ) -> Verdict {
        match self.begin_manifest(tab_id, frame_id, origin, payload, company) {
            Dispatch::Done(verdict) => verdict,
            Dispatch::Verify(pending) => {
                let verified = pending.verify().await;
                self.finish_manifest(verified)
            }
        }
    }

    /// Parse the in-page manifest node, then verify it.
    pub async fn load_manifest_node<F>(
        &mut self,
        tab_id: TabId,
        frame_id: FrameId,
        origin: &str,
        read: F,
        company: bool,
    ) -> Verdict
    where
        F: FnMut() -> Option<String>,
    {
        let host = self
            .config
            .origin(origin)
            .map(|o| o.host.clone())
            .unwrap_or_default();
        match parse_manifest_node(read, &host, &self.config.retry).await {
            Ok(payload) => self.load_manifest(tab_id, frame_id, origin, payload, company).await,
            Err(failure) => self.fail_frame(tab_id, frame_id, failure),
        }
    }

    /// Check a found resource's body against the trusted manifest.
    pub fn validate_raw_source(
        &mut self,
        tab_id: TabId,
        frame_id: FrameId,
        origin: &str,
        version: &str,
        resource: &FoundResource,
        source: &str,
    ) -> Verdict {
        let Some(name) = self.config.origin(origin).map(|o| o.name.clone()) else {
            return self.fail_frame(tab_id, frame_id, ManifestFailure::NoMatchingOrigin);
        };

        let body = resource.hashed_body(source);
        match self.manifests.check_source(&name, version, &body) {
            Ok(()) => Verdict::valid(),
            Err(ManifestFailure::HashDoesNotMatch)
                if resource.url().is_some_and(|url| self.config.is_allowlisted(url)) =>
            {
                tracing::warn!(
                    "tab {} frame {}: unknown extension resource {:?}",
                    tab_id,
                    frame_id,
                    resource.url()
                );
                self.update_frame_state(tab_id, frame_id, VerificationState::Risk);
                Verdict::invalid(ManifestFailure::HashDoesNotMatch.code())
            }
            Err(failure) => self.fail_frame(tab_id, frame_id, failure),
        }
    }

    // ========================================================================
    // CSP
    // ========================================================================

    /// Record a document's response headers and check its CSP when the URL
    /// belongs to a monitored origin.
    pub fn on_headers_received(
        &mut self,
        tab_id: TabId,
        frame_id: FrameId,
        url: &str,
        headers: &[(String, String)],
    ) -> Verdict {
        self.documents.insert(
            (tab_id, frame_id),
            DocumentPolicy {
                headers: CspHeaders::from_response_headers(headers),
                ..Default::default()
            },
        );
        self.tab_entry(tab_id).add_frame(frame_id);

        match self.config.origin_for_url(url).map(|o| o.name.clone()) {
            Some(origin) => self.check_document_csp(tab_id, frame_id, &origin),
            None => Verdict::valid(),
        }
    }

    /// Run the document CSP checks for a frame's recorded headers.
    pub fn check_document_csp(&mut self, tab_id: TabId, frame_id: FrameId, origin: &str) -> Verdict {
        let Some(host) = self.config.origin(origin).map(|o| o.host.clone()) else {
            return self.fail_frame(tab_id, frame_id, ManifestFailure::NoMatchingOrigin);
        };

        let document = self.documents.entry((tab_id, frame_id)).or_default();
        let mut watch = false;
        let result = check_document_csp_headers(&document.headers, &host, &mut || watch = true);
        match result {
            Ok(scopes) => {
                document.worker_scopes = scopes;
                document.watch_eval_reports = watch;
                Verdict::valid()
            }
            Err(failure) => {
                self.update_frame_state(tab_id, frame_id, VerificationState::Invalid);
                Verdict::invalid(failure.to_string())
            }
        }
    }

    /// Invalidate a watched frame when `eval` is reported.
    ///
    /// Returns whether the report invalidated the frame.
    pub fn on_csp_violation(&mut self, tab_id: TabId, frame_id: FrameId, report: &CspViolation) -> bool {
        let watched = self
            .documents
            .get(&(tab_id, frame_id))
            .is_some_and(|document| document.watch_eval_reports);
        if !watched || !report.is_eval() {
            return false;
        }

        tracing::warn!(
            "tab {} frame {}: eval reported by {}",
            tab_id,
            frame_id,
            report.document_uri
        );
        self.update_frame_state(tab_id, frame_id, VerificationState::Invalid);
        true
    }

    /// Check a worker script URL, and its own CSP when served with one,
    /// against the document's worker scopes.
    pub fn check_worker<H: AsRef<str>>(
        &mut self,
        tab_id: TabId,
        frame_id: FrameId,
        url: &str,
        worker_csp: &[H],
    ) -> Verdict {
        let scopes = self
            .documents
            .get(&(tab_id, frame_id))
            .map(|document| document.worker_scopes.as_slice())
            .unwrap_or_default();

        let mut result = check_worker_endpoint(scopes, url);
        if result.is_ok() && !worker_csp.is_empty() {
            let policies: Vec<ContentSecurityPolicy> = worker_csp
                .iter()
                .map(|header| ContentSecurityPolicy::parse(header.as_ref()))
                .collect();
            result = check_nested_worker_csp(scopes, &policies);
        }

        match result {
            Ok(()) => Verdict::valid(),
            Err(failure) => {
                tracing::warn!("tab {} frame {}: {}", tab_id, frame_id, failure);
                self.update_frame_state(tab_id, frame_id, VerificationState::Invalid);
                Verdict::invalid(failure.to_string())
            }
        }
    }

    // ========================================================================
    // Timeouts
    // ========================================================================

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeouts.next_deadline()
    }

    /// Move every frame whose manifest deadline passed by `now` to `Timeout`.
    pub fn expire_timeouts(&mut self, now: Instant) -> Vec<(TabId, FrameId)> {
        let expired = self.timeouts.expire(now);
        for &(tab_id, frame_id) in &expired {
            if self.frame_state(tab_id, frame_id) == Some(VerificationState::Processing) {
                tracing::warn!("tab {} frame {}: no manifest before deadline", tab_id, frame_id);
                self.update_frame_state(tab_id, frame_id, VerificationState::Timeout);
            }
        }
        expired
    }

    /// Sleep until the earliest deadline, then expire it.
    pub async fn wait_for_timeouts(&mut self) -> Vec<(TabId, FrameId)> {
        let Some(deadline) = self.timeouts.next_deadline() else {
            return Vec::new();
        };
        smol::Timer::at(deadline).await;
        self.expire_timeouts(Instant::now())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// A main-frame navigation starts the tab over; a sub-frame navigation
    /// drops that frame.
    pub fn on_tab_navigated(&mut self, tab_id: TabId, frame_id: FrameId, url: &str) {
        if frame_id != MAIN_FRAME {
            self.on_frame_removed(tab_id, frame_id);
            return;
        }

        self.forget_tab(tab_id);
        self.tabs.insert(
            tab_id,
            TabVerification::new(tab_id, Some(url.to_string()), self.events.clone()),
        );
        if self
            .events
            .try_send(TabVerdict::new(tab_id, VerificationState::Start))
            .is_err()
        {
            tracing::debug!("verdict listener gone, dropping reset for tab {}", tab_id);
        }
    }

    pub fn on_frame_removed(&mut self, tab_id: TabId, frame_id: FrameId) {
        self.documents.remove(&(tab_id, frame_id));
        self.timeouts.cancel(tab_id, frame_id);
        if let Some(tab) = self.tabs.get_mut(&tab_id) {
            tab.remove_frame(frame_id);
        }
    }

    pub fn on_tab_removed(&mut self, tab_id: TabId) {
        self.forget_tab(tab_id);
        tracing::debug!("tab {} removed", tab_id);
    }

    fn forget_tab(&mut self, tab_id: TabId) {
        self.tabs.remove(&tab_id);
        self.documents.retain(|&(tab, _), _| tab != tab_id);
        self.timeouts.cancel_tab(tab_id);
    }
}
