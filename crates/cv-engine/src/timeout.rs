//! Manifest deadlines
//!
//! A frame that starts processing must see a valid manifest within the
//! configured window. Deadlines are kept per (tab, frame) and drained by the
//! coordinator.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::tab::{FrameId, TabId};

/// Pending manifest deadlines
#[derive(Debug, Default)]
pub struct ManifestTimeouts {
    deadlines: HashMap<(TabId, FrameId), Instant>,
}

impl ManifestTimeouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a deadline; an existing one for the frame is kept.
    pub fn schedule(&mut self, tab_id: TabId, frame_id: FrameId, now: Instant, window: Duration) {
        self.deadlines.entry((tab_id, frame_id)).or_insert(now + window);
    }

    /// Returns whether a deadline was pending.
    pub fn cancel(&mut self, tab_id: TabId, frame_id: FrameId) -> bool {
        self.deadlines.remove(&(tab_id, frame_id)).is_some()
    }

    pub fn cancel_tab(&mut self, tab_id: TabId) {
        self.deadlines.retain(|&(tab, _), _| tab != tab_id);
    }

    pub fn is_pending(&self, tab_id: TabId, frame_id: FrameId) -> bool {
        self.deadlines.contains_key(&(tab_id, frame_id))
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every deadline that passed by `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<(TabId, FrameId)> {
        let mut expired: Vec<(TabId, FrameId)> = self
            .deadlines
            .iter()
            .filter(|&(_, &deadline)| deadline <= now)
            .map(|(&key, _)| key)
            .collect();
        expired.sort_unstable();

        for key in &expired {
            self.deadlines.remove(key);
        }
        expired
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
