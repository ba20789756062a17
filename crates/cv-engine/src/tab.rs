//! Tab verification
//!
//! A tab owns one state machine per frame plus its own machine. Frame
//! changes fan into the tab through [`TabVerification::update_state_if_valid`],
//! which holds back `Valid` until every frame has caught up.

use serde::Serialize;
use smol::channel::Sender;
use std::collections::HashMap;

use crate::indicator::Indicator;
use crate::machine::{StateMachine, StateObserver};
use crate::state::VerificationState;

/// Tab ID type
pub type TabId = u32;

/// Frame ID type
pub type FrameId = u32;

/// Frame ID of a tab's top-level document
pub const MAIN_FRAME: FrameId = 0;

/// Outward notification of a tab-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabVerdict {
    pub tab_id: TabId,
    pub state: VerificationState,
    pub indicator: Indicator,
}

impl TabVerdict {
    pub fn new(tab_id: TabId, state: VerificationState) -> Self {
        Self {
            tab_id,
            state,
            indicator: state.into(),
        }
    }
}

/// Forwards tab-level changes onto the event channel
#[derive(Debug)]
pub struct VerdictSender {
    tab_id: TabId,
    events: Sender<TabVerdict>,
}

impl VerdictSender {
    pub fn new(tab_id: TabId, events: Sender<TabVerdict>) -> Self {
        Self { tab_id, events }
    }
}

impl StateObserver for VerdictSender {
    fn on_state_updated(&mut self, previous: VerificationState, current: VerificationState) {
        tracing::info!("tab {}: {} -> {}", self.tab_id, previous, current);
        if self.events.try_send(TabVerdict::new(self.tab_id, current)).is_err() {
            tracing::debug!("verdict listener gone, dropping update for tab {}", self.tab_id);
        }
    }
}

/// Verification state of one tab and its frames
#[derive(Debug)]
pub struct TabVerification {
    /// Unique ID
    pub id: TabId,
    /// Current top-level URL
    pub url: Option<String>,
    frames: HashMap<FrameId, StateMachine<()>>,
    machine: StateMachine<VerdictSender>,
}

impl TabVerification {
    pub fn new(id: TabId, url: Option<String>, events: Sender<TabVerdict>) -> Self {
        Self {
            id,
            url,
            frames: HashMap::new(),
            machine: StateMachine::new(VerdictSender::new(id, events)),
        }
    }

    /// Aggregated tab state
    pub fn state(&self) -> VerificationState {
        self.machine.state()
    }

    /// State of a tracked frame
    pub fn frame_state(&self, frame_id: FrameId) -> Option<VerificationState> {
        self.frames.get(&frame_id).map(StateMachine::state)
    }

    /// Start tracking a frame in `Start`.
    pub fn add_frame(&mut self, frame_id: FrameId) {
        self.frames.entry(frame_id).or_insert_with(|| StateMachine::new(()));
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Move one frame and fan the change into the tab.
    ///
    /// Returns the frame's new state when it changed.
    pub fn update_frame_state(
        &mut self,
        frame_id: FrameId,
        target: VerificationState,
    ) -> Option<VerificationState> {
        let frame = self.frames.entry(frame_id).or_insert_with(|| StateMachine::new(()));
        let changed = frame.update_state(target)?;
        tracing::debug!("tab {} frame {}: {}", self.id, frame_id, changed);
        self.update_state_if_valid(changed);
        Some(changed)
    }

    /// Apply `target` to the tab unless it is `Valid` and some frame is
    /// neither `Valid` nor `Start`.
    pub fn update_state_if_valid(&mut self, target: VerificationState) -> Option<VerificationState> {
        if target == VerificationState::Valid && !self.all_frames_settled() {
            tracing::debug!("tab {}: VALID held back until all frames are valid", self.id);
            return None;
        }
        self.machine.update_state(target)
    }

    /// Stop tracking a frame. A tab left with only valid frames becomes valid.
    pub fn remove_frame(&mut self, frame_id: FrameId) -> Option<VerificationState> {
        self.frames.remove(&frame_id)?;
        let all_valid = !self.frames.is_empty()
            && self
                .frames
                .values()
                .all(|frame| frame.state() == VerificationState::Valid);
        if all_valid {
            self.update_state_if_valid(VerificationState::Valid)
        } else {
            None
        }
    }

    fn all_frames_settled(&self) -> bool {
        self.frames
            .values()
            .all(|frame| matches!(frame.state(), VerificationState::Valid | VerificationState::Start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VerificationState::*;

    fn tab() -> (TabVerification, smol::channel::Receiver<TabVerdict>) {
        let (tx, rx) = smol::channel::unbounded();
        (TabVerification::new(1, Some("https://www.facebook.com/".into()), tx), rx)
    }

    #[test]
    fn test_valid_with_start_frame_succeeds() {
        let (mut tab, _rx) = tab();
        tab.add_frame(1);
        tab.update_frame_state(MAIN_FRAME, Valid);
        assert_eq!(tab.state(), Valid);
    }

    #[test]
    fn test_valid_with_processing_frame_suppressed() {
        let (mut tab, _rx) = tab();
        tab.update_frame_state(1, Processing);
        assert_eq!(tab.state(), Processing);

        tab.update_frame_state(MAIN_FRAME, Valid);
        assert_eq!(tab.state(), Processing);

        tab.update_frame_state(1, Valid);
        assert_eq!(tab.state(), Valid);
    }

    #[test]
    fn test_aggregation_is_order_independent() {
        let (mut a, _ra) = tab();
        a.update_frame_state(0, Processing);
        a.update_frame_state(1, Processing);
        a.update_frame_state(0, Valid);
        a.update_frame_state(1, Valid);

        let (mut b, _rb) = tab();
        b.update_frame_state(1, Processing);
        b.update_frame_state(0, Processing);
        b.update_frame_state(1, Valid);
        b.update_frame_state(0, Valid);

        assert_eq!(a.state(), Valid);
        assert_eq!(b.state(), Valid);
    }

    #[test]
    fn test_frame_failure_reaches_tab() {
        let (mut tab, rx) = tab();
        tab.update_frame_state(0, Processing);
        tab.update_frame_state(1, Invalid);
        assert_eq!(tab.state(), Invalid);

        let seen: Vec<TabVerdict> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(seen.last(), Some(&TabVerdict::new(1, Invalid)));
        assert_eq!(seen.last().map(|v| v.indicator), Some(Indicator::Failure));
    }

    #[test]
    fn test_removing_pending_frame_releases_valid() {
        let (mut tab, _rx) = tab();
        tab.update_frame_state(0, Processing);
        tab.update_frame_state(1, Processing);
        tab.update_frame_state(0, Valid);
        assert_eq!(tab.state(), Processing);

        tab.remove_frame(1);
        assert_eq!(tab.state(), Valid);
        assert_eq!(tab.frame_count(), 1);
    }
}
