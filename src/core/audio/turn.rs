//! Conversational turn tracking.
//!
//! A session is always in exactly one of three states: waiting for input,
//! playing a model response, or recording the user. Starting to record while
//! a response is playing is a barge-in and must trigger exactly one
//! interruption.

/// Where the conversation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Nothing in flight
    #[default]
    Idle,
    /// Model audio is queued or playing
    Responding,
    /// User is speaking
    Recording,
}

/// Tracks turn state and decides when a barge-in interruption fires.
#[derive(Debug, Default)]
pub struct TurnTracker {
    state: TurnState,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Model audio has started arriving. No effect while recording; the
    /// user's turn wins and stale response audio is being discarded.
    pub fn begin_response(&mut self) {
        if self.state != TurnState::Recording {
            self.state = TurnState::Responding;
        }
    }

    /// The model signalled end of turn and playback has drained.
    pub fn response_complete(&mut self) {
        if self.state == TurnState::Responding {
            self.state = TurnState::Idle;
        }
    }

    /// The user started speaking. Returns `true` when this cuts off a
    /// response in progress, in which case the caller owes exactly one
    /// interruption notice.
    pub fn begin_recording(&mut self) -> bool {
        let interrupted = self.state == TurnState::Responding;
        self.state = TurnState::Recording;
        interrupted
    }

    /// The user stopped speaking.
    pub fn end_recording(&mut self) {
        if self.state == TurnState::Recording {
            self.state = TurnState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        assert_eq!(TurnTracker::new().state(), TurnState::Idle);
    }

    #[test]
    fn test_recording_from_idle_does_not_interrupt() {
        let mut tracker = TurnTracker::new();
        assert!(!tracker.begin_recording());
        assert_eq!(tracker.state(), TurnState::Recording);
    }

    #[test]
    fn test_barge_in_interrupts_once() {
        let mut tracker = TurnTracker::new();
        tracker.begin_response();
        assert!(tracker.begin_recording());
        // Already recording; a second start must not fire again
        assert!(!tracker.begin_recording());
    }

    #[test]
    fn test_response_audio_ignored_while_recording() {
        let mut tracker = TurnTracker::new();
        tracker.begin_recording();
        tracker.begin_response();
        assert_eq!(tracker.state(), TurnState::Recording);
    }

    #[test]
    fn test_full_turn_cycle() {
        let mut tracker = TurnTracker::new();
        tracker.begin_response();
        assert_eq!(tracker.state(), TurnState::Responding);
        tracker.response_complete();
        assert_eq!(tracker.state(), TurnState::Idle);
        tracker.begin_recording();
        tracker.end_recording();
        assert_eq!(tracker.state(), TurnState::Idle);
    }

    #[test]
    fn test_stale_completion_after_barge_in_is_ignored() {
        let mut tracker = TurnTracker::new();
        tracker.begin_response();
        tracker.begin_recording();
        // A late turn-complete from the cut-off response must not
        // knock us out of Recording
        tracker.response_complete();
        assert_eq!(tracker.state(), TurnState::Recording);
    }
}
