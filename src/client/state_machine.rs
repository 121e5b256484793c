use crate::client::error::{SyncError, SyncResult};
use crate::client::types::{RoundEvent, RoundState};

/// Lifecycle of a single round:
/// `Sent -> Matched -> Evaluated` or `Sent -> TimedOut`. A round cancelled
/// while waiting also ends as `TimedOut`: it got no answer.
#[derive(Debug, Clone)]
pub struct RoundStateMachine {
    sequence_number: u64,
    state: RoundState,
}

impl RoundStateMachine {
    pub fn new(sequence_number: u64) -> Self {
        Self {
            sequence_number,
            state: RoundState::Sent,
        }
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn current_state(&self) -> RoundState {
        self.state
    }

    /// Transition state based on event
    pub fn transition(&mut self, event: RoundEvent) -> SyncResult<RoundState> {
        let new_state = match (self.state, event) {
            (RoundState::Sent, RoundEvent::ReplyMatched) => RoundState::Matched,
            (RoundState::Sent, RoundEvent::DeadlineExpired) => RoundState::TimedOut,
            (RoundState::Sent, RoundEvent::Cancelled) => RoundState::TimedOut,
            (RoundState::Matched, RoundEvent::Evaluated) => RoundState::Evaluated,

            _ => {
                return Err(SyncError::InvalidRoundTransition(format!(
                    "Cannot handle {:?} in state {:?} (round {})",
                    event, self.state, self.sequence_number
                )));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}
