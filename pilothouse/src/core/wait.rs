//! Deterministic bookkeeping for the MySQL readiness poll.
//!
//! [`MysqlPoll`] owns the iteration counter and decides, per probe result,
//! whether to stop, retry, or give up and which notices are due. Sleeping and
//! printing stay with the caller.

use std::time::Duration;

/// Delay between failed probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Zero-based iteration whose failure prints the one-time waiting notice.
pub const WAITING_NOTICE_ITERATION: u32 = 3;

/// Zero-based iteration whose failure ends the poll.
pub const LAST_ITERATION: u32 = 30;

/// Lifecycle of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Ready,
    Failed,
}

/// What the caller must do after feeding a probe result to [`MysqlPoll::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Probe matched; stop polling.
    Ready { announce_ready: bool },
    /// Probe missed; sleep [`POLL_INTERVAL`] and probe again.
    Retry { announce_waiting: bool },
    /// Probe missed on the last allowed iteration.
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct MysqlPoll {
    iteration: u32,
    state: PollState,
}

impl Default for MysqlPoll {
    fn default() -> Self {
        Self::new()
    }
}

impl MysqlPoll {
    pub fn new() -> Self {
        Self {
            iteration: 0,
            state: PollState::Polling,
        }
    }

    /// Number of probes observed so far.
    pub fn attempts(&self) -> u32 {
        match self.state {
            PollState::Polling => self.iteration,
            PollState::Ready | PollState::Failed => self.iteration + 1,
        }
    }

    /// Feed one probe result.
    ///
    /// Observing after the poll reached a terminal state returns the same
    /// terminal action without changing the counter.
    pub fn observe(&mut self, probe_matched: bool) -> PollAction {
        match self.state {
            PollState::Ready => return PollAction::Ready { announce_ready: false },
            PollState::Failed => return PollAction::GiveUp,
            PollState::Polling => {}
        }

        if probe_matched {
            self.state = PollState::Ready;
            return PollAction::Ready {
                announce_ready: self.iteration > WAITING_NOTICE_ITERATION,
            };
        }

        let announce_waiting = self.iteration == WAITING_NOTICE_ITERATION;
        if self.iteration >= LAST_ITERATION {
            self.state = PollState::Failed;
            return PollAction::GiveUp;
        }
        self.iteration += 1;
        PollAction::Retry { announce_waiting }
    }
}
