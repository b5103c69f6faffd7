//! Poll policy for run status checks

use std::time::Duration;

/// How long and how often the orchestrator waits on a queued or
/// in-progress run. Either bound may be absent; with both absent a hung
/// run blocks forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Wall-clock budget measured from run creation
    pub deadline: Option<Duration>,
    pub max_polls: Option<u32>,
}

impl PollPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            max_polls: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    /// True once either bound has been reached.
    pub fn exhausted(&self, elapsed: Duration, polls: u32) -> bool {
        self.deadline.is_some_and(|deadline| elapsed >= deadline)
            || self.max_polls.is_some_and(|max| polls >= max)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500)).with_deadline(Duration::from_secs(120))
    }
}
