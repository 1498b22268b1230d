//! Controller timing and capacity configuration

use std::time::Duration;

/// Completion poll budget of the command primitive.
pub const DEFAULT_MAX_POLLS: u32 = 50_000;

/// One tick of the controller's time base.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Receive FIFO width; an ATR can never be longer.
pub const DEFAULT_ATR_CAPACITY: usize = 512;

/// Controller engine configuration
///
/// The poll budget is an iteration count, not a deadline: `max_polls`
/// register reads happen regardless of how long each sleep actually takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Sleep between completion polls, and the length of one-tick waits
    pub poll_interval: Duration,

    /// Completion polls before a command times out
    pub max_polls: u32,

    /// Capacity of the ATR capture buffer
    pub atr_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            atr_capacity: DEFAULT_ATR_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// Configuration that never sleeps, for simulated hardware
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Replace the ATR buffer capacity
    #[must_use]
    pub const fn with_atr_capacity(mut self, atr_capacity: usize) -> Self {
        self.atr_capacity = atr_capacity;
        self
    }

    /// Replace the poll budget
    #[must_use]
    pub const fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Worst-case time a single command may block
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        self.poll_interval * self.max_polls
    }
}
