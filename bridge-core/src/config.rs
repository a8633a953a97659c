//! Runtime configuration for the bridge core.

use core::time::Duration;

use crate::lanes::ClockMode;

/// Period between status polls (five polls per second).
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(200);

/// Options fixed at attach time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BridgeConfig {
    pub poll_period: Duration,
    pub clock_mode: ClockMode,
    /// Bring the stream up on its own once the signal is stable.
    pub auto_stream: bool,
    /// Initial equalizer override; `None` learns the configuration.
    pub eq_override: Option<bool>,
    /// Start with the internal colour bar generator driving the output.
    pub test_pattern: bool,
}

impl BridgeConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_period: DEFAULT_POLL_PERIOD,
            clock_mode: ClockMode::NonContinuous,
            auto_stream: false,
            eq_override: None,
            test_pattern: false,
        }
    }

    #[must_use]
    pub const fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    #[must_use]
    pub const fn with_clock_mode(mut self, mode: ClockMode) -> Self {
        self.clock_mode = mode;
        self
    }

    #[must_use]
    pub const fn with_auto_stream(mut self, enabled: bool) -> Self {
        self.auto_stream = enabled;
        self
    }

    #[must_use]
    pub const fn with_eq_override(mut self, mode: Option<bool>) -> Self {
        self.eq_override = mode;
        self
    }

    #[must_use]
    pub const fn with_test_pattern(mut self, enabled: bool) -> Self {
        self.test_pattern = enabled;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}
