//! CSI-2 transmit lane bring-up.
//!
//! Enabling the stream is a bounded handshake: configure the clock lane,
//! unmute, wait for the receiver to report sync, enable the transmitters and
//! then wait for the data lanes to start clocking. The clock lane's LP11 to HS
//! transition is occasionally missed by the far end, so a full
//! disable/enable cycle is retried up to [`MAX_RETRIES`] times before the
//! failure is reported.

use core::fmt;

/// Enable attempts made before giving up on the lanes.
pub const MAX_RETRIES: usize = 5;
/// Polls of the sync flag before activation is abandoned.
pub const SYNC_TIMEOUT: u32 = 100;
/// Polls of the data-lane busy flag per attempt.
pub const DATA_IDLE_TIMEOUT: u32 = 100;
/// Pause between data-lane busy polls, in microseconds.
pub const LANE_POLL_INTERVAL_US: u32 = 100;

/// Clock lane behaviour between frames.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ClockMode {
    /// The clock lane stays in HS mode.
    Continuous,
    /// The clock lane drops to LP between packets.
    #[default]
    NonContinuous,
}

/// Lane activation failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LaneError {
    /// The receiver never reported sync; retrying the lanes cannot help.
    NoSync,
    /// The data lanes never went busy within the retry budget.
    LanesNeverBusy,
}

impl fmt::Display for LaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneError::NoSync => f.write_str("no sync on input"),
            LaneError::LanesNeverBusy => {
                write!(f, "data lanes never went busy after {MAX_RETRIES} attempts")
            }
        }
    }
}

/// Transmitter-side operations used by the activation handshake.
pub trait CsiTransmitter {
    /// Prepares the clock lane for the given mode ahead of an HS transition.
    fn configure_clock_lane(&mut self, mode: ClockMode);

    fn set_muted(&mut self, muted: bool);

    fn set_test_pattern(&mut self, enabled: bool);

    /// Puts the transmitters and splitter into their idle topology.
    fn configure_disabled_topology(&mut self);

    fn set_transmit_enabled(&mut self, enabled: bool);

    fn sync_locked(&mut self) -> bool;

    fn data_lanes_busy(&mut self) -> bool;

    /// Short pause between busy-flag polls.
    fn lane_poll_delay(&mut self);
}

/// Per-attempt activation histogram, kept for the lifetime of the device.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetryStats {
    /// `attempts[i]` counts how often attempt `i + 1` waited on the busy flag.
    pub attempts: [u32; MAX_RETRIES],
    /// `successes[i]` counts activations that succeeded on attempt `i + 1`.
    pub successes: [u32; MAX_RETRIES],
}

impl RetryStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempts: [0; MAX_RETRIES],
            successes: [0; MAX_RETRIES],
        }
    }

    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.attempts.iter().fold(0, |total, count| total.saturating_add(*count))
    }

    #[must_use]
    pub fn total_successes(&self) -> u32 {
        self.successes.iter().fold(0, |total, count| total.saturating_add(*count))
    }
}

/// Owns the stream-enable state and drives the activation handshake.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LaneActivator {
    clock_mode: ClockMode,
    test_pattern: bool,
    enabled: bool,
    verify_pending: bool,
    last_attempts: u8,
    stats: RetryStats,
}

impl LaneActivator {
    #[must_use]
    pub const fn new(clock_mode: ClockMode) -> Self {
        Self::with_test_pattern(clock_mode, false)
    }

    #[must_use]
    pub const fn with_test_pattern(clock_mode: ClockMode, test_pattern: bool) -> Self {
        Self {
            clock_mode,
            test_pattern,
            enabled: false,
            verify_pending: false,
            last_attempts: 0,
            stats: RetryStats::new(),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `true` between a successful enable and the first lane re-check.
    #[must_use]
    pub const fn verify_pending(&self) -> bool {
        self.verify_pending
    }

    /// Attempts used by the most recent enable, successful or not.
    #[must_use]
    pub const fn last_attempts(&self) -> u8 {
        self.last_attempts
    }

    #[must_use]
    pub const fn stats(&self) -> &RetryStats {
        &self.stats
    }

    #[must_use]
    pub const fn clock_mode(&self) -> ClockMode {
        self.clock_mode
    }

    #[must_use]
    pub const fn test_pattern(&self) -> bool {
        self.test_pattern
    }

    /// Selects whether the next enable drives the internal colour bars.
    pub fn set_test_pattern(&mut self, enabled: bool) {
        self.test_pattern = enabled;
    }

    /// Brings the stream to `target`, retrying the lane handshake as needed.
    ///
    /// # Errors
    ///
    /// [`LaneError::NoSync`] when the input never reports sync and
    /// [`LaneError::LanesNeverBusy`] when every attempt times out on the busy
    /// flag. The stream is left disabled in both cases.
    pub fn set_enabled<H: CsiTransmitter + ?Sized>(
        &mut self,
        hw: &mut H,
        target: bool,
    ) -> Result<(), LaneError> {
        if target == self.enabled {
            return Ok(());
        }

        if !target {
            self.disable(hw);
            return Ok(());
        }

        self.last_attempts = 0;
        for attempt in 0..MAX_RETRIES {
            self.last_attempts = attempt_number(attempt);

            hw.set_test_pattern(false);
            hw.configure_clock_lane(self.clock_mode);
            hw.set_muted(false);
            if self.test_pattern {
                hw.set_test_pattern(true);
            } else if !wait_for(SYNC_TIMEOUT, || hw.sync_locked()) {
                self.disable(hw);
                return Err(LaneError::NoSync);
            }

            hw.set_transmit_enabled(true);
            self.stats.attempts[attempt] = self.stats.attempts[attempt].saturating_add(1);

            if wait_for_busy(hw) {
                self.stats.successes[attempt] = self.stats.successes[attempt].saturating_add(1);
                self.enabled = true;
                self.verify_pending = true;
                return Ok(());
            }

            self.disable(hw);
        }

        Err(LaneError::LanesNeverBusy)
    }

    /// Re-checks the lanes once after an enable. Returns `false` when they
    /// went idle and a disable/enable cycle is needed.
    pub fn verify<H: CsiTransmitter + ?Sized>(&mut self, hw: &mut H) -> bool {
        if !self.enabled || !self.verify_pending {
            return true;
        }
        self.verify_pending = false;
        wait_for_busy(hw)
    }

    /// Disable/enable cycle used when the lanes have gone idle.
    ///
    /// # Errors
    ///
    /// Propagates the [`LaneError`] of the re-enable.
    pub fn recover<H: CsiTransmitter + ?Sized>(&mut self, hw: &mut H) -> Result<(), LaneError> {
        self.disable(hw);
        self.set_enabled(hw, true)
    }

    /// Mutes the output and shuts the transmitters down. Cannot fail.
    pub fn disable<H: CsiTransmitter + ?Sized>(&mut self, hw: &mut H) {
        self.verify_pending = false;
        hw.set_test_pattern(false);
        hw.set_muted(true);
        hw.configure_disabled_topology();
        hw.set_transmit_enabled(false);
        self.enabled = false;
    }
}

fn wait_for_busy<H: CsiTransmitter + ?Sized>(hw: &mut H) -> bool {
    for _ in 0..DATA_IDLE_TIMEOUT {
        if hw.data_lanes_busy() {
            return true;
        }
        hw.lane_poll_delay();
    }
    false
}

fn wait_for(limit: u32, mut ready: impl FnMut() -> bool) -> bool {
    (0..limit).any(|_| ready())
}

fn attempt_number(index: usize) -> u8 {
    u8::try_from(index + 1).unwrap_or(u8::MAX)
}
