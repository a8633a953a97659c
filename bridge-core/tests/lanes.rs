use bridge_core::lanes::{
    ClockMode, CsiTransmitter, DATA_IDLE_TIMEOUT, LaneActivator, LaneError, MAX_RETRIES,
};

/// Transmitter whose lanes go busy only after `idle_enables` failed attempts.
#[derive(Default)]
struct Transmitter {
    idle_enables: usize,
    enables: usize,
    busy: bool,
    sync: bool,
    muted: bool,
    pattern: bool,
    polls: u32,
    clock_mode: Option<ClockMode>,
}

impl CsiTransmitter for Transmitter {
    fn configure_clock_lane(&mut self, mode: ClockMode) {
        self.clock_mode = Some(mode);
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn set_test_pattern(&mut self, enabled: bool) {
        self.pattern = enabled;
    }

    fn configure_disabled_topology(&mut self) {}

    fn set_transmit_enabled(&mut self, enabled: bool) {
        if enabled {
            self.enables += 1;
            self.busy = self.enables > self.idle_enables;
        } else {
            self.busy = false;
        }
    }

    fn sync_locked(&mut self) -> bool {
        self.sync
    }

    fn data_lanes_busy(&mut self) -> bool {
        self.busy
    }

    fn lane_poll_delay(&mut self) {
        self.polls += 1;
    }
}

fn transmitter(idle_enables: usize) -> Transmitter {
    Transmitter {
        idle_enables,
        sync: true,
        ..Transmitter::default()
    }
}

#[test]
fn retry_ceiling_is_exact() {
    let mut hw = transmitter(usize::MAX);
    let mut lanes = LaneActivator::new(ClockMode::NonContinuous);

    assert_eq!(lanes.set_enabled(&mut hw, true), Err(LaneError::LanesNeverBusy));

    assert_eq!(hw.enables, MAX_RETRIES);
    assert_eq!(hw.polls, DATA_IDLE_TIMEOUT * MAX_RETRIES as u32);
    assert_eq!(lanes.stats().attempts, [1; MAX_RETRIES]);
    assert_eq!(lanes.stats().total_successes(), 0);
    assert_eq!(usize::from(lanes.last_attempts()), MAX_RETRIES);
    assert!(!lanes.is_enabled());
    assert!(hw.muted);
}

#[test]
fn last_attempt_can_still_succeed() {
    let mut hw = transmitter(MAX_RETRIES - 1);
    let mut lanes = LaneActivator::new(ClockMode::Continuous);

    assert_eq!(lanes.set_enabled(&mut hw, true), Ok(()));

    assert_eq!(hw.enables, MAX_RETRIES);
    assert_eq!(lanes.stats().successes[MAX_RETRIES - 1], 1);
    assert_eq!(lanes.stats().total_attempts(), MAX_RETRIES as u32);
    assert_eq!(hw.clock_mode, Some(ClockMode::Continuous));
    assert!(!hw.muted);
}

#[test]
fn histogram_accumulates_across_enables() {
    let mut hw = transmitter(1);
    let mut lanes = LaneActivator::new(ClockMode::NonContinuous);

    lanes.set_enabled(&mut hw, true).expect("second attempt");
    lanes.set_enabled(&mut hw, false).expect("disable");
    lanes.set_enabled(&mut hw, true).expect("first attempt");

    assert_eq!(lanes.stats().attempts, [2, 1, 0, 0, 0]);
    assert_eq!(lanes.stats().successes, [1, 1, 0, 0, 0]);
}

#[test]
fn idle_lanes_after_enable_are_recovered() {
    let mut hw = transmitter(0);
    let mut lanes = LaneActivator::new(ClockMode::NonContinuous);
    lanes.set_enabled(&mut hw, true).expect("enable");
    assert!(lanes.verify_pending());

    hw.busy = false;
    assert!(!lanes.verify(&mut hw));
    assert_eq!(lanes.recover(&mut hw), Ok(()));
    assert!(lanes.is_enabled());
    assert_eq!(hw.enables, 2);

    assert!(lanes.verify(&mut hw));
    assert!(!lanes.verify_pending());
    assert!(lanes.verify(&mut hw));
}

#[test]
fn lost_sync_fails_fast() {
    let mut hw = transmitter(0);
    hw.sync = false;
    let mut lanes = LaneActivator::new(ClockMode::NonContinuous);

    assert_eq!(lanes.set_enabled(&mut hw, true), Err(LaneError::NoSync));
    assert_eq!(hw.enables, 0);
    assert_eq!(lanes.stats().total_attempts(), 0);
}
