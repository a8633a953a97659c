//! Test doubles shared by the unit tests.

use core::time::Duration;

use heapless::Vec;

use crate::events::{EventSink, FormatEvent};
use crate::lanes::{ClockMode, CsiTransmitter};
use crate::probe::{
    DetectedTiming, FormatChangeFlags, HardwareProbe, InterruptStatus, ReceiverPhy, SignalSample,
};
use crate::telemetry::TelemetryInstant;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MicrosInstant(u64);

impl MicrosInstant {
    pub const fn from_micros(value: u64) -> Self {
        Self(value)
    }
}

impl TelemetryInstant for MicrosInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Receiver whose signal depends on which equalizer settings the cable accepts.
#[derive(Debug)]
pub struct ScriptedHardware {
    pub power: bool,
    /// Indexed by equalizer configuration (`false` first).
    pub cable_ok: [bool; 2],
    pub eq_bypass: bool,
    pub timing: DetectedTiming,
    pub pending_flags: FormatChangeFlags,
    pub power_interrupt: bool,
    /// Transmit enables that fail before the lanes go busy.
    pub failing_enables: u32,
    pub lanes_busy: bool,
    pub transmit_enabled: bool,
    pub phy_resets: u32,
    pub eq_writes: Vec<bool, 64>,
    pub enables: u32,
}

impl ScriptedHardware {
    pub fn new(cable_ok: [bool; 2]) -> Self {
        Self {
            power: true,
            cable_ok,
            eq_bypass: true,
            timing: DetectedTiming::TEST_PATTERN_1080P60,
            pending_flags: FormatChangeFlags::NONE,
            power_interrupt: false,
            failing_enables: 0,
            lanes_busy: false,
            transmit_enabled: false,
            phy_resets: 0,
            eq_writes: Vec::new(),
            enables: 0,
        }
    }

    fn locked(&self) -> bool {
        self.power && self.cable_ok[usize::from(self.eq_bypass)]
    }
}

impl HardwareProbe for ScriptedHardware {
    fn sample(&mut self) -> SignalSample {
        let locked = self.locked();
        let flags = core::mem::replace(&mut self.pending_flags, FormatChangeFlags::NONE);
        SignalSample {
            power_present: self.power,
            clock_locked: locked,
            sync_locked: locked,
            hdcp_active: false,
            interrupt_causes: flags,
        }
    }

    fn detected_timing(&mut self) -> Option<DetectedTiming> {
        self.locked().then_some(self.timing)
    }

    fn power_present(&mut self) -> bool {
        self.power
    }

    fn take_interrupts(&mut self) -> InterruptStatus {
        InterruptStatus {
            power_detect: core::mem::take(&mut self.power_interrupt),
            deferred: false,
        }
    }
}

impl ReceiverPhy for ScriptedHardware {
    fn reset_phy(&mut self) {
        self.phy_resets += 1;
    }

    fn set_eq_bypass(&mut self, bypass: bool) {
        self.eq_bypass = bypass;
        let _ = self.eq_writes.push(bypass);
    }
}

impl CsiTransmitter for ScriptedHardware {
    fn configure_clock_lane(&mut self, _mode: ClockMode) {}

    fn set_muted(&mut self, _muted: bool) {}

    fn set_test_pattern(&mut self, _enabled: bool) {}

    fn configure_disabled_topology(&mut self) {}

    fn set_transmit_enabled(&mut self, enabled: bool) {
        self.transmit_enabled = enabled;
        if enabled {
            self.enables += 1;
            self.lanes_busy = if self.failing_enables > 0 {
                self.failing_enables -= 1;
                false
            } else {
                true
            };
        } else {
            self.lanes_busy = false;
        }
    }

    fn sync_locked(&mut self) -> bool {
        self.locked()
    }

    fn data_lanes_busy(&mut self) -> bool {
        self.lanes_busy
    }

    fn lane_poll_delay(&mut self) {}
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<FormatEvent, 16>,
}

impl EventSink for RecordingSink {
    fn notify(&mut self, event: FormatEvent) {
        let _ = self.events.push(event);
    }
}
