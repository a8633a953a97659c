//! Hardware status sampling and detected video timing.
//!
//! [`HardwareProbe`] is the only way the state machine learns about the
//! outside world: once per poll tick it asks for a [`SignalSample`] and, when
//! the sample says something changed, for a fresh [`DetectedTiming`]. The
//! [`ReceiverPhy`] trait carries the two receiver-side side effects the
//! equalizer search needs. A register-backed implementation of both lives in
//! [`tc358840`].

use core::fmt;

pub mod tc358840;

/// Pixel clock slack allowed when comparing two timings, in Hz.
pub const PIXEL_CLOCK_TOLERANCE_HZ: u64 = 250_000;

/// Reasons the incoming format may have changed since the previous tick.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FormatChangeFlags(u8);

impl FormatChangeFlags {
    pub const NONE: Self = Self(0);
    /// The receiver does not report sync lock.
    pub const SYNC_LOST: Self = Self(1 << 0);
    /// The source switched between DVI and HDMI signalling.
    pub const MODE_CHANGED: Self = Self(1 << 1);
    /// The active (DE) area changed size.
    pub const INPUT_TIMING_CHANGED: Self = Self(1 << 2);
    /// The sync detector changed state.
    pub const SYNC_STATE_CHANGED: Self = Self(1 << 3);

    const ALL: u8 = 0x0F;

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Flags after which a stored timing can no longer be trusted as a
    /// baseline, whatever the new measurement says.
    #[must_use]
    pub const fn invalidates_timing(self) -> bool {
        self.intersects(Self::SYNC_LOST.union(Self::MODE_CHANGED))
    }

    /// Flags that warrant a PHY reset when they coincide with a missing signal.
    #[must_use]
    pub const fn warrants_phy_reset(self) -> bool {
        self.intersects(Self::MODE_CHANGED.union(Self::SYNC_STATE_CHANGED))
    }
}

impl fmt::Display for FormatChangeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }

        let names = [
            (Self::SYNC_LOST, "sync-lost"),
            (Self::MODE_CHANGED, "mode-changed"),
            (Self::INPUT_TIMING_CHANGED, "timing-changed"),
            (Self::SYNC_STATE_CHANGED, "sync-state-changed"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// One tick's worth of receiver status.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SignalSample {
    pub power_present: bool,
    pub clock_locked: bool,
    pub sync_locked: bool,
    pub hdcp_active: bool,
    pub interrupt_causes: FormatChangeFlags,
}

impl SignalSample {
    /// Sample reported while the internal colour bar generator drives the output.
    #[must_use]
    pub const fn test_pattern() -> Self {
        Self {
            power_present: true,
            clock_locked: true,
            sync_locked: true,
            hdcp_active: false,
            interrupt_causes: FormatChangeFlags::NONE,
        }
    }

    /// Returns `true` when power, clock and sync are all present.
    #[must_use]
    pub const fn has_signal(&self) -> bool {
        self.power_present && self.clock_locked && self.sync_locked
    }
}

/// Interrupt causes acknowledged by the interrupt path.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InterruptStatus {
    /// The +5V power-detect line changed state.
    pub power_detect: bool,
    /// Other causes were pending; they are left for the next poll tick.
    pub deferred: bool,
}

/// Measured video timing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DetectedTiming {
    pub width: u32,
    pub height: u32,
    pub h_sync: u32,
    pub v_sync: u32,
    pub h_blank: u32,
    pub v_blank: u32,
    pub pixel_clock: u64,
    pub interlaced: bool,
    pub polarity_bits: u8,
}

impl DetectedTiming {
    pub const HSYNC_POSITIVE: u8 = 0x01;
    pub const VSYNC_POSITIVE: u8 = 0x02;

    /// CEA-861 1920x1080p60, reported while the test pattern runs.
    pub const TEST_PATTERN_1080P60: Self = Self {
        width: 1920,
        height: 1080,
        h_sync: 44,
        v_sync: 5,
        h_blank: 280,
        v_blank: 45,
        pixel_clock: 148_500_000,
        interlaced: false,
        polarity_bits: Self::HSYNC_POSITIVE | Self::VSYNC_POSITIVE,
    };

    /// Compares two timings, ignoring blanking intervals and allowing the
    /// pixel clock to differ by at most `pixel_clock_tolerance` Hz.
    #[must_use]
    pub const fn matches(&self, other: &Self, pixel_clock_tolerance: u64) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.interlaced == other.interlaced
            && self.polarity_bits == other.polarity_bits
            && self.h_sync == other.h_sync
            && self.v_sync == other.v_sync
            && self.pixel_clock.abs_diff(other.pixel_clock) <= pixel_clock_tolerance
    }

    /// [`matches`](Self::matches) with [`PIXEL_CLOCK_TOLERANCE_HZ`].
    #[must_use]
    pub const fn same_format(&self, other: &Self) -> bool {
        self.matches(other, PIXEL_CLOCK_TOLERANCE_HZ)
    }

    #[must_use]
    pub const fn total_width(&self) -> u32 {
        self.width + self.h_blank
    }

    #[must_use]
    pub const fn total_height(&self) -> u32 {
        self.height + self.v_blank
    }

    /// Frame rate in hundredths of a hertz, or zero when unknown.
    #[must_use]
    pub fn frame_rate_centihertz(&self) -> u64 {
        let total = u64::from(self.total_width()) * u64::from(self.total_height());
        if total == 0 {
            return 0;
        }
        let rate = self.pixel_clock * 100 / total;
        if self.interlaced { rate * 2 } else { rate }
    }
}

impl fmt::Display for DetectedTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = self.frame_rate_centihertz();
        write!(
            f,
            "{}x{}{}{}.{:02} ({}.{:03} MHz)",
            self.width,
            self.height,
            if self.interlaced { 'i' } else { 'p' },
            rate / 100,
            rate % 100,
            self.pixel_clock / 1_000_000,
            (self.pixel_clock / 1_000) % 1_000,
        )
    }
}

/// Synchronous, stateless view of the receiver.
pub trait HardwareProbe {
    /// Reads the status flags and acknowledges any pending interrupt causes,
    /// folding them into [`SignalSample::interrupt_causes`].
    fn sample(&mut self) -> SignalSample;

    /// Reads the measured timing, or `None` when the measurement is not valid.
    fn detected_timing(&mut self) -> Option<DetectedTiming>;

    /// Reads only the +5V power-detect state.
    fn power_present(&mut self) -> bool;

    /// Acknowledges the interrupt causes the interrupt path reacts to.
    fn take_interrupts(&mut self) -> InterruptStatus;
}

/// Receiver-side side effects driven by the equalizer search.
pub trait ReceiverPhy {
    /// Pulses the PHY reset. Idempotent.
    fn reset_phy(&mut self);

    /// Applies an equalizer bypass configuration.
    fn set_eq_bypass(&mut self, bypass: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing_1080p() -> DetectedTiming {
        DetectedTiming::TEST_PATTERN_1080P60
    }

    #[test]
    fn blanking_only_change_is_absorbed() {
        let base = timing_1080p();
        let jittered = DetectedTiming {
            h_blank: base.h_blank + 2,
            v_blank: base.v_blank - 1,
            ..base
        };

        assert!(base.same_format(&jittered));
    }

    #[test]
    fn active_geometry_change_is_a_new_format() {
        let base = timing_1080p();
        let wider = DetectedTiming {
            width: 1280,
            ..base
        };
        let taller = DetectedTiming {
            height: 720,
            ..base
        };
        let interlaced = DetectedTiming {
            interlaced: true,
            ..base
        };

        assert!(!base.same_format(&wider));
        assert!(!base.same_format(&taller));
        assert!(!base.same_format(&interlaced));
    }

    #[test]
    fn pixel_clock_tolerance_is_inclusive() {
        let base = timing_1080p();
        let within = DetectedTiming {
            pixel_clock: base.pixel_clock + PIXEL_CLOCK_TOLERANCE_HZ,
            ..base
        };
        let beyond = DetectedTiming {
            pixel_clock: base.pixel_clock - PIXEL_CLOCK_TOLERANCE_HZ - 1,
            ..base
        };

        assert!(base.same_format(&within));
        assert!(!base.same_format(&beyond));
    }

    #[test]
    fn flag_helpers_follow_bit_layout() {
        let mut flags = FormatChangeFlags::NONE;
        assert!(flags.is_empty());
        assert!(!flags.invalidates_timing());

        flags.insert(FormatChangeFlags::INPUT_TIMING_CHANGED);
        assert_eq!(flags.bits(), 0x4);
        assert!(!flags.invalidates_timing());
        assert!(!flags.warrants_phy_reset());

        flags.insert(FormatChangeFlags::SYNC_STATE_CHANGED);
        assert!(flags.warrants_phy_reset());
        assert_eq!(FormatChangeFlags::from_bits(0xFF).bits(), 0x0F);
        assert!(FormatChangeFlags::from_bits(0x1).invalidates_timing());
    }

    #[test]
    fn timing_display_includes_rate_and_clock() {
        let mut buffer = heapless::String::<48>::new();
        core::fmt::write(&mut buffer, format_args!("{}", timing_1080p())).expect("format");
        assert_eq!(buffer.as_str(), "1920x1080p60.00 (148.500 MHz)");
    }

    #[test]
    fn sample_requires_power_clock_and_sync() {
        let mut sample = SignalSample::test_pattern();
        assert!(sample.has_signal());
        sample.clock_locked = false;
        assert!(!sample.has_signal());
    }
}
