//! The three-state signal acquisition machine.
//!
//! [`BridgeState`] is the single piece of mutable decision state. Each poll
//! tick feeds it one [`SignalSample`]; it walks
//! `FindingSignal -> FoundSignal -> Stable`, delegating the equalizer search
//! to [`EqualizerLearner`] and stream bring-up to [`LaneActivator`]. Hardware
//! side effects, notifications and telemetry flow through a [`Context`]
//! borrowed for the duration of one call, so the state itself owns no
//! collaborators.

use core::fmt;

use crate::bridge::BridgeHardware;
use crate::config::BridgeConfig;
use crate::equalizer::{
    DropOutcome, EqAction, EqConfigStats, EqualizerLearner, MAX_FOUND_THRESHOLD,
    RECOMMENDED_EQ_CONFIG,
};
use crate::events::{EventSink, FormatEvent};
use crate::lanes::{LaneActivator, LaneError, RetryStats};
use crate::probe::{DetectedTiming, FormatChangeFlags, InterruptStatus, SignalSample};
use crate::telemetry::{
    PhyResetReason, TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecorder,
};

/// Acquisition progress.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SignalStatus {
    /// Searching for an equalizer configuration that locks.
    #[default]
    FindingSignal,
    /// A configuration was promoted and is being confirmed.
    FoundSignal,
    /// The signal has been trusted.
    Stable,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignalStatus::FindingSignal => "finding",
            SignalStatus::FoundSignal => "found",
            SignalStatus::Stable => "stable",
        })
    }
}

/// Point-in-time answer to "is there usable video?".
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SignalStatusSnapshot {
    pub present: bool,
    pub synced: bool,
    pub stable: bool,
}

/// Copy of the diagnostics counters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BridgeStats {
    pub status: SignalStatus,
    pub current_eq_config: bool,
    pub forced_eq_mode: Option<bool>,
    pub eq_stats: [EqConfigStats; 2],
    pub stream_enabled: bool,
    pub stream_requested: bool,
    pub retry_stats: RetryStats,
    pub test_pattern: bool,
}

/// Collaborators borrowed for one call into [`BridgeState`].
pub(crate) struct Context<'a, H: ?Sized, E: ?Sized, I: TelemetryInstant> {
    pub hw: &'a mut H,
    pub events: &'a mut E,
    pub telemetry: &'a mut TelemetryRecorder<I>,
    pub now: I,
}

impl<H, E, I> Context<'_, H, E, I>
where
    H: BridgeHardware + ?Sized,
    E: EventSink + ?Sized,
    I: TelemetryInstant,
{
    fn notify(&mut self, event: FormatEvent, timing: Option<DetectedTiming>) {
        self.events.notify(event);
        let payload = timing.map_or(TelemetryPayload::None, TelemetryPayload::Timing);
        self.telemetry
            .record(TelemetryEventKind::Format(event), payload, self.now);
    }

    fn record(&mut self, event: TelemetryEventKind) {
        self.telemetry
            .record(event, TelemetryPayload::None, self.now);
    }

    fn record_state_change(&mut self, event: TelemetryEventKind) {
        self.telemetry.record_state_change(event, self.now);
    }

    fn record_equalizer(&mut self, event: TelemetryEventKind, stats: [EqConfigStats; 2]) {
        self.telemetry.record_equalizer(event, stats, self.now);
    }

    fn reset_phy(&mut self, reason: PhyResetReason) {
        self.hw.reset_phy();
        self.record(TelemetryEventKind::PhyReset(reason));
    }
}

/// Decision state shared by the poll task and the interrupt path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BridgeState {
    current_eq_config: bool,
    status: SignalStatus,
    equalizer: EqualizerLearner,
    lanes: LaneActivator,
    detected_timing: Option<DetectedTiming>,
    found_stable_signal: bool,
    forced_eq_mode: Option<bool>,
    power_present: bool,
    last_sample: SignalSample,
    stream_requested: bool,
    test_pattern: bool,
}

impl BridgeState {
    /// Attach-time state: searching, all counters zero, stream off.
    #[must_use]
    pub const fn new(config: &BridgeConfig) -> Self {
        Self {
            current_eq_config: RECOMMENDED_EQ_CONFIG,
            status: SignalStatus::FindingSignal,
            equalizer: EqualizerLearner::new(),
            lanes: LaneActivator::with_test_pattern(config.clock_mode, config.test_pattern),
            detected_timing: None,
            found_stable_signal: false,
            forced_eq_mode: config.eq_override,
            power_present: false,
            last_sample: SignalSample {
                power_present: false,
                clock_locked: false,
                sync_locked: false,
                hdcp_active: false,
                interrupt_causes: FormatChangeFlags::NONE,
            },
            stream_requested: config.auto_stream,
            test_pattern: config.test_pattern,
        }
    }

    #[must_use]
    pub const fn status(&self) -> SignalStatus {
        self.status
    }

    #[must_use]
    pub const fn current_eq_config(&self) -> bool {
        self.current_eq_config
    }

    #[must_use]
    pub const fn eq_stats(&self) -> &[EqConfigStats; 2] {
        self.equalizer.stats()
    }

    #[must_use]
    pub const fn forced_eq_mode(&self) -> Option<bool> {
        self.forced_eq_mode
    }

    #[must_use]
    pub const fn found_stable_signal(&self) -> bool {
        self.found_stable_signal
    }

    #[must_use]
    pub const fn power_present(&self) -> bool {
        self.power_present
    }

    #[must_use]
    pub const fn stream_enabled(&self) -> bool {
        self.lanes.is_enabled()
    }

    #[must_use]
    pub const fn stream_requested(&self) -> bool {
        self.stream_requested
    }

    #[must_use]
    pub const fn test_pattern(&self) -> bool {
        self.test_pattern
    }

    /// Timing consumers may rely on: `None` unless the signal is stable.
    #[must_use]
    pub const fn exposed_timing(&self) -> Option<DetectedTiming> {
        if self.test_pattern {
            Some(DetectedTiming::TEST_PATTERN_1080P60)
        } else if self.found_stable_signal {
            self.detected_timing
        } else {
            None
        }
    }

    #[must_use]
    pub const fn snapshot(&self) -> SignalStatusSnapshot {
        SignalStatusSnapshot {
            present: self.power_present,
            synced: self.last_sample.sync_locked,
            stable: self.found_stable_signal,
        }
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            status: self.status,
            current_eq_config: self.current_eq_config,
            forced_eq_mode: self.forced_eq_mode,
            eq_stats: *self.equalizer.stats(),
            stream_enabled: self.lanes.is_enabled(),
            stream_requested: self.stream_requested,
            retry_stats: *self.lanes.stats(),
            test_pattern: self.test_pattern,
        }
    }

    /// One poll tick.
    pub(crate) fn poll<H, E, I>(&mut self, cx: &mut Context<'_, H, E, I>) -> SignalStatusSnapshot
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        let sample = if self.test_pattern {
            SignalSample::test_pattern()
        } else {
            cx.hw.sample()
        };
        self.last_sample = sample;
        let mut have_signal = sample.has_signal();

        self.check_power(sample.power_present, cx);
        if !sample.power_present {
            self.equalizer.clear_known_bad();
        }

        let mut changes = sample.interrupt_causes;
        if self.test_pattern {
            self.status = SignalStatus::Stable;
            changes = FormatChangeFlags::NONE;
        } else if !have_signal {
            self.drop_signal(changes, cx);
        } else {
            changes = self.refresh_timing(changes, cx);
            have_signal = self.detected_timing.is_some();
        }

        if sample.power_present {
            match self.status {
                SignalStatus::FindingSignal => self.find_signal(have_signal, cx),
                SignalStatus::FoundSignal => self.found_signal(have_signal, cx),
                SignalStatus::Stable => self.stable_signal(have_signal, changes, cx),
            }
        }

        self.snapshot()
    }

    /// Interrupt fast path: only power-detect changes are handled here.
    pub(crate) fn interrupt<H, E, I>(&mut self, cx: &mut Context<'_, H, E, I>) -> InterruptStatus
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        let pending = cx.hw.take_interrupts();
        if pending.power_detect {
            let present = self.test_pattern || cx.hw.power_present();
            self.check_power(present, cx);
        }
        pending
    }

    /// Acts only when `present` differs from the last processed value, so the
    /// poll tick never repeats what the interrupt path already did.
    pub(crate) fn check_power<H, E, I>(&mut self, present: bool, cx: &mut Context<'_, H, E, I>)
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        if present == self.power_present {
            return;
        }
        self.power_present = present;

        if present {
            cx.record_state_change(TelemetryEventKind::PowerDetected);
        } else {
            self.disable_stream(cx);
            self.current_eq_config = RECOMMENDED_EQ_CONFIG;
            cx.hw.set_eq_bypass(RECOMMENDED_EQ_CONFIG);
            self.found_stable_signal = false;
            self.detected_timing = None;
            self.equalizer.reset();
            cx.record_state_change(TelemetryEventKind::PowerLost);
            cx.notify(FormatEvent::SignalLost, None);
        }
        self.status = SignalStatus::FindingSignal;
    }

    /// A dark sample invalidates the stored timing. The per-state handlers
    /// decide what else it means: the learner restarts the current run while
    /// searching, a found signal counts a drop, and a stable one is torn down.
    fn drop_signal<H, E, I>(&mut self, changes: FormatChangeFlags, cx: &mut Context<'_, H, E, I>)
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        self.detected_timing = None;
        if self.power_present && changes.warrants_phy_reset() {
            cx.reset_phy(PhyResetReason::FormatChange);
        }
    }

    /// Reconciles the stored timing with a fresh measurement and returns the
    /// change flags that survive blanking-only jitter.
    fn refresh_timing<H, E, I>(
        &mut self,
        changes: FormatChangeFlags,
        cx: &mut Context<'_, H, E, I>,
    ) -> FormatChangeFlags
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        let measured = if changes.is_empty() && self.detected_timing.is_some() {
            self.detected_timing
        } else {
            cx.hw.detected_timing()
        };

        match (self.detected_timing, measured) {
            (Some(stored), Some(fresh))
                if !changes.is_empty()
                    && !changes.invalidates_timing()
                    && stored.same_format(&fresh) =>
            {
                cx.record(TelemetryEventKind::TimingAbsorbed);
                FormatChangeFlags::NONE
            }
            _ => {
                self.detected_timing = measured;
                changes
            }
        }
    }

    fn find_signal<H, E, I>(&mut self, have_signal: bool, cx: &mut Context<'_, H, E, I>)
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        let current = self.current_eq_config;
        let decision = self
            .equalizer
            .on_sample(current, have_signal, self.forced_eq_mode);
        if decision.glitch_reset {
            cx.reset_phy(PhyResetReason::Glitch);
        }

        match decision.action {
            EqAction::Stay => {}
            EqAction::Toggle => {
                self.switch_eq(!current, cx);
                cx.record(TelemetryEventKind::EqToggled(!current));
            }
            EqAction::Promote(choice) if choice == current => {
                self.status = SignalStatus::FoundSignal;
                cx.record_equalizer(
                    TelemetryEventKind::SignalFound(choice),
                    *self.equalizer.stats(),
                );
            }
            EqAction::Promote(choice) => {
                // The chosen configuration still has to reach the threshold
                // itself before it is adopted.
                self.switch_eq(choice, cx);
                cx.record_equalizer(
                    TelemetryEventKind::EqPromotedElsewhere(choice),
                    *self.equalizer.stats(),
                );
            }
        }
    }

    fn found_signal<H, E, I>(&mut self, have_signal: bool, cx: &mut Context<'_, H, E, I>)
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        let current = self.current_eq_config;
        if !have_signal {
            match self.equalizer.record_drop(current, self.forced_eq_mode) {
                DropOutcome::TryOther => {
                    self.switch_eq(!current, cx);
                    cx.record_equalizer(
                        TelemetryEventKind::EqOptimisticSwitch(!current),
                        *self.equalizer.stats(),
                    );
                }
                DropOutcome::Abandon => {
                    self.status = SignalStatus::FindingSignal;
                    self.equalizer.reset_found();
                    cx.hw.reset_phy();
                    cx.record_state_change(TelemetryEventKind::SignalAbandoned(current));
                }
                DropOutcome::Hold => {}
            }
            return;
        }

        if self.equalizer.record_found(current) >= MAX_FOUND_THRESHOLD {
            self.status = SignalStatus::Stable;
            cx.record_state_change(TelemetryEventKind::SignalStable(current));
        }
    }

    fn stable_signal<H, E, I>(
        &mut self,
        have_signal: bool,
        changes: FormatChangeFlags,
        cx: &mut Context<'_, H, E, I>,
    ) where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        if !have_signal || !changes.is_empty() {
            self.status = SignalStatus::FindingSignal;
            self.disable_stream(cx);
            self.equalizer.reset_found();
            if self.found_stable_signal {
                let event = if have_signal {
                    FormatEvent::SignalChanged
                } else {
                    FormatEvent::SignalLost
                };
                cx.notify(event, self.detected_timing);
            }
            self.found_stable_signal = false;
            cx.hw.reset_phy();
            return;
        }

        if !self.found_stable_signal {
            self.found_stable_signal = true;
            cx.notify(FormatEvent::FormatDetected, self.exposed_timing());
        }
        self.maintain_stream(cx);
    }

    /// Brings a requested stream up, or re-checks lanes after an enable.
    fn maintain_stream<H, E, I>(&mut self, cx: &mut Context<'_, H, E, I>)
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        if !self.lanes.is_enabled() {
            if self.stream_requested {
                // Failures are recorded and retried on the next tick.
                self.activate_stream(cx).ok();
            }
            return;
        }

        if self.lanes.verify(cx.hw) {
            return;
        }
        match self.lanes.recover(cx.hw) {
            Ok(()) => cx.record(TelemetryEventKind::LanesRecovered),
            Err(error) => cx.record(TelemetryEventKind::StreamFailed(error)),
        }
    }

    fn activate_stream<H, E, I>(&mut self, cx: &mut Context<'_, H, E, I>) -> Result<(), LaneError>
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        if self.lanes.is_enabled() {
            return Ok(());
        }

        let result = self.lanes.set_enabled(cx.hw, true);
        match result {
            Ok(()) => cx.record(TelemetryEventKind::StreamEnabled(self.lanes.last_attempts())),
            Err(error) => cx.record(TelemetryEventKind::StreamFailed(error)),
        }
        result
    }

    fn disable_stream<H, E, I>(&mut self, cx: &mut Context<'_, H, E, I>)
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        if self.lanes.is_enabled() {
            self.lanes.disable(cx.hw);
            cx.record(TelemetryEventKind::StreamDisabled);
        }
    }

    fn switch_eq<H, E, I>(&mut self, config: bool, cx: &mut Context<'_, H, E, I>)
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        self.current_eq_config = config;
        cx.hw.set_eq_bypass(config);
        cx.hw.reset_phy();
    }

    /// Records consumer intent and acts on it when the signal allows.
    pub(crate) fn request_stream<H, E, I>(
        &mut self,
        enable: bool,
        cx: &mut Context<'_, H, E, I>,
    ) -> Result<(), LaneError>
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        self.stream_requested = enable;
        if !enable {
            self.disable_stream(cx);
            return Ok(());
        }
        if self.status == SignalStatus::Stable && self.found_stable_signal {
            self.activate_stream(cx)
        } else {
            Ok(())
        }
    }

    /// `None` resumes learning and forgets both "known bad" verdicts.
    pub(crate) fn set_eq_override<H, E, I>(
        &mut self,
        mode: Option<bool>,
        cx: &mut Context<'_, H, E, I>,
    ) where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        self.forced_eq_mode = mode;
        if mode.is_none() {
            self.equalizer.clear_known_bad();
        }
        cx.record(TelemetryEventKind::EqOverride(mode));
    }

    pub(crate) fn set_test_pattern<H, E, I>(&mut self, enabled: bool, cx: &mut Context<'_, H, E, I>)
    where
        H: BridgeHardware + ?Sized,
        E: EventSink + ?Sized,
        I: TelemetryInstant,
    {
        if enabled == self.test_pattern {
            return;
        }

        // The stream restarts on the next tick with the new source.
        self.disable_stream(cx);
        self.test_pattern = enabled;
        self.lanes.set_test_pattern(enabled);
        cx.record(TelemetryEventKind::TestPattern(enabled));

        if enabled {
            self.status = SignalStatus::Stable;
            self.found_stable_signal = true;
            cx.notify(
                FormatEvent::FormatDetected,
                Some(DetectedTiming::TEST_PATTERN_1080P60),
            );
        } else {
            self.status = SignalStatus::FindingSignal;
            self.found_stable_signal = false;
            self.detected_timing = None;
            self.equalizer.reset_found();
            cx.notify(FormatEvent::SignalChanged, None);
        }
    }
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new(&BridgeConfig::new())
    }
}
