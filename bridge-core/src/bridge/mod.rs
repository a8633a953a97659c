//! Bridge controller facade.
//!
//! [`BridgeController`] ties one receiver, one event sink and the telemetry
//! ring to a [`BridgeState`]. Every entry point takes the current instant so
//! firmware and host drive it with their own clocks.

use crate::config::BridgeConfig;
use crate::events::EventSink;
use crate::lanes::{CsiTransmitter, LaneError};
use crate::probe::{DetectedTiming, HardwareProbe, InterruptStatus, ReceiverPhy};
use crate::signal::{BridgeState, BridgeStats, Context, SignalStatusSnapshot};
use crate::telemetry::{TelemetryInstant, TelemetryRecorder};

/// Everything the state machine needs from the bridge chip.
pub trait BridgeHardware: HardwareProbe + ReceiverPhy + CsiTransmitter {}

impl<T: HardwareProbe + ReceiverPhy + CsiTransmitter + ?Sized> BridgeHardware for T {}

/// Owns the state machine and its collaborators.
pub struct BridgeController<H, E, I>
where
    I: TelemetryInstant,
{
    hw: H,
    events: E,
    state: BridgeState,
    config: BridgeConfig,
    telemetry: TelemetryRecorder<I>,
}

impl<H, E, I> BridgeController<H, E, I>
where
    H: BridgeHardware,
    E: EventSink,
    I: TelemetryInstant,
{
    /// Attaches to `hw`. Writes the recommended equalizer setting and leaves
    /// the stream disabled.
    pub fn new(mut hw: H, events: E, config: BridgeConfig) -> Self {
        let state = BridgeState::new(&config);
        hw.set_eq_bypass(state.current_eq_config());
        Self {
            hw,
            events,
            state,
            config,
            telemetry: TelemetryRecorder::new(),
        }
    }

    fn with_context<R>(
        &mut self,
        now: I,
        f: impl FnOnce(&mut BridgeState, &mut Context<'_, H, E, I>) -> R,
    ) -> R {
        let mut cx = Context {
            hw: &mut self.hw,
            events: &mut self.events,
            telemetry: &mut self.telemetry,
            now,
        };
        f(&mut self.state, &mut cx)
    }

    /// Runs one poll tick.
    pub fn poll(&mut self, now: I) -> SignalStatusSnapshot {
        self.with_context(now, |state, cx| state.poll(cx))
    }

    /// Interrupt fast path. Only power-detect changes are acted on; the
    /// returned status says whether other causes are waiting for a poll.
    pub fn handle_interrupt(&mut self, now: I) -> InterruptStatus {
        self.with_context(now, |state, cx| state.interrupt(cx))
    }

    #[must_use]
    pub fn signal_status(&self) -> SignalStatusSnapshot {
        self.state.snapshot()
    }

    /// Timing of the stable signal, or `None` while no stable signal exists.
    #[must_use]
    pub fn detected_timing(&self) -> Option<DetectedTiming> {
        self.state.exposed_timing()
    }

    /// `Some(config)` pins the equalizer; `None` returns to learning.
    pub fn set_eq_override(&mut self, mode: Option<bool>, now: I) {
        self.with_context(now, |state, cx| state.set_eq_override(mode, cx));
    }

    /// Records whether a consumer wants the stream. Enabling while the signal
    /// is not yet stable defers activation to the poll tick.
    ///
    /// # Errors
    ///
    /// The [`LaneError`] of an immediate activation attempt.
    pub fn request_stream(&mut self, enable: bool, now: I) -> Result<(), LaneError> {
        self.with_context(now, |state, cx| state.request_stream(enable, cx))
    }

    pub fn set_test_pattern(&mut self, enabled: bool, now: I) {
        self.with_context(now, |state, cx| state.set_test_pattern(enabled, cx));
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        self.state.stats()
    }

    #[must_use]
    pub const fn state(&self) -> &BridgeState {
        &self.state
    }

    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryRecorder<I> {
        &self.telemetry
    }

    #[must_use]
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equalizer::{MAX_DROPPED_THRESHOLD, MAX_FOUND_THRESHOLD, MIN_FOUND_THRESHOLD};
    use crate::events::FormatEvent;
    use crate::probe::FormatChangeFlags;
    use crate::signal::SignalStatus;
    use crate::telemetry::{PhyResetReason, TelemetryEventKind};
    use crate::testing::{MicrosInstant, RecordingSink, ScriptedHardware};

    type TestController = BridgeController<ScriptedHardware, RecordingSink, MicrosInstant>;

    fn controller(cable_ok: [bool; 2]) -> TestController {
        BridgeController::new(
            ScriptedHardware::new(cable_ok),
            RecordingSink::default(),
            BridgeConfig::new(),
        )
    }

    fn run(controller: &mut TestController, ticks: u64) {
        for tick in 0..ticks {
            controller.poll(MicrosInstant::from_micros(tick * 200_000));
        }
    }

    fn run_until_stable(controller: &mut TestController) -> u64 {
        for tick in 0..64 {
            controller.poll(MicrosInstant::from_micros(tick * 200_000));
            if controller.signal_status().stable {
                return tick + 1;
            }
        }
        panic!("signal never became stable");
    }

    fn recorded(controller: &TestController, event: TelemetryEventKind) -> usize {
        controller
            .telemetry()
            .oldest_first()
            .filter(|record| record.event == event)
            .count()
    }

    #[test]
    fn attach_writes_recommended_equalizer() {
        let controller = controller([true, true]);
        assert_eq!(controller.hardware().eq_writes.as_slice(), &[true]);
        assert_eq!(controller.state().status(), SignalStatus::FindingSignal);
        assert_eq!(controller.detected_timing(), None);
    }

    #[test]
    fn recommended_configuration_reaches_stable() {
        let mut controller = controller([false, true]);

        controller.poll(MicrosInstant::from_micros(0));
        assert!(controller.signal_status().present);
        assert_eq!(controller.state().status(), SignalStatus::FindingSignal);

        let ticks = run_until_stable(&mut controller);
        assert!(ticks >= u64::from(MAX_FOUND_THRESHOLD) - 1);
        assert_eq!(controller.state().status(), SignalStatus::Stable);
        assert!(controller.state().current_eq_config());
        assert_eq!(
            controller.detected_timing(),
            Some(DetectedTiming::TEST_PATTERN_1080P60)
        );
        assert_eq!(
            controller.events_mut().events.as_slice(),
            &[FormatEvent::FormatDetected]
        );
    }

    #[test]
    fn learns_non_recommended_configuration() {
        let mut controller = controller([true, false]);

        run_until_stable(&mut controller);

        assert!(!controller.state().current_eq_config());
        assert!(!controller.hardware().eq_bypass);
        let stats = controller.stats();
        assert!(stats.eq_stats[0].found_count >= MIN_FOUND_THRESHOLD);
    }

    #[test]
    fn no_notification_before_stability() {
        let mut controller = controller([false, true]);
        run(&mut controller, 4);
        assert!(!controller.signal_status().stable);
        assert!(controller.events_mut().events.is_empty());
        assert_eq!(controller.detected_timing(), None);
    }

    #[test]
    fn stable_edge_notifies_once() {
        let mut controller = controller([true, true]);
        run_until_stable(&mut controller);
        run(&mut controller, 20);
        assert_eq!(
            controller.events_mut().events.as_slice(),
            &[FormatEvent::FormatDetected]
        );
    }

    #[test]
    fn blanking_only_change_keeps_stream_up() {
        let mut controller = controller([true, true]);
        run_until_stable(&mut controller);
        controller
            .request_stream(true, MicrosInstant::from_micros(10_000_000))
            .expect("stream");
        assert!(controller.stats().stream_enabled);

        let hw = controller.hardware_mut();
        hw.timing.h_blank += 4;
        hw.pending_flags = FormatChangeFlags::INPUT_TIMING_CHANGED;
        controller.poll(MicrosInstant::from_micros(10_200_000));

        assert_eq!(controller.state().status(), SignalStatus::Stable);
        assert!(controller.stats().stream_enabled);
        assert_eq!(recorded(&controller, TelemetryEventKind::TimingAbsorbed), 1);
        assert_eq!(
            controller.events_mut().events.as_slice(),
            &[FormatEvent::FormatDetected]
        );
    }

    #[test]
    fn resolution_change_reports_signal_changed() {
        let mut controller = controller([true, true]);
        run_until_stable(&mut controller);

        let hw = controller.hardware_mut();
        hw.timing.width = 1280;
        hw.timing.height = 720;
        hw.pending_flags = FormatChangeFlags::MODE_CHANGED;
        controller.poll(MicrosInstant::from_micros(20_000_000));

        assert_eq!(controller.state().status(), SignalStatus::FindingSignal);
        assert!(!controller.signal_status().stable);
        assert_eq!(
            controller.events_mut().events.as_slice(),
            &[FormatEvent::FormatDetected, FormatEvent::SignalChanged]
        );

        run_until_stable(&mut controller);
        assert_eq!(
            controller.detected_timing().map(|timing| timing.width),
            Some(1280)
        );
    }

    #[test]
    fn unplug_reports_loss_and_resets_learning() {
        let mut controller = controller([true, false]);
        run_until_stable(&mut controller);
        controller
            .request_stream(true, MicrosInstant::from_micros(1))
            .expect("stream");

        controller.hardware_mut().power = false;
        controller.poll(MicrosInstant::from_micros(30_000_000));

        let status = controller.signal_status();
        assert!(!status.present);
        assert!(!status.stable);
        assert!(!controller.stats().stream_enabled);
        assert!(controller.state().current_eq_config());
        assert!(controller.stats().eq_stats.iter().all(|stats| !stats.known_bad));
        assert_eq!(controller.detected_timing(), None);
        assert_eq!(
            controller.events_mut().events.as_slice(),
            &[FormatEvent::FormatDetected, FormatEvent::SignalLost]
        );

        controller.poll(MicrosInstant::from_micros(30_200_000));
        assert_eq!(controller.events_mut().events.len(), 2);
    }

    #[test]
    fn power_interrupt_is_not_repeated_by_poll() {
        let mut controller = controller([true, true]);
        run_until_stable(&mut controller);

        let hw = controller.hardware_mut();
        hw.power = false;
        hw.power_interrupt = true;
        let pending = controller.handle_interrupt(MicrosInstant::from_micros(40_000_000));
        assert!(pending.power_detect);
        assert!(!controller.signal_status().present);

        controller.poll(MicrosInstant::from_micros(40_100_000));
        assert_eq!(recorded(&controller, TelemetryEventKind::PowerLost), 1);
        assert_eq!(
            controller.events_mut().events.as_slice(),
            &[FormatEvent::FormatDetected, FormatEvent::SignalLost]
        );
    }

    #[test]
    fn deferred_stream_request_activates_when_stable() {
        let mut controller = controller([true, true]);
        controller
            .request_stream(true, MicrosInstant::from_micros(0))
            .expect("deferred");
        assert!(!controller.stats().stream_enabled);

        run_until_stable(&mut controller);
        controller.poll(MicrosInstant::from_micros(50_000_000));
        assert!(controller.stats().stream_enabled);
        assert!(controller.hardware().transmit_enabled);
        assert_eq!(recorded(&controller, TelemetryEventKind::StreamEnabled(1)), 1);
    }

    #[test]
    fn failed_auto_activation_is_retried_next_tick() {
        let mut controller = BridgeController::new(
            ScriptedHardware::new([true, true]),
            RecordingSink::default(),
            BridgeConfig::new().with_auto_stream(true),
        );
        controller.hardware_mut().failing_enables = 5;

        run_until_stable(&mut controller);
        assert!(!controller.stats().stream_enabled);
        assert_eq!(controller.hardware().enables, 5);
        assert_eq!(
            recorded(&controller, TelemetryEventKind::StreamFailed(LaneError::LanesNeverBusy)),
            1
        );

        controller.poll(MicrosInstant::from_micros(50_000_000));
        assert!(controller.stats().stream_enabled);
        assert_eq!(controller.hardware().enables, 6);
        assert_eq!(recorded(&controller, TelemetryEventKind::StreamEnabled(1)), 1);
    }

    #[test]
    fn stream_failure_is_reported_after_five_attempts() {
        let mut controller = controller([true, true]);
        run_until_stable(&mut controller);
        controller.hardware_mut().failing_enables = 10;

        let result = controller.request_stream(true, MicrosInstant::from_micros(1));
        assert_eq!(result, Err(LaneError::LanesNeverBusy));
        assert_eq!(controller.hardware().enables, 5);
        assert!(!controller.stats().stream_enabled);
        assert_eq!(controller.stats().retry_stats.total_attempts(), 5);
    }

    #[test]
    fn forced_equalizer_never_toggles() {
        let mut controller = controller([true, true]);
        controller.set_eq_override(Some(false), MicrosInstant::from_micros(0));

        run_until_stable(&mut controller);
        assert!(!controller.state().current_eq_config());
        let writes = &controller.hardware().eq_writes;
        assert_eq!(writes.as_slice(), &[true, false]);
    }

    #[test]
    fn drops_after_promotion_try_other_then_abandon() {
        let mut controller = controller([true, true]);
        let mut tick = 0;
        while controller.state().status() == SignalStatus::FindingSignal {
            controller.poll(MicrosInstant::from_micros(tick * 200_000));
            tick += 1;
            assert!(tick < 32, "signal never found");
        }
        assert_eq!(controller.state().status(), SignalStatus::FoundSignal);
        assert!(controller.state().current_eq_config());

        controller.hardware_mut().cable_ok = [false, false];
        let resets = controller.hardware().phy_resets;

        // First drop: switch to the other configuration right away.
        controller.poll(MicrosInstant::from_micros(tick * 200_000));
        tick += 1;
        assert_eq!(controller.state().status(), SignalStatus::FoundSignal);
        assert!(!controller.state().current_eq_config());
        assert!(!controller.hardware().eq_bypass);
        assert_eq!(controller.hardware().phy_resets, resets + 1);
        let stats = controller.stats();
        assert_eq!(stats.eq_stats[1].dropped_count, 1);
        assert_eq!(stats.eq_stats[0].dropped_count, 0);
        assert_eq!(recorded(&controller, TelemetryEventKind::EqOptimisticSwitch(false)), 1);

        // Below the threshold the new configuration is given time.
        for held in 1..MAX_DROPPED_THRESHOLD {
            controller.poll(MicrosInstant::from_micros(tick * 200_000));
            tick += 1;
            assert_eq!(controller.state().status(), SignalStatus::FoundSignal);
            assert!(!controller.state().current_eq_config());
            assert_eq!(controller.stats().eq_stats[0].dropped_count, held);
            assert_eq!(controller.hardware().phy_resets, resets + 1);
        }

        controller.poll(MicrosInstant::from_micros(tick * 200_000));
        assert_eq!(controller.state().status(), SignalStatus::FindingSignal);
        assert_eq!(controller.hardware().phy_resets, resets + 2);
        let stats = controller.stats();
        assert_eq!(stats.eq_stats[0].found_count, 0);
        assert_eq!(stats.eq_stats[1].found_count, 0);
        assert_eq!(recorded(&controller, TelemetryEventKind::SignalAbandoned(false)), 1);
        assert!(controller.events_mut().events.is_empty());
    }

    #[test]
    fn automatic_equalizer_forgets_known_bad_configuration() {
        let mut controller = controller([true, false]);
        run_until_stable(&mut controller);

        let stats = controller.stats();
        assert!(stats.eq_stats[1].known_bad);
        assert!(!stats.eq_stats[0].known_bad);

        controller.set_eq_override(Some(false), MicrosInstant::from_micros(20_000_000));
        let stats = controller.stats();
        assert_eq!(stats.forced_eq_mode, Some(false));
        assert!(stats.eq_stats[1].known_bad);

        controller.set_eq_override(None, MicrosInstant::from_micros(20_200_000));
        let stats = controller.stats();
        assert_eq!(stats.forced_eq_mode, None);
        assert!(stats.eq_stats.iter().all(|config| !config.known_bad));
    }

    #[test]
    fn lost_signal_in_finding_resets_phy() {
        let mut controller = controller([true, true]);
        run(&mut controller, 2);

        controller.hardware_mut().cable_ok = [false, false];
        controller.poll(MicrosInstant::from_micros(5_000_000));
        assert!(recorded(&controller, TelemetryEventKind::PhyReset(PhyResetReason::Glitch)) >= 1);
    }

    #[test]
    fn test_pattern_reports_fixed_timing() {
        let mut controller = controller([false, false]);
        controller.set_test_pattern(true, MicrosInstant::from_micros(0));

        assert!(controller.signal_status().stable);
        assert_eq!(
            controller.detected_timing(),
            Some(DetectedTiming::TEST_PATTERN_1080P60)
        );
        controller
            .request_stream(true, MicrosInstant::from_micros(1))
            .expect("pattern stream");
        controller.poll(MicrosInstant::from_micros(200_000));
        assert!(controller.stats().stream_enabled);

        controller.set_test_pattern(false, MicrosInstant::from_micros(400_000));
        assert!(!controller.stats().stream_enabled);
        assert_eq!(controller.detected_timing(), None);
        assert_eq!(
            controller.events_mut().events.as_slice(),
            &[FormatEvent::FormatDetected, FormatEvent::SignalChanged]
        );
    }
}
