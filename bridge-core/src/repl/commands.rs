//! High-level REPL command dispatcher.
//!
//! This module glues parsed commands to a [`BridgeControl`] implementation.
//! It stays `no_std` friendly so the firmware and emulator crates can share
//! the same implementation.

use core::fmt;

use crate::bridge::{BridgeController, BridgeHardware};
use crate::events::EventSink;
use crate::lanes::LaneError;
use crate::probe::DetectedTiming;
use crate::scheduler::SharedBridge;
use crate::signal::{BridgeStats, SignalStatusSnapshot};
use crate::telemetry::TelemetryInstant;

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::grammar::{self, Command, EqMode};
use super::status::{StatusFormatter, StatusReport, write_timing};

/// One entry of the `help` listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HelpTopic {
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

/// Commands understood by the REPL, in `help` order.
pub const HELP_TOPICS: &[HelpTopic] = &[
    HelpTopic {
        name: "status",
        usage: "status",
        summary: "signal, equalizer, stream and timing summary",
    },
    HelpTopic {
        name: "timing",
        usage: "timing",
        summary: "detected timing of the stable signal",
    },
    HelpTopic {
        name: "stats",
        usage: "stats",
        summary: "equalizer counters and lane retry histogram",
    },
    HelpTopic {
        name: "eq",
        usage: "eq auto|0|1",
        summary: "learn the equalizer bypass or pin it",
    },
    HelpTopic {
        name: "stream",
        usage: "stream on|off",
        summary: "request or stop the CSI output stream",
    },
    HelpTopic {
        name: "pattern",
        usage: "pattern on|off",
        summary: "drive the output from the colour bar generator",
    },
    HelpTopic {
        name: "help",
        usage: "help [command]",
        summary: "list commands or describe one",
    },
];

/// Looks up a help topic by name.
#[must_use]
pub fn find_topic(name: &str) -> Option<&'static HelpTopic> {
    HELP_TOPICS
        .iter()
        .find(|topic| topic.name.eq_ignore_ascii_case(name))
}

/// Operations the REPL needs from the bridge.
pub trait BridgeControl {
    type Instant: Copy;

    fn signal_status(&mut self) -> SignalStatusSnapshot;
    fn detected_timing(&mut self) -> Option<DetectedTiming>;
    fn stats(&mut self) -> BridgeStats;
    fn set_eq_override(&mut self, mode: Option<bool>, now: Self::Instant);
    /// # Errors
    ///
    /// The lane activation failure, if the stream was brought up immediately.
    fn request_stream(&mut self, enable: bool, now: Self::Instant) -> Result<(), LaneError>;
    fn set_test_pattern(&mut self, enabled: bool, now: Self::Instant);

    /// Gathers a [`StatusReport`].
    fn report(&mut self) -> StatusReport {
        StatusReport {
            signal: self.signal_status(),
            timing: self.detected_timing(),
            stats: self.stats(),
        }
    }
}

impl<H, E, I> BridgeControl for BridgeController<H, E, I>
where
    H: BridgeHardware,
    E: EventSink,
    I: TelemetryInstant,
{
    type Instant = I;

    fn signal_status(&mut self) -> SignalStatusSnapshot {
        BridgeController::signal_status(self)
    }

    fn detected_timing(&mut self) -> Option<DetectedTiming> {
        BridgeController::detected_timing(self)
    }

    fn stats(&mut self) -> BridgeStats {
        BridgeController::stats(self)
    }

    fn set_eq_override(&mut self, mode: Option<bool>, now: I) {
        BridgeController::set_eq_override(self, mode, now);
    }

    fn request_stream(&mut self, enable: bool, now: I) -> Result<(), LaneError> {
        BridgeController::request_stream(self, enable, now)
    }

    fn set_test_pattern(&mut self, enabled: bool, now: I) {
        BridgeController::set_test_pattern(self, enabled, now);
    }

    fn report(&mut self) -> StatusReport {
        StatusReport {
            signal: BridgeController::signal_status(self),
            timing: BridgeController::detected_timing(self),
            stats: BridgeController::stats(self),
        }
    }
}

impl<M, H, E, I> BridgeControl for &SharedBridge<M, H, E, I>
where
    M: RawMutex,
    H: BridgeHardware,
    E: EventSink,
    I: TelemetryInstant,
{
    type Instant = I;

    fn signal_status(&mut self) -> SignalStatusSnapshot {
        SharedBridge::signal_status(self)
    }

    fn detected_timing(&mut self) -> Option<DetectedTiming> {
        SharedBridge::detected_timing(self)
    }

    fn stats(&mut self) -> BridgeStats {
        SharedBridge::stats(self)
    }

    fn set_eq_override(&mut self, mode: Option<bool>, now: I) {
        SharedBridge::set_eq_override(self, mode, now);
    }

    fn request_stream(&mut self, enable: bool, now: I) -> Result<(), LaneError> {
        SharedBridge::request_stream(self, enable, now)
    }

    fn set_test_pattern(&mut self, enabled: bool, now: I) {
        SharedBridge::set_test_pattern(self, enabled, now);
    }

    /// Reads the whole report under one lock.
    fn report(&mut self) -> StatusReport {
        self.lock(|bridge| StatusReport {
            signal: bridge.signal_status(),
            timing: bridge.detected_timing(),
            stats: bridge.stats(),
        })
    }
}

/// Command execution successes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Status(StatusReport),
    Timing(Option<DetectedTiming>),
    Stats(BridgeStats),
    EqOverride(Option<bool>),
    Stream { requested: bool, enabled: bool },
    Pattern(bool),
    Help(Option<&'static HelpTopic>),
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Status(report) => {
                let formatter = StatusFormatter::new(report);
                formatter.write_signal_line(f)?;
                f.write_str("\n")?;
                formatter.write_equalizer_line(f)?;
                f.write_str("\n")?;
                formatter.write_stream_line(f)?;
                f.write_str("\n")?;
                formatter.write_timing_line(f)
            }
            CommandOutcome::Timing(timing) => write_timing(f, timing.as_ref()),
            CommandOutcome::Stats(stats) => {
                let report = StatusReport {
                    signal: SignalStatusSnapshot::default(),
                    timing: None,
                    stats: *stats,
                };
                let formatter = StatusFormatter::new(&report);
                formatter.write_equalizer_line(f)?;
                f.write_str("\n")?;
                formatter.write_stream_line(f)
            }
            CommandOutcome::EqOverride(None) => f.write_str("eq auto"),
            CommandOutcome::EqOverride(Some(mode)) => write!(f, "eq forced {}", u8::from(*mode)),
            CommandOutcome::Stream { requested, enabled } => match (requested, enabled) {
                (true, true) => f.write_str("stream enabled"),
                (true, false) => f.write_str("stream requested; waiting for stable signal"),
                (false, _) => f.write_str("stream disabled"),
            },
            CommandOutcome::Pattern(enabled) => {
                write!(f, "pattern {}", if *enabled { "on" } else { "off" })
            }
            CommandOutcome::Help(Some(topic)) => {
                write!(f, "{}: {}", topic.usage, topic.summary)
            }
            CommandOutcome::Help(None) => {
                for (index, topic) in HELP_TOPICS.iter().enumerate() {
                    if index > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{:<16} {}", topic.usage, topic.summary)?;
                }
                Ok(())
            }
        }
    }
}

/// Errors surfaced while executing a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError<'a> {
    Parse(grammar::ParseError<'a>),
    UnknownTopic(&'a str),
    Stream(LaneError),
}

impl<'a> From<grammar::ParseError<'a>> for CommandError<'a> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl From<LaneError> for CommandError<'_> {
    fn from(error: LaneError) -> Self {
        Self::Stream(error)
    }
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => error.fmt(f),
            CommandError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
            CommandError::Stream(error) => write!(f, "stream failed: {error}"),
        }
    }
}

/// Dispatches REPL commands into the bridge.
pub struct CommandExecutor<B> {
    bridge: B,
}

impl<B> CommandExecutor<B> {
    pub const fn new(bridge: B) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }
}

impl<B: BridgeControl> CommandExecutor<B> {
    /// Parses and executes a REPL command.
    ///
    /// # Errors
    ///
    /// Parse failures, unknown help topics and stream activation failures.
    pub fn execute<'a>(
        &mut self,
        line: &'a str,
        now: B::Instant,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        let command = grammar::parse(line)?;
        self.dispatch(command, now)
    }

    /// Executes an already parsed command.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub fn dispatch<'a>(
        &mut self,
        command: Command<'a>,
        now: B::Instant,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        match command {
            Command::Status => Ok(CommandOutcome::Status(self.bridge.report())),
            Command::Timing => Ok(CommandOutcome::Timing(self.bridge.detected_timing())),
            Command::Stats => Ok(CommandOutcome::Stats(self.bridge.stats())),
            Command::Eq(mode) => {
                let mode = EqMode::as_override(mode);
                self.bridge.set_eq_override(mode, now);
                Ok(CommandOutcome::EqOverride(mode))
            }
            Command::Stream(enable) => {
                self.bridge.request_stream(enable, now)?;
                Ok(CommandOutcome::Stream {
                    requested: enable,
                    enabled: self.bridge.stats().stream_enabled,
                })
            }
            Command::Pattern(enabled) => {
                self.bridge.set_test_pattern(enabled, now);
                Ok(CommandOutcome::Pattern(enabled))
            }
            Command::Help(help) => match help.topic {
                None => Ok(CommandOutcome::Help(None)),
                Some(name) => find_topic(name)
                    .map(|topic| CommandOutcome::Help(Some(topic)))
                    .ok_or(CommandError::UnknownTopic(name)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::events::NoopEventSink;
    use crate::testing::{MicrosInstant, ScriptedHardware};
    use core::fmt::Write;
    use heapless::String;

    type TestExecutor =
        CommandExecutor<BridgeController<ScriptedHardware, NoopEventSink, MicrosInstant>>;

    fn executor(cable_ok: [bool; 2]) -> TestExecutor {
        CommandExecutor::new(BridgeController::new(
            ScriptedHardware::new(cable_ok),
            NoopEventSink,
            BridgeConfig::new(),
        ))
    }

    fn settle(executor: &mut TestExecutor) {
        for tick in 0..32 {
            executor
                .bridge_mut()
                .poll(MicrosInstant::from_micros(tick * 200_000));
        }
    }

    fn now() -> MicrosInstant {
        MicrosInstant::from_micros(10_000_000)
    }

    #[test]
    fn eq_command_pins_configuration() {
        let mut executor = executor([true, true]);

        let outcome = executor.execute("eq 0", now()).expect("eq");
        assert_eq!(outcome, CommandOutcome::EqOverride(Some(false)));
        assert_eq!(executor.bridge().stats().forced_eq_mode, Some(false));

        settle(&mut executor);
        assert!(!executor.bridge().state().current_eq_config());

        let outcome = executor.execute("eq auto", now()).expect("eq");
        assert_eq!(outcome, CommandOutcome::EqOverride(None));
    }

    #[test]
    fn stream_request_before_signal_is_deferred() {
        let mut executor = executor([true, true]);

        let outcome = executor.execute("stream on", now()).expect("stream");
        assert_eq!(
            outcome,
            CommandOutcome::Stream {
                requested: true,
                enabled: false,
            }
        );

        settle(&mut executor);
        assert!(executor.bridge().stats().stream_enabled);

        let outcome = executor.execute("stream off", now()).expect("stream");
        assert_eq!(
            outcome,
            CommandOutcome::Stream {
                requested: false,
                enabled: false,
            }
        );
    }

    #[test]
    fn stream_failure_surfaces_lane_error() {
        let mut executor = executor([true, true]);
        settle(&mut executor);
        executor.bridge_mut().hardware_mut().failing_enables = 100;

        let error = executor.execute("stream on", now()).unwrap_err();
        assert_eq!(error, CommandError::Stream(LaneError::LanesNeverBusy));
    }

    #[test]
    fn status_renders_all_lines() {
        let mut executor = executor([true, true]);
        settle(&mut executor);

        let outcome = executor.execute("status", now()).expect("status");
        let mut text: String<512> = String::new();
        write!(text, "{outcome}").unwrap();

        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("signal power=present"));
        assert!(lines.next().unwrap().starts_with("equalizer bypass=1"));
        assert!(lines.next().unwrap().starts_with("stream enabled=no"));
        assert_eq!(
            lines.next().unwrap(),
            "timing 1920x1080p60.00 (148.500 MHz)"
        );
    }

    #[test]
    fn help_lists_and_describes_commands() {
        let mut executor = executor([true, true]);

        let outcome = executor.execute("help stream", now()).expect("help");
        let mut text: String<128> = String::new();
        write!(text, "{outcome}").unwrap();
        assert_eq!(
            text.as_str(),
            "stream on|off: request or stop the CSI output stream"
        );

        let error = executor.execute("help reboot", now()).unwrap_err();
        assert_eq!(error, CommandError::UnknownTopic("reboot"));

        let outcome = executor.execute("help", now()).expect("help");
        assert_eq!(outcome, CommandOutcome::Help(None));
    }

    #[test]
    fn parse_errors_are_forwarded() {
        let mut executor = executor([true, true]);
        let error = executor.execute("pattern maybe", now()).unwrap_err();
        assert_eq!(
            error,
            CommandError::Parse(grammar::ParseError::InvalidArgument {
                command: "pattern",
                found: "maybe",
            })
        );
    }
}
