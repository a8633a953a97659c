use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bridge_core::config::{BridgeConfig, DEFAULT_POLL_PERIOD};
use bridge_core::events::{ChannelEventSink, FormatEvents, FormatSubscriber};
use bridge_core::lanes::ClockMode;
use bridge_core::probe::tc358840::{Tc358840, Tc358840Config};
use bridge_core::repl::commands::{CommandError, CommandExecutor};
use bridge_core::repl::status::write_timing;
use bridge_core::scheduler::{PollScheduler, PollTimer, SharedBridge};
use bridge_core::telemetry::{EventId, TelemetryInstant, TelemetryPayload, TelemetryRecord};
use bridge_core::transport::NoDelay;
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::chip::{CableProfile, SOURCE_MODES, SimulatedChip, find_mode};

type HostMutex = CriticalSectionRawMutex;

type HostChip = Tc358840<SimulatedChip, NoDelay>;

type HostBridge =
    SharedBridge<HostMutex, HostChip, ChannelEventSink<'static, HostMutex>, HostInstant>;

/// Most polls a single `step` may run.
const MAX_STEPS: u32 = 1_000;

pub const SIMULATOR_TOPICS: &[(&str, &str)] = &[
    ("plug", "plug                     - connect the source (5V present)"),
    ("unplug", "unplug                   - disconnect the source"),
    (
        "cable",
        "cable <false|true|both|none> - equalizer settings that lock",
    ),
    ("mode", "mode <name>              - switch the source video mode"),
    ("source", "source                   - show the simulated source and receiver"),
    ("step", "step [count]             - run poll ticks now"),
    (
        "lanes",
        "lanes fail <count>       - next enables leave the data lanes idle",
    ),
    ("events", "events                   - drain format notifications"),
    ("log", "log [all]                - show new (or all) telemetry records"),
    ("detach", "detach                   - stop the background poller"),
];

/// Monotonic host timestamp fed to the bridge core.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct HostInstant(Instant);

impl HostInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }
}

impl TelemetryInstant for HostInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

/// Startup options collected from the command line.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub cable: CableProfile,
    pub background_poll: bool,
    pub clock_mode: ClockMode,
    /// `None` lets the bridge learn the equalizer setting.
    pub eq_override: Option<bool>,
    pub poll_period: Duration,
    pub transcript: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cable: CableProfile::BOTH,
            background_poll: true,
            clock_mode: ClockMode::NonContinuous,
            eq_override: None,
            poll_period: DEFAULT_POLL_PERIOD,
            transcript: None,
        }
    }
}

/// Sleeps the calling thread for one poll period.
struct SleepTimer {
    period: Duration,
}

impl PollTimer for SleepTimer {
    type Instant = HostInstant;

    async fn wait_next(&mut self) -> HostInstant {
        thread::sleep(self.period);
        HostInstant::now()
    }
}

pub struct Session {
    bridge: &'static HostBridge,
    events: FormatSubscriber<'static, HostMutex>,
    scheduler: &'static PollScheduler<HostMutex>,
    poller: Option<JoinHandle<()>>,
    executor: CommandExecutor<&'static HostBridge>,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
    log_cursor: EventId,
}

impl Session {
    pub fn new(options: SessionOptions) -> io::Result<Self> {
        let transcript = options
            .transcript
            .as_deref()
            .map(TranscriptLogger::new)
            .transpose()?;

        let format_events: &'static FormatEvents<HostMutex> = Box::leak(Box::new(FormatEvents::new()));
        let events = format_events
            .subscribe()
            .map_err(|_| io::Error::other("format event subscriber slots exhausted"))?;

        let mut chip = Tc358840::new(
            SimulatedChip::new(options.cable),
            NoDelay,
            Tc358840Config::default(),
        );
        chip.unmask_power_interrupt();

        let config = BridgeConfig::new()
            .with_auto_stream(true)
            .with_clock_mode(options.clock_mode)
            .with_eq_override(options.eq_override)
            .with_poll_period(options.poll_period);
        let bridge: &'static HostBridge = Box::leak(Box::new(SharedBridge::new(
            chip,
            format_events.sink(),
            config,
        )));
        let scheduler: &'static PollScheduler<HostMutex> = Box::leak(Box::new(PollScheduler::new()));

        let poller = options
            .background_poll
            .then(|| spawn_poller(bridge, scheduler, config.poll_period))
            .transpose()?;

        Ok(Self {
            bridge,
            events,
            scheduler,
            poller,
            executor: CommandExecutor::new(bridge),
            transcript,
            started_at: HostInstant::now(),
            log_cursor: 0,
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.elapsed();
        self.record(elapsed, TranscriptRole::Host, &[trimmed.to_string()])?;

        let lines = self.dispatch(trimmed);
        self.record(elapsed, TranscriptRole::Emulator, &lines)?;
        Ok(lines)
    }

    /// Stops the background poller, waiting out an in-flight tick.
    pub fn detach(&mut self) -> Vec<String> {
        let Some(handle) = self.poller.take() else {
            return vec!["poller not running".to_string()];
        };

        block_on(self.scheduler.cancel());
        let ticks = self.scheduler.tick_count();
        if handle.join().is_err() {
            return vec!["ERR poller thread panicked".to_string()];
        }
        vec![format!("poller stopped after {ticks} ticks; use `step` to advance")]
    }

    fn dispatch(&mut self, line: &str) -> Vec<String> {
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        match (keyword.as_str(), args.as_slice()) {
            ("plug", []) => self.plug(true),
            ("unplug", []) => self.plug(false),
            ("cable", [tag]) => match CableProfile::from_tag(tag) {
                Ok(profile) => {
                    self.bridge.lock(|bridge| {
                        bridge.hardware_mut().transport_mut().set_cable(profile);
                    });
                    vec![format!("cable {}", profile.label())]
                }
                Err(message) => vec![format!("ERR {message}")],
            },
            ("cable", []) => {
                let profile = self
                    .bridge
                    .lock(|bridge| bridge.hardware().transport().cable());
                vec![format!("cable {}", profile.label())]
            }
            ("mode", [name]) => self.switch_mode(name),
            ("mode", []) => {
                let mut lines = Vec::new();
                let current = self.bridge.lock(|bridge| bridge.hardware().transport().mode());
                for mode in SOURCE_MODES {
                    let marker = if *mode == current { '*' } else { ' ' };
                    lines.push(format!("{marker} {}", mode.name));
                }
                lines
            }
            ("source", []) => {
                let line = self.bridge.lock(|bridge| {
                    let chip = bridge.hardware().transport();
                    format!(
                        "source plugged={} cable={} mode={} eq-bypass={} locked={} phy-resets={}",
                        chip.plugged(),
                        chip.cable().label(),
                        chip.mode().name,
                        u8::from(chip.eq_bypass()),
                        chip.locked(),
                        chip.phy_resets(),
                    )
                });
                vec![line]
            }
            ("step", []) => self.step(1),
            ("step", [count]) => match count.parse::<u32>() {
                Ok(count) if (1..=MAX_STEPS).contains(&count) => self.step(count),
                _ => vec![format!("ERR step count must be 1..={MAX_STEPS}")],
            },
            ("lanes", ["fail", count]) => match count.parse::<u32>() {
                Ok(count) => {
                    self.bridge.lock(|bridge| {
                        bridge.hardware_mut().transport_mut().fail_lanes(count);
                    });
                    vec![format!("next {count} lane enables will stay idle")]
                }
                Err(_) => vec![format!("ERR invalid count `{count}`")],
            },
            ("lanes", []) => {
                let (busy, pending) = self.bridge.lock(|bridge| {
                    let chip = bridge.hardware().transport();
                    (chip.lanes_busy(), chip.pending_lane_failures())
                });
                vec![format!("lanes busy={busy} scripted-failures={pending}")]
            }
            ("events", []) => self.drain_events(),
            ("log", []) => self.telemetry_lines(false),
            ("log", ["all"]) => self.telemetry_lines(true),
            ("detach", []) => self.detach(),
            ("help", []) => self.help(None),
            ("help", [topic]) if simulator_topic(topic).is_some() => self.help(Some(*topic)),
            _ => self.execute(line),
        }
    }

    fn execute(&mut self, line: &str) -> Vec<String> {
        match self.executor.execute(line, HostInstant::now()) {
            Ok(outcome) => outcome.to_string().lines().map(str::to_string).collect(),
            Err(CommandError::Parse(error)) => vec![format!("ERR syntax {error}")],
            Err(error) => vec![format!("ERR {error}")],
        }
    }

    fn help(&mut self, topic: Option<&str>) -> Vec<String> {
        if let Some(detail) = topic.and_then(simulator_topic) {
            return vec![detail.to_string()];
        }

        let mut lines = vec!["Bridge commands:".to_string()];
        lines.extend(self.execute("help").into_iter().map(|line| format!("  {line}")));
        lines.push("Simulator commands:".to_string());
        for (_, detail) in SIMULATOR_TOPICS {
            lines.push(format!("  {detail}"));
        }
        lines.push("Type `help <topic>` for a specific command.".to_string());
        lines
    }

    fn plug(&mut self, plugged: bool) -> Vec<String> {
        let raised = self.bridge.lock(|bridge| {
            bridge
                .hardware_mut()
                .transport_mut()
                .set_plugged(plugged)
        });
        if raised {
            self.bridge.on_interrupt(HostInstant::now());
        }
        let state = if plugged { "plugged" } else { "unplugged" };
        vec![format!("source {state}")]
    }

    fn switch_mode(&mut self, name: &str) -> Vec<String> {
        let Some(mode) = find_mode(name) else {
            let names: Vec<&str> = SOURCE_MODES.iter().map(|mode| mode.name).collect();
            return vec![format!("ERR unknown mode `{name}` (one of {})", names.join(", "))];
        };

        let raised = self
            .bridge
            .lock(|bridge| bridge.hardware_mut().transport_mut().set_mode(mode));
        if raised {
            self.bridge.on_interrupt(HostInstant::now());
        }
        vec![format!("source mode {}", mode.name)]
    }

    fn step(&mut self, count: u32) -> Vec<String> {
        let mut snapshot = self.bridge.signal_status();
        for _ in 0..count {
            snapshot = self.bridge.poll(HostInstant::now());
        }
        let stats = self.bridge.stats();
        vec![format!(
            "stepped {count}: {} present={} synced={} stable={} eq={}",
            stats.status,
            snapshot.present,
            snapshot.synced,
            snapshot.stable,
            u8::from(stats.current_eq_config),
        )]
    }

    fn drain_events(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(event) = self.events.try_next_message_pure() {
            lines.push(event.to_string());
        }
        if lines.is_empty() {
            lines.push("no format events".to_string());
        }
        lines
    }

    fn telemetry_lines(&mut self, all: bool) -> Vec<String> {
        let cursor = if all { 0 } else { self.log_cursor };
        let started_at = self.started_at;
        let (lines, next) = self.bridge.lock(|bridge| {
            let recorder = bridge.telemetry();
            let lines: Vec<String> = recorder
                .since(cursor)
                .map(|record| describe_record(record, started_at))
                .collect();
            (lines, recorder.next_id())
        });
        self.log_cursor = next;

        if lines.is_empty() {
            vec!["no new telemetry".to_string()]
        } else {
            lines
        }
    }

    fn elapsed(&self) -> Duration {
        HostInstant::now().saturating_duration_since(self.started_at)
    }

    fn record(&mut self, elapsed: Duration, role: TranscriptRole, lines: &[String]) -> io::Result<()> {
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(elapsed, &role, line)?;
            }
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.poller.is_some() {
            let _ = self.detach();
        }
    }
}

fn spawn_poller(
    bridge: &'static HostBridge,
    scheduler: &'static PollScheduler<HostMutex>,
    period: Duration,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("bridge-poll".to_string())
        .spawn(move || {
            let mut timer = SleepTimer { period };
            block_on(scheduler.run(&mut timer, |now| {
                bridge.poll(now);
            }));
        })
}

fn simulator_topic(name: &str) -> Option<&'static str> {
    SIMULATOR_TOPICS
        .iter()
        .find(|(topic, _)| topic.eq_ignore_ascii_case(name))
        .map(|(_, detail)| *detail)
}

fn describe_record(record: &TelemetryRecord<HostInstant>, started_at: HostInstant) -> String {
    let offset = record.timestamp.saturating_duration_since(started_at);
    let mut line = format!("[+{:>6} ms] #{} {}", offset.as_millis(), record.id, record.event);
    match &record.details {
        TelemetryPayload::None => {}
        TelemetryPayload::Equalizer(stats) => line.push_str(&format!(" {stats}")),
        TelemetryPayload::Timing(timing) => {
            line.push(' ');
            let _ = write_timing(&mut line, Some(timing));
        }
        TelemetryPayload::Dwell(dwell) => {
            line.push_str(&format!(" after={}ms", dwell.as_millis()));
        }
    }
    line
}

struct TranscriptLogger {
    writer: BufWriter<fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# HDMI-CSI bridge emulator transcript")?;
        writeln!(
            logger.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, elapsed: Duration, role: &TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
