//! Telemetry event catalog and ring buffer for bridge decisions.
//!
//! Every decision the signal state machine takes is recorded here as a
//! typed event with an optional payload. The firmware drains new records and
//! logs them through defmt; the emulator prints them. Nothing in this module
//! performs I/O itself.

use core::{fmt, time::Duration};

use heapless::HistoryBuf;

use crate::equalizer::EqConfigStats;
use crate::events::FormatEvent;
use crate::lanes::LaneError;
use crate::probe::DetectedTiming;

/// Monotonic identifier assigned to each telemetry record.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Why the PHY was reset outside of an equalizer switch or state change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PhyResetReason {
    /// A configuration that had been producing signal stopped.
    Glitch,
    /// Mode or sync-state change without a signal.
    FormatChange,
}

impl fmt::Display for PhyResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhyResetReason::Glitch => "glitch",
            PhyResetReason::FormatChange => "format-change",
        })
    }
}

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    PowerDetected,
    PowerLost,
    /// Searching: the equalizer moved to the given configuration.
    EqToggled(bool),
    PhyReset(PhyResetReason),
    /// The search settled on the given configuration.
    SignalFound(bool),
    /// The search chose a different configuration than the one sampled.
    EqPromotedElsewhere(bool),
    /// A drop after promotion switched to the given configuration.
    EqOptimisticSwitch(bool),
    /// Too many drops after promotion; searching again.
    SignalAbandoned(bool),
    /// The signal stayed good long enough to be trusted.
    SignalStable(bool),
    Format(FormatEvent),
    /// A new timing differed from the stored one only in blanking.
    TimingAbsorbed,
    /// The stream came up after the given number of attempts.
    StreamEnabled(u8),
    StreamDisabled,
    StreamFailed(LaneError),
    /// The lanes had gone idle and were cycled.
    LanesRecovered,
    EqOverride(Option<bool>),
    TestPattern(bool),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::PowerDetected => f.write_str("power-detected"),
            TelemetryEventKind::PowerLost => f.write_str("power-lost"),
            TelemetryEventKind::EqToggled(config) => write!(f, "eq-toggled eq={}", on_off(*config)),
            TelemetryEventKind::PhyReset(reason) => write!(f, "phy-reset {reason}"),
            TelemetryEventKind::SignalFound(config) => {
                write!(f, "signal-found eq={}", on_off(*config))
            }
            TelemetryEventKind::EqPromotedElsewhere(config) => {
                write!(f, "eq-promoted-elsewhere eq={}", on_off(*config))
            }
            TelemetryEventKind::EqOptimisticSwitch(config) => {
                write!(f, "eq-optimistic-switch eq={}", on_off(*config))
            }
            TelemetryEventKind::SignalAbandoned(config) => {
                write!(f, "signal-abandoned eq={}", on_off(*config))
            }
            TelemetryEventKind::SignalStable(config) => {
                write!(f, "signal-stable eq={}", on_off(*config))
            }
            TelemetryEventKind::Format(event) => write!(f, "{event}"),
            TelemetryEventKind::TimingAbsorbed => f.write_str("timing-absorbed"),
            TelemetryEventKind::StreamEnabled(attempts) => {
                write!(f, "stream-enabled attempts={attempts}")
            }
            TelemetryEventKind::StreamDisabled => f.write_str("stream-disabled"),
            TelemetryEventKind::StreamFailed(error) => write!(f, "stream-failed: {error}"),
            TelemetryEventKind::LanesRecovered => f.write_str("lanes-recovered"),
            TelemetryEventKind::EqOverride(None) => f.write_str("eq-override auto"),
            TelemetryEventKind::EqOverride(Some(config)) => {
                write!(f, "eq-override eq={}", on_off(*config))
            }
            TelemetryEventKind::TestPattern(enabled) => {
                write!(f, "test-pattern {}", on_off(*enabled))
            }
        }
    }
}

const fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Snapshot of both equalizer configurations' counters.
    Equalizer(EqTelemetry),
    /// Timing associated with a format event.
    Timing(DetectedTiming),
    /// Time spent in the state being left.
    Dwell(Duration),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Equalizer counters captured at a decision point.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EqTelemetry {
    pub stats: [EqConfigStats; 2],
}

impl EqTelemetry {
    #[must_use]
    pub const fn new(stats: [EqConfigStats; 2]) -> Self {
        Self { stats }
    }
}

impl fmt::Display for EqTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [off, on] = &self.stats;
        write!(
            f,
            "found={}/{} dropped={}/{} bad={}/{}",
            off.found_count,
            on.found_count,
            off.dropped_count,
            on.dropped_count,
            u8::from(off.known_bad),
            u8::from(on.known_bad),
        )
    }
}

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_state_change: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_state_change: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord<TInstant>> + '_ {
        self.ring.oldest_ordered()
    }

    /// Records with an id at or after `cursor`, oldest first.
    pub fn since(&self, cursor: EventId) -> impl Iterator<Item = &TelemetryRecord<TInstant>> + '_ {
        self.oldest_first().filter(move |record| record.id >= cursor)
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Identifier the next record will receive.
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }

    /// Records an event that moves the state machine to another state,
    /// attaching how long the previous state lasted.
    pub fn record_state_change(&mut self, event: TelemetryEventKind, timestamp: TInstant) -> EventId {
        let payload = self
            .last_state_change
            .map_or(TelemetryPayload::None, |previous| {
                TelemetryPayload::Dwell(timestamp.saturating_duration_since(previous))
            });
        self.last_state_change = Some(timestamp);
        self.record(event, payload, timestamp)
    }

    /// Records an equalizer decision with both configurations' counters.
    pub fn record_equalizer(
        &mut self,
        event: TelemetryEventKind,
        stats: [EqConfigStats; 2],
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            event,
            TelemetryPayload::Equalizer(EqTelemetry::new(stats)),
            timestamp,
        )
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
