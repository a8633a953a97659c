//! Mirrors bridge telemetry to defmt (or stdout on the host).
//!
//! The core only records decisions into its ring. After each tick the poll
//! task hands the recorder to [`TelemetryDrain`], which logs every record it
//! has not seen yet and remembers where it stopped.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::{self, Write as _};

use bridge_core::events::FormatEvent;
use bridge_core::probe::DetectedTiming;
use bridge_core::repl::status::write_timing;
use bridge_core::telemetry::{EventId, TelemetryPayload, TelemetryRecord, TelemetryRecorder};
use heapless::String;

use crate::hw::FirmwareInstant;

/// Longest rendered telemetry line.
const LINE_CAPACITY: usize = 128;

type LogLine = String<LINE_CAPACITY>;

/// Cursor over a [`TelemetryRecorder`] that logs each record once.
#[derive(Debug, Default)]
pub struct TelemetryDrain {
    next: EventId,
}

impl TelemetryDrain {
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Logs records added since the previous call and returns how many.
    ///
    /// Records that fell out of the ring before being drained are skipped.
    pub fn drain(&mut self, recorder: &TelemetryRecorder<FirmwareInstant>) -> usize {
        let mut logged = 0;
        for record in recorder.since(self.next) {
            emit_log(record.timestamp.as_micros(), &render_record(record));
            logged += 1;
        }
        self.next = recorder.next_id();
        logged
    }
}

/// Logs a format event picked up from the broadcast channel.
pub fn log_format_event(event: FormatEvent, timing: Option<DetectedTiming>) {
    let mut line = LogLine::new();
    let _ = write!(line, "{event}");
    if let Some(timing) = timing {
        let _ = line.push(' ');
        let _ = write_timing(&mut line, Some(&timing));
    }
    emit_event(&line);
}

fn render_record(record: &TelemetryRecord<FirmwareInstant>) -> LogLine {
    let mut line = LogLine::new();
    // A truncated line still carries the event name.
    let _ = write_record(&mut line, record);
    line
}

fn write_record(
    out: &mut impl fmt::Write,
    record: &TelemetryRecord<FirmwareInstant>,
) -> fmt::Result {
    write!(out, "#{} {}", record.id, record.event)?;
    match &record.details {
        TelemetryPayload::None => Ok(()),
        TelemetryPayload::Equalizer(stats) => write!(out, " {stats}"),
        TelemetryPayload::Timing(timing) => {
            out.write_char(' ')?;
            write_timing(out, Some(timing))
        }
        TelemetryPayload::Dwell(dwell) => write!(out, " after={}ms", dwell.as_millis()),
    }
}

#[cfg(target_os = "none")]
fn emit_log(timestamp_us: u64, line: &str) {
    defmt::info!("telemetry t={}us {}", timestamp_us, line);
}

#[cfg(not(target_os = "none"))]
fn emit_log(timestamp_us: u64, line: &str) {
    println!("telemetry t={timestamp_us}us {line}");
}

#[cfg(target_os = "none")]
fn emit_event(line: &str) {
    defmt::info!("format: {}", line);
}

#[cfg(not(target_os = "none"))]
fn emit_event(line: &str) {
    println!("format: {line}");
}
