//! Shared status rendering for the REPL.
//!
//! [`StatusReport`] gathers everything the `status` command shows in one
//! lock acquisition; [`StatusFormatter`] keeps the textual rendering
//! consistent across front-ends.

use core::fmt;

use crate::lanes::MAX_RETRIES;
use crate::probe::DetectedTiming;
use crate::signal::{BridgeStats, SignalStatusSnapshot};
use crate::telemetry::EqTelemetry;

/// Snapshot of everything surfaced by `status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub signal: SignalStatusSnapshot,
    pub timing: Option<DetectedTiming>,
    pub stats: BridgeStats,
}

/// Helper that renders a [`StatusReport`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    report: &'a StatusReport,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(report: &'a StatusReport) -> Self {
        Self { report }
    }

    /// Writes the signal line (e.g. `signal power=present sync=locked stable=yes state=stable`).
    pub fn write_signal_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let signal = &self.report.signal;
        write!(
            writer,
            "signal power={} sync={} stable={} state={}",
            if signal.present { "present" } else { "absent" },
            if signal.synced { "locked" } else { "unlocked" },
            yes_no(signal.stable),
            self.report.stats.status,
        )
    }

    /// Writes the equalizer line (e.g. `equalizer bypass=1 mode=auto found=0/3 ...`).
    pub fn write_equalizer_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let stats = &self.report.stats;
        write!(
            writer,
            "equalizer bypass={} mode=",
            u8::from(stats.current_eq_config)
        )?;
        match stats.forced_eq_mode {
            None => writer.write_str("auto")?,
            Some(mode) => write!(writer, "forced-{}", u8::from(mode))?,
        }
        write!(writer, " {}", EqTelemetry::new(stats.eq_stats))
    }

    /// Writes the stream line (e.g. `stream enabled=yes requested=yes pattern=off attempts=1/0/0/0/0 ok=1/0/0/0/0`).
    pub fn write_stream_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let stats = &self.report.stats;
        write!(
            writer,
            "stream enabled={} requested={} pattern={} attempts=",
            yes_no(stats.stream_enabled),
            yes_no(stats.stream_requested),
            if stats.test_pattern { "on" } else { "off" },
        )?;
        write_histogram(writer, &stats.retry_stats.attempts)?;
        writer.write_str(" ok=")?;
        write_histogram(writer, &stats.retry_stats.successes)
    }

    /// Writes the timing line (`timing none` until the signal is stable).
    pub fn write_timing_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write_timing(writer, self.report.timing.as_ref())
    }
}

/// Writes `timing <mode>` or `timing none`.
pub fn write_timing<W: fmt::Write>(writer: &mut W, timing: Option<&DetectedTiming>) -> fmt::Result {
    match timing {
        Some(timing) => write!(writer, "timing {timing}"),
        None => writer.write_str("timing none"),
    }
}

fn write_histogram<W: fmt::Write>(writer: &mut W, counts: &[u32; MAX_RETRIES]) -> fmt::Result {
    for (index, count) in counts.iter().enumerate() {
        if index > 0 {
            writer.write_char('/')?;
        }
        write!(writer, "{count}")?;
    }
    Ok(())
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
