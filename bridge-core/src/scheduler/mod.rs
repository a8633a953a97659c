//! Periodic poll driver and the lock shared with the interrupt path.
//!
//! [`PollScheduler`] runs the tick callback on every period of a
//! [`PollTimer`] until cancelled. [`SharedBridge`] puts the controller behind
//! one blocking mutex so the poll tick, the interrupt handler and control
//! requests are serialized.

use core::cell::RefCell;
use core::future::Future;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::bridge::{BridgeController, BridgeHardware};
use crate::config::BridgeConfig;
use crate::events::EventSink;
use crate::lanes::LaneError;
use crate::probe::{DetectedTiming, InterruptStatus};
use crate::signal::{BridgeStats, SignalStatusSnapshot};
use crate::telemetry::TelemetryInstant;

/// Source of poll ticks.
pub trait PollTimer {
    type Instant;

    /// Resolves at the next tick and yields its timestamp.
    fn wait_next(&mut self) -> impl Future<Output = Self::Instant>;
}

/// Cancellable periodic driver.
pub struct PollScheduler<M: RawMutex> {
    stop_requested: AtomicBool,
    running: AtomicBool,
    ticks: AtomicU32,
    stopped: Signal<M, ()>,
}

impl<M: RawMutex> PollScheduler<M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
            ticks: AtomicU32::new(0),
            stopped: Signal::new(),
        }
    }

    /// Calls `tick` once per timer period until [`cancel`](Self::cancel).
    pub async fn run<T: PollTimer>(&self, timer: &mut T, mut tick: impl FnMut(T::Instant)) {
        self.stopped.reset();
        self.running.store(true, Ordering::SeqCst);

        while !self.is_cancelled() {
            let now = timer.wait_next().await;
            if self.is_cancelled() {
                break;
            }
            tick(now);
            self.ticks.fetch_add(1, Ordering::Relaxed);
        }

        self.running.store(false, Ordering::SeqCst);
        self.stopped.signal(());
    }

    /// Stops the schedule. Once this returns no further tick runs.
    pub async fn cancel(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if self.running.load(Ordering::SeqCst) {
            self.stopped.wait().await;
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Ticks delivered so far.
    #[must_use]
    pub fn tick_count(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl<M: RawMutex> Default for PollScheduler<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridge controller guarded by a single lock.
pub struct SharedBridge<M, H, E, I>
where
    M: RawMutex,
    I: TelemetryInstant,
{
    inner: Mutex<M, RefCell<BridgeController<H, E, I>>>,
}

impl<M, H, E, I> SharedBridge<M, H, E, I>
where
    M: RawMutex,
    H: BridgeHardware,
    E: EventSink,
    I: TelemetryInstant,
{
    pub fn new(hw: H, events: E, config: BridgeConfig) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(BridgeController::new(hw, events, config))),
        }
    }

    /// Runs `f` with exclusive access to the controller.
    pub fn lock<R>(&self, f: impl FnOnce(&mut BridgeController<H, E, I>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn poll(&self, now: I) -> SignalStatusSnapshot {
        self.lock(|bridge| bridge.poll(now))
    }

    /// Entry point for the receiver's interrupt line.
    pub fn on_interrupt(&self, now: I) -> InterruptStatus {
        self.lock(|bridge| bridge.handle_interrupt(now))
    }

    pub fn signal_status(&self) -> SignalStatusSnapshot {
        self.lock(|bridge| bridge.signal_status())
    }

    pub fn detected_timing(&self) -> Option<DetectedTiming> {
        self.lock(|bridge| bridge.detected_timing())
    }

    pub fn set_eq_override(&self, mode: Option<bool>, now: I) {
        self.lock(|bridge| bridge.set_eq_override(mode, now));
    }

    /// # Errors
    ///
    /// See [`BridgeController::request_stream`].
    pub fn request_stream(&self, enable: bool, now: I) -> Result<(), LaneError> {
        self.lock(|bridge| bridge.request_stream(enable, now))
    }

    pub fn set_test_pattern(&self, enabled: bool, now: I) {
        self.lock(|bridge| bridge.set_test_pattern(enabled, now));
    }

    pub fn stats(&self) -> BridgeStats {
        self.lock(|bridge| bridge.stats())
    }
}
