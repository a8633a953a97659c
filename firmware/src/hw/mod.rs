#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Board glue between the bridge core and the MCU peripherals.
//!
//! The TC358840 speaks 16-bit big-endian register addresses followed by
//! little-endian data on I2C. Frame assembly lives here so it can be checked
//! on the host; the embassy-backed transport sits in [`i2c`].

use core::time::Duration;

use bridge_core::telemetry::TelemetryInstant;
use embassy_time::Instant;
use heapless::Vec;

#[cfg(target_os = "none")]
pub mod i2c;

/// 7-bit I2C address of the bridge with ADDR strapped low.
pub const BRIDGE_I2C_ADDRESS: u8 = 0x0F;

/// Largest write frame: two address bytes plus a 32-bit value.
pub const MAX_WRITE_FRAME: usize = 6;

/// Monotonic timestamp wrapper so telemetry can be recorded against embassy time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        let micros = self.0.as_micros().saturating_sub(earlier.0.as_micros());
        Duration::from_micros(micros)
    }
}

/// Register address as it goes on the wire.
pub const fn address_bytes(addr: u16) -> [u8; 2] {
    addr.to_be_bytes()
}

/// Builds a register write frame: address then `value` least significant byte first.
pub fn write_frame(addr: u16, value: &[u8]) -> Vec<u8, MAX_WRITE_FRAME> {
    let mut frame = Vec::new();
    // The value never exceeds four bytes, so the frame always fits.
    let _ = frame.extend_from_slice(&address_bytes(addr));
    let _ = frame.extend_from_slice(value);
    frame
}
