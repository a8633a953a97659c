#![no_std]

// Shared logic for the HDMI to MIPI-CSI bridge controller.
//
// Signal acquisition, equalizer learning and lane bring-up live here so the
// MCU firmware and the host emulator drive exactly the same state machine.
// Nothing in this crate touches the standard library.

pub mod bridge;
pub mod config;
pub mod equalizer;
pub mod events;
pub mod lanes;
pub mod probe;
pub mod regs;
pub mod repl;
pub mod scheduler;
pub mod signal;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
