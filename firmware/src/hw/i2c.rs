//! Blocking I2C register transport and busy-wait delay.

use bridge_core::transport::{BlockingDelay, RegisterTransport};
use embassy_stm32::i2c::{Error, I2c};
use embassy_stm32::mode::Blocking;
use embassy_time::{Duration, block_for};

use super::{BRIDGE_I2C_ADDRESS, address_bytes, write_frame};

/// Register access over the bridge's I2C link.
///
/// Bus errors are logged and reads return zero, which the state machine sees
/// as "no signal".
pub struct I2cTransport {
    bus: I2c<'static, Blocking>,
    address: u8,
}

impl I2cTransport {
    pub fn new(bus: I2c<'static, Blocking>) -> Self {
        Self {
            bus,
            address: BRIDGE_I2C_ADDRESS,
        }
    }

    fn read<const N: usize>(&mut self, addr: u16) -> [u8; N] {
        let mut value = [0u8; N];
        if let Err(error) = self
            .bus
            .blocking_write_read(self.address, &address_bytes(addr), &mut value)
        {
            log_bus_error("read", addr, error);
            return [0u8; N];
        }
        value
    }

    fn write(&mut self, addr: u16, value: &[u8]) {
        let frame = write_frame(addr, value);
        if let Err(error) = self.bus.blocking_write(self.address, &frame) {
            log_bus_error("write", addr, error);
        }
    }
}

impl RegisterTransport for I2cTransport {
    fn read_u8(&mut self, addr: u16) -> u8 {
        self.read::<1>(addr)[0]
    }

    fn read_u16(&mut self, addr: u16) -> u16 {
        u16::from_le_bytes(self.read(addr))
    }

    fn read_u32(&mut self, addr: u16) -> u32 {
        u32::from_le_bytes(self.read(addr))
    }

    fn write_u8(&mut self, addr: u16, value: u8) {
        self.write(addr, &[value]);
    }

    fn write_u16(&mut self, addr: u16, value: u16) {
        self.write(addr, &value.to_le_bytes());
    }

    fn write_u32(&mut self, addr: u16, value: u32) {
        self.write(addr, &value.to_le_bytes());
    }
}

/// Spins on the embassy time driver.
pub struct EmbassyDelay;

impl BlockingDelay for EmbassyDelay {
    fn delay_us(&mut self, micros: u32) {
        block_for(Duration::from_micros(u64::from(micros)));
    }
}

fn log_bus_error(op: &'static str, addr: u16, error: Error) {
    defmt::warn!("i2c: {} 0x{:04x} failed: {}", op, addr, error);
}
