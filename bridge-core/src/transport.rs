//! Collaborator interfaces for register access and short busy-waits.
//!
//! Bus framing lives outside this crate. Implementations are expected to be
//! synchronous; a read that fails on the bus should report zero so the state
//! machine sees "no signal" rather than a fabricated lock.

/// Synchronous access to the bridge's 16-bit register address space.
pub trait RegisterTransport {
    fn read_u8(&mut self, addr: u16) -> u8;
    fn read_u16(&mut self, addr: u16) -> u16;
    fn read_u32(&mut self, addr: u16) -> u32;

    fn write_u8(&mut self, addr: u16, value: u8);
    fn write_u16(&mut self, addr: u16, value: u16);
    fn write_u32(&mut self, addr: u16, value: u32);

    /// Read-modify-write keeping the bits in `keep` and setting `set`.
    fn update_u8(&mut self, addr: u16, keep: u8, set: u8) {
        let value = self.read_u8(addr);
        self.write_u8(addr, (value & keep) | set);
    }

    /// Read-modify-write keeping the bits in `keep` and setting `set`.
    fn update_u16(&mut self, addr: u16, keep: u16, set: u16) {
        let value = self.read_u16(addr);
        self.write_u16(addr, (value & keep) | set);
    }

    /// Read-modify-write keeping the bits in `keep` and setting `set`.
    fn update_u32(&mut self, addr: u16, keep: u32, set: u32) {
        let value = self.read_u32(addr);
        self.write_u32(addr, (value & keep) | set);
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for &mut T {
    fn read_u8(&mut self, addr: u16) -> u8 {
        (**self).read_u8(addr)
    }

    fn read_u16(&mut self, addr: u16) -> u16 {
        (**self).read_u16(addr)
    }

    fn read_u32(&mut self, addr: u16) -> u32 {
        (**self).read_u32(addr)
    }

    fn write_u8(&mut self, addr: u16, value: u8) {
        (**self).write_u8(addr, value);
    }

    fn write_u16(&mut self, addr: u16, value: u16) {
        (**self).write_u16(addr, value);
    }

    fn write_u32(&mut self, addr: u16, value: u32) {
        (**self).write_u32(addr, value);
    }
}

/// Bounded microsecond-scale pause used between hardware flag polls.
pub trait BlockingDelay {
    fn delay_us(&mut self, micros: u32);
}

/// Delay that returns immediately. Useful for simulations and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDelay;

impl BlockingDelay for NoDelay {
    fn delay_us(&mut self, _micros: u32) {}
}
