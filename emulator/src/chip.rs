//! Register-level model of the bridge chip.
//!
//! Only the registers the bridge core touches are modelled. Status bits are
//! derived from the simulated source and cable each time they are read, the
//! interrupt registers are write-one-to-clear, and enabling the CSI
//! transmitters starts the data lanes unless a lane failure was scripted.

use std::collections::BTreeMap;

use bridge_core::regs;
use bridge_core::transport::RegisterTransport;

/// Video mode the simulated source transmits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SourceMode {
    pub name: &'static str,
    pub width: u16,
    pub height: u16,
    pub frame_width: u16,
    pub frame_height: u16,
    /// Frame interval in tenths of a millisecond.
    pub frame_interval: u16,
    pub interlaced: bool,
}

pub const SOURCE_MODES: &[SourceMode] = &[
    SourceMode {
        name: "1080p60",
        width: 1920,
        height: 1080,
        frame_width: 2200,
        frame_height: 1125,
        frame_interval: 167,
        interlaced: false,
    },
    SourceMode {
        name: "720p60",
        width: 1280,
        height: 720,
        frame_width: 1650,
        frame_height: 750,
        frame_interval: 167,
        interlaced: false,
    },
    SourceMode {
        name: "2160p30",
        width: 3840,
        height: 2160,
        frame_width: 4400,
        frame_height: 2250,
        frame_interval: 333,
        interlaced: false,
    },
    SourceMode {
        name: "1080i60",
        width: 1920,
        height: 540,
        frame_width: 2200,
        frame_height: 562,
        frame_interval: 167,
        interlaced: true,
    },
];

/// Looks a mode up by name, ignoring case.
pub fn find_mode(name: &str) -> Option<SourceMode> {
    SOURCE_MODES
        .iter()
        .find(|mode| mode.name.eq_ignore_ascii_case(name))
        .copied()
}

/// Which equalizer bypass settings let the receiver lock on this cable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CableProfile {
    /// Indexed by the bypass bit: `[bypass off, bypass on]`.
    pub locks: [bool; 2],
}

impl CableProfile {
    pub const BOTH: Self = Self {
        locks: [true, true],
    };

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        let locks = match tag.to_ascii_lowercase().as_str() {
            "both" => [true, true],
            "true" | "bypass" | "1" => [false, true],
            "false" | "eq" | "0" => [true, false],
            "none" | "dead" => [false, false],
            _ => return Err(format!("Unknown cable profile `{tag}` (expected false|true|both|none)")),
        };
        Ok(Self { locks })
    }

    pub fn label(self) -> &'static str {
        match self.locks {
            [true, true] => "both",
            [false, true] => "true",
            [true, false] => "false",
            [false, false] => "none",
        }
    }
}

/// Simulated TC358840 behind a [`RegisterTransport`].
#[derive(Debug)]
pub struct SimulatedChip {
    registers: BTreeMap<u16, u8>,
    plugged: bool,
    cable: CableProfile,
    mode: SourceMode,
    lane_failures: u32,
    lanes_busy: bool,
    phy_resets: u32,
}

impl SimulatedChip {
    pub fn new(cable: CableProfile) -> Self {
        let mut chip = Self {
            registers: BTreeMap::new(),
            plugged: false,
            cable,
            mode: SOURCE_MODES[0],
            lane_failures: 0,
            lanes_busy: false,
            phy_resets: 0,
        };
        // Bypass on and everything masked out of reset.
        chip.registers.insert(regs::EQ_BYPS, regs::MASK_EQ_BYPS);
        chip.registers.insert(regs::SYS_INTM, 0xFF);
        chip.program_mode();
        chip
    }

    pub fn plugged(&self) -> bool {
        self.plugged
    }

    pub fn cable(&self) -> CableProfile {
        self.cable
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn phy_resets(&self) -> u32 {
        self.phy_resets
    }

    pub fn lanes_busy(&self) -> bool {
        self.lanes_busy
    }

    pub fn pending_lane_failures(&self) -> u32 {
        self.lane_failures
    }

    pub fn eq_bypass(&self) -> bool {
        self.load(regs::EQ_BYPS) & regs::MASK_EQ_BYPS != 0
    }

    /// True when the receiver would be locked with the current equalizer.
    pub fn locked(&self) -> bool {
        self.plugged && self.cable.locks[usize::from(self.eq_bypass())]
    }

    /// Changes the 5V state and latches the detect interrupt.
    ///
    /// Returns true when the interrupt line is raised.
    pub fn set_plugged(&mut self, plugged: bool) -> bool {
        if self.plugged == plugged {
            return false;
        }
        self.plugged = plugged;
        self.raise(regs::SYS_INT, regs::MASK_DDC)
    }

    pub fn set_cable(&mut self, cable: CableProfile) {
        self.cable = cable;
    }

    /// Switches the source to `mode` and latches an active-area change.
    pub fn set_mode(&mut self, mode: SourceMode) -> bool {
        self.mode = mode;
        self.program_mode();
        self.raise(regs::CLK_INT, regs::MASK_IN_DE_CHG)
    }

    /// The next `count` transmitter enables leave the data lanes idle.
    pub fn fail_lanes(&mut self, count: u32) {
        self.lane_failures = count;
    }

    fn load(&self, addr: u16) -> u8 {
        self.registers.get(&addr).copied().unwrap_or(0)
    }

    fn store(&mut self, addr: u16, value: u8) {
        self.registers.insert(addr, value);
    }

    fn store16(&mut self, addr: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.store(addr, lo);
        self.store(addr + 1, hi);
    }

    fn program_mode(&mut self) {
        let mode = self.mode;
        self.store16(regs::DE_HSIZE, mode.width);
        self.store16(regs::DE_VSIZE, mode.height);
        self.store16(regs::IN_HSIZE, mode.frame_width);
        self.store16(regs::IN_VSIZE, mode.frame_height * 2);
        self.store16(regs::FV_CNT, mode.frame_interval);
        self.store(regs::CLK_STATUS, regs::MASK_S_V_HPOL | regs::MASK_S_V_VPOL);
        let interlace = if mode.interlaced {
            regs::MASK_S_V_INTERLACE
        } else {
            0
        };
        self.store(regs::VI_STATUS1, interlace);
    }

    /// Latches `mask` in an interrupt register and reports whether the
    /// interrupt reaches the line.
    fn raise(&mut self, addr: u16, mask: u8) -> bool {
        let latched = self.load(addr) | mask;
        self.store(addr, latched);

        let unmasked = addr != regs::SYS_INT || self.load(regs::SYS_INTM) & mask == 0;
        if unmasked {
            let pending = u16::from_le_bytes([self.load(regs::INTSTATUS), self.load(regs::INTSTATUS + 1)])
                | regs::MASK_HDMI_INT;
            self.store16(regs::INTSTATUS, pending);
        }
        unmasked
    }

    fn system_status(&self) -> u8 {
        let mut status = 0;
        if self.plugged {
            status |= regs::MASK_S_DDC5V;
        }
        if self.locked() {
            status |= regs::MASK_S_TMDS | regs::MASK_S_PHY_PLL | regs::MASK_S_SYNC;
        }
        status
    }

    fn hdmi_int1(&self) -> u8 {
        let mut summary = 0;
        if self.load(regs::SYS_INT) != 0 {
            summary |= regs::MASK_SYS;
        }
        if self.load(regs::CLK_INT) != 0 {
            summary |= regs::MASK_CLK;
        }
        if self.load(regs::MISC_INT) != 0 {
            summary |= regs::MASK_MISC;
        }
        summary
    }

    fn confctl_written(&mut self, previous: u16, value: u16) {
        let enables = regs::MASK_VTX0EN | regs::MASK_VTX1EN;
        let was_enabled = previous & enables != 0;
        let enabled = value & enables != 0;
        if !enabled {
            self.lanes_busy = false;
        } else if !was_enabled {
            if self.lane_failures > 0 {
                self.lane_failures -= 1;
                self.lanes_busy = false;
            } else {
                self.lanes_busy = true;
            }
        }
    }

    fn is_internal_stat(addr: u16) -> bool {
        addr == regs::CSITX_INTERNAL_STAT || addr == regs::csitx1(regs::CSITX_INTERNAL_STAT)
    }
}

impl RegisterTransport for SimulatedChip {
    fn read_u8(&mut self, addr: u16) -> u8 {
        match addr {
            regs::SYS_STATUS => self.system_status(),
            regs::HDMI_INT1 => self.hdmi_int1(),
            _ => self.load(addr),
        }
    }

    fn read_u16(&mut self, addr: u16) -> u16 {
        u16::from_le_bytes([self.read_u8(addr), self.read_u8(addr + 1)])
    }

    fn read_u32(&mut self, addr: u16) -> u32 {
        if Self::is_internal_stat(addr) {
            return if self.lanes_busy {
                regs::MASK_PPI_DL_BUSY
            } else {
                0
            };
        }
        u32::from(self.read_u16(addr)) | (u32::from(self.read_u16(addr + 2)) << 16)
    }

    fn write_u8(&mut self, addr: u16, value: u8) {
        match addr {
            regs::SYS_INT | regs::CLK_INT | regs::MISC_INT => {
                let remaining = self.load(addr) & !value;
                self.store(addr, remaining);
            }
            regs::PHY_RST => {
                if value & regs::MASK_RESET_CTRL == 0 {
                    self.phy_resets += 1;
                }
                self.store(addr, value);
            }
            _ => self.store(addr, value),
        }
    }

    fn write_u16(&mut self, addr: u16, value: u16) {
        match addr {
            regs::INTSTATUS => {
                let pending = u16::from_le_bytes([self.load(addr), self.load(addr + 1)]);
                self.store16(addr, pending & !value);
            }
            regs::CONFCTL0 => {
                let previous = u16::from_le_bytes([self.load(addr), self.load(addr + 1)]);
                self.store16(addr, value);
                self.confctl_written(previous, value);
            }
            _ => self.store16(addr, value),
        }
    }

    fn write_u32(&mut self, addr: u16, value: u32) {
        for (offset, byte) in (0u16..).zip(value.to_le_bytes()) {
            self.store(addr + offset, byte);
        }
    }
}
