//! Register-backed probe, PHY and transmitter control for the TC358840.

use crate::lanes::{ClockMode, CsiTransmitter};
use crate::regs;
use crate::transport::{BlockingDelay, RegisterTransport};

use super::{
    DetectedTiming, FormatChangeFlags, HardwareProbe, InterruptStatus, ReceiverPhy, SignalSample,
};

/// CSI-2 transmitters carrying the video.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CsiPorts {
    Tx0,
    Tx1,
    #[default]
    Both,
}

impl CsiPorts {
    const fn enable_mask(self) -> u16 {
        match self {
            CsiPorts::Tx0 => regs::MASK_VTX0EN,
            CsiPorts::Tx1 => regs::MASK_VTX1EN,
            CsiPorts::Both => regs::MASK_VTX0EN | regs::MASK_VTX1EN,
        }
    }

    const fn uses_tx0(self) -> bool {
        !matches!(self, CsiPorts::Tx1)
    }

    const fn uses_tx1(self) -> bool {
        !matches!(self, CsiPorts::Tx0)
    }
}

/// Board-level options for the register adapter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Tc358840Config {
    pub csi_ports: CsiPorts,
}

/// Minimum active area accepted as a real measurement.
const MIN_WIDTH: u32 = 640;
const MIN_HEIGHT: u32 = 480;

/// Drives the bridge through a [`RegisterTransport`].
pub struct Tc358840<T, D> {
    regs: T,
    delay: D,
    config: Tc358840Config,
}

impl<T, D> Tc358840<T, D>
where
    T: RegisterTransport,
    D: BlockingDelay,
{
    pub const fn new(regs: T, delay: D, config: Tc358840Config) -> Self {
        Self {
            regs,
            delay,
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.regs
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.regs
    }

    /// Clears stale causes and leaves only the 5V detect able to raise the
    /// interrupt line.
    pub fn unmask_power_interrupt(&mut self) {
        self.acknowledge_interrupts();
        self.regs.write_u8(regs::SYS_INTM, !regs::MASK_DDC);
        self.regs.write_u16(regs::INTSTATUS, regs::MASK_HDMI_INT);
    }

    /// Reads and clears the receiver interrupt causes.
    fn acknowledge_interrupts(&mut self) -> (u8, u8, u8) {
        let sys_int = self.regs.read_u8(regs::SYS_INT);
        let clk_int = self.regs.read_u8(regs::CLK_INT);
        let misc_int = self.regs.read_u8(regs::MISC_INT);

        self.regs.write_u8(regs::MISC_INT, 0xFF);
        self.regs.write_u8(regs::CLK_INT, 0xFF);
        self.regs.write_u8(regs::SYS_INT, 0xFF);

        (sys_int, clk_int, misc_int)
    }

    fn for_each_tx(&mut self, mut f: impl FnMut(&mut T, u16)) {
        if self.config.csi_ports.uses_tx0() {
            f(&mut self.regs, 0);
        }
        if self.config.csi_ports.uses_tx1() {
            f(&mut self.regs, regs::CSITX1_OFFSET);
        }
    }
}

impl<T, D> HardwareProbe for Tc358840<T, D>
where
    T: RegisterTransport,
    D: BlockingDelay,
{
    fn sample(&mut self) -> SignalSample {
        let status = self.regs.read_u8(regs::SYS_STATUS);
        let power_present = status & regs::MASK_S_DDC5V != 0;
        let clock_locked = status & regs::MASK_S_TMDS != 0;
        let sync_locked = status & regs::MASK_S_SYNC != 0;

        // HDCP can flicker on while a source connects; with manual
        // authentication it never completes, so treat it as inactive.
        let mut hdcp_active =
            power_present && clock_locked && sync_locked && status & regs::MASK_S_HDCP != 0;
        if hdcp_active {
            hdcp_active =
                self.regs.read_u8(regs::HDCP_MODE) & regs::MASK_MANUAL_AUTHENTICATION == 0;
        }

        let (sys_int, clk_int, misc_int) = self.acknowledge_interrupts();
        let mut causes = FormatChangeFlags::NONE;
        if !sync_locked {
            causes.insert(FormatChangeFlags::SYNC_LOST);
        }
        if sys_int & (regs::MASK_DVI | regs::MASK_HDMI) != 0 {
            causes.insert(FormatChangeFlags::MODE_CHANGED);
        }
        if clk_int & regs::MASK_IN_DE_CHG != 0 {
            causes.insert(FormatChangeFlags::INPUT_TIMING_CHANGED);
        }
        if misc_int & regs::MASK_SYNC_CHG != 0 {
            causes.insert(FormatChangeFlags::SYNC_STATE_CHANGED);
        }

        SignalSample {
            power_present,
            clock_locked,
            sync_locked,
            hdcp_active,
            interrupt_causes: causes,
        }
    }

    fn detected_timing(&mut self) -> Option<DetectedTiming> {
        let status = self.regs.read_u8(regs::SYS_STATUS);
        if status & regs::MASK_S_TMDS == 0 || status & regs::MASK_S_SYNC == 0 {
            return None;
        }

        let interlaced = self.regs.read_u8(regs::VI_STATUS1) & regs::MASK_S_V_INTERLACE != 0;
        let width = u32::from(self.regs.read_u16(regs::DE_HSIZE) & 0x1FFF);
        let mut height = u32::from(self.regs.read_u16(regs::DE_VSIZE) & 0x1FFF);
        let frame_width = u32::from(self.regs.read_u16(regs::IN_HSIZE) & 0x1FFF);
        let frame_height = u32::from(self.regs.read_u16(regs::IN_VSIZE) & 0x3FFF) / 2;
        let polarity = self.regs.read_u8(regs::CLK_STATUS);
        // Frame interval in tenths of a millisecond.
        let frame_interval = u64::from(self.regs.read_u16(regs::FV_CNT) & 0x03FF);

        if frame_width <= width || frame_height <= height || frame_width & 1 != 0 {
            return None;
        }

        let centihertz = if frame_interval > 0 {
            1_000_000 / frame_interval
        } else {
            0
        };
        let pixels = u64::from(frame_width) * u64::from(frame_height) * centihertz / 100;
        let mut pixel_clock = (pixels + 500) / 1_000 * 1_000;

        let h_blank = frame_width - width;
        let v_blank = frame_height - height;
        if interlaced {
            height *= 2;
            pixel_clock >>= 1;
        }

        if width < MIN_WIDTH || height < MIN_HEIGHT || width & 1 != 0 || height & 1 != 0 {
            return None;
        }

        let mut polarity_bits = 0;
        if polarity & regs::MASK_S_V_HPOL != 0 {
            polarity_bits |= DetectedTiming::HSYNC_POSITIVE;
        }
        if polarity & regs::MASK_S_V_VPOL != 0 {
            polarity_bits |= DetectedTiming::VSYNC_POSITIVE;
        }

        Some(DetectedTiming {
            width,
            height,
            h_sync: 0,
            v_sync: 0,
            h_blank,
            v_blank,
            pixel_clock,
            interlaced,
            polarity_bits,
        })
    }

    fn power_present(&mut self) -> bool {
        self.regs.read_u8(regs::SYS_STATUS) & regs::MASK_S_DDC5V != 0
    }

    fn take_interrupts(&mut self) -> InterruptStatus {
        let pending = self.regs.read_u16(regs::INTSTATUS);
        if pending & regs::MASK_HDMI_INT == 0 {
            return InterruptStatus::default();
        }

        let hdmi_int1 = self.regs.read_u8(regs::HDMI_INT1);
        let mut status = InterruptStatus {
            power_detect: false,
            deferred: hdmi_int1 & !regs::MASK_SYS != 0,
        };

        if hdmi_int1 & regs::MASK_SYS != 0 {
            let sys_int = self.regs.read_u8(regs::SYS_INT);
            if sys_int & regs::MASK_DDC != 0 {
                self.regs.write_u8(regs::SYS_INT, regs::MASK_DDC);
                status.power_detect = true;
            }
            if sys_int & !regs::MASK_DDC != 0 {
                status.deferred = true;
            }
        }

        self.regs.write_u16(regs::INTSTATUS, regs::MASK_HDMI_INT);
        status
    }
}

impl<T, D> ReceiverPhy for Tc358840<T, D>
where
    T: RegisterTransport,
    D: BlockingDelay,
{
    fn reset_phy(&mut self) {
        self.regs
            .update_u8(regs::PHY_RST, !regs::MASK_RESET_CTRL, 0);
        self.regs
            .update_u8(regs::PHY_RST, !regs::MASK_RESET_CTRL, regs::MASK_RESET_CTRL);
    }

    fn set_eq_bypass(&mut self, bypass: bool) {
        let set = if bypass { regs::MASK_EQ_BYPS } else { 0 };
        self.regs.update_u8(regs::EQ_BYPS, !regs::MASK_EQ_BYPS, set);
    }
}

impl<T, D> CsiTransmitter for Tc358840<T, D>
where
    T: RegisterTransport,
    D: BlockingDelay,
{
    fn configure_clock_lane(&mut self, mode: ClockMode) {
        self.for_each_tx(|bus, offset| {
            let funcmode = regs::FUNCMODE + offset;
            match mode {
                ClockMode::NonContinuous => {
                    bus.update_u32(funcmode, !regs::MASK_CONTCLKMODE, regs::MASK_FORCESTOP);
                }
                ClockMode::Continuous => {
                    // Drop to LP11 first so the receiver sees the LP11 to HS edge.
                    bus.update_u32(funcmode, !regs::MASK_CONTCLKMODE, 0);
                    bus.update_u32(funcmode, 0, regs::MASK_CONTCLKMODE);
                }
            }
        });
    }

    fn set_muted(&mut self, muted: bool) {
        let value = if muted {
            regs::MASK_AUTO_MUTE | regs::MASK_VI_MUTE
        } else {
            regs::MASK_AUTO_MUTE
        };
        self.regs.write_u8(regs::VI_MUTE, value);
    }

    fn set_test_pattern(&mut self, enabled: bool) {
        if enabled {
            self.regs.update_u16(
                regs::CB_CTL,
                !(regs::MASK_CB_EN | regs::MASK_CB_CSEL),
                regs::MASK_CB_CSEL_CSI_TX1 | regs::MASK_CB_EN,
            );
        } else {
            self.regs.update_u16(regs::CB_CTL, !regs::MASK_CB_EN, 0);
        }
    }

    fn configure_disabled_topology(&mut self) {
        self.for_each_tx(|bus, offset| {
            bus.update_u32(regs::FUNCMODE + offset, !0, regs::MASK_FORCESTOP);
        });

        let bypass = if self.config.csi_ports == CsiPorts::Both {
            0
        } else {
            regs::MASK_SPBP
        };
        self.regs
            .update_u16(regs::SPLITTX0_CTRL, !regs::MASK_SPBP, bypass);
        self.regs
            .update_u16(regs::SPLITTX1_CTRL, !regs::MASK_SPBP, bypass);
    }

    fn set_transmit_enabled(&mut self, enabled: bool) {
        let base = regs::MASK_TX_MSEL | regs::MASK_AUTOINDEX;
        let set = if enabled {
            base | self.config.csi_ports.enable_mask() | regs::MASK_ABUFEN
        } else {
            base
        };
        self.regs.update_u16(
            regs::CONFCTL0,
            !(regs::MASK_VTX0EN | regs::MASK_VTX1EN | regs::MASK_ABUFEN),
            set,
        );
    }

    fn sync_locked(&mut self) -> bool {
        self.regs.read_u8(regs::SYS_STATUS) & regs::MASK_S_SYNC != 0
    }

    fn data_lanes_busy(&mut self) -> bool {
        let mut busy = true;
        self.for_each_tx(|bus, offset| {
            busy &= bus.read_u32(regs::CSITX_INTERNAL_STAT + offset) & regs::MASK_PPI_DL_BUSY != 0;
        });
        busy
    }

    fn lane_poll_delay(&mut self) {
        self.delay.delay_us(crate::lanes::LANE_POLL_INTERVAL_US);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NoDelay;
    use heapless::LinearMap;

    #[derive(Default)]
    struct RegisterFile {
        values: LinearMap<u16, u8, 64>,
    }

    impl RegisterFile {
        fn set(&mut self, addr: u16, value: u8) {
            self.values.insert(addr, value).expect("register file full");
        }

        fn set16(&mut self, addr: u16, value: u16) {
            let [lo, hi] = value.to_le_bytes();
            self.set(addr, lo);
            self.set(addr + 1, hi);
        }

        fn get(&self, addr: u16) -> u8 {
            self.values.get(&addr).copied().unwrap_or(0)
        }
    }

    impl RegisterTransport for RegisterFile {
        fn read_u8(&mut self, addr: u16) -> u8 {
            self.get(addr)
        }

        fn read_u16(&mut self, addr: u16) -> u16 {
            u16::from_le_bytes([self.get(addr), self.get(addr + 1)])
        }

        fn read_u32(&mut self, addr: u16) -> u32 {
            u32::from_le_bytes([
                self.get(addr),
                self.get(addr + 1),
                self.get(addr + 2),
                self.get(addr + 3),
            ])
        }

        fn write_u8(&mut self, addr: u16, value: u8) {
            // Interrupt registers are write-one-to-clear.
            if matches!(addr, regs::SYS_INT | regs::CLK_INT | regs::MISC_INT) {
                let current = self.get(addr);
                self.set(addr, current & !value);
            } else {
                self.set(addr, value);
            }
        }

        fn write_u16(&mut self, addr: u16, value: u16) {
            self.set16(addr, value);
        }

        fn write_u32(&mut self, addr: u16, value: u32) {
            for (index, byte) in (0u16..).zip(value.to_le_bytes()) {
                self.set(addr + index, byte);
            }
        }
    }

    fn chip() -> Tc358840<RegisterFile, NoDelay> {
        Tc358840::new(RegisterFile::default(), NoDelay, Tc358840Config::default())
    }

    fn program_1080p60(regs_file: &mut RegisterFile) {
        regs_file.set(
            regs::SYS_STATUS,
            regs::MASK_S_DDC5V | regs::MASK_S_TMDS | regs::MASK_S_SYNC,
        );
        regs_file.set16(regs::DE_HSIZE, 1920);
        regs_file.set16(regs::DE_VSIZE, 1080);
        regs_file.set16(regs::IN_HSIZE, 2200);
        regs_file.set16(regs::IN_VSIZE, 1125 * 2);
        regs_file.set16(regs::FV_CNT, 167);
        regs_file.set(regs::CLK_STATUS, regs::MASK_S_V_HPOL | regs::MASK_S_V_VPOL);
    }

    #[test]
    fn sample_folds_and_clears_interrupt_causes() {
        let mut chip = chip();
        let bus = chip.transport_mut();
        bus.set(regs::SYS_STATUS, regs::MASK_S_DDC5V | regs::MASK_S_TMDS);
        bus.set(regs::SYS_INT, regs::MASK_HDMI);
        bus.set(regs::CLK_INT, regs::MASK_IN_DE_CHG);

        let sample = chip.sample();
        assert!(sample.power_present);
        assert!(sample.clock_locked);
        assert!(!sample.sync_locked);
        assert!(!sample.has_signal());
        assert_eq!(
            sample.interrupt_causes,
            FormatChangeFlags::SYNC_LOST
                .union(FormatChangeFlags::MODE_CHANGED)
                .union(FormatChangeFlags::INPUT_TIMING_CHANGED)
        );
        assert_eq!(chip.transport().get(regs::SYS_INT), 0);
        assert_eq!(chip.transport().get(regs::CLK_INT), 0);
    }

    #[test]
    fn hdcp_glitch_under_manual_authentication_is_ignored() {
        let mut chip = chip();
        let bus = chip.transport_mut();
        bus.set(
            regs::SYS_STATUS,
            regs::MASK_S_DDC5V | regs::MASK_S_TMDS | regs::MASK_S_SYNC | regs::MASK_S_HDCP,
        );
        bus.set(regs::HDCP_MODE, regs::MASK_MANUAL_AUTHENTICATION);

        assert!(!chip.sample().hdcp_active);
    }

    #[test]
    fn reads_1080p_timing() {
        let mut chip = chip();
        program_1080p60(chip.transport_mut());

        let timing = chip.detected_timing().expect("valid timing");
        assert_eq!(timing.width, 1920);
        assert_eq!(timing.height, 1080);
        assert_eq!(timing.h_blank, 280);
        assert_eq!(timing.v_blank, 45);
        assert!(!timing.interlaced);
        assert_eq!(
            timing.polarity_bits,
            DetectedTiming::HSYNC_POSITIVE | DetectedTiming::VSYNC_POSITIVE
        );
        // 1e6 / 167 = 5988 centihertz, so the derived clock lands a little low.
        assert_eq!(timing.pixel_clock, 148_203_000);
    }

    #[test]
    fn rejects_implausible_measurements() {
        let mut chip = chip();
        program_1080p60(chip.transport_mut());
        chip.transport_mut().set16(regs::IN_HSIZE, 1920);
        assert!(chip.detected_timing().is_none());

        program_1080p60(chip.transport_mut());
        chip.transport_mut().set16(regs::DE_HSIZE, 320);
        assert!(chip.detected_timing().is_none());
    }

    #[test]
    fn eq_bypass_and_transmit_enable_touch_only_their_bits() {
        let mut chip = chip();
        chip.transport_mut().set(regs::EQ_BYPS, 0xF0);

        chip.set_eq_bypass(true);
        assert_eq!(chip.transport().get(regs::EQ_BYPS), 0xF1);
        chip.set_eq_bypass(false);
        assert_eq!(chip.transport().get(regs::EQ_BYPS), 0xF0);

        chip.set_transmit_enabled(true);
        let confctl = chip.transport_mut().read_u16(regs::CONFCTL0);
        assert_eq!(
            confctl & (regs::MASK_VTX0EN | regs::MASK_VTX1EN),
            regs::MASK_VTX0EN | regs::MASK_VTX1EN
        );
        chip.set_transmit_enabled(false);
        let confctl = chip.transport_mut().read_u16(regs::CONFCTL0);
        assert_eq!(confctl & (regs::MASK_VTX0EN | regs::MASK_VTX1EN), 0);
    }

    #[test]
    fn unmasking_leaves_only_power_detect() {
        let mut chip = chip();
        chip.transport_mut().set(regs::SYS_INT, regs::MASK_DDC | regs::MASK_HDMI);

        chip.unmask_power_interrupt();

        assert_eq!(chip.transport().get(regs::SYS_INTM), !regs::MASK_DDC);
        assert_eq!(chip.transport().get(regs::SYS_INT), 0);
    }

    #[test]
    fn power_detect_interrupt_is_acknowledged() {
        let mut chip = chip();
        let bus = chip.transport_mut();
        bus.set16(regs::INTSTATUS, regs::MASK_HDMI_INT);
        bus.set(regs::HDMI_INT1, regs::MASK_SYS);
        bus.set(regs::SYS_INT, regs::MASK_DDC | regs::MASK_HDMI);

        let status = chip.take_interrupts();
        assert!(status.power_detect);
        assert!(status.deferred);
        assert_eq!(chip.transport().get(regs::SYS_INT), regs::MASK_HDMI);
    }
}
