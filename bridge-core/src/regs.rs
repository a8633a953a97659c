//! Register table for the TC358840 HDMI receiver / dual CSI-2 transmitter.
//!
//! Only the registers the signal-acquisition and lane bring-up paths touch
//! are listed here.

// Global control.
pub const CONFCTL0: u16 = 0x0004;
pub const MASK_VTX0EN: u16 = 0x0001;
pub const MASK_VTX1EN: u16 = 0x0002;
pub const MASK_AUTOINDEX: u16 = 0x0004;
pub const MASK_ABUFEN: u16 = 0x0008;
pub const MASK_TX_MSEL: u16 = 0x0080;

pub const INTSTATUS: u16 = 0x0014;
pub const MASK_HDMI_INT: u16 = 0x0200;

// CSI-2 transmitter 0; transmitter 1 lives at `CSITX1_OFFSET` above it.
pub const CSITX1_OFFSET: u16 = 0x0200;
pub const CSITX_INTERNAL_STAT: u16 = 0x0144;
pub const MASK_PPI_DL_BUSY: u32 = 0x0000_0100;
pub const FUNCMODE: u16 = 0x0150;
pub const MASK_CONTCLKMODE: u32 = 0x0000_0020;
pub const MASK_FORCESTOP: u32 = 0x0000_0400;

// Splitter.
pub const SPLITTX0_CTRL: u16 = 0x5000;
pub const SPLITTX1_CTRL: u16 = 0x5080;
pub const MASK_SPBP: u16 = 0x0001;

// Colour bar generator.
pub const CB_CTL: u16 = 0x7000;
pub const MASK_CB_EN: u16 = 0x0001;
pub const MASK_CB_CSEL: u16 = 0x000C;
pub const MASK_CB_CSEL_CSI_TX1: u16 = 0x0008;

// HDMI receiver interrupts.
pub const HDMI_INT0: u16 = 0x8500;
pub const HDMI_INT1: u16 = 0x8501;
pub const MASK_SYS: u8 = 0x02;
pub const MASK_CLK: u8 = 0x04;
pub const MASK_MISC: u8 = 0x80;

pub const SYS_INT: u16 = 0x8502;
pub const MASK_DDC: u8 = 0x01;
pub const MASK_TMDS: u8 = 0x02;
pub const MASK_HDMI: u8 = 0x10;
pub const MASK_DVI: u8 = 0x20;

pub const CLK_INT: u16 = 0x8503;
pub const MASK_IN_DE_CHG: u8 = 0x20;

pub const MISC_INT: u16 = 0x850B;
pub const MASK_SYNC_CHG: u8 = 0x02;

pub const SYS_INTM: u16 = 0x8512;

// HDMI receiver status.
pub const SYS_STATUS: u16 = 0x8520;
pub const MASK_S_DDC5V: u8 = 0x01;
pub const MASK_S_TMDS: u8 = 0x02;
pub const MASK_S_PHY_PLL: u8 = 0x04;
pub const MASK_S_PHY_SCDT: u8 = 0x08;
pub const MASK_S_HDMI: u8 = 0x10;
pub const MASK_S_HDCP: u8 = 0x20;
pub const MASK_S_SYNC: u8 = 0x80;

pub const VI_STATUS1: u16 = 0x8522;
pub const MASK_S_V_INTERLACE: u8 = 0x02;

pub const CLK_STATUS: u16 = 0x8526;
pub const MASK_S_V_HPOL: u8 = 0x40;
pub const MASK_S_V_VPOL: u8 = 0x80;

pub const PHY_RST: u16 = 0x8535;
pub const MASK_RESET_CTRL: u8 = 0x01;

pub const EQ_BYPS: u16 = 0x8539;
pub const MASK_EQ_BYPS: u8 = 0x01;

pub const HDCP_MODE: u16 = 0x8560;
pub const MASK_MANUAL_AUTHENTICATION: u8 = 0x02;

pub const VI_MUTE: u16 = 0x857F;
pub const MASK_AUTO_MUTE: u8 = 0xC0;
pub const MASK_VI_MUTE: u8 = 0x10;

// Timing measurement, all little-endian 16-bit pairs.
pub const DE_HSIZE: u16 = 0x8582;
pub const DE_VSIZE: u16 = 0x858C;
pub const IN_HSIZE: u16 = 0x858E;
pub const IN_VSIZE: u16 = 0x8590;
pub const FV_CNT: u16 = 0x85A1;

/// Returns the register address for `reg` on the second CSI transmitter.
#[must_use]
pub const fn csitx1(reg: u16) -> u16 {
    reg + CSITX1_OFFSET
}
