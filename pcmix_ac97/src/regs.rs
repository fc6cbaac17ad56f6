//! AC'97 register map (PCM-out subset).
//!
//! Offsets are relative to the NAM (BAR0) or NABM (BAR1) I/O base.

// ---- PCI ----

/// PCI command register value: I/O space + bus master enable.
pub const PCI_COMMAND_IO_BUS_MASTER: u16 = 0x5;

pub const BAR_NAM: u8 = 0;
pub const BAR_NABM: u8 = 1;

// ---- NAM (mixer / codec) ----

pub const NAM_RESET: u16 = 0x00;
pub const NAM_MASTER_VOLUME: u16 = 0x02;
pub const NAM_PCM_OUT_VOLUME: u16 = 0x18;
pub const NAM_EXT_AUDIO_ID: u16 = 0x28;
/// Extended audio status and control.
pub const NAM_EXT_AUDIO_STC: u16 = 0x2A;
pub const NAM_FRONT_DAC_RATE: u16 = 0x2C;
pub const NAM_LR_ADC_RATE: u16 = 0x32;

/// Variable rate audio enable, in [`NAM_EXT_AUDIO_STC`].
pub const EXT_AUDIO_VRA: u16 = 1 << 0;

/// Written to the master volume register to probe how many attenuation bits stick.
pub const VOLUME_PROBE: u16 = 0x3F3F;
pub const MUTE: u16 = 1 << 15;

// ---- NABM (bus master), PCM out box ----

pub const PO_BDBAR: u16 = 0x10;
/// Current index value.
pub const PO_CIV: u16 = 0x14;
/// Last valid index.
pub const PO_LVI: u16 = 0x15;
pub const PO_SR: u16 = 0x16;
/// Position in current buffer, in samples.
pub const PO_PICB: u16 = 0x18;
pub const PO_PIV: u16 = 0x1A;
pub const PO_CR: u16 = 0x1B;

// PO_CR bits

/// Run/pause bus master.
pub const CR_RPBM: u8 = 1 << 0;
/// Reset the box registers.
pub const CR_RR: u8 = 1 << 1;
/// Last valid buffer interrupt enable.
pub const CR_LVBIE: u8 = 1 << 2;
/// FIFO error interrupt enable.
pub const CR_FEIE: u8 = 1 << 3;
/// Interrupt on completion enable.
pub const CR_IOCE: u8 = 1 << 4;

pub const CR_INTERRUPTS: u8 = CR_FEIE | CR_IOCE | CR_LVBIE;

// PO_SR bits

/// DMA controller halted. Read-only.
pub const SR_DCH: u16 = 1 << 0;
/// Current equals last valid. Read-only.
pub const SR_CELV: u16 = 1 << 1;
/// Last valid buffer completion interrupt. Write 1 to clear.
pub const SR_LVBCI: u16 = 1 << 2;
/// Buffer completion interrupt. Write 1 to clear.
pub const SR_BCIS: u16 = 1 << 3;
/// FIFO error (underrun). Write 1 to clear.
pub const SR_FIFOE: u16 = 1 << 4;

/// Bits acknowledged by the interrupt handler.
pub const SR_ACK_MASK: u16 = 0x1E;
