//! A register-level model of an AC'97 controller, for tests.
//!
//! [`SimulatedAc97`] decodes port I/O into a NAM (codec) register file and the
//! NABM PCM-out box. It doesn't run on its own: DMA progress happens when
//! [`complete_transfer`](SimulatedAc97::complete_transfer) is called, which
//! fetches the queued descriptors from [`DmaMemory`], records the audio, and
//! raises completion status.
//!
//! Only the behaviour the driver relies on is modelled.

use crate::{
    device::{DmaAllocator, DmaBuffer, HardwareDevice, PortIo},
    regs::*,
    ring::{BufferDescriptor, DESCRIPTOR_SIZE, next_slot},
};
use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

pub const NAM_BASE: u16 = 0xC000;
pub const NAM_SIZE: u16 = 0x100;
pub const NABM_BASE: u16 = 0xC400;
pub const NABM_SIZE: u16 = 0x40;

/// Physical address of the first allocation, so that 0 is never a valid address.
const DMA_BASE: u32 = 0x1000;
const DMA_ALIGN: u32 = 8;

#[inline(always)]
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---- DMA memory ----

/// Simulated physical memory, shared between [`HeapDma`] buffers and the controller.
#[derive(Debug, Clone, Default)]
pub struct DmaMemory(Arc<Mutex<Vec<u8>>>);

impl DmaMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, addr: u32, buf: &mut [u8]) {
        let mem = lock(&self.0);
        let start = addr as usize;
        buf.copy_from_slice(&mem[start..start + buf.len()]);
    }

    pub fn write(&self, addr: u32, bytes: &[u8]) {
        let mut mem = lock(&self.0);
        let start = addr as usize;
        mem[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn grow_to(&self, len: usize) {
        let mut mem = lock(&self.0);
        if mem.len() < len {
            mem.resize(len, 0);
        }
    }
}

/// A bump allocator over [`DmaMemory`].
#[derive(Debug)]
pub struct HeapDma {
    memory: DmaMemory,
    next: u32,
}

impl HeapDma {
    pub fn new(memory: DmaMemory) -> Self {
        Self {
            memory,
            next: DMA_BASE,
        }
    }
}

impl DmaAllocator for HeapDma {
    type Buffer = HeapDmaBuffer;

    fn allocate(&mut self, len: usize) -> io::Result<HeapDmaBuffer> {
        let base = self.next;
        let len32 = u32::try_from(len).map_err(|_| io::ErrorKind::OutOfMemory)?;

        let end = base
            .checked_add(len32)
            .and_then(|end| end.checked_next_multiple_of(DMA_ALIGN))
            .ok_or(io::ErrorKind::OutOfMemory)?;

        self.memory.grow_to(end as usize);
        self.next = end;

        Ok(HeapDmaBuffer {
            memory: self.memory.clone(),
            base,
            len,
        })
    }
}

#[derive(Debug)]
pub struct HeapDmaBuffer {
    memory: DmaMemory,
    base: u32,
    len: usize,
}

impl DmaBuffer for HeapDmaBuffer {
    #[inline(always)]
    fn physical_address(&self) -> u32 {
        self.base
    }

    #[inline(always)]
    fn len(&self) -> usize {
        self.len
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.len, "DMA buffer overrun");
        self.memory.write(self.base + offset as u32, bytes);
    }
}

// ---- controller ----

#[derive(Debug)]
struct Registers {
    nam: [u16; (NAM_SIZE / 2) as usize],
    pci_command: u16,

    bdbar: u32,
    civ: u8,
    lvi: u8,
    sr: u16,
    picb: u16,
    piv: u8,
    cr: u8,

    /// Next descriptor the engine will fetch.
    fetch: u8,
    played: Vec<u8>,
    delayed: Duration,
}

impl Registers {
    fn new() -> Self {
        let mut this = Self {
            nam: [0; (NAM_SIZE / 2) as usize],
            pci_command: 0,
            bdbar: 0,
            civ: 0,
            lvi: 0,
            sr: SR_DCH,
            picb: 0,
            piv: 0,
            cr: 0,
            fetch: 0,
            played: Vec::new(),
            delayed: Duration::ZERO,
        };
        this.reset_codec();
        this
    }

    fn reset_codec(&mut self) {
        self.nam = [0; (NAM_SIZE / 2) as usize];
        self.nam[usize::from(NAM_MASTER_VOLUME / 2)] = MUTE;
        self.nam[usize::from(NAM_PCM_OUT_VOLUME / 2)] = 0x8808;
        self.nam[usize::from(NAM_EXT_AUDIO_ID / 2)] = EXT_AUDIO_VRA;
        self.nam[usize::from(NAM_FRONT_DAC_RATE / 2)] = 48_000;
        self.nam[usize::from(NAM_LR_ADC_RATE / 2)] = 48_000;
    }

    fn reset_box(&mut self) {
        self.bdbar = 0;
        self.civ = 0;
        self.lvi = 0;
        self.sr = SR_DCH;
        self.picb = 0;
        self.piv = 0;
        self.cr = 0;
        self.fetch = 0;
    }

    fn vra_enabled(&self) -> bool {
        self.nam[usize::from(NAM_EXT_AUDIO_STC / 2)] & EXT_AUDIO_VRA != 0
    }

    fn nam_write(&mut self, offset: u16, value: u16, volume_bits: u8) {
        let slot = usize::from(offset / 2);

        match offset & !1 {
            NAM_RESET => self.reset_codec(),
            NAM_EXT_AUDIO_ID => {}
            NAM_MASTER_VOLUME => {
                let m = (1u16 << volume_bits) - 1;
                self.nam[slot] = value & (MUTE | (m << 8) | m);
            }
            NAM_EXT_AUDIO_STC => self.nam[slot] = value & EXT_AUDIO_VRA,
            // fixed at 48 kHz unless variable rate audio is on
            NAM_FRONT_DAC_RATE | NAM_LR_ADC_RATE => {
                if self.vra_enabled() {
                    self.nam[slot] = value;
                }
            }
            _ => {
                if let Some(r) = self.nam.get_mut(slot) {
                    *r = value;
                }
            }
        }
    }

    fn nam_read(&self, offset: u16) -> u16 {
        self.nam.get(usize::from(offset / 2)).copied().unwrap_or(0)
    }

    fn nabm_read_u8(&self, offset: u16) -> u8 {
        const BDBAR_END: u16 = PO_BDBAR + 3;
        const SR_HI: u16 = PO_SR + 1;
        const PICB_HI: u16 = PO_PICB + 1;

        match offset {
            PO_BDBAR..=BDBAR_END => (self.bdbar >> ((offset - PO_BDBAR) * 8)) as u8,
            PO_CIV => self.civ,
            PO_LVI => self.lvi,
            PO_SR => self.sr as u8,
            SR_HI => (self.sr >> 8) as u8,
            PO_PICB => self.picb as u8,
            PICB_HI => (self.picb >> 8) as u8,
            PO_PIV => self.piv,
            PO_CR => self.cr,
            _ => 0,
        }
    }

    fn nabm_write_u8(&mut self, offset: u16, value: u8) {
        const BDBAR_END: u16 = PO_BDBAR + 3;

        match offset {
            PO_BDBAR..=BDBAR_END => {
                let shift = (offset - PO_BDBAR) * 8;
                let mask = !(0xFFu32 << shift);
                // descriptor lists are 8-byte aligned
                self.bdbar = ((self.bdbar & mask) | (u32::from(value) << shift)) & !7;
            }
            PO_LVI => self.lvi = value & 0x1F,
            // write 1 to clear
            PO_SR => self.sr &= !(u16::from(value) & SR_ACK_MASK),
            PO_CR => {
                if value & CR_RR != 0 {
                    self.reset_box();
                    return;
                }

                self.cr = value & 0x1F;

                if value & CR_RPBM != 0 {
                    self.sr &= !SR_DCH;
                } else {
                    self.sr |= SR_DCH;
                }
            }
            _ => {}
        }
    }
}

/// A simulated AC'97 controller with its codec.
#[derive(Debug)]
pub struct SimulatedAc97 {
    regs: Mutex<Registers>,
    memory: DmaMemory,
    volume_bits: u8,
}

impl SimulatedAc97 {
    /// Creates a controller whose codec implements `volume_bits` (5 or 6) bits
    /// of master attenuation, doing DMA from `memory`.
    pub fn new(volume_bits: u8, memory: DmaMemory) -> Self {
        assert!(matches!(volume_bits, 5 | 6), "ERROR: unsupported volume depth");

        Self {
            regs: Mutex::new(Registers::new()),
            memory,
            volume_bits,
        }
    }

    /// Runs the bus master through every queued descriptor, up to and including
    /// the last valid one.
    ///
    /// Returns the number of bytes played, `0` if the engine isn't running or has
    /// nothing new to fetch.
    pub fn complete_transfer(&self) -> usize {
        let mut r = lock(&self.regs);

        if r.cr & CR_RPBM == 0 || r.fetch == next_slot(r.lvi) {
            return 0;
        }

        let mut played = 0;
        let mut i = r.fetch;

        loop {
            let mut raw = [0; DESCRIPTOR_SIZE];
            self.memory
                .read(r.bdbar + u32::from(i) * DESCRIPTOR_SIZE as u32, &mut raw);
            let d = BufferDescriptor::from_le_bytes(raw);

            let mut audio = vec![0; usize::from(d.len_samples()) * 2];
            self.memory.read(d.pointer, &mut audio);
            played += audio.len();
            r.played.extend_from_slice(&audio);

            if d.ioc() {
                r.sr |= SR_BCIS;
            }

            if i == r.lvi {
                break;
            }

            i = next_slot(i);
        }

        r.civ = r.lvi;
        r.piv = next_slot(r.lvi);
        r.fetch = next_slot(r.lvi);
        r.picb = 0;
        r.sr |= SR_LVBCI | SR_CELV | SR_DCH;

        played
    }

    /// Sets arbitrary status bits, as the hardware would on an event.
    pub fn raise_status(&self, bits: u16) {
        lock(&self.regs).sr |= bits;
    }

    /// Returns `true` if an enabled interrupt source is pending.
    pub fn irq_pending(&self) -> bool {
        let r = lock(&self.regs);

        (r.sr & SR_BCIS != 0 && r.cr & CR_IOCE != 0)
            || (r.sr & SR_LVBCI != 0 && r.cr & CR_LVBIE != 0)
            || (r.sr & SR_FIFOE != 0 && r.cr & CR_FEIE != 0)
    }

    /// Takes the audio played so far.
    pub fn take_played(&self) -> Vec<u8> {
        core::mem::take(&mut lock(&self.regs).played)
    }

    pub fn nam_register(&self, offset: u16) -> u16 {
        lock(&self.regs).nam_read(offset)
    }

    pub fn pci_command(&self) -> u16 {
        lock(&self.regs).pci_command
    }

    pub fn bdbar(&self) -> u32 {
        lock(&self.regs).bdbar
    }

    pub fn lvi(&self) -> u8 {
        lock(&self.regs).lvi
    }

    pub fn control(&self) -> u8 {
        lock(&self.regs).cr
    }

    pub fn status(&self) -> u16 {
        lock(&self.regs).sr
    }

    /// Total time the driver asked to wait for.
    pub fn total_delay(&self) -> Duration {
        lock(&self.regs).delayed
    }

    /// Decodes a port into a NAM or NABM offset.
    fn decode(&self, port: u16) -> Option<(bool, u16)> {
        if (NAM_BASE..NAM_BASE + NAM_SIZE).contains(&port) {
            Some((true, port - NAM_BASE))
        } else if (NABM_BASE..NABM_BASE + NABM_SIZE).contains(&port) {
            Some((false, port - NABM_BASE))
        } else {
            None
        }
    }

    fn read(&self, port: u16, size: u16) -> u32 {
        let r = lock(&self.regs);

        match self.decode(port) {
            Some((true, off)) => match size {
                4 => u32::from(r.nam_read(off)) | u32::from(r.nam_read(off + 2)) << 16,
                2 => u32::from(r.nam_read(off)),
                _ => {
                    let word = r.nam_read(off & !1);
                    u32::from(if off & 1 == 0 { word as u8 } else { (word >> 8) as u8 })
                }
            },
            Some((false, off)) => (0..size).fold(0, |acc, i| {
                acc | u32::from(r.nabm_read_u8(off + i)) << (i * 8)
            }),
            None => u32::MAX >> (32 - size * 8),
        }
    }

    fn write(&self, port: u16, size: u16, value: u32) {
        let mut r = lock(&self.regs);

        match self.decode(port) {
            Some((true, off)) => match size {
                4 => {
                    r.nam_write(off, value as u16, self.volume_bits);
                    r.nam_write(off + 2, (value >> 16) as u16, self.volume_bits);
                }
                2 => r.nam_write(off, value as u16, self.volume_bits),
                _ => {
                    let word = r.nam_read(off & !1);
                    let word = if off & 1 == 0 {
                        (word & 0xFF00) | (value as u16 & 0xFF)
                    } else {
                        (word & 0x00FF) | ((value as u16 & 0xFF) << 8)
                    };
                    r.nam_write(off & !1, word, self.volume_bits);
                }
            },
            Some((false, off)) => {
                for i in 0..size {
                    r.nabm_write_u8(off + i, (value >> (i * 8)) as u8);
                }
            }
            None => {}
        }
    }
}

impl PortIo for SimulatedAc97 {
    fn in8(&self, port: u16) -> u8 {
        self.read(port, 1) as u8
    }

    fn in16(&self, port: u16) -> u16 {
        self.read(port, 2) as u16
    }

    fn in32(&self, port: u16) -> u32 {
        self.read(port, 4)
    }

    fn out8(&self, port: u16, value: u8) {
        self.write(port, 1, value.into())
    }

    fn out16(&self, port: u16, value: u16) {
        self.write(port, 2, value.into())
    }

    fn out32(&self, port: u16, value: u32) {
        self.write(port, 4, value)
    }
}

impl HardwareDevice for SimulatedAc97 {
    fn bar_io_base(&self, index: u8) -> Option<u16> {
        match index {
            BAR_NAM => Some(NAM_BASE),
            BAR_NABM => Some(NABM_BASE),
            _ => None,
        }
    }

    fn write_pci_command(&self, value: u16) {
        lock(&self.regs).pci_command = value;
    }

    fn delay(&self, duration: Duration) {
        lock(&self.regs).delayed += duration;
    }
}
