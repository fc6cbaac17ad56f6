//! The PCM-out DMA ring driver.

use crate::{
    DriverError, InterruptOutcome, PlaybackState,
    device::{DmaAllocator, DmaBuffer, HardwareDevice},
    regs::*,
    ring::{
        BDL_BUFFER_LEN, BDL_LEN, BufferDescriptor, CL_BUP, CL_IOC, DESCRIPTOR_SIZE, next_slot,
    },
};
use pcmix_proto::format::StreamFormat;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

/// Largest number of bytes a single [`Ac97::write`] call enqueues.
///
/// One slot is always left out, so a write never wraps onto the descriptor it
/// started from.
pub const MAX_WRITE_LEN: usize = (BDL_LEN - 1) * BDL_BUFFER_LEN;

const SAMPLE_RATE: u16 = StreamFormat::PCM_S16LE_STEREO_44100.sample_rate_hz as u16;
const CODEC_SETTLE: Duration = Duration::from_millis(10);

/// State reachable from both the write path and the interrupt path.
#[derive(Debug)]
struct Shared<D> {
    device: D,
    nabm: u16,
    state: AtomicU8,
}

impl<D: HardwareDevice> Shared<D> {
    #[inline(always)]
    fn state(&self) -> PlaybackState {
        PlaybackState::from_raw(self.state.load(Ordering::Acquire))
    }

    fn handle_interrupt(&self) -> InterruptOutcome {
        let sr = self.device.in16(self.nabm + PO_SR);

        if sr == 0 {
            return InterruptOutcome::None;
        }

        let outcome = if sr & (SR_BCIS | SR_LVBCI) != 0 {
            self.state.store(PlaybackState::Idle as u8, Ordering::Release);
            log::trace!("playback completed, status {sr:#06x}");
            InterruptOutcome::Completed
        } else if sr & SR_FIFOE != 0 {
            log::warn!("PCM out FIFO underrun, status {sr:#06x}");
            InterruptOutcome::Underrun
        } else {
            return InterruptOutcome::Unhandled;
        };

        self.device.out16(self.nabm + PO_SR, sr & SR_ACK_MASK);

        outcome
    }
}

/// Driver for the PCM-out engine of an AC'97 controller.
///
/// Audio is written into a ring of [`BDL_LEN`] buffers of [`BDL_BUFFER_LEN`]
/// bytes each. Every write fills the slots following the last valid index and
/// restarts the bus master. The controller raises a completion interrupt once
/// it has drained them, which must be forwarded to
/// [`handle_interrupt`](Self::handle_interrupt) or to an [`InterruptLine`].
#[derive(Debug)]
pub struct Ac97<D, B> {
    shared: Arc<Shared<D>>,
    descriptor_list: B,
    buffers: Box<[B]>,
    descriptors: [BufferDescriptor; BDL_LEN],
    lvi: u8,
    volume_bits: u8,
}

impl<D: HardwareDevice, B: DmaBuffer> Ac97<D, B> {
    /// Initializes the controller.
    pub fn new<A>(device: D, allocator: &mut A) -> Result<Self, DriverError>
    where
        A: DmaAllocator<Buffer = B>,
    {
        let nam = device
            .bar_io_base(BAR_NAM)
            .ok_or(DriverError::MissingBar(BAR_NAM))?;
        let nabm = device
            .bar_io_base(BAR_NABM)
            .ok_or(DriverError::MissingBar(BAR_NABM))?;

        log::debug!("AC'97 NAM at {nam:#06x}, NABM at {nabm:#06x}");

        let mut descriptor_list = allocator
            .allocate(BDL_LEN * DESCRIPTOR_SIZE)
            .map_err(DriverError::Alloc)?;

        let buffers = (0..BDL_LEN)
            .map(|_| allocator.allocate(BDL_BUFFER_LEN))
            .collect::<Result<Box<[_]>, _>>()
            .map_err(DriverError::Alloc)?;

        let descriptors: [_; BDL_LEN] =
            core::array::from_fn(|i| BufferDescriptor::new(buffers[i].physical_address()));

        for (i, d) in descriptors.iter().enumerate() {
            descriptor_list.write_at(i * DESCRIPTOR_SIZE, &d.to_le_bytes());
        }

        let lvi = (BDL_LEN - 1) as u8;

        device.out8(nabm + PO_CR, CR_INTERRUPTS);
        device.write_pci_command(PCI_COMMAND_IO_BUS_MASTER);

        // no attenuation on the PCM out path
        device.out16(nam + NAM_PCM_OUT_VOLUME, 0x0000);

        device.out32(nabm + PO_BDBAR, descriptor_list.physical_address());
        device.out8(nabm + PO_LVI, lvi);

        // codecs only keep the attenuation bits they implement
        device.out16(nam + NAM_MASTER_VOLUME, VOLUME_PROBE);
        let volume_bits = if device.in16(nam + NAM_MASTER_VOLUME) & 0x3F == 0x3F {
            6
        } else {
            5
        };

        let mid_attenuation = (1u16 << (volume_bits - 1)) - 1;
        device.out16(
            nam + NAM_MASTER_VOLUME,
            (mid_attenuation << 8) | mid_attenuation,
        );

        log::debug!("codec master volume has {volume_bits} bits");

        let stc = device.in16(nam + NAM_EXT_AUDIO_STC);
        device.out16(nam + NAM_EXT_AUDIO_STC, stc | EXT_AUDIO_VRA);
        device.delay(CODEC_SETTLE);
        device.out16(nam + NAM_FRONT_DAC_RATE, SAMPLE_RATE);
        device.out16(nam + NAM_LR_ADC_RATE, SAMPLE_RATE);

        let cr = device.in8(nabm + PO_CR);
        device.out8(nabm + PO_CR, cr | CR_RPBM);

        log::info!("AC'97 initialized, {SAMPLE_RATE} Hz");

        Ok(Self {
            shared: Arc::new(Shared {
                device,
                nabm,
                state: AtomicU8::new(PlaybackState::Idle as u8),
            }),
            descriptor_list,
            buffers,
            descriptors,
            lvi,
            volume_bits,
        })
    }

    /// Enqueues `bytes` for playback and starts the bus master.
    ///
    /// At most [`MAX_WRITE_LEN`] bytes are taken. Returns the number of bytes
    /// enqueued. Each descriptor covers `len / 2` samples of its chunk, so an odd
    /// trailing byte is copied but never played.
    ///
    /// Fails with [`DriverError::Busy`] if a previous write is still playing.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, DriverError> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let idle = PlaybackState::Idle as u8;
        let playing = PlaybackState::Playing as u8;

        self.shared
            .state
            .compare_exchange(idle, playing, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DriverError::Busy)?;

        let bytes = &bytes[..bytes.len().min(MAX_WRITE_LEN)];
        let n_chunks = bytes.len().div_ceil(BDL_BUFFER_LEN);

        let mut slot = next_slot(self.lvi);

        for (k, chunk) in bytes.chunks(BDL_BUFFER_LEN).enumerate() {
            let i = usize::from(slot);

            self.buffers[i].write_at(0, chunk);

            let d = &mut self.descriptors[i];
            d.reset();
            // chunk.len() <= BDL_BUFFER_LEN, so this fits
            d.set_len_samples((chunk.len() / 2) as u16);
            d.control |= CL_IOC;

            if k.strict_add(1) == n_chunks {
                d.control |= CL_BUP;
                self.lvi = slot;
            }

            self.descriptor_list
                .write_at(i * DESCRIPTOR_SIZE, &d.to_le_bytes());

            slot = next_slot(slot);
        }

        let Shared { device, nabm, .. } = &*self.shared;

        device.out32(nabm + PO_BDBAR, self.descriptor_list.physical_address());
        device.out8(nabm + PO_LVI, self.lvi);
        device.out8(nabm + PO_CR, CR_RPBM | CR_INTERRUPTS);

        // a completion interrupt may already have moved us to Idle
        let _ = self.shared.state.compare_exchange(
            playing,
            PlaybackState::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        log::trace!(
            "enqueued {} bytes in {n_chunks} descriptors, lvi {}",
            bytes.len(),
            self.lvi
        );

        Ok(bytes.len())
    }

    /// Services a PCM-out interrupt. Safe to call when no interrupt is pending.
    #[inline(always)]
    pub fn handle_interrupt(&self) -> InterruptOutcome {
        self.shared.handle_interrupt()
    }

    /// Returns a handle through which interrupts can be serviced from elsewhere.
    #[inline(always)]
    pub fn interrupt_line(&self) -> InterruptLine<D> {
        InterruptLine {
            shared: Arc::clone(&self.shared),
        }
    }

    #[inline(always)]
    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Returns `true` if a write would be accepted right now.
    #[inline(always)]
    pub fn can_write(&self) -> bool {
        self.state() == PlaybackState::Idle
    }

    /// Number of attenuation bits of the codec's master volume (5 or 6).
    #[inline(always)]
    pub const fn volume_bits(&self) -> u8 {
        self.volume_bits
    }

    /// Last valid index, the slot the latest write ended on.
    #[inline(always)]
    pub const fn lvi(&self) -> u8 {
        self.lvi
    }

    #[inline(always)]
    pub fn descriptor(&self, i: usize) -> Option<&BufferDescriptor> {
        self.descriptors.get(i)
    }

    #[inline(always)]
    pub fn device(&self) -> &D {
        &self.shared.device
    }
}

/// A cloneable handle to the interrupt path of an [`Ac97`].
///
/// It only touches the status register and the playback state, so it may run
/// concurrently with [`Ac97::write`].
#[derive(Debug)]
pub struct InterruptLine<D> {
    shared: Arc<Shared<D>>,
}

impl<D> Clone for InterruptLine<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: HardwareDevice> InterruptLine<D> {
    #[inline(always)]
    pub fn handle_interrupt(&self) -> InterruptOutcome {
        self.shared.handle_interrupt()
    }

    #[inline(always)]
    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::PortIo,
        ring::CL_LENGTH_MASK,
        sim::{DmaMemory, HeapDma, HeapDmaBuffer, NABM_BASE, SimulatedAc97},
    };

    type SimDriver = Ac97<SimulatedAc97, HeapDmaBuffer>;

    fn driver_with_codec(volume_bits: u8) -> SimDriver {
        let memory = DmaMemory::new();
        let mut dma = HeapDma::new(memory.clone());
        Ac97::new(SimulatedAc97::new(volume_bits, memory), &mut dma).unwrap()
    }

    fn ramp(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    /// Plays everything queued and services the resulting interrupt.
    fn drain(drv: &SimDriver) -> Vec<u8> {
        drv.device().complete_transfer();
        assert_eq!(drv.handle_interrupt(), InterruptOutcome::Completed);
        drv.device().take_played()
    }

    #[test]
    fn init_programs_codec_and_engine() {
        let drv = driver_with_codec(6);
        let hw = drv.device();

        assert_eq!(drv.volume_bits(), 6);
        assert_eq!(hw.nam_register(NAM_MASTER_VOLUME), 0x1F1F);
        assert_eq!(hw.nam_register(NAM_PCM_OUT_VOLUME), 0x0000);
        assert_ne!(hw.nam_register(NAM_EXT_AUDIO_STC) & EXT_AUDIO_VRA, 0);
        assert_eq!(hw.nam_register(NAM_FRONT_DAC_RATE), 44_100);
        assert_eq!(hw.nam_register(NAM_LR_ADC_RATE), 44_100);
        assert!(hw.total_delay() >= Duration::from_millis(10));

        assert_eq!(hw.pci_command(), PCI_COMMAND_IO_BUS_MASTER);
        assert_eq!(hw.control(), CR_INTERRUPTS | CR_RPBM);
        assert_ne!(hw.bdbar(), 0);
        assert_eq!(hw.lvi(), 31);
        assert_eq!(drv.lvi(), 31);

        for i in 0..BDL_LEN {
            let d = drv.descriptor(i).unwrap();
            assert_ne!(d.pointer, 0);
            assert_eq!(d.control, 0);
        }
        assert!(drv.descriptor(BDL_LEN).is_none());

        assert_eq!(drv.state(), PlaybackState::Idle);
    }

    #[test]
    fn five_bit_codec_gets_five_bit_attenuation() {
        let drv = driver_with_codec(5);

        assert_eq!(drv.volume_bits(), 5);
        assert_eq!(drv.device().nam_register(NAM_MASTER_VOLUME), 0x0F0F);
    }

    #[test]
    fn small_write_uses_one_descriptor() {
        let mut drv = driver_with_codec(6);
        let data = ramp(100);

        assert_eq!(drv.write(&data).unwrap(), 100);
        assert_eq!(drv.lvi(), 0);
        assert_eq!(drv.device().lvi(), 0);

        let d = drv.descriptor(0).unwrap();
        assert_eq!(d.len_samples(), 50);
        assert!(d.ioc() && d.bup());

        assert_eq!(drv.state(), PlaybackState::Draining);
        assert!(!drv.can_write());

        assert_eq!(drain(&drv), data);
        assert_eq!(drv.state(), PlaybackState::Idle);
        assert_eq!(drv.device().status() & SR_ACK_MASK, 0);
    }

    #[test]
    fn large_write_spans_descriptors() {
        let mut drv = driver_with_codec(6);
        let data = ramp(40_000);

        assert_eq!(drv.write(&data).unwrap(), 40_000);
        // 9 full buffers and a 3136 byte tail
        assert_eq!(drv.lvi(), 9);

        for i in 0..9 {
            let d = drv.descriptor(i).unwrap();
            assert_eq!(usize::from(d.len_samples()), BDL_BUFFER_LEN / 2);
            assert!(d.ioc());
            assert!(!d.bup());
        }

        let last = drv.descriptor(9).unwrap();
        assert_eq!(last.len_samples(), 3136 / 2);
        assert!(last.ioc() && last.bup());
        assert_eq!(drv.descriptor(10).unwrap().control & CL_LENGTH_MASK, 0);

        assert_eq!(drain(&drv), data);

        // the next write continues after the last valid index
        let data = ramp(5000);
        assert_eq!(drv.write(&data).unwrap(), 5000);
        assert_eq!(drv.lvi(), 11);
        assert_eq!(drain(&drv), data);
    }

    #[test]
    fn oversized_write_is_clamped() {
        let mut drv = driver_with_codec(6);
        let data = ramp(MAX_WRITE_LEN + 100);

        assert_eq!(drv.write(&data).unwrap(), MAX_WRITE_LEN);
        assert_eq!(usize::from(drv.lvi()), BDL_LEN - 2);
        assert_eq!(drain(&drv), &data[..MAX_WRITE_LEN]);
    }

    #[test]
    fn ring_wraps_around() {
        let mut drv = driver_with_codec(6);

        drv.write(&ramp(MAX_WRITE_LEN)).unwrap();
        drain(&drv);
        assert_eq!(drv.lvi(), 30);

        drv.write(&ramp(10)).unwrap();
        assert_eq!(drv.lvi(), 31);
        drain(&drv);

        let data = ramp(BDL_BUFFER_LEN + 2);
        drv.write(&data).unwrap();
        assert_eq!(drv.lvi(), 1);
        assert!(drv.descriptor(0).unwrap().ioc());
        assert!(!drv.descriptor(0).unwrap().bup());
        assert_eq!(drain(&drv), data);
    }

    #[test]
    fn odd_trailing_byte_is_not_played() {
        let mut drv = driver_with_codec(6);
        let data = ramp(101);

        assert_eq!(drv.write(&data).unwrap(), 101);
        assert_eq!(drv.descriptor(0).unwrap().len_samples(), 50);
        assert_eq!(drain(&drv), &data[..100]);
    }

    #[test]
    fn write_while_playing_is_rejected() {
        let mut drv = driver_with_codec(6);

        drv.write(&ramp(64)).unwrap();
        assert!(matches!(drv.write(&ramp(64)), Err(DriverError::Busy)));
        // the rejected write left the ring alone
        assert_eq!(drv.lvi(), 0);

        drain(&drv);
        assert_eq!(drv.write(&ramp(64)).unwrap(), 64);
    }

    #[test]
    fn empty_write_touches_nothing() {
        let mut drv = driver_with_codec(6);

        assert_eq!(drv.write(&[]).unwrap(), 0);
        assert_eq!(drv.state(), PlaybackState::Idle);
        assert_eq!(drv.device().lvi(), 31);
    }

    #[test]
    fn interrupts_are_idempotent() {
        let mut drv = driver_with_codec(6);

        // nothing pending at all
        assert_eq!(drv.handle_interrupt(), InterruptOutcome::None);
        assert_eq!(drv.state(), PlaybackState::Idle);

        drv.write(&ramp(64)).unwrap();
        drv.device().complete_transfer();

        assert_eq!(drv.handle_interrupt(), InterruptOutcome::Completed);
        // only the halted bit is left, which isn't ours to service
        assert_eq!(drv.handle_interrupt(), InterruptOutcome::Unhandled);
        assert_eq!(drv.state(), PlaybackState::Idle);
    }

    #[test]
    fn fifo_error_is_an_underrun() {
        let mut drv = driver_with_codec(6);
        drv.write(&ramp(64)).unwrap();

        drv.device().raise_status(SR_FIFOE);
        assert!(drv.device().irq_pending());

        assert_eq!(drv.handle_interrupt(), InterruptOutcome::Underrun);
        assert_eq!(drv.device().status() & SR_FIFOE, 0);
        // an underrun alone doesn't end playback
        assert_eq!(drv.state(), PlaybackState::Draining);
    }

    #[test]
    fn interrupts_can_be_serviced_from_another_thread() {
        let mut drv = driver_with_codec(6);
        let line = drv.interrupt_line();

        drv.write(&ramp(64)).unwrap();
        drv.device().complete_transfer();

        let outcome = std::thread::spawn(move || line.handle_interrupt())
            .join()
            .unwrap();

        assert_eq!(outcome, InterruptOutcome::Completed);
        assert!(drv.can_write());
        assert_eq!(
            drv.device().in16(NABM_BASE + PO_SR) & (SR_BCIS | SR_LVBCI),
            0
        );
    }
}
