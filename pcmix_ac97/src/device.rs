//! Interfaces the driver needs from the platform.
//!
//! The driver never touches hardware directly: port I/O, PCI configuration and
//! DMA-visible memory are provided by the kernel (or by [`sim`](crate::sim) in
//! tests) through these traits.

use std::{io, time::Duration};

/// x86-style port I/O.
///
/// Methods take `&self`: register accesses from the write path and from the
/// interrupt path may interleave.
pub trait PortIo {
    fn in8(&self, port: u16) -> u8;
    fn in16(&self, port: u16) -> u16;
    fn in32(&self, port: u16) -> u32;
    fn out8(&self, port: u16, value: u8);
    fn out16(&self, port: u16, value: u16);
    fn out32(&self, port: u16, value: u32);
}

/// A PCI function with I/O BARs.
pub trait HardwareDevice: PortIo {
    /// Returns the I/O port base of BAR `index`, if it is an I/O BAR.
    fn bar_io_base(&self, index: u8) -> Option<u16>;

    fn write_pci_command(&self, value: u16);

    /// Waits for at least `duration`.
    fn delay(&self, duration: Duration);
}

/// Physically contiguous memory the controller can read.
pub trait DmaBuffer {
    /// The bus address of the first byte.
    fn physical_address(&self) -> u32;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `bytes` into the buffer at `offset`.
    ///
    /// # Panics
    ///
    /// If the range doesn't fit in the buffer.
    fn write_at(&mut self, offset: usize, bytes: &[u8]);
}

pub trait DmaAllocator {
    type Buffer: DmaBuffer;

    /// Allocates a zeroed buffer of `len` bytes.
    fn allocate(&mut self, len: usize) -> io::Result<Self::Buffer>;
}
