//! Playback driver for AC'97-style audio controllers.
//!
//! The controller's PCM-out engine streams audio from a ring of
//! [buffer descriptors](ring::BufferDescriptor) it fetches by DMA. [`Ac97`]
//! owns that ring, programs the codec at initialisation, and turns writes into
//! descriptor updates. [`SoundDevice`] exposes it as a [`std::io::Write`] sink.
//!
//! Platform access (port I/O, PCI configuration, DMA memory) goes through the
//! traits in [`device`]. The `sim` feature provides a register-level model of
//! the controller implementing them.

pub mod device;
pub mod driver;
pub mod regs;
pub mod ring;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod sound;

pub use device::{DmaAllocator, DmaBuffer, HardwareDevice, PortIo};
pub use driver::{Ac97, InterruptLine, MAX_WRITE_LEN};
pub use sound::SoundDevice;

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A previous write is still playing.
    #[error("device busy: playback in progress")]
    Busy,
    #[error("BAR{0} is not an I/O BAR")]
    MissingBar(u8),
    #[error("failed to allocate DMA memory: {0}")]
    Alloc(#[source] io::Error),
}

/// Where the PCM-out engine is in its write/complete cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlaybackState {
    /// Nothing queued, writes are accepted.
    Idle = 0,
    /// A write is filling descriptors.
    Playing = 1,
    /// The bus master is running, waiting for the completion interrupt.
    Draining = 2,
}

impl PlaybackState {
    #[inline(always)]
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Playing,
            _ => Self::Draining,
        }
    }
}

/// What an interrupt turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptOutcome {
    /// The status register was clear.
    None,
    /// A buffer (or the last valid buffer) completed, the engine is idle again.
    Completed,
    /// The FIFO ran dry.
    Underrun,
    /// Status bits this driver doesn't service. Left unacknowledged.
    Unhandled,
}
