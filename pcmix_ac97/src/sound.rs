use crate::{Ac97, DmaBuffer, DriverError, HardwareDevice, InterruptLine};
use std::io;

/// The driver as a byte sink.
///
/// A write attempted while playback is in progress fails with
/// [`io::ErrorKind::WouldBlock`], so callers can treat the device like a
/// non-blocking file.
#[derive(Debug)]
pub struct SoundDevice<D, B> {
    driver: Ac97<D, B>,
}

impl<D: HardwareDevice, B: DmaBuffer> SoundDevice<D, B> {
    #[inline(always)]
    pub fn new(driver: Ac97<D, B>) -> Self {
        Self { driver }
    }

    #[inline(always)]
    pub fn can_write(&self) -> bool {
        self.driver.can_write()
    }

    #[inline(always)]
    pub fn interrupt_line(&self) -> InterruptLine<D> {
        self.driver.interrupt_line()
    }

    #[inline(always)]
    pub fn driver(&self) -> &Ac97<D, B> {
        &self.driver
    }

    #[inline(always)]
    pub fn into_inner(self) -> Ac97<D, B> {
        self.driver
    }
}

impl<D: HardwareDevice, B: DmaBuffer> io::Write for SoundDevice<D, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.driver.write(buf).map_err(|e| match e {
            DriverError::Busy => io::Error::new(io::ErrorKind::WouldBlock, e),
            e => io::Error::other(e),
        })
    }

    #[inline(always)]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
