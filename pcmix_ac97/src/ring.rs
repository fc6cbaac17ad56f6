//! Buffer descriptor list layout.

/// Number of descriptors in the ring.
pub const BDL_LEN: usize = 32;
/// Size of the buffer behind each descriptor, in bytes.
pub const BDL_BUFFER_LEN: usize = 0x1000;

/// Size of one encoded descriptor, in bytes.
pub const DESCRIPTOR_SIZE: usize = 8;

/// Interrupt on completion.
pub const CL_IOC: u32 = 1 << 31;
/// Buffer underrun policy: this is the last buffer, stop (or repeat silence) after it.
pub const CL_BUP: u32 = 1 << 30;
pub const CL_LENGTH_MASK: u32 = 0xFFFF;

/// One entry of the descriptor list the controller fetches over DMA.
///
/// On the wire: a little-endian `u32` buffer address, then a little-endian `u32`
/// control word (length in 16-bit samples, plus flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferDescriptor {
    pub pointer: u32,
    pub control: u32,
}

impl BufferDescriptor {
    #[inline(always)]
    pub const fn new(pointer: u32) -> Self {
        Self {
            pointer,
            control: 0,
        }
    }

    /// Buffer length, in samples.
    #[inline(always)]
    pub const fn len_samples(&self) -> u16 {
        (self.control & CL_LENGTH_MASK) as u16
    }

    #[inline(always)]
    pub const fn set_len_samples(&mut self, len: u16) {
        self.control = (self.control & !CL_LENGTH_MASK) | len as u32;
    }

    #[inline(always)]
    pub const fn ioc(&self) -> bool {
        self.control & CL_IOC != 0
    }

    #[inline(always)]
    pub const fn bup(&self) -> bool {
        self.control & CL_BUP != 0
    }

    /// Clears the length and every flag.
    #[inline(always)]
    pub const fn reset(&mut self) {
        self.control = 0;
    }

    #[inline(always)]
    pub fn to_le_bytes(self) -> [u8; DESCRIPTOR_SIZE] {
        let mut out = [0; DESCRIPTOR_SIZE];
        let (ptr, ctl) = out.split_first_chunk_mut::<4>().unwrap();
        *ptr = self.pointer.to_le_bytes();
        ctl.copy_from_slice(&self.control.to_le_bytes());
        out
    }

    #[inline(always)]
    pub fn from_le_bytes(bytes: [u8; DESCRIPTOR_SIZE]) -> Self {
        let (&ptr, ctl) = bytes.split_first_chunk::<4>().unwrap();
        Self {
            pointer: u32::from_le_bytes(ptr),
            control: u32::from_le_bytes(ctl.try_into().unwrap()),
        }
    }
}

/// Index of the slot following `i` in the ring.
#[inline(always)]
pub const fn next_slot(i: u8) -> u8 {
    ((i as usize + 1) % BDL_LEN) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_word_layout() {
        let mut d = BufferDescriptor::new(0x1234_5678);
        d.set_len_samples(0x800);
        d.control |= CL_IOC | CL_BUP;

        assert_eq!(d.len_samples(), 0x800);
        assert!(d.ioc() && d.bup());
        assert_eq!(
            d.to_le_bytes(),
            [0x78, 0x56, 0x34, 0x12, 0x00, 0x08, 0x00, 0xC0]
        );
        assert_eq!(BufferDescriptor::from_le_bytes(d.to_le_bytes()), d);

        d.set_len_samples(3);
        assert!(d.ioc() && d.bup());
        assert_eq!(d.len_samples(), 3);
    }

    #[test]
    fn slots_wrap_around() {
        assert_eq!(next_slot(0), 1);
        assert_eq!(next_slot(30), 31);
        assert_eq!(next_slot(31), 0);
    }
}
