//! The PCM format served by the mixer.
//!
//! The format is fixed: there is no negotiation. Clients are expected to send
//! data already in this format.

use core::num;

/// Sample encodings understood by the output path.
///
/// All samples are packed, little-endian, interleaved and uncompressed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SampleType {
    I16,
}

impl SampleType {
    /// Returns the size of a single sample in bytes.
    #[inline(always)]
    pub const fn sample_size(self) -> num::NonZeroU8 {
        match self {
            Self::I16 => num::NonZeroU8::new(2).unwrap(),
        }
    }
}

/// Describes the stream every client writes and the device plays.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StreamFormat {
    pub sample_rate_hz: u32,
    pub sample_type: SampleType,
    pub channels: num::NonZeroU8,
}

impl StreamFormat {
    /// 44.1 kHz, signed 16-bit, stereo.
    pub const PCM_S16LE_STEREO_44100: Self = Self {
        sample_rate_hz: 44_100,
        sample_type: SampleType::I16,
        channels: num::NonZeroU8::new(2).unwrap(),
    };

    /// Size of one frame (one sample per channel), in bytes.
    #[inline(always)]
    pub const fn frame_size(&self) -> usize {
        self.sample_type.sample_size().get() as usize * self.channels.get() as usize
    }

    /// Playback duration of `n_bytes` of audio in this format, in microseconds.
    #[inline]
    pub const fn duration_micros(&self, n_bytes: usize) -> u64 {
        let frames = (n_bytes / self.frame_size()) as u64;
        frames * 1_000_000 / self.sample_rate_hz as u64
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::PCM_S16LE_STEREO_44100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_payload_is_255_stereo_frames() {
        let format = StreamFormat::default();
        assert_eq!(format.frame_size(), 4);
        assert_eq!(crate::PAYLOAD_SIZE / format.frame_size(), 255);
        assert_eq!(format.duration_micros(crate::PAYLOAD_SIZE), 5782);
    }
}
