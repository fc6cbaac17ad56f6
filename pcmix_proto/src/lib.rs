#![no_std]
//! The fixed-layout message protocol spoken between playback clients and the mixing server.
//!
//! ## Roles
//!
//! - The **server** owns the output device and mixes every connected client into it.
//! - **Clients** are short-lived producers that stream raw PCM into the server.
//!
//! ## Protocol model
//!
//! Every message on the wire has exactly the same size: a 4-byte little-endian
//! tag followed by a [`PAYLOAD_SIZE`]-byte payload region. The payload is only
//! meaningful for [`MixerMessage::AudioData`](message::MixerMessage::AudioData); for every
//! other tag it is zero-filled by senders and ignored by receivers.
//!
//! Any frame whose length differs from [`MESSAGE_SIZE`] is a protocol violation
//! (see [`ProtocolError`](message::ProtocolError)). There is no versioning field.
//!
//! ## Conversation
//!
//! 1. On accept, the server sends a single `Greeting`.
//! 2. The client sends one `AudioData` per chunk of PCM.
//! 3. The client sends exactly one `Disconnect` before closing.
//!
//! ## Samples
//!
//! Audio payloads are interpreted as [`SAMPLES_PER_PAYLOAD`] signed 16-bit
//! little-endian samples. [`SampleBlock`] is the typed view of a payload, and is
//! the only place where endianness is handled.

extern crate alloc;

pub mod format;
pub mod message;

pub use message::{MessageTag, MixerMessage, PcmPayload, ProtocolError};

/// Size, in bytes, of the PCM payload region of every message.
pub const PAYLOAD_SIZE: usize = 1020;

/// Size, in bytes, of the tag preceding the payload.
pub const TAG_SIZE: usize = size_of::<u32>();

/// Size, in bytes, of every message on the wire.
pub const MESSAGE_SIZE: usize = TAG_SIZE + PAYLOAD_SIZE;

/// The sample type carried by audio payloads.
pub type Sample = i16;

/// Number of samples held by one payload (and by one mixing period).
pub const SAMPLES_PER_PAYLOAD: usize = PAYLOAD_SIZE / size_of::<Sample>();

/// One payload's worth of signed 16-bit samples.
///
/// Mixing is purely additive: [`mix_in`](Self::mix_in) sums sample by sample,
/// clamping to the representable range instead of wrapping. No normalization
/// is performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleBlock([Sample; SAMPLES_PER_PAYLOAD]);

impl Default for SampleBlock {
    fn default() -> Self {
        Self::silence()
    }
}

impl SampleBlock {
    #[inline(always)]
    pub const fn silence() -> Self {
        Self([0; SAMPLES_PER_PAYLOAD])
    }

    #[inline(always)]
    pub const fn from_samples(samples: [Sample; SAMPLES_PER_PAYLOAD]) -> Self {
        Self(samples)
    }

    /// Decodes little-endian sample bytes.
    pub fn from_le_bytes(bytes: &[u8; PAYLOAD_SIZE]) -> Self {
        let mut block = Self::silence();

        for (sample, &pair) in block.0.iter_mut().zip(bytes.as_chunks::<2>().0) {
            *sample = Sample::from_le_bytes(pair);
        }

        block
    }

    /// Encodes the samples into `out` as little-endian bytes.
    pub fn write_le_bytes(&self, out: &mut [u8; PAYLOAD_SIZE]) {
        for (pair, sample) in out.as_chunks_mut::<2>().0.iter_mut().zip(self.0) {
            *pair = sample.to_le_bytes();
        }
    }

    pub fn to_le_bytes(&self) -> [u8; PAYLOAD_SIZE] {
        let mut out = [0; PAYLOAD_SIZE];
        self.write_le_bytes(&mut out);
        out
    }

    /// Adds `other` into `self`, saturating each sample at the `i16` bounds.
    #[inline]
    pub fn mix_in(&mut self, other: &SampleBlock) {
        for (acc, &spl) in self.0.iter_mut().zip(other.0.iter()) {
            *acc = acc.saturating_add(spl);
        }
    }

    /// Resets every sample to silence.
    #[inline(always)]
    pub fn clear(&mut self) {
        self.0 = [0; SAMPLES_PER_PAYLOAD];
    }

    #[inline(always)]
    pub fn is_silent(&self) -> bool {
        self.0.iter().all(|&s| s == 0)
    }

    #[inline(always)]
    pub const fn samples(&self) -> &[Sample; SAMPLES_PER_PAYLOAD] {
        &self.0
    }

    #[inline(always)]
    pub const fn samples_mut(&mut self) -> &mut [Sample; SAMPLES_PER_PAYLOAD] {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_size_is_tag_plus_payload() {
        assert_eq!(MESSAGE_SIZE, 1024);
        assert_eq!(SAMPLES_PER_PAYLOAD, 510);
    }

    #[test]
    fn samples_are_little_endian() {
        let mut bytes = [0; PAYLOAD_SIZE];
        bytes[0] = 0xE8;
        bytes[1] = 0x03;
        bytes[2] = 0x18;
        bytes[3] = 0xFC;

        let block = SampleBlock::from_le_bytes(&bytes);
        assert_eq!(block.samples()[0], 1000);
        assert_eq!(block.samples()[1], -1000);
        assert_eq!(block.to_le_bytes(), bytes);
    }

    #[test]
    fn mixing_saturates_instead_of_wrapping() {
        let mut acc = SampleBlock::silence();
        acc.samples_mut()[0] = 30_000;
        acc.samples_mut()[1] = -30_000;
        acc.samples_mut()[2] = 1000;

        let mut other = SampleBlock::silence();
        other.samples_mut()[0] = 10_000;
        other.samples_mut()[1] = -10_000;
        other.samples_mut()[2] = 2000;

        acc.mix_in(&other);

        assert_eq!(acc.samples()[0], i16::MAX);
        assert_eq!(acc.samples()[1], i16::MIN);
        assert_eq!(acc.samples()[2], 3000);
        assert!(acc.samples()[3..].iter().all(|&s| s == 0));
    }

    #[test]
    fn clear_restores_silence() {
        let mut block = SampleBlock::from_samples([7; SAMPLES_PER_PAYLOAD]);
        assert!(!block.is_silent());
        block.clear();
        assert!(block.is_silent());
    }
}
