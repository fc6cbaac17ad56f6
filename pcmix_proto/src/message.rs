//! Protocol message types and their fixed wire layout.

use crate::{MESSAGE_SIZE, PAYLOAD_SIZE, SampleBlock, TAG_SIZE};
use alloc::boxed::Box;

/// Discriminant preceding every payload on the wire, encoded as a little-endian `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum MessageTag {
    /// Catch-all for messages carrying no recognised tag.
    Invalid = 0,
    Ack = 1,
    /// First message sent by the server after accepting a client.
    Greeting = 2,
    /// A payload of raw PCM.
    AudioData = 3,
    /// Last message sent by a client before closing its connection.
    Disconnect = 4,
}

impl MessageTag {
    /// Maps a raw discriminant to a tag. Unknown values map to [`MessageTag::Invalid`].
    #[inline(always)]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Ack,
            2 => Self::Greeting,
            3 => Self::AudioData,
            4 => Self::Disconnect,
            _ => Self::Invalid,
        }
    }

    #[inline(always)]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }
}

/// Errors produced while decoding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame was not exactly [`MESSAGE_SIZE`] bytes long.
    #[error("malformed message: expected {expected} bytes, got {actual}", expected = MESSAGE_SIZE)]
    MalformedMessage { actual: usize },
}

/// A raw PCM payload, exactly [`PAYLOAD_SIZE`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PcmPayload(Box<[u8; PAYLOAD_SIZE]>);

impl Default for PcmPayload {
    fn default() -> Self {
        Self(Box::new([0; PAYLOAD_SIZE]))
    }
}

impl PcmPayload {
    #[inline(always)]
    pub fn new(bytes: [u8; PAYLOAD_SIZE]) -> Self {
        Self(Box::new(bytes))
    }

    /// Copies `bytes` into a new payload, zero-padding anything past its end.
    ///
    /// Returns `None` if `bytes` is longer than [`PAYLOAD_SIZE`].
    pub fn from_partial(bytes: &[u8]) -> Option<Self> {
        let mut payload = Self::default();
        payload.0.get_mut(..bytes.len())?.copy_from_slice(bytes);
        Some(payload)
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.0
    }

    #[inline(always)]
    pub fn samples(&self) -> SampleBlock {
        SampleBlock::from_le_bytes(&self.0)
    }
}

impl From<&SampleBlock> for PcmPayload {
    fn from(block: &SampleBlock) -> Self {
        Self::new(block.to_le_bytes())
    }
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerMessage {
    Invalid,
    Ack,
    Greeting,
    AudioData(PcmPayload),
    Disconnect,
}

impl MixerMessage {
    #[inline(always)]
    pub const fn tag(&self) -> MessageTag {
        match self {
            Self::Invalid => MessageTag::Invalid,
            Self::Ack => MessageTag::Ack,
            Self::Greeting => MessageTag::Greeting,
            Self::AudioData(_) => MessageTag::AudioData,
            Self::Disconnect => MessageTag::Disconnect,
        }
    }

    /// Writes the full wire representation of this message into `out`.
    pub fn encode_into(&self, out: &mut [u8; MESSAGE_SIZE]) {
        let (tag, payload) = out.split_first_chunk_mut::<TAG_SIZE>().unwrap();
        *tag = self.tag().to_raw().to_le_bytes();

        match self {
            Self::AudioData(pcm) => payload.copy_from_slice(pcm.as_bytes()),
            _ => payload.fill(0),
        }
    }

    pub fn encode(&self) -> [u8; MESSAGE_SIZE] {
        let mut out = [0; MESSAGE_SIZE];
        self.encode_into(&mut out);
        out
    }

    /// Parses one frame.
    ///
    /// The frame must be exactly [`MESSAGE_SIZE`] bytes long. Payload bytes of
    /// non-audio messages are ignored.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let malformed = ProtocolError::MalformedMessage {
            actual: frame.len(),
        };

        let frame: &[u8; MESSAGE_SIZE] = frame.try_into().map_err(|_| malformed)?;

        let (&tag, payload) = frame.split_first_chunk::<TAG_SIZE>().unwrap();

        Ok(match MessageTag::from_raw(u32::from_le_bytes(tag)) {
            MessageTag::Invalid => Self::Invalid,
            MessageTag::Ack => Self::Ack,
            MessageTag::Greeting => Self::Greeting,
            MessageTag::Disconnect => Self::Disconnect,
            MessageTag::AudioData => {
                // the payload region is exactly PAYLOAD_SIZE bytes long
                Self::AudioData(PcmPayload::new(payload.try_into().unwrap()))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_payload() -> PcmPayload {
        let mut bytes = [0u8; PAYLOAD_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        PcmPayload::new(bytes)
    }

    #[test]
    fn every_variant_survives_the_wire() {
        let messages = [
            MixerMessage::Invalid,
            MixerMessage::Ack,
            MixerMessage::Greeting,
            MixerMessage::AudioData(ramp_payload()),
            MixerMessage::Disconnect,
        ];

        for msg in messages {
            let frame = msg.encode();
            assert_eq!(frame.len(), MESSAGE_SIZE);

            let decoded = MixerMessage::decode(&frame).unwrap();
            assert_eq!(decoded.tag(), msg.tag());
            assert_eq!(decoded, msg);
            assert_eq!(decoded.encode(), frame);
        }
    }

    #[test]
    fn tag_is_a_little_endian_u32() {
        let frame = MixerMessage::Disconnect.encode();
        assert_eq!(&frame[..TAG_SIZE], &[4, 0, 0, 0]);
        assert!(frame[TAG_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn wrong_lengths_are_malformed() {
        let frame = MixerMessage::Greeting.encode();

        for len in [0, 1, TAG_SIZE, MESSAGE_SIZE - 1] {
            assert_eq!(
                MixerMessage::decode(&frame[..len]),
                Err(ProtocolError::MalformedMessage { actual: len })
            );
        }

        let mut long = [0u8; MESSAGE_SIZE + 1];
        long[..MESSAGE_SIZE].copy_from_slice(&frame);
        assert_eq!(
            MixerMessage::decode(&long),
            Err(ProtocolError::MalformedMessage {
                actual: MESSAGE_SIZE + 1
            })
        );
    }

    #[test]
    fn unknown_tags_decode_as_invalid() {
        let mut frame = [0u8; MESSAGE_SIZE];
        frame[..TAG_SIZE].copy_from_slice(&0xDEADu32.to_le_bytes());
        assert_eq!(MixerMessage::decode(&frame), Ok(MixerMessage::Invalid));
    }

    #[test]
    fn non_audio_payload_bytes_are_ignored() {
        let mut frame = MixerMessage::Ack.encode();
        frame[MESSAGE_SIZE - 1] = 0xFF;
        assert_eq!(MixerMessage::decode(&frame), Ok(MixerMessage::Ack));
    }

    #[test]
    fn partial_payloads_are_zero_padded() {
        let payload = PcmPayload::from_partial(&[1, 2, 3]).unwrap();
        assert_eq!(&payload.as_bytes()[..3], &[1, 2, 3]);
        assert!(payload.as_bytes()[3..].iter().all(|&b| b == 0));

        assert!(PcmPayload::from_partial(&[0; PAYLOAD_SIZE + 1]).is_none());
    }
}
