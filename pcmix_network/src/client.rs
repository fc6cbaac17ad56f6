//! Client side of the connection.
//!
//! The client side is blocking: a producer connects, waits for the server's
//! greeting, streams its audio and says goodbye.

use pcmix_proto::{MESSAGE_SIZE, MessageTag, MixerMessage, PAYLOAD_SIZE, PcmPayload};
use std::{
    io::{self, Read, Write},
    net::Shutdown,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("could not connect to {}: {source}", .path.display())]
    Refused {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The greeting frame was short or had an unexpected tag.
    #[error("malformed greeting: got {received} bytes, tag {tag:?}")]
    MalformedGreeting {
        received: usize,
        tag: Option<MessageTag>,
    },
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

/// A blocking connection to the mixing server.
#[derive(Debug)]
pub struct MixerConnection {
    stream: UnixStream,
}

impl MixerConnection {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, ConnectError> {
        let path = path.as_ref();

        let stream = UnixStream::connect(path).map_err(|source| ConnectError::Refused {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!("connected to {}", path.display());

        Ok(Self { stream })
    }

    /// Wraps an already connected stream.
    #[inline(always)]
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Blocks until the server's greeting has been received.
    pub fn expect_greeting(&mut self) -> Result<(), ConnectError> {
        let mut frame = [0u8; MESSAGE_SIZE];
        let received = read_full(&mut self.stream, &mut frame)?;

        let malformed = |tag| ConnectError::MalformedGreeting { received, tag };

        let message = MixerMessage::decode(&frame[..received]).map_err(|_| malformed(None))?;

        match message.tag() {
            MessageTag::Greeting => Ok(()),
            tag => Err(malformed(Some(tag))),
        }
    }

    /// Sends `pcm` as audio messages, [`PAYLOAD_SIZE`] bytes at a time.
    ///
    /// A trailing partial payload is zero-padded.
    pub fn send_audio(&mut self, pcm: &[u8]) -> Result<(), ConnectError> {
        for chunk in pcm.chunks(PAYLOAD_SIZE) {
            // chunks are at most PAYLOAD_SIZE long
            let payload = PcmPayload::from_partial(chunk).unwrap();
            self.send(&MixerMessage::AudioData(payload))?;
        }

        Ok(())
    }

    pub fn send(&mut self, message: &MixerMessage) -> Result<(), ConnectError> {
        self.stream.write_all(&message.encode())?;
        Ok(())
    }

    /// Sends a single disconnect message and closes the connection.
    pub fn disconnect(mut self) -> Result<(), ConnectError> {
        self.send(&MixerMessage::Disconnect)?;
        self.stream.flush()?;

        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Reads until `buf` is full or the stream ends, returning the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled = filled.strict_add(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}
