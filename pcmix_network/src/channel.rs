//! Framed message channel over a Unix stream socket.

use crate::{ChannelError, MessageChannel};
use pcmix_proto::{MESSAGE_SIZE, MixerMessage, ProtocolError};
use std::{
    io::{self, Read, Write},
    os::{
        fd::{AsFd, AsRawFd, BorrowedFd, RawFd},
        unix::net::UnixStream,
    },
};

/// One end of a client connection.
///
/// The stream is put in non-blocking mode. Incoming bytes are accumulated until
/// a full frame is available, so a message split across several reads is
/// reassembled transparently.
#[derive(Debug)]
pub struct IpcChannel {
    stream: UnixStream,
    rx: Box<[u8; MESSAGE_SIZE]>,
    filled: usize,
    eof: bool,
}

impl IpcChannel {
    /// Wraps a connected stream, switching it to non-blocking mode.
    pub fn new(stream: UnixStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;

        Ok(Self {
            stream,
            rx: Box::new([0; MESSAGE_SIZE]),
            filled: 0,
            eof: false,
        })
    }

    /// Number of bytes of a partially received frame.
    #[inline(always)]
    pub const fn buffered(&self) -> usize {
        self.filled
    }

    #[inline(always)]
    pub fn stream(&self) -> &UnixStream {
        &self.stream
    }

    fn write_frame(&mut self, frame: &[u8; MESSAGE_SIZE]) -> io::Result<()> {
        let mut written = 0;

        while written < frame.len() {
            match self.stream.write(&frame[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written = written.strict_add(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if crate::io_err_is_timeout(e.kind()) => {
                    // the peer isn't draining fast enough, finish this frame blocking.
                    // The server only sends the greeting, into an empty socket buffer,
                    // so the event loop never waits here.
                    self.stream.set_nonblocking(false)?;
                    let res = self.stream.write_all(&frame[written..]);
                    self.stream.set_nonblocking(true)?;
                    return res;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

impl MessageChannel for IpcChannel {
    fn send_message(&mut self, message: &MixerMessage) -> Result<(), ChannelError> {
        self.write_frame(&message.encode())
            .map_err(ChannelError::Transport)
    }

    fn try_recv_message(&mut self) -> Result<Option<MixerMessage>, ChannelError> {
        if self.eof {
            return Err(ChannelError::Closed);
        }

        while self.filled < MESSAGE_SIZE {
            match self.stream.read(&mut self.rx[self.filled..]) {
                Ok(0) => {
                    self.eof = true;

                    let received = core::mem::take(&mut self.filled);

                    return Err(if received == 0 {
                        ChannelError::Closed
                    } else {
                        ProtocolError::MalformedMessage { actual: received }.into()
                    });
                }
                Ok(n) => self.filled = self.filled.strict_add(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if crate::io_err_is_timeout(e.kind()) => return Ok(None),
                Err(e) if crate::io_err_is_hangup(e.kind()) => {
                    self.eof = true;
                    return Err(ChannelError::Closed);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.filled = 0;

        let message = MixerMessage::decode(&self.rx[..])?;

        log::trace!("received {:?} on fd {}", message.tag(), self.as_raw_fd());

        Ok(Some(message))
    }
}

impl AsRawFd for IpcChannel {
    #[inline(always)]
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl AsFd for IpcChannel {
    #[inline(always)]
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}
