//! Transport for the message model defined in the `pcmix_proto` crate.
//!
//! Messages travel over Unix-domain stream sockets as fixed-size frames
//! ([`MESSAGE_SIZE`](pcmix_proto::MESSAGE_SIZE) bytes each). Since a stream
//! socket has no message boundaries, [`IpcChannel`] reassembles frames from
//! whatever the socket hands out.
//!
//! ## Scope
//!
//! - [`server`]: a non-blocking listener handing out [`IpcChannel`]s, driven
//!   by an external readiness loop.
//! - [`client`]: the blocking client side of the handshake, used by playback
//!   utilities.
//! - [`MessageChannel`]: the seam between sessions and the transport.

pub mod channel;
pub mod client;
pub mod server;

pub use channel::IpcChannel;
pub use pcmix_proto;
pub use server::{IpcListener, Listener};

use pcmix_proto::{MixerMessage, ProtocolError};
use std::io;

/// Where the server listens unless configured otherwise.
pub const DEFAULT_SOCKET_PATH: &str = "/Session/mixer.ipc";

/// Errors produced by a [`MessageChannel`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The peer closed its end of the channel, or it was closed locally.
    #[error("channel closed")]
    Closed,
    /// The peer sent a frame of the wrong size.
    #[error(transparent)]
    Malformed(#[from] ProtocolError),
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

/// A bidirectional, message-oriented channel to a single peer.
///
/// Receiving never blocks. Sending may block for as long as it takes the peer to
/// drain one frame.
pub trait MessageChannel {
    fn send_message(&mut self, message: &MixerMessage) -> Result<(), ChannelError>;

    /// Returns the next complete message, or `None` if none is available yet.
    fn try_recv_message(&mut self) -> Result<Option<MixerMessage>, ChannelError>;
}

/// Returns `true` if the given I/O error kind means "try again later".
///
/// This treats both `WouldBlock` and `TimedOut` as timeout-equivalent, which
/// is useful when working with non-blocking or socket-based transports.
#[inline(always)]
pub fn io_err_is_timeout(e: io::ErrorKind) -> bool {
    use io::ErrorKind::*;
    [WouldBlock, TimedOut].contains(&e)
}

/// Returns `true` if the given I/O error kind means the peer went away.
#[inline(always)]
pub(crate) fn io_err_is_hangup(e: io::ErrorKind) -> bool {
    use io::ErrorKind::*;
    [BrokenPipe, ConnectionReset, ConnectionAborted, NotConnected].contains(&e)
}
