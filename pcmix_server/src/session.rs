//! Per-client protocol state.

use crate::diagnostics::Diagnostics;
use core::fmt;
use pcmix_network::{
    ChannelError, MessageChannel,
    pcmix_proto::{MessageTag, MixerMessage, SampleBlock},
};

/// Identifies a session for the lifetime of the server. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a single receive did to a session.
#[derive(Debug)]
pub enum SessionOutcome {
    /// No complete message was available.
    Idle,
    /// Audio was mixed into the period's buffer.
    Mixed,
    /// Audio arrived after this period's contribution, and was dropped.
    Deferred,
    /// The client said goodbye.
    Disconnected,
    /// A message with no meaning server-side.
    Ignored(MessageTag),
    /// The channel failed, or carried a malformed frame. Terminal.
    Failed(ChannelError),
}

/// A connected client.
///
/// Each session contributes at most one payload per mixing period. Its channel
/// is closed exactly once, either through [`close`](Self::close) or on drop.
#[derive(Debug)]
pub struct Session<C> {
    id: SessionId,
    channel: Option<C>,
    disconnected: bool,
    contributed: bool,
    pending_count: u32,
}

impl<C: MessageChannel> Session<C> {
    /// Wraps a freshly accepted channel and greets the client.
    ///
    /// If the greeting can't be sent, the session is returned already
    /// disconnected, to be reaped by the next sweep.
    pub fn accept(id: SessionId, channel: C, diagnostics: &mut Diagnostics) -> Self {
        diagnostics.connected_clients = diagnostics.connected_clients.strict_add(1);
        diagnostics.accepted_total = diagnostics.accepted_total.strict_add(1);

        let mut session = Self {
            id,
            channel: Some(channel),
            disconnected: false,
            contributed: false,
            pending_count: 0,
        };

        match session.send(&MixerMessage::Greeting) {
            Ok(()) => log::info!(
                "client {id} connected ({} connected)",
                diagnostics.connected_clients
            ),
            Err(e) => log::warn!("client {id}: failed to send greeting: {e}"),
        }

        session
    }

    /// Processes at most one message from the client.
    ///
    /// The first audio payload of a period is mixed into `mix`. Any further payload
    /// in the same period only bumps [`pending_count`](Self::pending_count) and is
    /// lost.
    pub fn receive_and_apply(&mut self, mix: &mut SampleBlock) -> SessionOutcome {
        if self.disconnected {
            return SessionOutcome::Failed(ChannelError::Closed);
        }

        let Some(channel) = self.channel.as_mut() else {
            self.disconnected = true;
            return SessionOutcome::Failed(ChannelError::Closed);
        };

        let message = match channel.try_recv_message() {
            Ok(Some(message)) => message,
            Ok(None) => return SessionOutcome::Idle,
            Err(e) => {
                self.disconnected = true;
                match &e {
                    ChannelError::Closed => log::info!("client {} hung up", self.id),
                    e => log::warn!("client {}: {e}", self.id),
                }
                return SessionOutcome::Failed(e);
            }
        };

        match message {
            MixerMessage::AudioData(payload) if !self.contributed => {
                mix.mix_in(&payload.samples());
                self.contributed = true;
                log::trace!("client {}: mixed one payload", self.id);
                SessionOutcome::Mixed
            }
            MixerMessage::AudioData(_) => {
                self.pending_count = self.pending_count.saturating_add(1);
                log::debug!(
                    "client {}: already contributed this period, dropping payload ({} dropped)",
                    self.id,
                    self.pending_count
                );
                SessionOutcome::Deferred
            }
            MixerMessage::Disconnect => {
                self.disconnected = true;
                log::info!("client {} disconnected", self.id);
                SessionOutcome::Disconnected
            }
            other => {
                let tag = other.tag();
                log::debug!("client {}: ignoring {tag:?} message", self.id);
                SessionOutcome::Ignored(tag)
            }
        }
    }

    /// Sends a message to the client.
    ///
    /// Fails with [`ChannelError::Closed`] without touching the channel if the
    /// session is already disconnected. Any send failure disconnects the session.
    pub fn send(&mut self, message: &MixerMessage) -> Result<(), ChannelError> {
        if self.disconnected {
            return Err(ChannelError::Closed);
        }

        let Some(channel) = self.channel.as_mut() else {
            self.disconnected = true;
            return Err(ChannelError::Closed);
        };

        let res = channel.send_message(message);

        if res.is_err() {
            self.disconnected = true;
        }

        res
    }
}

impl<C> Session<C> {
    #[inline(always)]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[inline(always)]
    pub const fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    #[inline(always)]
    pub const fn contributed(&self) -> bool {
        self.contributed
    }

    /// Payloads dropped because they arrived after this session had already
    /// contributed to a period. Never reset.
    #[inline(always)]
    pub const fn pending_count(&self) -> u32 {
        self.pending_count
    }

    #[inline(always)]
    pub fn channel(&self) -> Option<&C> {
        self.channel.as_ref()
    }

    /// Marks the end of a mixing period.
    #[inline(always)]
    pub fn end_period(&mut self) {
        self.contributed = false;
    }

    /// Disconnects the session and closes its channel. Idempotent.
    ///
    /// Returns `true` if this call closed the channel.
    pub fn close(&mut self) -> bool {
        self.disconnected = true;

        let closed = self.channel.take().is_some();

        if closed {
            log::debug!("client {}: channel closed", self.id);
        }

        closed
    }
}

impl<C> Drop for Session<C> {
    fn drop(&mut self) {
        self.close();
    }
}
