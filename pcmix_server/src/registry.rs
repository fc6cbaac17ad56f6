//! The set of live sessions.

use crate::{
    diagnostics::Diagnostics,
    session::{Session, SessionId},
};
use pcmix_network::{Listener, MessageChannel};
use std::io;

/// Owns every session, in the order they were accepted.
///
/// Disconnected sessions stay in place until the next [`sweep`](Self::sweep).
#[derive(Debug)]
pub struct Registry<C> {
    sessions: Vec<Session<C>>,
    next_id: u64,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            next_id: 0,
        }
    }
}

impl<C: MessageChannel> Registry<C> {
    /// Accepts one pending connection from `listener`, if any.
    pub fn accept_incoming<L>(
        &mut self,
        listener: &L,
        diagnostics: &mut Diagnostics,
    ) -> io::Result<Option<SessionId>>
    where
        L: Listener<Channel = C>,
    {
        let Some(channel) = listener.accept_channel()? else {
            return Ok(None);
        };

        Ok(Some(self.insert(channel, diagnostics)))
    }

    /// Starts a session on an already connected channel.
    pub fn insert(&mut self, channel: C, diagnostics: &mut Diagnostics) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id = self.next_id.strict_add(1);

        self.sessions.push(Session::accept(id, channel, diagnostics));

        id
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes (and closes) every disconnected session, keeping the others in
    /// order. Returns how many were removed.
    pub fn sweep(&mut self, diagnostics: &mut Diagnostics) -> usize {
        let before = self.sessions.len();

        self.sessions.retain(|s| !s.is_disconnected());

        let reaped = before.strict_sub(self.sessions.len());

        if reaped > 0 {
            diagnostics.connected_clients = diagnostics.connected_clients.saturating_sub(reaped);
            log::info!(
                "reaped {reaped} session(s), {} connected",
                diagnostics.connected_clients
            );
        }

        reaped
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[inline(always)]
    pub fn iter(&self) -> core::slice::Iter<'_, Session<C>> {
        self.sessions.iter()
    }

    #[inline(always)]
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, Session<C>> {
        self.sessions.iter_mut()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session<C>> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session<C>> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }
}

impl<'a, C> IntoIterator for &'a Registry<C> {
    type Item = &'a Session<C>;
    type IntoIter = core::slice::Iter<'a, Session<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, C> IntoIterator for &'a mut Registry<C> {
    type Item = &'a mut Session<C>;
    type IntoIter = core::slice::IterMut<'a, Session<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
