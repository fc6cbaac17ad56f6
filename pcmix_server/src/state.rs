use crate::{
    diagnostics::Diagnostics,
    engine::{MixingEngine, TickReport},
    registry::Registry,
    session::{SessionId, SessionOutcome},
};
use pcmix_network::{Listener, MessageChannel};
use std::io;

/// Everything the server mutates, owned in one place.
///
/// The reactor calls one handler per event. Handlers never block.
#[derive(Debug)]
pub struct MixerServerState<C, W> {
    registry: Registry<C>,
    engine: MixingEngine<W>,
    diagnostics: Diagnostics,
}

impl<C: MessageChannel, W: io::Write> MixerServerState<C, W> {
    pub fn new(device: W) -> Self {
        Self {
            registry: Registry::new(),
            engine: MixingEngine::new(device),
            diagnostics: Diagnostics::default(),
        }
    }

    /// The listener is readable: accept one client, then sweep.
    pub fn on_accept<L>(&mut self, listener: &L) -> io::Result<Option<SessionId>>
    where
        L: Listener<Channel = C>,
    {
        let res = self
            .registry
            .accept_incoming(listener, &mut self.diagnostics);

        self.registry.sweep(&mut self.diagnostics);

        res
    }

    /// A client's channel is readable: process one message.
    ///
    /// Returns `None` if the session is gone.
    pub fn on_session_readable(&mut self, id: SessionId) -> Option<SessionOutcome> {
        let session = self.registry.get_mut(id)?;
        let outcome = session.receive_and_apply(self.engine.mix_buffer_mut());

        self.diagnostics.record(&outcome);

        Some(outcome)
    }

    /// The period elapsed.
    #[inline(always)]
    pub fn on_timer(&mut self) -> TickReport {
        self.engine.tick(&mut self.registry, &mut self.diagnostics)
    }
}

impl<C, W> MixerServerState<C, W> {
    #[inline(always)]
    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    #[inline(always)]
    pub fn engine(&self) -> &MixingEngine<W> {
        &self.engine
    }

    #[inline(always)]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}
