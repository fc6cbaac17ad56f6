//! The periodic mixing tick.

use crate::{diagnostics::Diagnostics, registry::Registry};
use pcmix_network::{
    MessageChannel,
    pcmix_proto::{PAYLOAD_SIZE, SampleBlock},
};
use std::io;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Sessions given a last chance to contribute.
    pub polled: usize,
    /// Sessions whose audio is in this period.
    pub contributors: usize,
    /// Whether the period reached the device.
    pub written: bool,
    pub reaped: usize,
}

/// Owns the shared mix buffer and the output device.
#[derive(Debug)]
pub struct MixingEngine<W> {
    mix: SampleBlock,
    scratch: [u8; PAYLOAD_SIZE],
    device: W,
}

impl<W: io::Write> MixingEngine<W> {
    pub fn new(device: W) -> Self {
        Self {
            mix: SampleBlock::silence(),
            scratch: [0; PAYLOAD_SIZE],
            device,
        }
    }

    /// Closes the current period.
    ///
    /// Every session that hasn't contributed yet gets one non-blocking receive.
    /// Then the mix is written to the device, reset to silence, and disconnected
    /// sessions are reaped.
    ///
    /// Device errors are logged and counted, never propagated: the next period is
    /// attempted regardless.
    pub fn tick<C: MessageChannel>(
        &mut self,
        registry: &mut Registry<C>,
        diagnostics: &mut Diagnostics,
    ) -> TickReport {
        let mut report = TickReport::default();

        for session in registry
            .iter_mut()
            .filter(|s| !s.is_disconnected() && !s.contributed())
        {
            report.polled = report.polled.strict_add(1);
            let outcome = session.receive_and_apply(&mut self.mix);
            diagnostics.record(&outcome);
        }

        report.contributors = registry.iter().filter(|s| s.contributed()).count();

        self.mix.write_le_bytes(&mut self.scratch);
        report.written = self.write_period(diagnostics);

        self.mix.clear();
        for session in registry.iter_mut() {
            session.end_period();
        }

        report.reaped = registry.sweep(diagnostics);

        log::trace!("tick: {report:?}");

        report
    }

    fn write_period(&mut self, diagnostics: &mut Diagnostics) -> bool {
        match self.device.write(&self.scratch) {
            Ok(PAYLOAD_SIZE) => {
                diagnostics.periods_written = diagnostics.periods_written.strict_add(1);
                true
            }
            Ok(n) => {
                diagnostics.device_errors = diagnostics.device_errors.strict_add(1);
                log::warn!("short device write: {n} of {PAYLOAD_SIZE} bytes");
                false
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                diagnostics.periods_dropped = diagnostics.periods_dropped.strict_add(1);
                log::debug!("device busy, period dropped");
                false
            }
            Err(e) => {
                diagnostics.device_errors = diagnostics.device_errors.strict_add(1);
                log::error!("device write failed: {e}");
                false
            }
        }
    }

    #[inline(always)]
    pub fn mix_buffer(&self) -> &SampleBlock {
        &self.mix
    }

    #[inline(always)]
    pub fn mix_buffer_mut(&mut self) -> &mut SampleBlock {
        &mut self.mix
    }

    #[inline(always)]
    pub fn device(&self) -> &W {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{Scripted, ScriptedChannel, block_with};
    use pcmix_network::pcmix_proto::MixerMessage;

    fn periods(written: &[u8]) -> Vec<SampleBlock> {
        written
            .chunks(PAYLOAD_SIZE)
            .map(|c| SampleBlock::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn registry_with(
        n: usize,
        diag: &mut Diagnostics,
    ) -> (Registry<ScriptedChannel>, Vec<ScriptedChannel>) {
        let mut registry = Registry::new();
        let chans: Vec<_> = (0..n).map(|_| ScriptedChannel::default()).collect();
        for c in &chans {
            registry.insert(c.clone(), diag);
        }
        (registry, chans)
    }

    #[test]
    fn two_sessions_are_summed() {
        let mut diag = Diagnostics::default();
        let (mut registry, chans) = registry_with(2, &mut diag);
        let mut engine = MixingEngine::new(Vec::new());

        chans[0].push_audio(&block_with(1000));
        chans[1].push_audio(&block_with(2000));

        let report = engine.tick(&mut registry, &mut diag);
        assert_eq!(report.polled, 2);
        assert_eq!(report.contributors, 2);
        assert!(report.written);

        let out = periods(engine.device());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples()[0], 3000);
        assert!(out[0].samples()[1..].iter().all(|&s| s == 0));

        // the buffer is silent again for the next period
        assert!(engine.mix_buffer().is_silent());
        assert!(registry.iter().all(|s| !s.contributed()));
    }

    #[test]
    fn mixing_saturates() {
        let mut diag = Diagnostics::default();
        let (mut registry, chans) = registry_with(3, &mut diag);
        let mut engine = MixingEngine::new(Vec::new());

        for c in &chans {
            c.push_audio(&block_with(20_000));
        }

        engine.tick(&mut registry, &mut diag);
        assert_eq!(periods(engine.device())[0].samples()[0], i16::MAX);
    }

    #[test]
    fn silence_is_written_without_contributors() {
        let mut diag = Diagnostics::default();
        let (mut registry, _chans) = registry_with(2, &mut diag);
        let mut engine = MixingEngine::new(Vec::new());

        let report = engine.tick(&mut registry, &mut diag);
        assert_eq!(report.contributors, 0);

        // also with no session at all
        let mut empty = Registry::<ScriptedChannel>::new();
        engine.tick(&mut empty, &mut diag);

        let out = periods(engine.device());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(SampleBlock::is_silent));
        assert_eq!(diag.periods_written, 2);
    }

    #[test]
    fn late_payload_is_dropped_and_counted() {
        let mut diag = Diagnostics::default();
        let (mut registry, chans) = registry_with(1, &mut diag);
        let mut engine = MixingEngine::new(Vec::new());

        // period 1: both payloads arrive before the tick
        chans[0].push_audio(&block_with(7));
        chans[0].push_audio(&block_with(9));

        let session = registry.iter_mut().next().unwrap();
        let mix = engine.mix_buffer_mut();
        session.receive_and_apply(mix);
        let outcome = session.receive_and_apply(mix);
        diag.record(&outcome);

        let report = engine.tick(&mut registry, &mut diag);
        // already contributed, so not polled again
        assert_eq!(report.polled, 0);

        let session = registry.iter().next().unwrap();
        assert!(!session.contributed());
        assert_eq!(session.pending_count(), 1);
        assert_eq!(diag.messages_deferred, 1);

        // period 2: the dropped payload isn't replayed
        engine.tick(&mut registry, &mut diag);

        let out = periods(engine.device());
        assert_eq!(out[0].samples()[0], 7);
        assert!(out[1].is_silent());
        assert_eq!(registry.iter().next().unwrap().pending_count(), 1);
    }

    #[test]
    fn tick_reaps_disconnected_sessions() {
        let mut diag = Diagnostics::default();
        let (mut registry, chans) = registry_with(3, &mut diag);
        let mut engine = MixingEngine::new(Vec::new());

        chans[1].push(Scripted::Message(MixerMessage::Disconnect));
        chans[2].push_audio(&block_with(5));

        let report = engine.tick(&mut registry, &mut diag);

        assert_eq!(report.reaped, 1);
        assert_eq!(
            registry.iter().map(|s| s.id().0).collect::<Vec<_>>(),
            [0, 2]
        );
        assert_eq!(diag.connected_clients, 2);
        assert_eq!(periods(engine.device())[0].samples()[0], 5);
    }

    struct FailingDevice(io::ErrorKind);

    impl io::Write for FailingDevice {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(self.0.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn device_errors_do_not_stop_the_engine() {
        let mut diag = Diagnostics::default();
        let (mut registry, chans) = registry_with(1, &mut diag);
        let mut engine = MixingEngine::new(FailingDevice(io::ErrorKind::Other));

        chans[0].push_audio(&block_with(1));

        let report = engine.tick(&mut registry, &mut diag);
        assert!(!report.written);
        assert_eq!(diag.device_errors, 1);

        // state was still reset
        assert!(engine.mix_buffer().is_silent());
        assert!(!registry.iter().next().unwrap().contributed());

        engine.tick(&mut registry, &mut diag);
        assert_eq!(diag.device_errors, 2);
    }

    #[test]
    fn busy_device_drops_the_period() {
        let mut diag = Diagnostics::default();
        let mut registry = Registry::<ScriptedChannel>::new();
        let mut engine = MixingEngine::new(FailingDevice(io::ErrorKind::WouldBlock));

        engine.tick(&mut registry, &mut diag);

        assert_eq!(diag.periods_dropped, 1);
        assert_eq!(diag.device_errors, 0);
    }
}
