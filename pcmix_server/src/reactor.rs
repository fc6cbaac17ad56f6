//! Single-threaded event loop.
//!
//! Each turn, a readiness list is built from the listener and every live
//! session that has yet to contribute to the current period, and handed to
//! `poll(2)` with a timeout bounded by the next mixing deadline. Ready entries
//! are dispatched to [`MixerServerState`], then the tick runs if its deadline
//! has passed.
//!
//! Frames a client sends ahead of the mix stay in its socket until the period
//! they belong to, so a fast producer is throttled by its own send buffer.

use crate::{session::SessionId, state::MixerServerState};
use pcmix_network::{Listener, MessageChannel};
use pcmix_utils::PeriodTimer;
use std::{
    io,
    os::fd::{AsRawFd, RawFd},
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

/// An event the loop can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Accept,
    SessionReadable(SessionId),
    TimerFired,
}

#[derive(Debug)]
pub struct Reactor {
    timer: PeriodTimer,
    fds: Vec<libc::pollfd>,
    actions: Vec<Action>,
    ready: Vec<Action>,
}

#[inline(always)]
fn poll_in(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

/// Rounds up, so that the loop never wakes up just before a deadline.
fn poll_timeout(d: Duration) -> libc::c_int {
    libc::c_int::try_from(d.as_micros().div_ceil(1000)).unwrap_or(libc::c_int::MAX)
}

impl Reactor {
    pub fn new(period: Duration) -> Self {
        Self {
            timer: PeriodTimer::new(period, Instant::now()),
            fds: Vec::new(),
            actions: Vec::new(),
            ready: Vec::new(),
        }
    }

    /// Runs until `shutdown` is set.
    pub fn run<L, C, W>(
        &mut self,
        listener: &L,
        state: &mut MixerServerState<C, W>,
        shutdown: &AtomicBool,
    ) -> io::Result<()>
    where
        L: Listener<Channel = C> + AsRawFd,
        C: MessageChannel + AsRawFd,
        W: io::Write,
    {
        self.timer.reset(Instant::now());

        while !shutdown.load(Ordering::Relaxed) {
            self.turn(listener, state)?;
        }

        log::info!("shutting down");

        Ok(())
    }

    /// Waits for at most one period and dispatches whatever became ready.
    pub fn turn<L, C, W>(
        &mut self,
        listener: &L,
        state: &mut MixerServerState<C, W>,
    ) -> io::Result<()>
    where
        L: Listener<Channel = C> + AsRawFd,
        C: MessageChannel + AsRawFd,
        W: io::Write,
    {
        self.build_readiness_list(listener, state);

        let timeout = poll_timeout(self.timer.time_until_deadline(Instant::now()));

        // SAFETY: `fds` is a valid, initialized slice of pollfd for the whole call
        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout,
            )
        };

        self.ready.clear();

        if n < 0 {
            let e = io::Error::last_os_error();
            // a signal, the shutdown flag is checked by the caller
            if e.kind() != io::ErrorKind::Interrupted {
                return Err(e);
            }
        } else if n > 0 {
            self.ready.extend(
                self.fds
                    .iter()
                    .zip(&self.actions)
                    .filter(|(fd, _)| fd.revents != 0)
                    .map(|(_, &action)| action),
            );
        }

        let expired = self.timer.poll_expired(Instant::now());

        if expired > 1 {
            log::debug!("{} mixing period(s) missed", expired - 1);
        }

        if expired > 0 {
            self.ready.push(Action::TimerFired);
        }

        for i in 0..self.ready.len() {
            dispatch(self.ready[i], listener, state);
        }

        Ok(())
    }

    fn build_readiness_list<L, C, W>(&mut self, listener: &L, state: &MixerServerState<C, W>)
    where
        L: AsRawFd,
        C: AsRawFd,
    {
        self.fds.clear();
        self.actions.clear();

        self.fds.push(poll_in(listener.as_raw_fd()));
        self.actions.push(Action::Accept);

        for session in state.registry() {
            // disconnected sessions wait for the next sweep, and a session that
            // already contributed is left unread until the next period
            if session.is_disconnected() || session.contributed() {
                continue;
            }

            if let Some(channel) = session.channel() {
                self.fds.push(poll_in(channel.as_raw_fd()));
                self.actions.push(Action::SessionReadable(session.id()));
            }
        }
    }

    /// The actions registered by the last turn, in readiness-list order.
    #[inline(always)]
    pub fn registered(&self) -> &[Action] {
        &self.actions
    }
}

fn dispatch<L, C, W>(action: Action, listener: &L, state: &mut MixerServerState<C, W>)
where
    L: Listener<Channel = C>,
    C: MessageChannel,
    W: io::Write,
{
    match action {
        Action::Accept => {
            if let Err(e) = state.on_accept(listener) {
                log::warn!("failed to accept client: {e}");
            }
        }
        Action::SessionReadable(id) => {
            state.on_session_readable(id);
        }
        Action::TimerFired => {
            state.on_timer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_round_up_to_milliseconds() {
        assert_eq!(poll_timeout(Duration::ZERO), 0);
        assert_eq!(poll_timeout(Duration::from_micros(1)), 1);
        assert_eq!(poll_timeout(Duration::from_millis(2)), 2);
        assert_eq!(poll_timeout(Duration::from_micros(2001)), 3);
        assert_eq!(poll_timeout(Duration::MAX), libc::c_int::MAX);
    }
}
