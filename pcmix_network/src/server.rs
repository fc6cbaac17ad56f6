//! Server-side listener.
//!
//! The listener is non-blocking: it is meant to be registered with a
//! readiness loop, and [`accept_channel`](Listener::accept_channel) called
//! once it reports the listener readable.

use crate::{IpcChannel, MessageChannel};
use std::{
    io,
    os::{
        fd::{AsRawFd, RawFd},
        unix::net::UnixListener,
    },
    path::{Path, PathBuf},
};

/// A source of incoming client channels.
pub trait Listener {
    type Channel: MessageChannel;

    /// Accepts one pending connection, or returns `None` if there is none.
    fn accept_channel(&self) -> io::Result<Option<Self::Channel>>;
}

/// A listening Unix-domain socket at a filesystem path.
///
/// The socket file is removed when the listener is dropped.
#[derive(Debug)]
pub struct IpcListener {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcListener {
    /// Binds a new listener at `path`.
    ///
    /// Fails if the path already exists. Removing a stale socket is left to the
    /// caller, who knows whether a previous instance is still alive.
    pub fn bind(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();

        let listener = UnixListener::bind(&path)?;
        listener.set_nonblocking(true)?;

        log::info!("listening on {}", path.display());

        Ok(Self { listener, path })
    }

    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Listener for IpcListener {
    type Channel = IpcChannel;

    fn accept_channel(&self) -> io::Result<Option<IpcChannel>> {
        loop {
            return match self.listener.accept() {
                Ok((stream, _)) => IpcChannel::new(stream).map(Some),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if crate::io_err_is_timeout(e.kind()) => Ok(None),
                Err(e) => Err(e),
            };
        }
    }
}

impl AsRawFd for IpcListener {
    #[inline(always)]
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}

impl Drop for IpcListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("failed to remove socket {}: {e}", self.path.display());
        }
    }
}
