//! The `pcmix` mixing server.
//!
//! Local producers connect over a Unix-domain socket and stream fixed-size PCM
//! payloads. Every period, whatever arrived is summed into a single block,
//! written to the sound device, and the block is reset to silence.
//!
//! Everything runs on one thread: [`reactor::Reactor`] waits for readiness and
//! dispatches to [`state::MixerServerState`], which owns the sessions, the mix
//! buffer and the device.

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod reactor;
pub mod registry;
pub mod session;
pub mod state;

pub use pcmix_network as network;
pub use pcmix_utils as utils;

pub use config::{Cli, ServerConfig};
pub use error::ServerError;
pub use state::MixerServerState;

use network::IpcListener;
use std::{fs, io, path::Path, sync::atomic::AtomicBool};
use utils::lock::LockFile;

/// Removes a socket left behind by a previous instance.
///
/// Only called while holding the lock, so nobody else can be listening on it.
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Starts the server and runs it until `shutdown` is set.
///
/// Acquires the lock, binds the listener, opens the device, in that order. All
/// three are released on return.
pub fn run(config: &ServerConfig, shutdown: &AtomicBool) -> Result<(), ServerError> {
    config.validate()?;

    let _lock = LockFile::acquire(&config.lock_path)?;

    let listener_unavailable = |source| ServerError::ListenerUnavailable {
        path: config.socket_path.clone(),
        source,
    };

    remove_stale_socket(&config.socket_path).map_err(listener_unavailable)?;
    let listener = IpcListener::bind(&config.socket_path).map_err(listener_unavailable)?;

    let device = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&config.device_path)
        .map_err(|source| ServerError::Device {
            path: config.device_path.clone(),
            source,
        })?;

    log::info!(
        "mixing into {} every {:?}",
        config.device_path.display(),
        config.tick_interval(),
    );

    let mut state = MixerServerState::new(device);
    let mut reactor = reactor::Reactor::new(config.tick_interval());

    reactor.run(&listener, &mut state, shutdown)?;

    let d = state.diagnostics();
    log::info!(
        "{} client(s) served, {} period(s) written, {} dropped, {} device error(s)",
        d.accepted_total,
        d.periods_written,
        d.periods_dropped,
        d.device_errors,
    );

    Ok(())
}
