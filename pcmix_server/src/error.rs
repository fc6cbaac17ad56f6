use crate::config::ConfigError;
use pcmix_utils::lock::LockError;
use std::{io, path::PathBuf};

/// Fatal errors, each with its own process exit code.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Audio mixer is already running.")]
    AlreadyRunning,
    #[error(transparent)]
    Lock(LockError),
    #[error("cannot listen on {}: {source}", .path.display())]
    ListenerUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot open sound device {}: {source}", .path.display())]
    Device {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("event loop failed: {0}")]
    Io(#[from] io::Error),
}

impl From<LockError> for ServerError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::AlreadyRunning { .. } => Self::AlreadyRunning,
            e => Self::Lock(e),
        }
    }
}

impl ServerError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Lock(_) | Self::Io(_) => 1,
            Self::Config(_) => 2,
            Self::AlreadyRunning => 3,
            Self::ListenerUnavailable { .. } => 4,
            Self::Device { .. } => 5,
        }
    }
}
