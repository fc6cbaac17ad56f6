//! Single-instance lock marker.
//!
//! A server instance holds the lock for as long as it runs. The marker is a
//! plain file at a well-known path: if it can be opened for reading, another
//! instance is considered to be running.
//!
//! Acquisition and release are symmetric: dropping the [`LockFile`] removes
//! the marker. A marker left behind by a crashed instance has to be removed
//! by hand.

use std::{fs, io, io::Write, path::{Path, PathBuf}};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock {} is held by another instance", .path.display())]
    AlreadyRunning { path: PathBuf },
    #[error("failed to create lock {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A held lock marker. Removed on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Takes the lock at `path`.
    ///
    /// Fails with [`LockError::AlreadyRunning`] if the marker is readable, or if
    /// another process creates it concurrently.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();

        if fs::File::open(&path).is_ok() {
            return Err(LockError::AlreadyRunning { path });
        }

        let res = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);

        let mut file = match res {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(LockError::AlreadyRunning { path });
            }
            Err(source) => return Err(LockError::Create { path, source }),
        };

        // informational only, nothing reads it back
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            log::debug!("could not record pid in {}: {e}", path.display());
        }

        log::debug!("acquired lock {}", path.display());

        Ok(Self { path })
    }

    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("released lock {}", self.path.display()),
            Err(e) => log::warn!("failed to release lock {}: {e}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixer.lock");

        let lock = LockFile::acquire(&path).unwrap();
        assert!(path.exists());

        let err = LockFile::acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::AlreadyRunning { .. }));

        drop(lock);
        assert!(!path.exists());

        let _again = LockFile::acquire(&path).unwrap();
    }

    #[test]
    fn stale_marker_counts_as_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixer.lock");
        fs::write(&path, b"").unwrap();

        assert!(matches!(
            LockFile::acquire(&path),
            Err(LockError::AlreadyRunning { .. })
        ));
        // the stale marker is not ours to remove
        assert!(path.exists());
    }

    #[test]
    fn missing_parent_is_a_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("mixer.lock");

        assert!(matches!(
            LockFile::acquire(&path),
            Err(LockError::Create { .. })
        ));
    }
}
