//! Cross-process single-instance guard.
//!
//! [`PidFileLock`] is advisory: it records the owner's process id in a marker
//! file and treats the marker as held while that process is alive. Two
//! processes claiming at the same instant can both succeed, and a recycled
//! process id can make a stale marker look live. Both are accepted limits of
//! a pid-file scheme; swap in another [`InstanceLock`] if stronger exclusion
//! is needed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, SimError};

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// The marker now names this process.
    Acquired,
    /// A live process owns the marker.
    HeldBy(u32),
}

/// Exclusivity token guarding the simulation loop across processes.
pub trait InstanceLock: Send + Sync {
    /// Claims the lock, reclaiming it from dead or unreadable owners.
    fn acquire(&self) -> Result<LockStatus>;

    /// Gives the lock up. Releasing a lock that is not held is not an error.
    fn release(&self) -> Result<()>;

    /// Whether a live owner currently holds the lock.
    fn is_held(&self) -> bool;
}

/// Pid-file lock marker.
#[derive(Debug, Clone)]
pub struct PidFileLock {
    path: PathBuf,
}

/// What the marker file currently says.
enum Marker {
    Absent,
    Owner(u32),
    Corrupt,
}

impl PidFileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_marker(&self) -> Marker {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(pid) if pid > 0 => Marker::Owner(pid),
                _ => Marker::Corrupt,
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Marker::Absent,
            Err(_) => Marker::Corrupt,
        }
    }

    fn remove_marker(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.lock_error(e)),
        }
    }

    fn lock_error(&self, e: io::Error) -> SimError {
        SimError::Lock {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

impl InstanceLock for PidFileLock {
    fn acquire(&self) -> Result<LockStatus> {
        match self.read_marker() {
            Marker::Owner(pid) if process_alive(pid) => return Ok(LockStatus::HeldBy(pid)),
            Marker::Owner(pid) => {
                info!(pid, path = %self.path.display(), "reclaiming stale lock marker");
                self.remove_marker()?;
            }
            Marker::Corrupt => {
                warn!(path = %self.path.display(), "lock marker unreadable, reclaiming");
                self.remove_marker()?;
            }
            Marker::Absent => {}
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.lock_error(e))?;
            }
        }
        fs::write(&self.path, std::process::id().to_string()).map_err(|e| self.lock_error(e))?;
        Ok(LockStatus::Acquired)
    }

    fn release(&self) -> Result<()> {
        self.remove_marker()
    }

    fn is_held(&self) -> bool {
        matches!(self.read_marker(), Marker::Owner(pid) if process_alive(pid))
    }
}

/// Probes `pid` with signal 0; nothing is delivered.
///
/// `EPERM` means the process exists under another user, so it counts as alive.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // SAFETY: kill with signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(raw, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Without a portable probe every recorded owner is assumed alive.
#[cfg(not(unix))]
pub fn process_alive(pid: u32) -> bool {
    pid > 0
}
