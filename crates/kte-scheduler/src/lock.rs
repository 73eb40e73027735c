//! Single-instance OS file lock with stale-lock reclaim (C11, spec §4.11).
//!
//! `std::fs::OpenOptions::create_new` gives us an atomic exclusive create
//! with no extra crate; staleness is judged by the lock file's mtime plus a
//! liveness check on the PID it records, via `libc::kill(pid, 0)` (signal 0:
//! existence probe, no signal actually delivered).

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A lock is reclaimable once it is older than this *and* its recorded PID
/// is no longer alive.
const STALE_AFTER: chrono::Duration = chrono::Duration::hours(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockError {
    /// Another instance holds the lock and is either still running or the
    /// lock is not yet old enough to presume abandoned.
    AlreadyRunning { pid: u32, age_secs: i64 },
    Io(String),
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::AlreadyRunning { pid, age_secs } => {
                write!(f, "another instance (pid {pid}) holds the lock, last touched {age_secs}s ago")
            }
            LockError::Io(msg) => write!(f, "instance lock I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LockError {}

/// Held for the process lifetime; [`Drop`] removes the lock file so a clean
/// exit never needs an explicit release call, though [`InstanceLock::release`]
/// lets a graceful-shutdown path do so before the process actually ends.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    released: bool,
}

impl InstanceLock {
    /// Acquires the lock at `path`, reclaiming it if the recorded PID is no
    /// longer alive and the file is older than one hour (spec §4.11).
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        match Self::try_create(&path) {
            Ok(()) => return Ok(InstanceLock { path, released: false }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(LockError::Io(e.to_string())),
        }

        let (pid, age) = Self::inspect(&path).map_err(|e| LockError::Io(e.to_string()))?;
        if age < STALE_AFTER || process_alive(pid) {
            return Err(LockError::AlreadyRunning { pid, age_secs: age.num_seconds() });
        }

        tracing::warn!(pid, age_secs = age.num_seconds(), "reclaiming stale instance lock");
        std::fs::remove_file(&path).map_err(|e| LockError::Io(e.to_string()))?;
        Self::try_create(&path).map_err(|e| LockError::Io(e.to_string()))?;
        Ok(InstanceLock { path, released: false })
    }

    fn try_create(path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(())
    }

    fn inspect(path: &Path) -> std::io::Result<(u32, chrono::Duration)> {
        let content = std::fs::read_to_string(path)?;
        let pid: u32 = content.trim().parse().unwrap_or(0);
        let modified = std::fs::metadata(path)?.modified()?;
        let age = chrono::Duration::from_std(modified.elapsed().unwrap_or_default()).unwrap_or_default();
        Ok((pid, age))
    }

    /// Releases the lock immediately, idempotent. Called on graceful
    /// SIGINT/SIGTERM shutdown before the process actually exits (spec
    /// §4.11); also runs implicitly via [`Drop`] on any other exit path.
    pub fn release(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
            self.released = true;
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    // Signal 0 probes for existence/permission without delivering anything.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}
