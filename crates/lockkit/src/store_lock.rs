//! Exclusive advisory lock over a whole state file.
//!
//! The lock lives in a sibling file (`<state file>.lock`) so that it can be
//! held across the state database being opened, closed or replaced. The lock
//! file is never removed: unlinking it while another process waits on the
//! old inode would let a third process lock a fresh file concurrently.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Guard for the exclusive store lock; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Path of the lock file guarding `store_path`.
    pub fn lock_path_for(store_path: &Path) -> PathBuf {
        let mut name = store_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Acquire the lock, blocking while another process holds it.
    ///
    /// A non-blocking attempt is made first; on contention a notice is
    /// logged before waiting.
    pub fn acquire(store_path: &Path) -> Result<Self> {
        let path = Self::lock_path_for(store_path);
        let file = open_lock_file(&path)?;

        if try_lock_exclusive(&file).map_err(|source| Error::Lock {
            path: path.clone(),
            source,
        })? {
            log::debug!("Acquired store lock {}", path.display());
            return Ok(Self { file, path });
        }

        log::warn!(
            "Waiting for exclusive lock on {} (another process is using this state file)...",
            store_path.display()
        );
        lock_exclusive(&file).map_err(|source| Error::Lock {
            path: path.clone(),
            source,
        })?;
        log::debug!("Acquired store lock {} after waiting", path.display());

        Ok(Self { file, path })
    }

    /// Acquire the lock only if it is free right now.
    pub fn try_acquire(store_path: &Path) -> Result<Option<Self>> {
        let path = Self::lock_path_for(store_path);
        let file = open_lock_file(&path)?;

        let locked = try_lock_exclusive(&file).map_err(|source| Error::Lock {
            path: path.clone(),
            source,
        })?;
        if locked {
            Ok(Some(Self { file, path }))
        } else {
            Ok(None)
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = unlock(&self.file) {
            log::warn!("Failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}

/// Run `f` while holding the store lock.
///
/// The lock is released when `f` returns, whether it succeeded or not.
pub fn with_store_lock<T, E, F>(store_path: &Path, f: F) -> std::result::Result<T, E>
where
    F: FnOnce() -> std::result::Result<T, E>,
    E: From<Error>,
{
    let _guard = StoreLock::acquire(store_path)?;
    f()
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| Error::LockFile {
            path: path.to_path_buf(),
            source,
        })?;
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| Error::LockFile {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn flock(file: &File, operation: libc::c_int) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let ret = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if ret == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    match flock(file, libc::LOCK_EX | libc::LOCK_NB) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    flock(file, libc::LOCK_EX)
}

#[cfg(unix)]
fn unlock(file: &File) -> std::io::Result<()> {
    flock(file, libc::LOCK_UN)
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> std::io::Result<bool> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "store locking requires flock(2)",
    ))
}

#[cfg(not(unix))]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    try_lock_exclusive(file).map(|_| ())
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> std::io::Result<()> {
    Ok(())
}
