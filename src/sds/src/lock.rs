//! Advisory file locking for write-open datasets. Acquired with
//! `flock(2)` on Unix; a no-op elsewhere, since there's no portable
//! equivalent in this dependency stack.

use crate::error::{IoErrorKind, SdsError, SdsResult};
use std::fs::File;

const SITE_ACQUIRE: &str = "lock::acquire_exclusive";
const SITE_PROBE: &str = "lock::file_is_locked";

#[cfg(unix)]
mod imp {
    use std::os::unix::io::AsRawFd;

    pub fn try_lock_exclusive(file: &std::fs::File) -> std::io::Result<bool> {
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            Ok(true)
        } else {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                Ok(false)
            } else {
                Err(err)
            }
        }
    }

    pub fn try_lock_shared_probe(file: &std::fs::File) -> std::io::Result<bool> {
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_SH | libc::LOCK_NB) };
        if rc == 0 {
            unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
            Ok(false)
        } else {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                Ok(true)
            } else {
                Err(err)
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub fn try_lock_exclusive(_file: &std::fs::File) -> std::io::Result<bool> {
        Ok(true)
    }

    pub fn try_lock_shared_probe(_file: &std::fs::File) -> std::io::Result<bool> {
        Ok(false)
    }
}

/// Attempts to take an exclusive advisory lock on `file`, as done when a
/// dataset is opened for writing. Fails with
/// `SdsError::Io(LockConflict)` if another writer already holds it.
pub fn acquire_exclusive(file: &File) -> SdsResult<()> {
    match imp::try_lock_exclusive(file) {
        Ok(true) => {
            log::debug!("advisory lock acquired");
            Ok(())
        }
        Ok(false) => Err(SdsError::io(SITE_ACQUIRE, IoErrorKind::LockConflict)),
        Err(e) => Err(SdsError::io(SITE_ACQUIRE, IoErrorKind::Other(e))),
    }
}

/// Probes whether `file` is currently locked by another writer, without
/// taking or holding a lock itself.
pub fn file_is_locked(file: &File) -> SdsResult<bool> {
    imp::try_lock_shared_probe(file).map_err(|e| SdsError::io(SITE_PROBE, IoErrorKind::Other(e)))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    #[test]
    fn exclusive_lock_then_probe_detects_conflict() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("sds-lock-test-{}", std::process::id()));
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&path).unwrap();
        acquire_exclusive(&file).unwrap();

        let other = OpenOptions::new().read(true).open(&path).unwrap();
        assert!(file_is_locked(&other).unwrap());

        drop(file);
        let _ = std::fs::remove_file(&path);
    }
}
