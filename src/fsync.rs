//! Platform-specific durable sync
//!
//! Each platform has a different strongest primitive for "this data is on
//! persistent media". This module maps both halves of an atomic replace —
//! syncing the file contents and syncing the directory entry after the
//! rename — to that primitive.

use std::fs::File;
use std::io;
use std::path::Path;

/// Ensure a file's data is durably written before returning.
///
/// Platform behaviors:
/// - Linux: fdatasync() - syncs data but not metadata (faster than fsync)
/// - macOS/iOS: fcntl(F_FULLFSYNC) - bypasses the disk write cache; plain
///   fsync() on Apple platforms stops at the volatile cache
/// - Windows: FlushFileBuffers()
/// - Other: File::sync_data() fallback
///
/// May block for milliseconds under heavy I/O; callers must not hold locks
/// that readers need while calling this.
pub fn sync_file(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fdatasync is a POSIX call on a file descriptor obtained
        // from a live File reference, so the fd is open and valid.
        let rc = unsafe { libc::fdatasync(fd) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fcntl(F_FULLFSYNC) operates on a valid open fd obtained
        // from a live File reference.
        let rc = unsafe { libc::fcntl(fd, libc::F_FULLFSYNC) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        let handle = file.as_raw_handle();
        // SAFETY: FlushFileBuffers is called on a valid handle obtained from
        // a live File reference.
        let rc = unsafe { FlushFileBuffers(handle as *mut _) };
        if rc != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "ios",
        target_os = "windows"
    )))]
    {
        file.sync_data()
    }
}

/// Ensure a directory entry change (a rename or delete) is durable.
///
/// On unix the directory itself is fsync'd; a rename is only guaranteed to
/// survive power loss once its parent directory has been synced. Windows has
/// no stable equivalent for directory handles opened from std, and NTFS
/// journals the rename, so this is a no-op there.
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let handle = File::open(dir)?;
        // SAFETY: fsync on the directory's own fd, open for the duration of
        // this call. fsync (not fdatasync) because the entry metadata is the
        // point here.
        let rc = unsafe { libc::fsync(handle.as_raw_fd()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(())
    }
}
