//! Descriptor helpers shared by the descriptor-backed codecs.

use std::fs::File;
use std::io;
use std::os::fd::{FromRawFd, IntoRawFd, RawFd};

/// Duplicate `fd` into an independently owned [`File`].
///
/// The caller keeps ownership of `fd`; closing the returned file leaves it
/// open. The duplicate shares the file offset with the original, so data
/// written through one is positioned after data written through the other.
/// It is created close-on-exec, like every descriptor std opens.
pub fn duplicate(fd: RawFd) -> io::Result<File> {
    // SAFETY: F_DUPFD_CLOEXEC only reads the descriptor table; an invalid
    // `fd` is reported through errno.
    let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if dup < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `dup` is a freshly created descriptor nobody else owns.
    Ok(unsafe { File::from_raw_fd(dup) })
}

/// Close `file`, reporting the error that `Drop for File` would discard.
pub fn close(file: File) -> io::Result<()> {
    let fd = file.into_raw_fd();
    // SAFETY: ownership of `fd` was just released by `into_raw_fd`.
    if unsafe { libc::close(fd) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Flush `file` to stable storage, retrying when interrupted.
pub fn reliable_fsync(file: &File) -> io::Result<()> {
    loop {
        match file.sync_all() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
