use std::fmt;
use std::io;

use thiserror::Error;

use crate::compression::FileCompression;

/// Failure reported by a codec library call.
///
/// `status` is the codec's own numeric status code (for bzip2 these are the
/// `BZ_*` values). `errno` is only captured when the status means "generic
/// I/O failure"; for every other status it is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    /// Codec name, e.g. `"bzip2"`.
    pub codec: &'static str,
    /// Lifecycle phase that failed, e.g. `"read failed"`.
    pub phase: &'static str,
    pub status: i32,
    pub errno: Option<i32>,
}

impl CodecError {
    pub fn new(codec: &'static str, phase: &'static str, status: i32) -> Self {
        Self {
            codec,
            phase,
            status,
            errno: None,
        }
    }

    /// Build an I/O-class failure, capturing the OS error number from `err`.
    pub fn with_errno(codec: &'static str, phase: &'static str, status: i32, err: &io::Error) -> Self {
        Self {
            codec,
            phase,
            status,
            errno: err.raw_os_error(),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}: {}", self.codec, self.phase, self.status)?;
        if let Some(errno) = self.errno {
            write!(f, " ({})", io::Error::from_raw_os_error(errno))?;
        }
        Ok(())
    }
}

impl std::error::Error for CodecError {}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An OS-level operation outside the codec failed (fsync, buffered write).
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// Syncing or closing the duplicated descriptor failed; `context` says
    /// which. Any codec finalisation error seen in the same `close()` is
    /// carried in `pending`.
    #[error("{context}: {source}")]
    Close {
        context: &'static str,
        #[source]
        source: io::Error,
        pending: Option<CodecError>,
    },

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("no codec registered for compression format '{0}'")]
    Unsupported(FileCompression),
}

impl Error {
    /// The codec error behind this failure, if any.
    ///
    /// For [`Error::Close`] this is the codec error that was pending when the
    /// descriptor failed to close.
    pub fn codec_error(&self) -> Option<&CodecError> {
        match self {
            Error::Codec(e) => Some(e),
            Error::Close { pending, .. } => pending.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
