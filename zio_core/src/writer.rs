use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use crate::codec::{Compressor, Fsync};
use crate::compression::FileCompression;
use crate::error::{Error, Result};
use crate::registry::CompressionFactory;

/// Compressed output endpoint built on the process-wide registry.
///
/// # Write contract
/// Call [`write`](Writer::write) any number of times with arbitrary-sized
/// byte slices, then [`finish`](Writer::finish) to finalise the compressed
/// stream. A writer dropped without `finish` still closes its compressor but
/// any error is only logged.
pub struct Writer {
    compressor: Box<dyn Compressor>,
    /// Original file when the writer created it; the compressor writes to a
    /// duplicate of this descriptor.
    file: Option<File>,
    raw_bytes: u64,
}

impl Writer {
    /// Create (or truncate) `path` and open a compressor on it.
    ///
    /// The format is taken from the path suffix when `compression` is `None`.
    pub fn create(path: impl AsRef<Path>, compression: Option<FileCompression>, sync: Fsync) -> Result<Self> {
        let path = path.as_ref();
        let compression = compression.unwrap_or_else(|| FileCompression::from_path(path));
        let file = File::create(path).map_err(|source| Error::Io {
            context: "creating output file",
            source,
        })?;
        let compressor = CompressionFactory::instance().create_compressor(compression, file.as_raw_fd(), sync)?;
        log::debug!("writing {} output to {}", compression, path.display());
        Ok(Self {
            compressor,
            file: Some(file),
            raw_bytes: 0,
        })
    }

    /// Open a compressor on a duplicate of `fd`. The caller keeps `fd`.
    pub fn from_fd(fd: RawFd, compression: FileCompression, sync: Fsync) -> Result<Self> {
        Ok(Self {
            compressor: CompressionFactory::instance().create_compressor(compression, fd, sync)?,
            file: None,
            raw_bytes: 0,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.compressor.write(data)?;
        self.raw_bytes += data.len() as u64;
        Ok(())
    }

    /// Uncompressed bytes accepted so far.
    pub fn raw_bytes(&self) -> u64 {
        self.raw_bytes
    }

    /// Close the compressor, then the original file if the writer owns it.
    ///
    /// Returns the number of uncompressed bytes written.
    pub fn finish(mut self) -> Result<u64> {
        self.compressor.close()?;
        if let Some(file) = self.file.take() {
            crate::fd::close(file).map_err(|source| Error::Close {
                context: "close failed",
                source,
                pending: None,
            })?;
        }
        Ok(self.raw_bytes)
    }
}
