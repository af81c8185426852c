use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use crate::codec::Decompressor;
use crate::compression::FileCompression;
use crate::error::{Error, Result};
use crate::registry::CompressionFactory;

/// Compressed input endpoint built on the process-wide registry.
///
/// # Read contract
/// [`read_chunk`](Reader::read_chunk) yields decompressed chunks until it
/// returns an empty one. The reader also implements [`io::Read`], so it can
/// be handed to `io::copy` or wrapped in a `BufReader`.
///
/// A reader over a buffer borrows it for `'a`; descriptor-backed readers are
/// `Reader<'static>`.
pub struct Reader<'a> {
    decompressor: Box<dyn Decompressor + 'a>,
    file: Option<File>,
    /// Chunk partially handed out through `io::Read`.
    pending: Vec<u8>,
    pending_pos: usize,
    raw_bytes: u64,
}

impl Reader<'static> {
    /// Open `path` and a decompressor on it.
    ///
    /// The format is taken from the path suffix when `compression` is `None`.
    pub fn open(path: impl AsRef<Path>, compression: Option<FileCompression>) -> Result<Self> {
        let path = path.as_ref();
        let compression = compression.unwrap_or_else(|| FileCompression::from_path(path));
        let file = File::open(path).map_err(|source| Error::Io {
            context: "opening input file",
            source,
        })?;
        let decompressor = CompressionFactory::instance().create_decompressor(compression, file.as_raw_fd())?;
        log::debug!("reading {} input from {}", compression, path.display());
        Ok(Self::with_decompressor(decompressor, Some(file)))
    }

    /// Open a decompressor on a duplicate of `fd`. The caller keeps `fd`.
    pub fn from_fd(fd: RawFd, compression: FileCompression) -> Result<Self> {
        let decompressor = CompressionFactory::instance().create_decompressor(compression, fd)?;
        Ok(Self::with_decompressor(decompressor, None))
    }
}

impl<'a> Reader<'a> {
    /// Decompress `buffer` in place, without a descriptor.
    pub fn from_buffer(buffer: &'a [u8], compression: FileCompression) -> Result<Self> {
        let decompressor = CompressionFactory::instance().create_buffer_decompressor(compression, buffer)?;
        Ok(Self::with_decompressor(decompressor, None))
    }

    fn with_decompressor(decompressor: Box<dyn Decompressor + 'a>, file: Option<File>) -> Self {
        Self {
            decompressor,
            file,
            pending: Vec::new(),
            pending_pos: 0,
            raw_bytes: 0,
        }
    }

    /// Next decompressed chunk; empty once the input is exhausted.
    pub fn read_chunk(&mut self) -> Result<Vec<u8>> {
        if self.pending_pos < self.pending.len() {
            let rest = self.pending.split_off(self.pending_pos);
            self.pending.clear();
            self.pending_pos = 0;
            return Ok(rest);
        }
        let chunk = self.decompressor.read()?;
        self.raw_bytes += chunk.len() as u64;
        Ok(chunk)
    }

    /// Read every remaining chunk into one buffer.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read_chunk()?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    /// Decompressed bytes produced so far.
    pub fn raw_bytes(&self) -> u64 {
        self.raw_bytes
    }

    /// Close the decompressor, then the original file if the reader owns it.
    pub fn close(mut self) -> Result<()> {
        self.decompressor.close()?;
        if let Some(file) = self.file.take() {
            crate::fd::close(file).map_err(|source| Error::Close {
                context: "close failed",
                source,
                pending: None,
            })?;
        }
        Ok(())
    }
}

impl io::Read for Reader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending_pos == self.pending.len() {
            self.pending = self.decompressor.read().map_err(io::Error::other)?;
            self.pending_pos = 0;
            self.raw_bytes += self.pending.len() as u64;
        }
        let available = &self.pending[self.pending_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        Ok(n)
    }
}
