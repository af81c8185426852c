//! Adapters that turn `std::io` encoder/decoder wrappers into registry
//! codecs.
//!
//! Codecs whose crates already expose streaming `Write`/`Read` wrappers
//! (gzip, zstd, lz4, pass-through) only need to say how to build the wrapper
//! and how to get the descriptor back out of it; descriptor duplication,
//! close ordering, fsync and end-of-input handling live here.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::RawFd;
use std::sync::Arc;

use zio_core::codec::{Compressor, Decompressor, Fsync, INPUT_BUFFER_SIZE};
use zio_core::error::{CodecError, Error, Result};
use zio_core::fd;

/// Generic "I/O failure" status for codecs without their own status codes.
pub const STATUS_IO_ERROR: i32 = -1;
/// Generic "malformed input" status.
pub const STATUS_DATA_ERROR: i32 = -3;

/// Classify an error surfaced through an `io` wrapper.
pub(crate) fn io_failure(codec: &'static str, phase: &'static str, err: &io::Error) -> CodecError {
    if err.raw_os_error().is_some() {
        CodecError::with_errno(codec, phase, STATUS_IO_ERROR, err)
    } else {
        CodecError::new(codec, phase, STATUS_DATA_ERROR)
    }
}

/// Fsync (if requested) and close a compressor's descriptor, then report
/// `finished`, the outcome of writing the stream trailer.
///
/// The descriptor is closed whatever `finished` says. A descriptor failure
/// wins and carries the trailer error as the `pending` of [`Error::Close`].
pub(crate) fn close_output(
    codec: &'static str,
    file: File,
    sync: Fsync,
    finished: std::result::Result<(), CodecError>,
) -> Result<()> {
    let synced = match sync {
        Fsync::Yes => fd::reliable_fsync(&file),
        Fsync::No => Ok(()),
    };
    let closed = fd::close(file);
    let (context, source) = match (synced, closed) {
        (Ok(()), Ok(())) => return finished.map_err(Error::from),
        (Err(source), closed) => {
            if let Err(e) = closed {
                log::warn!("{codec}: close failed after fsync failure: {e}");
            }
            ("fsync failed", source)
        }
        (Ok(()), Err(source)) => ("close failed", source),
    };
    Err(Error::Close {
        context,
        source,
        pending: finished.err(),
    })
}

/// Write side of a compressor's descriptor, handed to its encoder.
///
/// The compressor holds a second reference, so the descriptor stays reachable
/// for fsync and close even when the encoder fails and is dropped.
pub struct EncoderSink(Arc<File>);

impl Write for EncoderSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

/// A streaming encoder that writes into an [`EncoderSink`].
pub trait Encoder: Write + Send + Sized {
    /// Write the stream trailer.
    fn finish_stream(self) -> io::Result<()>;
}

impl Encoder for EncoderSink {
    fn finish_stream(mut self) -> io::Result<()> {
        self.flush()
    }
}

/// A streaming decoder; `into_file` returns the descriptor it reads from, if
/// it has one.
pub trait Decoder: Read + Send {
    fn into_file(self) -> Option<File>;
}

impl Decoder for File {
    fn into_file(self) -> Option<File> {
        Some(self)
    }
}

impl Decoder for &[u8] {
    fn into_file(self) -> Option<File> {
        None
    }
}

pub struct EncoderCompressor<E: Encoder> {
    codec: &'static str,
    /// `None` once closed.
    encoder: Option<E>,
    file: Option<Arc<File>>,
    sync: Fsync,
}

impl<E: Encoder> EncoderCompressor<E> {
    pub fn open(
        codec: &'static str,
        fd: RawFd,
        sync: Fsync,
        make: impl FnOnce(EncoderSink) -> io::Result<E>,
    ) -> Result<Self> {
        let file = Arc::new(fd::duplicate(fd).map_err(|e| io_failure(codec, "write open failed", &e))?);
        let encoder =
            make(EncoderSink(Arc::clone(&file))).map_err(|e| io_failure(codec, "write open failed", &e))?;
        log::debug!("{}: write open on fd {}", codec, fd);
        Ok(Self {
            codec,
            encoder: Some(encoder),
            file: Some(file),
            sync,
        })
    }
}

impl<E: Encoder> Compressor for EncoderCompressor<E> {
    fn name(&self) -> &'static str {
        self.codec
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let encoder = self.encoder.as_mut().ok_or(Error::Closed("compressor"))?;
        encoder
            .write_all(data)
            .map_err(|e| io_failure(self.codec, "write failed", &e))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(encoder) = self.encoder.take() else {
            return Ok(());
        };
        // Finishing consumes the encoder, releasing the sink's reference.
        let finished = encoder
            .finish_stream()
            .map_err(|e| io_failure(self.codec, "write close failed", &e));
        let Some(file) = self.file.take().and_then(Arc::into_inner) else {
            return finished.map_err(Error::from);
        };
        close_output(self.codec, file, self.sync, finished)?;
        log::debug!("{}: write close", self.codec);
        Ok(())
    }
}

impl<E: Encoder> Drop for EncoderCompressor<E> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("{}: ignoring error while dropping compressor: {e}", self.codec);
        }
    }
}

pub struct DecoderDecompressor<D: Decoder> {
    codec: &'static str,
    /// `None` once closed.
    decoder: Option<D>,
    stream_end: bool,
    /// Buffer decoders stop at their first failure; descriptor decoders
    /// report it and leave end-of-input unset.
    end_on_error: bool,
}

impl<D: Decoder> DecoderDecompressor<D> {
    /// Wrap a decoder over a resident buffer.
    pub fn new(codec: &'static str, decoder: D) -> Self {
        Self {
            codec,
            decoder: Some(decoder),
            stream_end: false,
            end_on_error: true,
        }
    }

    /// Duplicate `fd` and build a decoder reading from the duplicate.
    pub fn open(codec: &'static str, fd: RawFd, make: impl FnOnce(File) -> io::Result<D>) -> Result<Self> {
        let file = fd::duplicate(fd).map_err(|e| io_failure(codec, "read open failed", &e))?;
        let decoder = make(file).map_err(|e| io_failure(codec, "read open failed", &e))?;
        log::debug!("{}: read open on fd {}", codec, fd);
        Ok(Self {
            codec,
            decoder: Some(decoder),
            stream_end: false,
            end_on_error: false,
        })
    }
}

impl<D: Decoder> Decompressor for DecoderDecompressor<D> {
    fn name(&self) -> &'static str {
        self.codec
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        if self.stream_end {
            return Ok(Vec::new());
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(Vec::new());
        };

        let mut buffer = vec![0; INPUT_BUFFER_SIZE];
        let nread = loop {
            match decoder.read(&mut buffer) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.stream_end = self.end_on_error;
                    return Err(io_failure(self.codec, "read failed", &e).into());
                }
            }
        };
        if nread == 0 {
            self.stream_end = true;
        }
        buffer.truncate(nread);
        Ok(buffer)
    }

    fn close(&mut self) -> Result<()> {
        let Some(decoder) = self.decoder.take() else {
            return Ok(());
        };
        if let Some(file) = decoder.into_file() {
            fd::close(file).map_err(|source| Error::Close {
                context: "close failed",
                source,
                pending: None,
            })?;
        }
        log::debug!("{}: read close", self.codec);
        Ok(())
    }
}

impl<D: Decoder> Drop for DecoderDecompressor<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("{}: ignoring error while dropping decompressor: {e}", self.codec);
        }
    }
}
