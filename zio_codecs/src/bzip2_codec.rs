use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::RawFd;

use bzip2::{Action, Compress, Compression, Decompress, Status};
use zio_core::codec::{Compressor, Decompressor, Fsync, INPUT_BUFFER_SIZE};
use zio_core::error::{CodecError, Error, Result};
use zio_core::registry::CodecConstructors;
use zio_core::fd;

use crate::stream::close_output;

const CODEC: &str = "bzip2";

/// Block size used for every compressed stream (1 = fast, 9 = best).
pub const COMPRESSION_LEVEL: u32 = 6;

/// 0 selects libbz2's default work factor.
const WORK_FACTOR: u32 = 0;

/// Size of the staging buffers between the codec and the descriptor.
const BZ_MAX_UNUSED: usize = 5000;

/// Output window of [`Bzip2BufferDecompressor::read`].
pub const BUFFER_OUTPUT_SIZE: usize = 10 * 1024;

// ── libbz2 status codes ────────────────────────────────────────────────────

pub const BZ_OK: i32 = 0;
pub const BZ_RUN_OK: i32 = 1;
pub const BZ_FLUSH_OK: i32 = 2;
pub const BZ_FINISH_OK: i32 = 3;
pub const BZ_STREAM_END: i32 = 4;
pub const BZ_SEQUENCE_ERROR: i32 = -1;
pub const BZ_PARAM_ERROR: i32 = -2;
pub const BZ_MEM_ERROR: i32 = -3;
pub const BZ_DATA_ERROR: i32 = -4;
pub const BZ_DATA_ERROR_MAGIC: i32 = -5;
pub const BZ_IO_ERROR: i32 = -6;
pub const BZ_UNEXPECTED_EOF: i32 = -7;

fn status_code(status: Status) -> i32 {
    match status {
        Status::Ok => BZ_OK,
        Status::RunOk => BZ_RUN_OK,
        Status::FlushOk => BZ_FLUSH_OK,
        Status::FinishOk => BZ_FINISH_OK,
        Status::StreamEnd => BZ_STREAM_END,
        Status::MemNeeded => BZ_MEM_ERROR,
    }
}

fn error_code(err: bzip2::Error) -> i32 {
    match err {
        bzip2::Error::Sequence => BZ_SEQUENCE_ERROR,
        bzip2::Error::Param => BZ_PARAM_ERROR,
        bzip2::Error::Data => BZ_DATA_ERROR,
        bzip2::Error::DataMagic => BZ_DATA_ERROR_MAGIC,
    }
}

/// Fold a libbz2 call result into its numeric status.
fn result_code(result: std::result::Result<Status, bzip2::Error>) -> i32 {
    match result {
        Ok(status) => status_code(status),
        Err(err) => error_code(err),
    }
}

fn io_error(phase: &'static str, err: &io::Error) -> CodecError {
    CodecError::with_errno(CODEC, phase, BZ_IO_ERROR, err)
}

// ── Compressor ─────────────────────────────────────────────────────────────

/// bzip2 compressor writing to a duplicated descriptor.
pub struct Bzip2Compressor {
    file: Option<File>,
    /// `None` once closed.
    stream: Option<Compress>,
    buffer: Vec<u8>,
    sync: Fsync,
}

impl Bzip2Compressor {
    pub fn new(fd: RawFd, sync: Fsync) -> Result<Self> {
        let file = fd::duplicate(fd).map_err(|e| io_error("write open failed", &e))?;
        log::debug!("bzip2: write open on fd {} (level {})", fd, COMPRESSION_LEVEL);
        Ok(Self {
            file: Some(file),
            stream: Some(Compress::new(Compression::new(COMPRESSION_LEVEL), WORK_FACTOR)),
            buffer: vec![0; BZ_MAX_UNUSED],
            sync,
        })
    }
}

/// Run `input` through `stream` with `action`, writing all output to `file`.
///
/// With [`Action::Run`] this returns once every input byte was consumed; with
/// [`Action::Finish`] it returns once the stream trailer was written.
fn pump(
    stream: &mut Compress,
    file: &mut File,
    buffer: &mut [u8],
    mut input: &[u8],
    action: Action,
    phase: &'static str,
) -> std::result::Result<(), CodecError> {
    loop {
        let done = match action {
            Action::Finish => false,
            _ => input.is_empty(),
        };
        if done {
            return Ok(());
        }

        let before_in = stream.total_in();
        let before_out = stream.total_out();
        let status = stream
            .compress(input, buffer, action)
            .map_err(|e| CodecError::new(CODEC, phase, error_code(e)))?;
        let consumed = (stream.total_in() - before_in) as usize;
        let produced = (stream.total_out() - before_out) as usize;
        input = &input[consumed..];

        file.write_all(&buffer[..produced]).map_err(|e| io_error(phase, &e))?;

        match status {
            Status::StreamEnd => return Ok(()),
            Status::Ok | Status::RunOk | Status::FlushOk | Status::FinishOk => {}
            other => return Err(CodecError::new(CODEC, phase, status_code(other))),
        }
    }
}

impl Compressor for Bzip2Compressor {
    fn name(&self) -> &'static str {
        CODEC
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let (Some(stream), Some(file)) = (self.stream.as_mut(), self.file.as_mut()) else {
            return Err(Error::Closed("bzip2 compressor"));
        };
        pump(stream, file, &mut self.buffer, data, Action::Run, "write failed")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        if let Some(mut file) = self.file.take() {
            let finished = pump(&mut stream, &mut file, &mut self.buffer, &[], Action::Finish, "write close failed");
            drop(stream);
            // Flush and close the descriptor before reporting a codec failure,
            // so everything the codec emitted reaches the OS.
            close_output(CODEC, file, self.sync, finished)?;
        }
        log::debug!("bzip2: write close");
        Ok(())
    }
}

impl Drop for Bzip2Compressor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("bzip2: ignoring error while dropping compressor: {e}");
        }
    }
}

// ── Stream decompressor ────────────────────────────────────────────────────

/// Duplicated input descriptor plus its physical end-of-file state.
struct InputHandle {
    file: File,
    eof: bool,
}

impl InputHandle {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.file.read(buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// One bzip2 stream being decoded from an [`InputHandle`].
///
/// Owns the input staged from the descriptor. When the stream ends, the
/// staged bytes that were not consumed belong to whatever follows it.
struct ReadContext {
    stream: Decompress,
    input: Vec<u8>,
    pos: usize,
    end: usize,
    ended: bool,
    /// Follows a finished stream, so the descriptor may end cleanly before
    /// this stream starts.
    continuation: bool,
}

impl ReadContext {
    /// Start the first stream on a descriptor.
    fn open(seed: &[u8]) -> Self {
        let mut input = vec![0; BZ_MAX_UNUSED.max(seed.len())];
        input[..seed.len()].copy_from_slice(seed);
        Self {
            stream: Decompress::new(false),
            input,
            pos: 0,
            end: seed.len(),
            ended: false,
            continuation: false,
        }
    }

    /// Start the stream after a finished one, seeded with its unused bytes.
    fn continue_with(unused: &[u8]) -> Self {
        Self {
            continuation: true,
            ..Self::open(unused)
        }
    }

    /// Decompress into `out` until it is full or the stream ends.
    ///
    /// Returns the bytes written and whether the stream ended. A continuation
    /// that finds the descriptor at EOF before its first byte also counts as
    /// ended, with nothing staged.
    fn read(&mut self, handle: &mut InputHandle, out: &mut [u8]) -> std::result::Result<(usize, bool), CodecError> {
        if self.ended {
            return Err(CodecError::new(CODEC, "read failed", BZ_SEQUENCE_ERROR));
        }
        let mut written = 0;
        loop {
            if self.pos == self.end && !handle.eof {
                let n = handle.fill(&mut self.input).map_err(|e| io_error("read failed", &e))?;
                self.pos = 0;
                self.end = n;
            }
            let drained = handle.eof && self.pos == self.end;
            if self.continuation && drained && self.stream.total_in() == 0 {
                self.ended = true;
                return Ok((written, true));
            }

            let before_in = self.stream.total_in();
            let before_out = self.stream.total_out();
            let status = self
                .stream
                .decompress(&self.input[self.pos..self.end], &mut out[written..])
                .map_err(|e| CodecError::new(CODEC, "read failed", error_code(e)))?;
            self.pos += (self.stream.total_in() - before_in) as usize;
            written += (self.stream.total_out() - before_out) as usize;

            match status {
                Status::StreamEnd => {
                    self.ended = true;
                    return Ok((written, true));
                }
                Status::Ok => {}
                other => return Err(CodecError::new(CODEC, "read failed", status_code(other))),
            }
            if written == out.len() {
                return Ok((written, false));
            }
            if handle.eof && self.pos == self.end {
                return Err(CodecError::new(CODEC, "read failed", BZ_UNEXPECTED_EOF));
            }
        }
    }

    /// Staged input past the end of the finished stream.
    fn take_unused(&mut self) -> std::result::Result<Vec<u8>, CodecError> {
        if !self.ended {
            return Err(CodecError::new(CODEC, "get unused failed", BZ_SEQUENCE_ERROR));
        }
        let unused = self.input[self.pos..self.end].to_vec();
        self.pos = self.end;
        Ok(unused)
    }
}

/// bzip2 decompressor reading from a duplicated descriptor.
///
/// Several bzip2 streams written back to back are decoded as one: when a
/// stream ends before the descriptor does, a fresh stream is started with the
/// bytes that followed it.
pub struct Bzip2Decompressor {
    input: Option<InputHandle>,
    /// `None` once closed.
    context: Option<ReadContext>,
    stream_end: bool,
}

impl Bzip2Decompressor {
    pub fn new(fd: RawFd) -> Result<Self> {
        let file = fd::duplicate(fd).map_err(|e| io_error("read open failed", &e))?;
        log::debug!("bzip2: read open on fd {}", fd);
        Ok(Self {
            input: Some(InputHandle { file, eof: false }),
            context: Some(ReadContext::open(&[])),
            stream_end: false,
        })
    }
}

impl Decompressor for Bzip2Decompressor {
    fn name(&self) -> &'static str {
        CODEC
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        if self.stream_end {
            return Ok(Vec::new());
        }
        let (Some(context), Some(handle)) = (self.context.as_mut(), self.input.as_mut()) else {
            return Ok(Vec::new());
        };

        let mut buffer = vec![0; INPUT_BUFFER_SIZE];
        loop {
            let (nread, ended) = context.read(handle, &mut buffer)?;
            if ended {
                // Only a descriptor already seen at EOF ends the input; an
                // open pipe must not block here on data nobody asked for.
                let unused = context.take_unused()?;
                if unused.is_empty() && handle.eof {
                    self.stream_end = true;
                } else {
                    log::trace!("bzip2: stream ended, continuing with {} carried bytes", unused.len());
                    *context = ReadContext::continue_with(&unused);
                }
            }
            // A stream may end without producing output in this call; keep
            // going so an empty chunk only ever means end of input.
            if nread > 0 || self.stream_end {
                buffer.truncate(nread);
                return Ok(buffer);
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.context.take().is_none() {
            return Ok(());
        }
        if let Some(handle) = self.input.take() {
            fd::close(handle.file).map_err(|source| Error::Close {
                context: "close failed",
                source,
                pending: None,
            })?;
        }
        log::debug!("bzip2: read close");
        Ok(())
    }
}

impl Drop for Bzip2Decompressor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("bzip2: ignoring error while dropping decompressor: {e}");
        }
    }
}

// ── Buffer decompressor ────────────────────────────────────────────────────

/// bzip2 decompressor over a borrowed, already resident buffer.
///
/// Only the first bzip2 stream in the buffer is decoded; bytes after its end
/// are ignored.
pub struct Bzip2BufferDecompressor<'a> {
    /// Cleared once the stream ended or failed; every later read is empty.
    buffer: Option<&'a [u8]>,
    stream: Option<Decompress>,
}

impl<'a> Bzip2BufferDecompressor<'a> {
    pub fn new(buffer: &'a [u8]) -> Result<Self> {
        Ok(Self {
            buffer: Some(buffer),
            stream: Some(Decompress::new(false)),
        })
    }
}

impl Decompressor for Bzip2BufferDecompressor<'_> {
    fn name(&self) -> &'static str {
        CODEC
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let (Some(input), Some(stream)) = (self.buffer, self.stream.as_mut()) else {
            return Ok(Vec::new());
        };

        let mut output = vec![0; BUFFER_OUTPUT_SIZE];
        let consumed = stream.total_in() as usize;
        let before_out = stream.total_out();
        let status = result_code(stream.decompress(&input[consumed..], &mut output));
        let produced = (stream.total_out() - before_out) as usize;
        let exhausted = stream.total_in() as usize == input.len();

        // No output and no input left without reaching the end: the stream
        // is truncated (or the buffer was empty to begin with).
        let stalled = status == BZ_OK && produced == 0 && exhausted;

        if status != BZ_OK || stalled {
            self.buffer = None;
        }
        if status != BZ_OK && status != BZ_STREAM_END {
            return Err(CodecError::new(CODEC, "decompress failed", status).into());
        }
        if stalled && !input.is_empty() {
            return Err(CodecError::new(CODEC, "decompress failed", BZ_UNEXPECTED_EOF).into());
        }

        output.truncate(produced);
        Ok(output)
    }

    fn close(&mut self) -> Result<()> {
        self.buffer = None;
        self.stream = None;
        Ok(())
    }
}

// ── Registration ───────────────────────────────────────────────────────────

fn create_compressor(fd: RawFd, sync: Fsync) -> Result<Box<dyn Compressor>> {
    Ok(Box::new(Bzip2Compressor::new(fd, sync)?))
}

fn create_decompressor(fd: RawFd) -> Result<Box<dyn Decompressor>> {
    Ok(Box::new(Bzip2Decompressor::new(fd)?))
}

fn create_buffer_decompressor(buffer: &[u8]) -> Result<Box<dyn Decompressor + '_>> {
    Ok(Box::new(Bzip2BufferDecompressor::new(buffer)?))
}

pub fn constructors() -> CodecConstructors {
    CodecConstructors {
        compressor: create_compressor,
        decompressor: create_decompressor,
        buffer_decompressor: create_buffer_decompressor,
    }
}
