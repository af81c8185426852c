use crate::error::Result;

/// Number of decompressed bytes a descriptor-backed decompressor asks its
/// codec for on each `read()`.
pub const INPUT_BUFFER_SIZE: usize = 64 * 1024;

/// Durability requested for a compressed output when it is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fsync {
    #[default]
    No,
    /// fsync the output descriptor before closing it.
    Yes,
}

/// Write side of a codec.
///
/// Implementations own a duplicate of the descriptor they were opened on,
/// so the caller keeps full ownership of the original.
///
/// # Lifecycle
/// `write` may be called any number of times with chunks of any size.
/// `close` finalises the stream and releases the duplicate descriptor. It is
/// idempotent: every call after the first returns `Ok(())` and does nothing.
/// Dropping an open compressor closes it and only logs failures, so callers
/// that care about errors must call `close` themselves.
pub trait Compressor: Send {
    /// Codec name for diagnostics.
    fn name(&self) -> &'static str;

    fn write(&mut self, data: &[u8]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Read side of a codec, backed either by a descriptor or by a borrowed
/// buffer.
///
/// `read` returns the next chunk of decompressed bytes. An empty chunk means
/// the input is exhausted; once returned, every later call also returns an
/// empty chunk. `close` follows the same idempotence rules as
/// [`Compressor::close`].
pub trait Decompressor: Send {
    fn name(&self) -> &'static str;

    fn read(&mut self) -> Result<Vec<u8>>;

    fn close(&mut self) -> Result<()>;
}
