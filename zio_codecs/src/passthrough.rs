use std::fs::File;
use std::os::fd::RawFd;

use zio_core::codec::{Compressor, Decompressor, Fsync};
use zio_core::error::Result;
use zio_core::registry::CodecConstructors;

use crate::stream::{DecoderDecompressor, EncoderCompressor, EncoderSink};

const CODEC: &str = "none";

/// No-op codec: bytes are written and read verbatim.
///
/// Useful for uncompressed inputs that still go through the same
/// descriptor-duplication and close semantics as the real codecs.
pub type PassThroughCompressor = EncoderCompressor<EncoderSink>;
pub type PassThroughDecompressor = DecoderDecompressor<File>;
pub type PassThroughBufferDecompressor<'a> = DecoderDecompressor<&'a [u8]>;

fn create_compressor(fd: RawFd, sync: Fsync) -> Result<Box<dyn Compressor>> {
    Ok(Box::new(PassThroughCompressor::open(CODEC, fd, sync, Ok)?))
}

fn create_decompressor(fd: RawFd) -> Result<Box<dyn Decompressor>> {
    Ok(Box::new(PassThroughDecompressor::open(CODEC, fd, Ok)?))
}

fn create_buffer_decompressor(buffer: &[u8]) -> Result<Box<dyn Decompressor + '_>> {
    Ok(Box::new(PassThroughBufferDecompressor::new(CODEC, buffer)))
}

pub fn constructors() -> CodecConstructors {
    CodecConstructors {
        compressor: create_compressor,
        decompressor: create_decompressor,
        buffer_decompressor: create_buffer_decompressor,
    }
}
