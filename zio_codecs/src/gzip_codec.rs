use std::fs::File;
use std::io;
use std::os::fd::RawFd;

use flate2::read::{GzDecoder, MultiGzDecoder};
use flate2::write::GzEncoder;
use flate2::Compression;
use zio_core::codec::{Compressor, Decompressor, Fsync};
use zio_core::error::Result;
use zio_core::registry::CodecConstructors;

use crate::stream::{Decoder, DecoderDecompressor, Encoder, EncoderCompressor, EncoderSink};

const CODEC: &str = "gzip";

/// Compression level used by the registry constructor (0–9).
pub const DEFAULT_LEVEL: u32 = 6;

/// gzip codec backed by `flate2`.
///
/// The descriptor decompressor reads every member of a multi-member gzip
/// file; the buffer decompressor stops after the first member.
pub type GzipCompressor = EncoderCompressor<GzEncoder<EncoderSink>>;
pub type GzipDecompressor = DecoderDecompressor<MultiGzDecoder<File>>;
pub type GzipBufferDecompressor<'a> = DecoderDecompressor<GzDecoder<&'a [u8]>>;

impl Encoder for GzEncoder<EncoderSink> {
    fn finish_stream(self) -> io::Result<()> {
        GzEncoder::finish(self).map(drop)
    }
}

impl Decoder for MultiGzDecoder<File> {
    fn into_file(self) -> Option<File> {
        Some(self.into_inner())
    }
}

impl Decoder for GzDecoder<&[u8]> {
    fn into_file(self) -> Option<File> {
        None
    }
}

pub fn open_compressor(fd: RawFd, sync: Fsync, level: u32) -> Result<GzipCompressor> {
    GzipCompressor::open(CODEC, fd, sync, |sink| {
        Ok(GzEncoder::new(sink, Compression::new(level)))
    })
}

fn create_compressor(fd: RawFd, sync: Fsync) -> Result<Box<dyn Compressor>> {
    Ok(Box::new(open_compressor(fd, sync, DEFAULT_LEVEL)?))
}

fn create_decompressor(fd: RawFd) -> Result<Box<dyn Decompressor>> {
    Ok(Box::new(GzipDecompressor::open(CODEC, fd, |file| Ok(MultiGzDecoder::new(file)))?))
}

fn create_buffer_decompressor(buffer: &[u8]) -> Result<Box<dyn Decompressor + '_>> {
    Ok(Box::new(GzipBufferDecompressor::new(CODEC, GzDecoder::new(buffer))))
}

pub fn constructors() -> CodecConstructors {
    CodecConstructors {
        compressor: create_compressor,
        decompressor: create_decompressor,
        buffer_decompressor: create_buffer_decompressor,
    }
}
