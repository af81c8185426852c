use std::fs::File;
use std::io::{self, BufReader};
use std::os::fd::RawFd;

use zio_core::codec::{Compressor, Decompressor, Fsync};
use zio_core::error::Result;
use zio_core::registry::CodecConstructors;

use crate::stream::{Decoder, DecoderDecompressor, Encoder, EncoderCompressor, EncoderSink};

const CODEC: &str = "zstd";

/// Compression level used by the registry constructor
/// (1 = fast / larger, 22 = slow / smallest).
pub const DEFAULT_LEVEL: i32 = 3;

/// Zstandard codec.
///
/// Both decompressors read consecutive frames as one stream.
pub type ZstdCompressor = EncoderCompressor<zstd::stream::write::Encoder<'static, EncoderSink>>;
pub type ZstdDecompressor = DecoderDecompressor<zstd::stream::read::Decoder<'static, BufReader<File>>>;
pub type ZstdBufferDecompressor<'a> = DecoderDecompressor<zstd::stream::read::Decoder<'a, &'a [u8]>>;

impl Encoder for zstd::stream::write::Encoder<'static, EncoderSink> {
    fn finish_stream(self) -> io::Result<()> {
        self.finish().map(drop)
    }
}

impl Decoder for zstd::stream::read::Decoder<'static, BufReader<File>> {
    fn into_file(self) -> Option<File> {
        Some(self.finish().into_inner())
    }
}

impl Decoder for zstd::stream::read::Decoder<'_, &[u8]> {
    fn into_file(self) -> Option<File> {
        None
    }
}

pub fn open_compressor(fd: RawFd, sync: Fsync, level: i32) -> Result<ZstdCompressor> {
    ZstdCompressor::open(CODEC, fd, sync, |sink| zstd::stream::write::Encoder::new(sink, level))
}

fn create_compressor(fd: RawFd, sync: Fsync) -> Result<Box<dyn Compressor>> {
    Ok(Box::new(open_compressor(fd, sync, DEFAULT_LEVEL)?))
}

fn create_decompressor(fd: RawFd) -> Result<Box<dyn Decompressor>> {
    Ok(Box::new(ZstdDecompressor::open(CODEC, fd, |file| zstd::stream::read::Decoder::new(file))?))
}

fn create_buffer_decompressor(buffer: &[u8]) -> Result<Box<dyn Decompressor + '_>> {
    let decoder = zstd::stream::read::Decoder::with_buffer(buffer)
        .map_err(|e| crate::stream::io_failure(CODEC, "decompression init failed", &e))?;
    Ok(Box::new(ZstdBufferDecompressor::new(CODEC, decoder)))
}

pub fn constructors() -> CodecConstructors {
    CodecConstructors {
        compressor: create_compressor,
        decompressor: create_decompressor,
        buffer_decompressor: create_buffer_decompressor,
    }
}
