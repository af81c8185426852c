use std::fs::File;
use std::io;
use std::os::fd::RawFd;

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use zio_core::codec::{Compressor, Decompressor, Fsync};
use zio_core::error::Result;
use zio_core::registry::CodecConstructors;

use crate::stream::{Decoder, DecoderDecompressor, Encoder, EncoderCompressor, EncoderSink};

const CODEC: &str = "lz4";

/// LZ4 frame-format codec.
///
/// Fastest decompression of all bundled codecs. Best for hot data where
/// decode speed matters more than size reduction.
pub type Lz4Compressor = EncoderCompressor<FrameEncoder<EncoderSink>>;
pub type Lz4Decompressor = DecoderDecompressor<FrameDecoder<File>>;
pub type Lz4BufferDecompressor<'a> = DecoderDecompressor<FrameDecoder<&'a [u8]>>;

impl Encoder for FrameEncoder<EncoderSink> {
    fn finish_stream(self) -> io::Result<()> {
        FrameEncoder::finish(self).map(drop).map_err(io::Error::other)
    }
}

impl Decoder for FrameDecoder<File> {
    fn into_file(self) -> Option<File> {
        Some(self.into_inner())
    }
}

impl Decoder for FrameDecoder<&[u8]> {
    fn into_file(self) -> Option<File> {
        None
    }
}

fn create_compressor(fd: RawFd, sync: Fsync) -> Result<Box<dyn Compressor>> {
    Ok(Box::new(Lz4Compressor::open(CODEC, fd, sync, |sink| Ok(FrameEncoder::new(sink)))?))
}

fn create_decompressor(fd: RawFd) -> Result<Box<dyn Decompressor>> {
    Ok(Box::new(Lz4Decompressor::open(CODEC, fd, |file| Ok(FrameDecoder::new(file)))?))
}

fn create_buffer_decompressor(buffer: &[u8]) -> Result<Box<dyn Decompressor + '_>> {
    Ok(Box::new(Lz4BufferDecompressor::new(CODEC, FrameDecoder::new(buffer))))
}

pub fn constructors() -> CodecConstructors {
    CodecConstructors {
        compressor: create_compressor,
        decompressor: create_decompressor,
        buffer_decompressor: create_buffer_decompressor,
    }
}
