pub mod bzip2_codec;
pub mod gzip_codec;
pub mod lz4_codec;
pub mod passthrough;
pub mod stream;
pub mod zstd_codec;

pub use bzip2_codec::{Bzip2BufferDecompressor, Bzip2Compressor, Bzip2Decompressor};

use std::os::fd::RawFd;
use std::sync::Once;

use zio_core::{CodecConstructors, CompressionFactory, Compressor, FileCompression, Fsync};

/// Constructors of the bundled codec for `compression`.
pub fn constructors(compression: FileCompression) -> CodecConstructors {
    match compression {
        FileCompression::None => passthrough::constructors(),
        FileCompression::Gzip => gzip_codec::constructors(),
        FileCompression::Bzip2 => bzip2_codec::constructors(),
        FileCompression::Zstd => zstd_codec::constructors(),
        FileCompression::Lz4 => lz4_codec::constructors(),
    }
}

/// Register every bundled codec with `factory`.
pub fn register_codecs(factory: &CompressionFactory) {
    for compression in FileCompression::ALL {
        factory.register_compression(compression, constructors(compression));
    }
}

/// Register every bundled codec with the process-wide registry.
///
/// Call once during startup, before the first codec is requested. Later
/// calls do nothing.
pub fn register_all_codecs() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| register_codecs(CompressionFactory::instance()));
}

/// Open a compressor at an explicit compression level.
///
/// Only gzip and zstd take a level; other formats use their registered
/// constructor and the level is ignored.
pub fn compressor_with_level(
    compression: FileCompression,
    fd: RawFd,
    sync: Fsync,
    level: i32,
) -> zio_core::Result<Box<dyn Compressor>> {
    match compression {
        FileCompression::Gzip => Ok(Box::new(gzip_codec::open_compressor(fd, sync, level.clamp(0, 9) as u32)?)),
        FileCompression::Zstd => Ok(Box::new(zstd_codec::open_compressor(fd, sync, level)?)),
        other => {
            log::warn!("{} has a fixed compression level; ignoring level {}", other, level);
            (constructors(other).compressor)(fd, sync)
        }
    }
}
