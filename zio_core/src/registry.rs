use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::codec::{Compressor, Decompressor, Fsync};
use crate::compression::FileCompression;
use crate::error::{Error, Result};

pub type CreateCompressor = fn(RawFd, Fsync) -> Result<Box<dyn Compressor>>;
pub type CreateDecompressor = fn(RawFd) -> Result<Box<dyn Decompressor>>;
pub type CreateBufferDecompressor = for<'a> fn(&'a [u8]) -> Result<Box<dyn Decompressor + 'a>>;

/// The three constructors a codec registers under its format tag.
#[derive(Clone, Copy)]
pub struct CodecConstructors {
    pub compressor: CreateCompressor,
    pub decompressor: CreateDecompressor,
    pub buffer_decompressor: CreateBufferDecompressor,
}

/// Maps a [`FileCompression`] tag to the constructors of its codec.
///
/// The process-wide instance is populated once at startup (see
/// `zio_codecs::register_all_codecs`) and only read afterwards. Separate
/// instances can be built with [`CompressionFactory::new`].
#[derive(Default)]
pub struct CompressionFactory {
    callbacks: RwLock<HashMap<FileCompression, CodecConstructors>>,
}

impl CompressionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn instance() -> &'static CompressionFactory {
        static INSTANCE: OnceLock<CompressionFactory> = OnceLock::new();
        INSTANCE.get_or_init(CompressionFactory::new)
    }

    /// Register `constructors` under `compression`.
    ///
    /// Returns `true` if the tag was not registered before. Registering the
    /// same tag again replaces the previous constructors.
    pub fn register_compression(&self, compression: FileCompression, constructors: CodecConstructors) -> bool {
        let previous = self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(compression, constructors);
        if previous.is_none() {
            log::debug!("registered {} codec", compression);
        }
        previous.is_none()
    }

    pub fn is_registered(&self, compression: FileCompression) -> bool {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&compression)
    }

    /// All registered tags, in declaration order.
    pub fn registered(&self) -> Vec<FileCompression> {
        let mut tags: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        tags.sort();
        tags
    }

    fn constructors(&self, compression: FileCompression) -> Result<CodecConstructors> {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&compression)
            .copied()
            .ok_or(Error::Unsupported(compression))
    }

    /// Open a compressor writing to a duplicate of `fd`.
    pub fn create_compressor(&self, compression: FileCompression, fd: RawFd, sync: Fsync) -> Result<Box<dyn Compressor>> {
        (self.constructors(compression)?.compressor)(fd, sync)
    }

    /// Open a decompressor reading from a duplicate of `fd`.
    pub fn create_decompressor(&self, compression: FileCompression, fd: RawFd) -> Result<Box<dyn Decompressor>> {
        (self.constructors(compression)?.decompressor)(fd)
    }

    /// Open a decompressor over `buffer`, which stays borrowed until the
    /// decompressor is dropped.
    pub fn create_buffer_decompressor<'a>(
        &self,
        compression: FileCompression,
        buffer: &'a [u8],
    ) -> Result<Box<dyn Decompressor + 'a>> {
        (self.constructors(compression)?.buffer_decompressor)(buffer)
    }
}
