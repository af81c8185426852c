pub mod codec;
pub mod compression;
pub mod error;
pub mod fd;
pub mod reader;
pub mod registry;
pub mod writer;

pub use codec::{Compressor, Decompressor, Fsync, INPUT_BUFFER_SIZE};
pub use compression::FileCompression;
pub use error::{CodecError, Error, Result};
pub use reader::Reader;
pub use registry::{CodecConstructors, CompressionFactory};
pub use writer::Writer;
