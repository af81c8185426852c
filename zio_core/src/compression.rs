use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Compression format tag used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileCompression {
    None,
    Gzip,
    Bzip2,
    Zstd,
    Lz4,
}

impl FileCompression {
    pub const ALL: [FileCompression; 5] = [
        FileCompression::None,
        FileCompression::Gzip,
        FileCompression::Bzip2,
        FileCompression::Zstd,
        FileCompression::Lz4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCompression::None => "none",
            FileCompression::Gzip => "gzip",
            FileCompression::Bzip2 => "bzip2",
            FileCompression::Zstd => "zstd",
            FileCompression::Lz4 => "lz4",
        }
    }

    /// Conventional file suffix, without the dot. `None` has no suffix.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            FileCompression::None => None,
            FileCompression::Gzip => Some("gz"),
            FileCompression::Bzip2 => Some("bz2"),
            FileCompression::Zstd => Some("zst"),
            FileCompression::Lz4 => Some("lz4"),
        }
    }

    /// Guess the format from the last extension of `path`.
    ///
    /// Unknown or missing extensions map to [`FileCompression::None`].
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("gz") => FileCompression::Gzip,
            Some("bz2") => FileCompression::Bzip2,
            Some("zst") => FileCompression::Zstd,
            Some("lz4") => FileCompression::Lz4,
            _ => FileCompression::None,
        }
    }
}

impl fmt::Display for FileCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCompression(pub String);

impl fmt::Display for UnknownCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown compression format '{}'. Valid options: none, gzip, bzip2, zstd, lz4",
            self.0
        )
    }
}

impl std::error::Error for UnknownCompression {}

impl FromStr for FileCompression {
    type Err = UnknownCompression;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "passthrough" | "pass" => Ok(FileCompression::None),
            "gzip" | "gz" => Ok(FileCompression::Gzip),
            "bzip2" | "bz2" => Ok(FileCompression::Bzip2),
            "zstd" | "zst" => Ok(FileCompression::Zstd),
            "lz4" => Ok(FileCompression::Lz4),
            _ => Err(UnknownCompression(s.to_string())),
        }
    }
}
