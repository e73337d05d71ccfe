use crate::utils::error::{PlayerError, PlayerResult};
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::PathBuf;

/// Where the APNG bytes come from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file on disk.
    File(PathBuf),
    /// A path relative to an asset directory.
    Asset { root: PathBuf, path: PathBuf },
    /// Bytes already in memory.
    Memory(Vec<u8>),
}

impl ImageSource {
    pub fn fetch(&self) -> PlayerResult<Vec<u8>> {
        let path = match self {
            ImageSource::Memory(bytes) => return Ok(bytes.clone()),
            ImageSource::File(path) => path.clone(),
            ImageSource::Asset { root, path } => root.join(path),
        };

        fs::read(&path).map_err(|error| PlayerError::SourceUnavailable {
            source_name: path.display().to_string(),
            error,
        })
    }
}

impl Display for ImageSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::File(path) => write!(f, "{}", path.display()),
            ImageSource::Asset { root, path } => write!(f, "{}", root.join(path).display()),
            ImageSource::Memory(bytes) => write!(f, "<{} bytes in memory>", bytes.len()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::File(path)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Memory(bytes)
    }
}
