use std::path::{Path, PathBuf};

/// Errors surfaced by loading, saving and combining image buffers.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid EXR data in {path}: {message}")]
    Format { path: PathBuf, message: String },
    #[error("dimension mismatch: expected {}x{}, found {}x{}", expected.0, expected.1, found.0, found.1)]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("render pass not found: {0}")]
    PassNotFound(String),
    #[error("sample ({x}, {y}, {c}) outside {width}x{height}x{channels} image")]
    OutOfBounds {
        x: usize,
        y: usize,
        c: usize,
        width: usize,
        height: usize,
        channels: usize,
    },
    #[error("cannot encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProcessingError>;

impl ProcessingError {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub(crate) fn file_access(path: &Path, source: std::io::Error) -> Self {
        Self::FileAccess { path: path.to_path_buf(), source }
    }

    pub(crate) fn format(path: &Path, message: impl Into<String>) -> Self {
        Self::Format { path: path.to_path_buf(), message: message.into() }
    }

    /// Maps an `exr` codec error onto the file-access / format split.
    pub(crate) fn from_exr(path: &Path, err: exr::error::Error) -> Self {
        match err {
            exr::error::Error::Io(source) => Self::file_access(path, source),
            other => Self::format(path, other.to_string()),
        }
    }
}
