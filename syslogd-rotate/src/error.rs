//! Error types for syslogd-rotate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while writing or rotating the log file.
#[derive(Debug, Error)]
pub enum RotateError {
    /// Filesystem failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A single write can never fit in one log file.
    #[error("write of {len} bytes exceeds maximum file size of {max} bytes")]
    WriteTooLarge { len: usize, max: u64 },
}

/// Convenience constructor for [`RotateError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> RotateError {
    RotateError::Io {
        path: path.into(),
        source,
    }
}

impl From<RotateError> for io::Error {
    fn from(err: RotateError) -> Self {
        let kind = match &err {
            RotateError::Io { source, .. } => source.kind(),
            RotateError::WriteTooLarge { .. } => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}
