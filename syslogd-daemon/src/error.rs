use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Error surface for daemon setup, socket handling and notification.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("log file error: {0}")]
    Rotate(#[from] syslogd_rotate::RotateError),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// A datagram that could not be written to the sink.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unable to write: {0}")]
    Content(#[source] io::Error),

    #[error("unable to write newline: {0}")]
    Newline(#[source] io::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
