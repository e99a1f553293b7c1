//! Service-manager readiness protocol (`sd_notify`).
//!
//! When `$NOTIFY_SOCKET` is set the supervisor expects `READY=1` once the
//! service is listening and `STOPPING=1` when it begins to shut down. Both are
//! single datagrams on a Unix socket. A leading `@` names a Linux abstract
//! socket.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use crate::error::{io_err, DaemonError};

pub const READY: &str = "READY=1";
pub const STOPPING: &str = "STOPPING=1";

#[derive(Debug, Clone, Default)]
pub struct Notifier {
    socket: Option<PathBuf>,
}

impl Notifier {
    pub fn new(socket: Option<PathBuf>) -> Self {
        Self { socket }
    }

    pub fn ready(&self) -> Result<(), DaemonError> {
        self.send(READY)
    }

    pub fn stopping(&self) -> Result<(), DaemonError> {
        self.send(STOPPING)
    }

    /// Send one notification. A no-op without a configured socket.
    pub fn send(&self, payload: &str) -> Result<(), DaemonError> {
        let Some(path) = &self.socket else {
            return Ok(());
        };
        let socket = UnixDatagram::unbound().map_err(|e| io_err(path, e))?;
        connect(&socket, path).map_err(|e| io_err(path, e))?;
        socket
            .send(payload.as_bytes())
            .map_err(|e| io_err(path, e))?;
        Ok(())
    }

    /// Guard that sends `STOPPING=1` when dropped, including during unwinding.
    pub fn stopping_guard(&self) -> StoppingGuard {
        StoppingGuard {
            notifier: self.clone(),
        }
    }
}

/// Sends `STOPPING=1` on drop. Failures are logged.
#[derive(Debug)]
pub struct StoppingGuard {
    notifier: Notifier,
}

impl Drop for StoppingGuard {
    fn drop(&mut self) {
        if let Err(err) = self.notifier.stopping() {
            tracing::warn!(error = %err, "stopping notification failed");
        }
    }
}

fn connect(socket: &UnixDatagram, path: &Path) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::linux::net::SocketAddrExt;
        use std::os::unix::ffi::OsStrExt;
        use std::os::unix::net::SocketAddr;

        if let Some(name) = path.as_os_str().as_bytes().strip_prefix(b"@") {
            let addr = SocketAddr::from_abstract_name(name)?;
            return socket.connect_addr(&addr);
        }
    }
    socket.connect(path)
}
