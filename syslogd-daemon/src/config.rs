use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use syslogd_rotate::RotationPolicy;

pub const DEFAULT_LOG_DIR: &str = "/var/log/syslogd";
pub const SYSLOG_PORT: u16 = 514;

/// Largest payload a single UDP read can return.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

pub const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Everything the daemon needs at startup. Fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// UDP address to receive on; all interfaces, port 514 by default.
    pub listen_addr: SocketAddr,
    pub rotation: RotationPolicy,
    /// In-memory buffer in front of the log file; `0` writes through.
    pub buffer_capacity: usize,
    /// Supervisor notification socket, usually taken from `$NOTIFY_SOCKET`.
    pub notify_socket: Option<PathBuf>,
}

impl DaemonConfig {
    /// Production defaults for logs written under `log_dir`.
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        Self {
            listen_addr: default_listen_addr(),
            rotation: RotationPolicy::syslog(log_dir),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            notify_socket: notify_socket_from_env(),
        }
    }

    pub fn log_file(&self) -> &Path {
        &self.rotation.filename
    }
}

pub fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], SYSLOG_PORT))
}

/// `$NOTIFY_SOCKET`, ignoring an empty value.
pub fn notify_socket_from_env() -> Option<PathBuf> {
    std::env::var_os(NOTIFY_SOCKET_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_all_interfaces_port_514() {
        let config = DaemonConfig::new(DEFAULT_LOG_DIR);
        assert_eq!(config.listen_addr.to_string(), "0.0.0.0:514");
        assert_eq!(config.log_file(), Path::new("/var/log/syslogd/syslog"));
        assert_eq!(config.buffer_capacity, 4096);
    }
}
