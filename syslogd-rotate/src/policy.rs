use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MEGABYTE: u64 = 1024 * 1024;

/// Active file size that triggers rotation (500 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 500 * MEGABYTE;

/// Number of rotated backups retained.
pub const DEFAULT_MAX_BACKUPS: usize = 3;

/// Backups older than this are removed (28 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(28 * 24 * 60 * 60);

pub const SYSLOG_FILE_NAME: &str = "syslog";

/// Rotation settings, fixed for the lifetime of a [`crate::RotatingWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Path of the active log file. Backups are written next to it.
    pub filename: PathBuf,
    /// Maximum size in bytes of the active file.
    pub max_size: u64,
    /// Maximum number of backups to keep; `0` keeps all of them.
    pub max_backups: usize,
    /// Maximum backup age; `None` keeps backups regardless of age.
    pub max_age: Option<Duration>,
    /// Gzip backups once they are rotated out.
    pub compress: bool,
}

impl RotationPolicy {
    /// Production policy: `<dir>/syslog`, 500 MiB, 3 backups, 28 days, compressed.
    pub fn syslog(dir: impl AsRef<Path>) -> Self {
        Self {
            filename: dir.as_ref().join(SYSLOG_FILE_NAME),
            max_size: DEFAULT_MAX_SIZE,
            max_backups: DEFAULT_MAX_BACKUPS,
            max_age: Some(DEFAULT_MAX_AGE),
            compress: true,
        }
    }

    /// Directory holding the active file and its backups.
    pub fn dir(&self) -> &Path {
        match self.filename.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Whether a rotation needs a follow-up retention/compression pass.
    pub(crate) fn needs_mill(&self) -> bool {
        self.max_backups > 0 || self.max_age.is_some() || self.compress
    }
}
