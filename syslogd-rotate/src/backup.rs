//! Backup naming, discovery, and the post-rotation mill pass.
//!
//! Backups live next to the active file and are named
//! `<stem>-<timestamp><ext>[.gz]`, e.g. `syslog-2026-10-17T08-30-00.123.gz`.
//! Files in the directory that do not parse as backups are never touched.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{io_err, RotateError};
use crate::policy::RotationPolicy;

const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const COMPRESS_SUFFIX: &str = ".gz";

/// One rotated-out log file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBackup {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub compressed: bool,
}

impl LogBackup {
    /// File name with any `.gz` suffix removed; a plain backup and its
    /// compressed copy share this key.
    fn base_name(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.strip_suffix(COMPRESS_SUFFIX) {
            Some(base) => base.to_string(),
            None => name,
        }
    }
}

/// Prefix/extension split of the active file name.
#[derive(Debug, Clone)]
pub(crate) struct BackupName {
    prefix: String,
    ext: String,
}

impl BackupName {
    pub(crate) fn for_file(filename: &Path) -> Self {
        let stem = filename
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = filename
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Self {
            prefix: format!("{stem}-"),
            ext,
        }
    }

    pub(crate) fn path_for(&self, dir: &Path, timestamp: DateTime<Utc>) -> PathBuf {
        dir.join(format!(
            "{}{}{}",
            self.prefix,
            timestamp.format(BACKUP_TIME_FORMAT),
            self.ext
        ))
    }

    /// Parse a directory entry name; `None` when it is not one of our backups.
    fn parse(&self, file_name: &str) -> Option<(DateTime<Utc>, bool)> {
        let rest = file_name.strip_prefix(&self.prefix)?;
        let (rest, compressed) = match rest.strip_suffix(COMPRESS_SUFFIX) {
            Some(rest) => (rest, true),
            None => (rest, false),
        };
        let stamp = rest.strip_suffix(&self.ext)?;
        let naive = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).ok()?;
        Some((naive.and_utc(), compressed))
    }
}

/// List the backups belonging to `policy`, newest first.
pub fn list_backups(policy: &RotationPolicy) -> Result<Vec<LogBackup>, RotateError> {
    let dir = policy.dir();
    let names = BackupName::for_file(&policy.filename);

    let mut backups = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let file_name = entry.file_name();
        let Some((timestamp, compressed)) = names.parse(&file_name.to_string_lossy()) else {
            continue;
        };
        backups.push(LogBackup {
            path: entry.path(),
            timestamp,
            compressed,
        });
    }

    backups.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.compressed.cmp(&b.compressed))
    });
    Ok(backups)
}

/// What a mill pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MillReport {
    pub removed: usize,
    pub compressed: usize,
}

/// Apply retention by count and age, then compress what is left.
///
/// Individual file failures are logged and skipped so one unreadable backup
/// does not stop the rest of the pass.
pub(crate) fn mill(policy: &RotationPolicy, now: DateTime<Utc>) -> Result<MillReport, RotateError> {
    let mut report = MillReport::default();
    let mut files = list_backups(policy)?;
    let mut remove = Vec::new();

    if policy.max_backups > 0 {
        let mut preserved = HashSet::new();
        let mut remaining = Vec::new();
        for backup in files {
            preserved.insert(backup.base_name());
            if preserved.len() > policy.max_backups {
                remove.push(backup);
            } else {
                remaining.push(backup);
            }
        }
        files = remaining;
    }

    if let Some(max_age) = policy.max_age {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age));
        if let Some(cutoff) = cutoff {
            let (expired, remaining): (Vec<_>, Vec<_>) =
                files.into_iter().partition(|b| b.timestamp < cutoff);
            remove.extend(expired);
            files = remaining;
        }
    }

    for backup in &remove {
        match fs::remove_file(&backup.path) {
            Ok(()) => report.removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %backup.path.display(), error = %err, "failed to remove old log backup")
            }
        }
    }

    if policy.compress {
        for backup in files.iter().filter(|b| !b.compressed) {
            let target = gz_path(&backup.path);
            match compress_file(&backup.path, &target) {
                Ok(()) => report.compressed += 1,
                Err(err) => tracing::warn!(error = %err, "failed to compress log backup"),
            }
        }
    }

    Ok(report)
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(COMPRESS_SUFFIX);
    PathBuf::from(name)
}

/// Gzip `src` into `dst` with the same permissions, then remove `src`.
fn compress_file(src: &Path, dst: &Path) -> Result<(), RotateError> {
    let mut input = File::open(src).map_err(|e| io_err(src, e))?;
    let meta = input.metadata().map_err(|e| io_err(src, e))?;

    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(meta.permissions().mode());
    }
    let output = options.open(dst).map_err(|e| io_err(dst, e))?;

    let encoded = (|| -> io::Result<()> {
        let mut encoder = GzEncoder::new(output, Compression::default());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?.sync_all()
    })();
    if let Err(err) = encoded {
        let _ = fs::remove_file(dst);
        return Err(io_err(dst, err));
    }

    #[cfg(not(unix))]
    let _ = fs::set_permissions(dst, meta.permissions());

    fs::remove_file(src).map_err(|e| io_err(src, e))
}
