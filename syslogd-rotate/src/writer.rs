//! The rotating file writer.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};

use crate::backup::{mill, BackupName};
use crate::error::{io_err, RotateError};
use crate::policy::RotationPolicy;

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send>;

const NEW_FILE_MODE: u32 = 0o600;

/// Appends to `policy.filename`, rotating it out once it grows past
/// `policy.max_size`.
///
/// The file is opened lazily on first write (or explicitly via [`open`]).
/// An existing file is appended to when the next write still fits.
///
/// Rotation only happens between lines. A write arriving in the middle of a
/// line finishes that line in the current file first, so a file may end up
/// larger than `max_size` by the tail of its last line.
///
/// [`open`]: RotatingWriter::open
pub struct RotatingWriter {
    policy: RotationPolicy,
    names: BackupName,
    file: Option<File>,
    size: u64,
    at_line_start: bool,
    clock: Clock,
    mill: Option<JoinHandle<()>>,
}

impl RotatingWriter {
    pub fn new(policy: RotationPolicy) -> Self {
        let names = BackupName::for_file(&policy.filename);
        Self {
            policy,
            names,
            file: None,
            size: 0,
            at_line_start: true,
            clock: Box::new(Utc::now),
            mill: None,
        }
    }

    /// Replace the time source used for backup names and age cutoffs.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Bytes written to the active file, including what it held when opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Open (or create) the active file now instead of on first write.
    ///
    /// Surfaces missing-permission or bad-directory problems at startup.
    pub fn open(&mut self) -> Result<(), RotateError> {
        if self.file.is_none() {
            self.open_existing_or_new(0)?;
        }
        Ok(())
    }

    /// Move the active file to a timestamped backup and start a fresh one.
    pub fn rotate(&mut self) -> Result<(), RotateError> {
        self.close_file()?;
        self.open_new()?;
        tracing::info!(path = %self.policy.filename.display(), "log file rotated");
        self.spawn_mill();
        Ok(())
    }

    /// Close the active file and wait for any in-flight mill pass.
    ///
    /// Safe to call repeatedly; a later write reopens the file.
    pub fn close(&mut self) -> Result<(), RotateError> {
        let closed = self.close_file();
        self.wait_for_mill();
        closed
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, RotateError> {
        let len = buf.len() as u64;
        if len > self.policy.max_size {
            return Err(RotateError::WriteTooLarge {
                len: buf.len(),
                max: self.policy.max_size,
            });
        }

        if self.file.is_none() {
            self.open_existing_or_new(buf.len())?;
        }
        let mut chunk = buf;
        if self.size + len > self.policy.max_size {
            if self.at_line_start {
                self.rotate()?;
            } else if let Some(end) = buf.iter().position(|&b| b == b'\n') {
                // The rest goes to the next file once this line is complete.
                chunk = &buf[..=end];
            }
        }

        let path = &self.policy.filename;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io_err(path, io::Error::other("log file is not open")))?;
        let written = file.write(chunk).map_err(|e| io_err(path, e))?;
        self.size += written as u64;
        if written > 0 {
            self.at_line_start = chunk[written - 1] == b'\n';
        }
        Ok(written)
    }

    fn open_existing_or_new(&mut self, write_len: usize) -> Result<(), RotateError> {
        let path = self.policy.filename.clone();
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return self.open_new(),
            Err(err) => return Err(io_err(&path, err)),
        };

        if meta.len() + write_len as u64 >= self.policy.max_size {
            return self.rotate();
        }

        match OpenOptions::new().read(true).append(true).open(&path) {
            Ok(mut file) => {
                self.at_line_start =
                    ends_with_newline(&mut file, meta.len()).map_err(|e| io_err(&path, e))?;
                self.file = Some(file);
                self.size = meta.len();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot append to log file, starting a new one");
                self.open_new()
            }
        }
    }

    /// Create a fresh active file, renaming any existing one to a backup.
    fn open_new(&mut self) -> Result<(), RotateError> {
        let path = self.policy.filename.clone();
        let dir = self.policy.dir().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let mut mode = NEW_FILE_MODE;
        if let Ok(meta) = fs::metadata(&path) {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                mode = meta.permissions().mode();
            }
            #[cfg(not(unix))]
            let _ = meta;

            let backup = self.names.path_for(&dir, (self.clock)());
            fs::rename(&path, &backup).map_err(|e| io_err(&backup, e))?;
        }

        self.file = Some(create_file(&path, mode)?);
        self.size = 0;
        self.at_line_start = true;
        Ok(())
    }

    fn close_file(&mut self) -> Result<(), RotateError> {
        match self.file.take() {
            Some(file) => file
                .sync_all()
                .map_err(|e| io_err(&self.policy.filename, e)),
            None => Ok(()),
        }
    }

    fn spawn_mill(&mut self) {
        if !self.policy.needs_mill() {
            return;
        }
        // One pass at a time; the next rotation waits for the previous one.
        self.wait_for_mill();

        let policy = self.policy.clone();
        let now = (self.clock)();
        let spawned = thread::Builder::new()
            .name("syslogd-mill".to_string())
            .spawn(move || run_mill(&policy, now));
        match spawned {
            Ok(handle) => self.mill = Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "cannot spawn mill thread, running inline");
                run_mill(&self.policy, now);
            }
        }
    }

    fn wait_for_mill(&mut self) {
        if let Some(handle) = self.mill.take() {
            if handle.join().is_err() {
                tracing::warn!("log mill thread panicked");
            }
        }
    }
}

fn run_mill(policy: &RotationPolicy, now: DateTime<Utc>) {
    match mill(policy, now) {
        Ok(report) => tracing::debug!(
            removed = report.removed,
            compressed = report.compressed,
            "log backups milled"
        ),
        Err(err) => tracing::warn!(error = %err, "log backup mill failed"),
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn create_file(path: &Path, mode: u32) -> Result<File, RotateError> {
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path).map_err(|e| io_err(path, e))
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to close log file");
        }
    }
}
