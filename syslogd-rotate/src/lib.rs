//! Size/age/count based log rotation with gzip-compressed backups.
//!
//! [`RotatingWriter`] appends to a single active file. When a write would push
//! the file past [`RotationPolicy::max_size`], the active file is renamed to a
//! timestamped backup (`syslog-2026-10-17T08-30-00.123`) and a fresh file is
//! started. After every rotation a background "mill" pass prunes backups by
//! count and age and gzips whatever remains uncompressed.

mod backup;
pub mod error;
pub mod policy;
mod writer;

pub use backup::{list_backups, LogBackup};
pub use error::RotateError;
pub use policy::{RotationPolicy, DEFAULT_MAX_AGE, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_SIZE, MEGABYTE};
pub use writer::RotatingWriter;
