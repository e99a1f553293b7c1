//! syslogd — receive syslog datagrams over UDP and store them in rotating,
//! compressed log files.
//!
//! # Usage
//!
//! ```text
//! syslogd [--dir <PATH>]
//! ```
//!
//! Listens on UDP port 514 and appends every datagram as one line to
//! `<PATH>/syslog`. SIGINT, SIGHUP or SIGTERM stop the daemon cleanly.

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use syslogd_daemon::config::DEFAULT_LOG_DIR;
use syslogd_daemon::{start_blocking, DaemonConfig};

#[derive(Parser, Debug)]
#[command(
    name = "syslogd",
    version,
    about = "Receive syslog over UDP and write it to rotating log files",
    long_about = None,
)]
struct Cli {
    /// Directory where syslog files are written.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOG_DIR)]
    dir: PathBuf,
}

/// Accept the single-dash `-dir` spelling used by existing service units.
fn normalize_legacy_flags(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-dir") => OsString::from("--dir"),
            Some(s) if s.starts_with("-dir=") => OsString::from(format!("-{s}")),
            _ => arg,
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(normalize_legacy_flags(std::env::args_os()));
    let config = DaemonConfig::new(&cli.dir);

    let stats = start_blocking(config)
        .with_context(|| format!("syslogd failed (log dir {})", cli.dir.display()))?;
    tracing::info!(datagrams = stats.datagrams, "syslogd stopped");
    Ok(())
}
