//! UDP syslog receiver: socket loop, buffered sink, lifecycle and supervisor
//! notification. Storage rotation lives in `syslogd-rotate`.

pub mod config;
mod error;
pub mod framing;
pub mod notify;
pub mod receiver;
mod runtime;
pub mod sink;

pub use config::DaemonConfig;
pub use error::{DaemonError, FrameError};
pub use notify::{Notifier, StoppingGuard};
pub use receiver::{DatagramSource, ExitReason, ReceiveStats, Receiver};
pub use runtime::{run, shutdown_on_signal, start_blocking, BoundDaemon, Daemon};
pub use sink::BufferedSink;
pub use tokio_util::sync::CancellationToken;
