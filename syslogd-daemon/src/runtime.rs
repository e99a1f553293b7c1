use std::net::SocketAddr;

use syslogd_rotate::RotatingWriter;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::notify::{Notifier, StoppingGuard};
use crate::receiver::{DatagramSource, ReceiveStats, Receiver};
use crate::sink::BufferedSink;

/// Start the daemon on a fresh runtime and block until it shuts down.
///
/// SIGINT, SIGHUP and SIGTERM trigger a graceful shutdown, which is reported
/// as `Ok`. `STOPPING=1` is sent on every return, including runtime or signal
/// handler setup failures.
pub fn start_blocking(config: DaemonConfig) -> Result<ReceiveStats, DaemonError> {
    init_tracing();
    let daemon = Daemon::new(config);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DaemonError::Runtime(format!("cannot build tokio runtime: {e}")))?;

    let cancel = CancellationToken::new();
    let signals = {
        let _enter = runtime.enter();
        shutdown_on_signal(cancel.clone())?
    };

    runtime.block_on(async move {
        let result = daemon.run(cancel.clone()).await;
        cancel.cancel();
        join_signal_task(signals).await;
        result
    })
}

/// Run the full lifecycle: bind, notify readiness, receive, drain.
pub async fn run(
    config: DaemonConfig,
    cancel: CancellationToken,
) -> Result<ReceiveStats, DaemonError> {
    Daemon::new(config).run(cancel).await
}

/// Cancel `cancel` on SIGINT, SIGHUP or SIGTERM.
///
/// Must be called inside a tokio runtime. The task also ends quietly once the
/// token is cancelled by someone else.
pub fn shutdown_on_signal(cancel: CancellationToken) -> Result<JoinHandle<()>, DaemonError> {
    let install = |kind: SignalKind, name: &str| {
        signal(kind)
            .map_err(|e| DaemonError::Runtime(format!("cannot install {name} handler: {e}")))
    };
    let mut interrupt = install(SignalKind::interrupt(), "SIGINT")?;
    let mut hangup = install(SignalKind::hangup(), "SIGHUP")?;
    let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;

    Ok(tokio::spawn(async move {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interrupt.recv() => "SIGINT",
            _ = hangup.recv() => "SIGHUP",
            _ = terminate.recv() => "SIGTERM",
        };
        tracing::info!(signal = received, "received signal, shutting down");
        cancel.cancel();
    }))
}

async fn join_signal_task(handle: JoinHandle<()>) {
    if let Err(err) = handle.await {
        tracing::warn!(error = %err, "signal task ended abnormally");
    }
}

/// A configured daemon that has not yet bound its socket.
///
/// `STOPPING=1` is sent when the daemon is dropped, whether or not it ever
/// got as far as binding.
pub struct Daemon {
    config: DaemonConfig,
    notifier: Notifier,
    stopping: StoppingGuard,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        let notifier = Notifier::new(config.notify_socket.clone());
        let stopping = notifier.stopping_guard();
        Self {
            config,
            notifier,
            stopping,
        }
    }

    /// Bind, then serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<ReceiveStats, DaemonError> {
        let bound = self.bind().await?;
        Ok(bound.serve(cancel).await)
    }

    /// Open the log file and bind the UDP socket.
    pub async fn bind(self) -> Result<BoundDaemon, DaemonError> {
        let receiver = Receiver::bind(self.config.listen_addr).await?;
        self.assemble(receiver)
    }

    /// Like [`bind`], but reading from an already constructed source.
    ///
    /// [`bind`]: Daemon::bind
    pub fn with_source(self, source: DatagramSource) -> Result<BoundDaemon, DaemonError> {
        self.assemble(Receiver::new(source))
    }

    fn assemble(self, receiver: Receiver) -> Result<BoundDaemon, DaemonError> {
        let Daemon {
            config,
            notifier,
            stopping,
        } = self;
        let mut writer = RotatingWriter::new(config.rotation.clone());
        writer.open()?;
        let sink = BufferedSink::with_capacity(config.buffer_capacity, writer);

        tracing::info!(
            addr = ?receiver.local_addr(),
            path = %config.log_file().display(),
            "syslog receiver bound",
        );
        Ok(BoundDaemon {
            receiver,
            sink,
            notifier,
            stopping,
        })
    }
}

/// A daemon owning its socket and open log file, ready to serve.
pub struct BoundDaemon {
    receiver: Receiver,
    sink: BufferedSink<RotatingWriter>,
    notifier: Notifier,
    stopping: StoppingGuard,
}

impl BoundDaemon {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.local_addr()
    }

    /// Notify readiness, receive until cancelled, then flush and close.
    ///
    /// Drain failures are logged; they do not change the outcome.
    pub async fn serve(self, cancel: CancellationToken) -> ReceiveStats {
        let BoundDaemon {
            mut receiver,
            mut sink,
            notifier,
            stopping,
        } = self;

        if let Err(err) = notifier.ready() {
            tracing::warn!(error = %err, "readiness notification failed");
        }
        tracing::info!("receiving syslog datagrams");

        let stats = receiver.run(&mut sink, &cancel).await;
        tracing::info!(
            reason = ?stats.exit,
            datagrams = stats.datagrams,
            bytes = stats.bytes,
            recv_errors = stats.recv_errors,
            write_errors = stats.write_errors,
            "receive loop stopped",
        );

        drop(receiver);
        drain(sink);
        drop(stopping);
        stats
    }
}

fn drain(mut sink: BufferedSink<RotatingWriter>) {
    if let Err(err) = sink.flush() {
        tracing::error!(error = %err, "failed to flush log buffer");
    }
    let mut writer = sink.into_inner();
    if let Err(err) = writer.close() {
        tracing::error!(error = %err, "failed to close log file");
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
