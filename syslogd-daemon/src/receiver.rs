//! The datagram receive loop.
//!
//! # Shutdown contract
//!
//! The loop ends in one of two ways, neither of which is an error:
//!
//! * the [`CancellationToken`] fires. Every receive is raced against the
//!   token, so a pending receive is abandoned as soon as shutdown starts;
//! * the source is closed. A closed source resolves a pending receive to
//!   `Ok(None)`; closed-socket I/O errors are mapped to the same thing.
//!
//! Any other receive error is logged and the loop keeps going.

use std::io::{self, Write};
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::MAX_DATAGRAM_SIZE;
use crate::error::DaemonError;
use crate::framing::frame_datagram;
use crate::sink::BufferedSink;

/// Where datagrams come from.
pub enum DatagramSource {
    /// A bound UDP socket (the production transport).
    Udp(UdpSocket),

    /// In-process feed. Closed once every sender is dropped.
    Channel(mpsc::Receiver<io::Result<Vec<u8>>>),
}

impl DatagramSource {
    /// Receive the next datagram into `buf`; `Ok(None)` once closed.
    pub async fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self {
            DatagramSource::Udp(socket) => match socket.recv_from(buf).await {
                Ok((len, _peer)) => Ok(Some(len)),
                Err(err) if is_closed(&err) => Ok(None),
                Err(err) => Err(err),
            },
            DatagramSource::Channel(rx) => match rx.recv().await {
                Some(Ok(datagram)) => {
                    let len = datagram.len().min(buf.len());
                    buf[..len].copy_from_slice(&datagram[..len]);
                    Ok(Some(len))
                }
                Some(Err(err)) => Err(err),
                None => Ok(None),
            },
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            DatagramSource::Udp(socket) => socket.local_addr().ok(),
            DatagramSource::Channel(_) => None,
        }
    }
}

fn is_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}

/// Why the receive loop stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    #[default]
    Cancelled,
    SourceClosed,
}

/// Counters for one run of the receive loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveStats {
    pub datagrams: u64,
    pub bytes: u64,
    pub recv_errors: u64,
    pub write_errors: u64,
    pub exit: ExitReason,
}

/// Owns the datagram source and the reusable receive buffer.
pub struct Receiver {
    source: DatagramSource,
    buf: Vec<u8>,
}

impl Receiver {
    /// Bind a UDP socket on `addr`.
    pub async fn bind(addr: SocketAddr) -> Result<Self, DaemonError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| DaemonError::Bind { addr, source })?;
        Ok(Self::new(DatagramSource::Udp(socket)))
    }

    pub fn new(source: DatagramSource) -> Self {
        Self {
            source,
            buf: vec![0; MAX_DATAGRAM_SIZE],
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.source.local_addr()
    }

    /// Forward datagrams into `sink` until cancelled or the source closes.
    ///
    /// Each datagram is written before the next receive reuses the buffer.
    pub async fn run<W: Write>(
        &mut self,
        sink: &mut BufferedSink<W>,
        cancel: &CancellationToken,
    ) -> ReceiveStats {
        let mut stats = ReceiveStats::default();

        stats.exit = loop {
            if cancel.is_cancelled() {
                break ExitReason::Cancelled;
            }

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break ExitReason::Cancelled,
                received = self.source.recv(&mut self.buf) => received,
            };

            let len = match received {
                Ok(Some(len)) => len,
                Ok(None) => break ExitReason::SourceClosed,
                Err(err) => {
                    stats.recv_errors += 1;
                    tracing::warn!(error = %err, "receive failed");
                    continue;
                }
            };

            let datagram = &self.buf[..len];
            stats.datagrams += 1;
            stats.bytes += len as u64;
            if let Err(err) = frame_datagram(sink, datagram) {
                stats.write_errors += 1;
                tracing::warn!(error = %err, "dropping datagram");
            }
        };

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tracing_test::traced_test;

    use crate::sink::tests::FlakyWriter;

    fn channel_receiver() -> (mpsc::Sender<io::Result<Vec<u8>>>, Receiver) {
        let (tx, rx) = mpsc::channel(16);
        (tx, Receiver::new(DatagramSource::Channel(rx)))
    }

    #[tokio::test]
    #[traced_test]
    async fn closed_source_ends_loop_without_error_log() {
        let (tx, mut receiver) = channel_receiver();
        tx.send(Ok(b"hello world".to_vec())).await.unwrap();
        tx.send(Ok(b"hello\n".to_vec())).await.unwrap();
        tx.send(Ok(Vec::new())).await.unwrap();
        drop(tx);

        let mut sink = BufferedSink::new(Vec::new());
        let stats = receiver.run(&mut sink, &CancellationToken::new()).await;
        sink.flush().unwrap();

        assert_eq!(stats.exit, ExitReason::SourceClosed);
        assert_eq!(stats.datagrams, 3);
        assert_eq!(stats.bytes, 17);
        assert_eq!(sink.get_ref().as_slice(), b"hello world\nhello\n");
        assert!(!logs_contain("receive failed"));
        assert!(!logs_contain("dropping datagram"));
    }

    #[tokio::test]
    #[traced_test]
    async fn receive_error_is_logged_and_loop_continues() {
        let (tx, mut receiver) = channel_receiver();
        tx.send(Err(io::Error::other("truncated packet"))).await.unwrap();
        tx.send(Ok(b"after".to_vec())).await.unwrap();
        drop(tx);

        let mut sink = BufferedSink::new(Vec::new());
        let stats = receiver.run(&mut sink, &CancellationToken::new()).await;
        sink.flush().unwrap();

        assert_eq!(stats.recv_errors, 1);
        assert_eq!(stats.datagrams, 1);
        assert_eq!(sink.get_ref().as_slice(), b"after\n");
        assert!(logs_contain("receive failed"));
        assert!(logs_contain("truncated packet"));
    }

    #[tokio::test]
    #[traced_test]
    async fn write_failure_does_not_stop_next_datagram() {
        let (tx, mut receiver) = channel_receiver();
        tx.send(Ok(b"first".to_vec())).await.unwrap();
        tx.send(Ok(b"second".to_vec())).await.unwrap();
        drop(tx);

        let mut sink = BufferedSink::with_capacity(0, FlakyWriter::failing(1));
        let stats = receiver.run(&mut sink, &CancellationToken::new()).await;

        assert_eq!(stats.datagrams, 2);
        assert_eq!(stats.write_errors, 1);
        assert_eq!(sink.get_ref().data, b"second\n");
        assert!(logs_contain("unable to write: disk full"));
    }

    #[tokio::test]
    async fn cancellation_unblocks_pending_receive() {
        let (tx, mut receiver) = channel_receiver();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut sink = BufferedSink::new(Vec::new());
        let stats = tokio::time::timeout(Duration::from_secs(5), receiver.run(&mut sink, &cancel))
            .await
            .expect("receive loop should stop on cancellation");

        assert_eq!(stats.exit, ExitReason::Cancelled);
        assert_eq!(stats.datagrams, 0);
        drop(tx);
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_receiving() {
        let (tx, mut receiver) = channel_receiver();
        tx.send(Ok(b"never read".to_vec())).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut sink = BufferedSink::new(Vec::new());
        let stats = receiver.run(&mut sink, &cancel).await;

        assert_eq!(stats.exit, ExitReason::Cancelled);
        assert_eq!(stats.datagrams, 0);
    }

    #[tokio::test]
    async fn udp_socket_receives_full_datagram() {
        let mut receiver = Receiver::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();

        let payload = vec![b'x'; 60_000];
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&payload, addr).await.unwrap();

        let len = receiver
            .source
            .recv(&mut receiver.buf)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(len, 60_000);
        assert_eq!(&receiver.buf[..len], payload.as_slice());
    }

    #[tokio::test]
    async fn bind_conflict_reports_address() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let err = match Receiver::bind(addr).await {
            Ok(_) => panic!("second bind on {addr} should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, DaemonError::Bind { addr: a, .. } if a == addr));
    }
}
