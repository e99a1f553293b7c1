//! Lossy buffered writer placed in front of the log file.
//!
//! Unlike `std::io::BufWriter`, a failed flush discards the pending bytes
//! instead of keeping them for a retry, and the sink stays usable. Syslog over
//! UDP is lossy already; one bad write must not stall datagram intake.

use std::io::{self, Write};

use crate::config::DEFAULT_BUFFER_CAPACITY;

pub struct BufferedSink<W: Write> {
    inner: W,
    buf: Vec<u8>,
    capacity: usize,
}

impl<W: Write> BufferedSink<W> {
    pub fn new(inner: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY, inner)
    }

    pub fn with_capacity(capacity: usize, inner: W) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `bytes`, flushing first if they do not fit.
    ///
    /// On error both the pending buffer and `bytes` are dropped.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.buf.len() + bytes.len() > self.capacity {
            self.flush_buf()?;
        }
        if bytes.len() >= self.capacity {
            return self.inner.write_all(bytes);
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_newline(&mut self) -> io::Result<()> {
        self.write(b"\n")
    }

    /// Push buffered bytes to the writer and flush it.
    pub fn flush(&mut self) -> io::Result<()> {
        self.flush_buf()?;
        self.inner.flush()
    }

    /// Bytes waiting in memory.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the writer. Buffered bytes are discarded; call [`flush`] first.
    ///
    /// [`flush`]: BufferedSink::flush
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let result = self.inner.write_all(&self.buf);
        self.buf.clear();
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Writer that fails its next `failures` writes, then records everything.
    #[derive(Debug, Default)]
    pub(crate) struct FlakyWriter {
        pub failures: usize,
        pub data: Vec<u8>,
    }

    impl FlakyWriter {
        pub(crate) fn failing(failures: usize) -> Self {
            Self {
                failures,
                data: Vec::new(),
            }
        }
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::other("disk full"));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn small_writes_stay_buffered_until_flush() {
        let mut sink = BufferedSink::with_capacity(16, Vec::new());
        sink.write(b"abc").unwrap();
        sink.write_newline().unwrap();
        assert_eq!(sink.buffered(), 4);
        assert!(sink.get_ref().is_empty());

        sink.flush().unwrap();
        assert_eq!(sink.buffered(), 0);
        assert_eq!(sink.get_ref().as_slice(), b"abc\n");
    }

    #[test]
    fn overflow_flushes_pending_bytes_first() {
        let mut sink = BufferedSink::with_capacity(8, Vec::new());
        sink.write(b"12345").unwrap();
        sink.write(b"6789").unwrap();
        assert_eq!(sink.get_ref().as_slice(), b"12345");
        assert_eq!(sink.buffered(), 4);
    }

    #[test]
    fn payload_larger_than_buffer_goes_straight_through() {
        let mut sink = BufferedSink::with_capacity(4, Vec::new());
        sink.write(b"ab").unwrap();
        sink.write(b"a long datagram").unwrap();
        assert_eq!(sink.get_ref().as_slice(), b"aba long datagram");
        assert_eq!(sink.buffered(), 0);
    }

    #[test]
    fn zero_capacity_writes_through() {
        let mut sink = BufferedSink::with_capacity(0, Vec::new());
        sink.write(b"x").unwrap();
        sink.write_newline().unwrap();
        assert_eq!(sink.get_ref().as_slice(), b"x\n");
    }

    #[test]
    fn failed_flush_drops_data_and_recovers() {
        let mut sink = BufferedSink::with_capacity(6, FlakyWriter::failing(1));
        sink.write(b"lost").unwrap();
        let err = sink.write(b"gone").unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(sink.buffered(), 0);

        sink.write(b"ok\n").unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.get_ref().data, b"ok\n");
    }
}
