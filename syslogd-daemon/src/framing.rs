//! Newline framing of received datagrams.

use std::io::Write;

use crate::error::FrameError;
use crate::sink::BufferedSink;

/// Whether a newline must follow `datagram` in the log file.
pub fn needs_newline(datagram: &[u8]) -> bool {
    datagram.last().is_some_and(|&last| last != b'\n')
}

/// Write one datagram as one log line.
///
/// The raw bytes go out verbatim, followed by `\n` unless the datagram is
/// empty or already newline-terminated. A failed content write skips the
/// newline so a dropped datagram leaves no stray blank line behind.
pub fn frame_datagram<W: Write>(
    sink: &mut BufferedSink<W>,
    datagram: &[u8],
) -> Result<(), FrameError> {
    sink.write(datagram).map_err(FrameError::Content)?;
    if needs_newline(datagram) {
        sink.write_newline().map_err(FrameError::Newline)?;
    }
    Ok(())
}
