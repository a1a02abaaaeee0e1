// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line framing over a serial connection.

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ParseError, ProtocolError, Result};
use crate::protocol::serial::{SerialCommand, SerialConfig};

/// Byte stream to a relay card.
///
/// Implemented for anything readable and writable, including the boxed
/// ports returned by `serialport`. Reads may return `WouldBlock` or
/// `TimedOut` when no data is available yet.
pub trait SerialLine: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> SerialLine for T {}

/// Command/response framing on top of a [`SerialLine`].
///
/// Commands are written as `token\r`. The device echoes `token\r\n` and,
/// for queries, follows with one response line ending in `\r\n`.
pub struct SerialLink {
    line: Box<dyn SerialLine>,
    pending: Vec<u8>,
    poll_interval: Duration,
    read_timeout: Duration,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("pending", &self.pending)
            .field("poll_interval", &self.poll_interval)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl SerialLink {
    /// Wraps an open line using the timing from `config`.
    #[must_use]
    pub fn new(line: Box<dyn SerialLine>, config: &SerialConfig) -> Self {
        Self {
            line,
            pending: Vec::new(),
            poll_interval: config.poll_interval(),
            read_timeout: config.read_timeout(),
        }
    }

    /// Sends a command and returns its response line, if it has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails, a line does not arrive in time,
    /// or the echo differs from the command.
    pub fn send(&mut self, command: &SerialCommand) -> Result<Option<String>> {
        let token = command.token();

        if !self.pending.is_empty() {
            tracing::debug!(stale = ?self.pending, "Dropping unread serial input");
            self.pending.clear();
        }

        tracing::trace!(command = %token, "Sending serial command");
        self.write_all(format!("{token}\r").as_bytes())?;

        let echo = self.read_line()?;
        if echo != token {
            return Err(ProtocolError::EchoMismatch {
                sent: token,
                received: echo,
            }
            .into());
        }

        if command.expects_response() {
            let response = self.read_line()?;
            tracing::trace!(command = %token, response = %response, "Serial response");
            Ok(Some(response))
        } else {
            Ok(None)
        }
    }

    /// Sends `s0` and decodes the aggregate state bitmask.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the response is not a
    /// decimal number.
    pub fn query_state(&mut self) -> Result<u32> {
        let response = self.send(&SerialCommand::QueryState)?.unwrap_or_default();
        response.trim().parse::<u32>().map_err(|_| {
            ParseError::UnexpectedFormat(format!("state bitmask {response:?}")).into()
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.line.write_all(bytes).map_err(ProtocolError::from)?;
        self.line.flush().map_err(ProtocolError::from)?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.read_timeout;
        let mut buf = [0u8; 64];

        loop {
            if let Some(end) = self.pending.windows(2).position(|w| w == b"\r\n") {
                let mut line: Vec<u8> = self.pending.drain(..end + 2).collect();
                line.truncate(end);
                if !line.is_ascii() {
                    return Err(ParseError::InvalidLine(line).into());
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }

            if Instant::now() >= deadline {
                if !self.pending.is_empty() {
                    tracing::warn!(received = ?self.pending, "Partial read from relay card");
                    self.pending.clear();
                }
                let waited = u64::try_from(self.read_timeout.as_millis()).unwrap_or(u64::MAX);
                return Err(ProtocolError::Timeout(waited).into());
            }

            match self.line.read(&mut buf) {
                Ok(0) => thread::sleep(self.poll_interval),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                // serialport already waited for its own timeout
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    thread::sleep(self.poll_interval);
                }
                Err(e) => return Err(ProtocolError::from(e).into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::Error;
    use crate::types::{ChannelIndex, RelayState};

    /// Replays canned read chunks and records writes.
    #[derive(Clone, Default)]
    struct Scripted {
        chunks: Arc<Mutex<VecDeque<Vec<u8>>>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl Scripted {
        fn with_chunks(chunks: &[&[u8]]) -> Self {
            let script = Self::default();
            script
                .chunks
                .lock()
                .extend(chunks.iter().map(|c| c.to_vec()));
            script
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.lock().pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Err(io::Error::from(ErrorKind::WouldBlock)),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn link(script: &Scripted) -> SerialLink {
        let config = SerialConfig::new("/dev/null")
            .with_poll_interval(Duration::from_millis(1))
            .with_read_timeout(Duration::from_millis(30));
        SerialLink::new(Box::new(script.clone()), &config)
    }

    #[test]
    fn identify_reads_echo_then_response() {
        let script = Scripted::with_chunks(&[b"?\r\n", b"UDIN-8R 8 x Relay V1.0\r\n"]);
        let response = link(&script).send(&SerialCommand::Identify).unwrap();
        assert_eq!(response.as_deref(), Some("UDIN-8R 8 x Relay V1.0"));
        assert_eq!(script.written.lock().as_slice(), b"?\r");
    }

    #[test]
    fn lines_may_arrive_split_or_joined() {
        let script = Scripted::with_chunks(&[b"s", b"0\r", b"\n5\r\n"]);
        assert_eq!(link(&script).query_state().unwrap(), 5);
    }

    #[test]
    fn switch_has_no_response() {
        let script = Scripted::with_chunks(&[b"n3\r\n"]);
        let cmd = SerialCommand::Switch {
            index: ChannelIndex::new(2).unwrap(),
            state: RelayState::On,
        };
        assert_eq!(link(&script).send(&cmd).unwrap(), None);
        assert_eq!(script.written.lock().as_slice(), b"n3\r");
    }

    #[test]
    fn echo_mismatch_is_an_error() {
        let script = Scripted::with_chunks(&[b"s0\r\n", b"0\r\n"]);
        let err = link(&script).send(&SerialCommand::Identify).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::EchoMismatch { .. })
        ));
    }

    #[test]
    fn missing_terminator_times_out() {
        let script = Scripted::with_chunks(&[b"?\r\n", b"UDIN-8R"]);
        let err = link(&script).send(&SerialCommand::Identify).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Timeout(30))));
    }

    #[test]
    fn silent_device_times_out() {
        let script = Scripted::default();
        let err = link(&script).send(&SerialCommand::Identify).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Timeout(_))));
    }

    #[test]
    fn bare_newline_is_not_a_terminator() {
        let script = Scripted::with_chunks(&[b"?\n"]);
        assert!(link(&script).send(&SerialCommand::Identify).is_err());
    }

    #[test]
    fn non_numeric_state_is_a_parse_error() {
        let script = Scripted::with_chunks(&[b"s0\r\n", b"ERR\r\n"]);
        let err = link(&script).query_state().unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::UnexpectedFormat(_))));
    }
}
