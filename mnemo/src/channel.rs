//! Blocking byte channel with bounded-wait reads.
//!
//! A [`SerialChannel`] owns a [`Port`] for the length of a session. Opening
//! remembers the port's timeout and baud rate and switches to the session
//! baud rate; closing puts the old settings back and closes the port. Closing
//! happens at most once, either through [`SerialChannel::close`] or on drop.
//!
//! Only the timeout and baud rate are restored. Terminal settings a port had
//! before it was opened (parity, flow control, modem lines) are not captured,
//! since a [`Port`] is already configured by the time the channel sees it.

use {
    crate::{
        error::{Error, Result},
        port::Port,
    },
    log::{trace, warn},
    std::{io, time::Duration},
};

/// Settings captured when the channel was opened.
#[derive(Debug, Clone, Copy)]
struct SavedSettings {
    timeout: Duration,
    baud_rate: u32,
}

/// Exclusive, scoped access to a serial port.
///
/// Restores the timeout and baud rate on close; see the module docs.
pub struct SerialChannel<P: Port> {
    port: P,
    saved: SavedSettings,
    closed: bool,
}

impl<P: Port> SerialChannel<P> {
    /// Take ownership of `port` and switch it to `baud_rate`.
    ///
    /// Pending input is discarded.
    pub fn open(mut port: P, baud_rate: u32) -> Result<Self> {
        let saved = SavedSettings {
            timeout: port.timeout(),
            baud_rate: port.baud_rate(),
        };
        trace!(
            "{}: saved {} baud, {:?} timeout",
            port.name(),
            saved.baud_rate,
            saved.timeout
        );

        if saved.baud_rate != baud_rate {
            port.set_baud_rate(baud_rate)?;
        }
        port.clear_buffers()?;

        Ok(Self {
            port,
            saved,
            closed: false,
        })
    }

    /// Send `bytes` in a single write.
    ///
    /// A partial write is reported as [`Error::ShortWrite`].
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let written = loop {
            match self.port.write(bytes) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        };
        if written != bytes.len() {
            return Err(Error::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        self.port.flush()?;
        trace!("TX {} bytes: {:02X?}", bytes.len(), bytes);
        Ok(())
    }

    /// Read exactly `count` bytes.
    ///
    /// `timeout_ms` bounds each individual wait, not the whole call: the read
    /// fails with [`Error::Timeout`] as soon as one wait elapses without data.
    /// A device that keeps trickling bytes slower than `count` but faster than
    /// the timeout can therefore hold this call for a long time.
    pub fn read_exact(&mut self, count: usize, timeout_ms: u64) -> Result<Vec<u8>> {
        self.apply_timeout(Duration::from_millis(timeout_ms))?;

        let mut buf = vec![0u8; count];
        let mut received = 0;
        while received < count {
            match self.port.read(&mut buf[received..]) {
                Ok(0) => {
                    return Err(Error::Timeout {
                        expected: count,
                        received,
                        timeout_ms,
                    });
                },
                Ok(n) => received += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(Error::Timeout {
                        expected: count,
                        received,
                        timeout_ms,
                    });
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }

        trace!("RX {count} bytes: {buf:02X?}");
        Ok(buf)
    }

    /// Read whatever arrives within one wait of `timeout`.
    ///
    /// Returns `Ok(0)` when the wait elapsed with no data.
    pub fn read_available(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.apply_timeout(timeout)?;
        loop {
            match self.port.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(0),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Underlying port.
    pub fn get_ref(&self) -> &P {
        &self.port
    }

    /// Mutable access to the underlying port.
    pub fn get_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Restore the saved settings and close the port.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn apply_timeout(&mut self, timeout: Duration) -> Result<()> {
        if self.port.timeout() != timeout {
            self.port.set_timeout(timeout)?;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let restored = self
            .port
            .set_timeout(self.saved.timeout)
            .and_then(|()| self.port.set_baud_rate(self.saved.baud_rate));
        let closed = self.port.close();
        restored.and(closed)
    }
}

impl<P: Port> Drop for SerialChannel<P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to restore {}: {e}", self.port.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockPort;

    fn mock() -> MockPort {
        MockPort::new(9600, Duration::from_millis(250))
    }

    #[test]
    fn test_open_switches_baud_and_clears() {
        let port = mock();
        let state = port.handle();
        let channel = SerialChannel::open(port, 460_800).unwrap();

        assert_eq!(channel.get_ref().baud_rate(), 460_800);
        assert_eq!(state.lock().unwrap().clears, 1);
    }

    #[test]
    fn test_read_exact_accumulates_chunks() {
        let port = mock();
        port.push_read(&[1, 2]);
        port.push_read(&[3]);
        port.push_read(&[4, 5, 6]);
        let mut channel = SerialChannel::open(port, 9600).unwrap();

        assert_eq!(channel.read_exact(4, 1000).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(channel.read_exact(2, 1000).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_read_exact_times_out_with_partial_count() {
        let port = mock();
        port.push_read(&[1, 2, 3]);
        let mut channel = SerialChannel::open(port, 9600).unwrap();

        match channel.read_exact(11, 1000) {
            Err(Error::Timeout {
                expected,
                received,
                timeout_ms,
            }) => {
                assert_eq!(expected, 11);
                assert_eq!(received, 3);
                assert_eq!(timeout_ms, 1000);
            },
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_read_exact_sets_per_wait_timeout() {
        let port = mock();
        let state = port.handle();
        port.push_read(&[0; 11]);
        let mut channel = SerialChannel::open(port, 9600).unwrap();

        channel.read_exact(11, 5000).unwrap();
        assert_eq!(state.lock().unwrap().timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_timeout_set_only_on_change_and_restored() {
        let port = mock();
        let state = port.handle();
        port.push_read(&[0; 4]);
        port.push_read(&[0; 4]);
        let mut channel = SerialChannel::open(port, 9600).unwrap();

        channel.read_exact(4, 5000).unwrap();
        channel.read_exact(4, 5000).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(channel.read_available(&mut buf, Duration::from_millis(1000)).unwrap(), 0);
        assert_eq!(
            state.lock().unwrap().timeouts_set,
            vec![Duration::from_millis(5000), Duration::from_millis(1000)]
        );

        channel.close().unwrap();
        assert_eq!(
            state.lock().unwrap().timeouts_set,
            vec![
                Duration::from_millis(5000),
                Duration::from_millis(1000),
                Duration::from_millis(250),
            ]
        );
    }

    #[test]
    fn test_short_write_is_distinct_error() {
        let port = mock();
        port.handle().lock().unwrap().write_limit = Some(4);
        let mut channel = SerialChannel::open(port, 9600).unwrap();

        match channel.write(&[0u8; 10]) {
            Err(Error::ShortWrite { written, expected }) => {
                assert_eq!(written, 4);
                assert_eq!(expected, 10);
            },
            other => panic!("expected short write, got {other:?}"),
        }
    }

    #[test]
    fn test_read_available_returns_zero_on_timeout() {
        let port = mock();
        port.push_read(&[]);
        port.push_read(b"abc");
        let mut channel = SerialChannel::open(port, 9600).unwrap();
        let mut buf = [0u8; 16];

        assert_eq!(
            channel
                .read_available(&mut buf, Duration::from_millis(100))
                .unwrap(),
            0
        );
        assert_eq!(
            channel
                .read_available(&mut buf, Duration::from_millis(100))
                .unwrap(),
            3
        );
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_close_restores_settings() {
        let port = mock();
        let state = port.handle();
        let mut channel = SerialChannel::open(port, 115_200).unwrap();
        channel.read_available(&mut [0u8; 4], Duration::from_millis(10)).unwrap();
        channel.close().unwrap();

        let state = state.lock().unwrap();
        assert!(state.closed);
        assert_eq!(state.baud_rate, 9600);
        assert_eq!(state.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_drop_restores_settings_on_error_path() {
        let port = mock();
        let state = port.handle();
        {
            let mut channel = SerialChannel::open(port, 115_200).unwrap();
            assert!(channel.read_exact(1, 10).unwrap_err().is_timeout());
        }

        let state = state.lock().unwrap();
        assert!(state.closed);
        assert_eq!(state.baud_rate, 9600);
        assert_eq!(state.timeout, Duration::from_millis(250));
    }
}
