//! Raw serial port abstraction.
//!
//! The bootloader client and the survey reader never touch a concrete serial
//! implementation. They talk to a [`Port`], which the CLI backs with
//! [`NativePort`] and the tests back with in-memory devices.
//!
//! ```text
//! +----------------------+   +----------------------+
//! |   BootloaderClient   |   |   survey::acquire    |
//! +----------+-----------+   +----------+-----------+
//!            |                          |
//!            v                          v
//! +----------+--------------------------+-----------+
//! |                  SerialChannel                  |
//! +------------------------+------------------------+
//!                          |
//!                          v
//! +------------------------+------------------------+
//! |                   Port trait                    |
//! +------------+--------------------+---------------+
//!              |                    |
//!       NativePort (serialport)   test doubles
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use mnemo::port::Port;
//!
//! fn poke<P: Port>(port: &mut P) -> std::io::Result<()> {
//!     port.write_all(b"getdata\n")?;
//!
//!     let mut buf = [0u8; 64];
//!     let n = port.read(&mut buf)?;
//!     println!("Received: {:?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Default per-read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Serial port settings.
///
/// The logger always uses 8 data bits, no parity, one stop bit and no flow
/// control, so only the baud rate and timeout are configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 9600,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a configuration for `port_name` at `baud_rate`.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A duplex byte port.
///
/// Reads must honour the configured timeout and report an elapsed wait as
/// [`std::io::ErrorKind::TimedOut`] (or `Ok(0)`).
pub trait Port: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Set the baud rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Discard pending input and output.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port. Further I/O fails with `NotConnected`.
    fn close(&mut self) -> Result<()>;
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        (**self).set_baud_rate(baud_rate)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn clear_buffers(&mut self) -> Result<()> {
        (**self).clear_buffers()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(feature = "native")]
pub use native::NativePort;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_millis(1000));
        assert!(config.port_name.is_empty());
    }

    #[test]
    fn test_serial_config_builder() {
        let config =
            SerialConfig::new("/dev/ttyUSB0", 460_800).with_timeout(Duration::from_secs(5));

        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 460_800);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
