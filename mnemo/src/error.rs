//! Error types for mnemo.

use std::{fmt, io};
use thiserror::Error;

/// Result type for mnemo operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Phase of a flashing session, used to report where a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    /// Reading bootloader information.
    Query,
    /// Erasing the application region.
    Erase,
    /// Writing pages.
    Write,
    /// Comparing device checksums against the image.
    Verify,
    /// Restarting into the application.
    Reset,
}

impl fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Erase => "erase",
            Self::Write => "write",
            Self::Verify => "verify",
            Self::Reset => "reset",
        })
    }
}

/// Error type for mnemo operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The serial device could not be opened.
    #[cfg(feature = "native")]
    #[error("Cannot open {port}: {source}")]
    Open {
        /// Port path that failed to open.
        port: String,
        /// Underlying serial error.
        #[source]
        source: serialport::Error,
    },

    /// No data arrived within a single bounded wait.
    #[error("Timeout after {timeout_ms} ms: received {received} of {expected} bytes")]
    Timeout {
        /// Bytes the caller asked for.
        expected: usize,
        /// Bytes accumulated before the wait elapsed.
        received: usize,
        /// The per-wait timeout in milliseconds.
        timeout_ms: u64,
    },

    /// A command frame or payload was not fully sent.
    #[error("Short write: sent {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes accepted by the port.
        written: usize,
        /// Bytes that should have been sent.
        expected: usize,
    },

    /// The device answered with a non-success status byte.
    #[error("Bootloader returned status {status:#04x} for {opcode}")]
    Status {
        /// Opcode name of the failed request.
        opcode: &'static str,
        /// Status byte returned by the device.
        status: u8,
    },

    /// Response had an unexpected layout.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device checksum differs from the image checksum.
    #[error("Checksum mismatch at {address:#08x}: device {device:#06x}, image {image:#06x}")]
    ChecksumMismatch {
        /// Start address of the verified window.
        address: u32,
        /// Checksum reported by the device.
        device: u16,
        /// Checksum computed over the image.
        image: u16,
    },

    /// A flashing session aborted.
    #[error("Flashing failed during {phase}{}: {source}", .offset.map(|o| format!(" at {o:#08x}")).unwrap_or_default())]
    Flash {
        /// Phase in which the session failed.
        phase: FlashPhase,
        /// Last offset reached, for the page-wise phases.
        offset: Option<u32>,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Device not found by autodetection.
    #[error("Device not found")]
    DeviceNotFound,

    /// Survey dump could not be decoded.
    #[error("Invalid survey dump: {0}")]
    InvalidDump(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an error with the flash phase (and offset) it occurred in.
    pub fn in_phase(self, phase: FlashPhase, offset: Option<u32>) -> Self {
        Self::Flash {
            phase,
            offset,
            source: Box::new(self),
        }
    }

    /// Returns `true` for a bounded-wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_error_display_with_offset() {
        let err = Error::Status {
            opcode: "FlashWrite",
            status: 0xFE,
        }
        .in_phase(FlashPhase::Write, Some(0x2080));
        assert_eq!(
            err.to_string(),
            "Flashing failed during write at 0x002080: Bootloader returned status 0xfe for FlashWrite"
        );
    }

    #[test]
    fn test_flash_error_display_without_offset() {
        let err = Error::Protocol("bad".into()).in_phase(FlashPhase::Query, None);
        assert_eq!(
            err.to_string(),
            "Flashing failed during query: Protocol error: bad"
        );
    }
}
