//! Survey download from the logger.
//!
//! The logger streams its memory after a trigger command and then goes
//! quiet. The stream has no length prefix or terminator, so the end is
//! detected by a run of empty reads.

use {
    crate::{
        channel::SerialChannel,
        error::{Error, Result},
        port::Port,
    },
    chrono::{Datelike, Local, NaiveDateTime, Timelike},
    log::{debug, info},
    std::{fmt, str::FromStr, thread, time::Duration},
};

/// Trigger byte of the first-generation firmware.
pub const GETDATA_V1: u8 = 0x43;

/// Trigger line of the second-generation firmware.
pub const GETDATA_V2: &[u8] = b"getdata\n";

/// Baud rate used for survey download.
pub const IMPORT_BAUD: u32 = 9600;

/// Firmware generation, which selects the trigger command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// `0x43` followed by a local-time header.
    #[default]
    V1,
    /// `getdata\n`.
    V2,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        })
    }
}

impl FromStr for ProtocolVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(Self::V1),
            "v2" | "2" => Ok(Self::V2),
            other => Err(Error::Config(format!("unknown protocol version '{other}'"))),
        }
    }
}

/// Timing of a survey download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Consecutive empty reads that end the download.
    pub max_empty_reads: u32,
    /// Wait for data on each read.
    pub read_timeout: Duration,
    /// Pause after an empty read.
    pub backoff: Duration,
    /// Pause between the v1 trigger byte and the time header.
    pub trigger_delay: Duration,
    /// Largest chunk handed to the sink.
    pub chunk_size: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_empty_reads: 5,
            read_timeout: Duration::from_millis(100),
            backoff: Duration::from_millis(100),
            trigger_delay: Duration::from_millis(100),
            chunk_size: 1024,
        }
    }
}

impl AcquisitionConfig {
    /// Set the number of empty reads that end the download.
    #[must_use]
    pub fn with_max_empty_reads(mut self, max_empty_reads: u32) -> Self {
        self.max_empty_reads = max_empty_reads;
        self
    }

    /// Set read timeout, backoff and trigger delay at once.
    #[must_use]
    pub fn with_timing(mut self, read_timeout: Duration, backoff: Duration, trigger_delay: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.backoff = backoff;
        self.trigger_delay = trigger_delay;
        self
    }
}

/// Receiver of downloaded survey bytes.
pub trait SurveySink {
    /// Handle one non-empty chunk, in arrival order.
    fn on_data(&mut self, chunk: &[u8]) -> Result<()>;
}

impl<F> SurveySink for F
where
    F: FnMut(&[u8]) -> Result<()>,
{
    fn on_data(&mut self, chunk: &[u8]) -> Result<()> {
        self(chunk)
    }
}

/// Encode the v1 time header `[year - 2000, month, day, hour, minute]`.
pub fn time_header(now: &NaiveDateTime) -> Result<[u8; 5]> {
    let year = u8::try_from(now.year() - 2000)
        .map_err(|_| Error::Config(format!("year {} cannot be sent to the logger", now.year())))?;
    // month, day, hour and minute always fit in a byte
    let field = |v: u32| u8::try_from(v).unwrap_or(u8::MAX);
    Ok([
        year,
        field(now.month()),
        field(now.day()),
        field(now.hour()),
        field(now.minute()),
    ])
}

/// Trigger a download and stream it into `sink`, stamping v1 requests with
/// the local time.
///
/// Returns the number of bytes received.
pub fn acquire<P, S>(
    channel: &mut SerialChannel<P>,
    version: ProtocolVersion,
    sink: &mut S,
    config: &AcquisitionConfig,
) -> Result<usize>
where
    P: Port,
    S: SurveySink + ?Sized,
{
    acquire_at(channel, version, &Local::now().naive_local(), sink, config)
}

/// [`acquire`] with an explicit timestamp for the v1 header.
pub fn acquire_at<P, S>(
    channel: &mut SerialChannel<P>,
    version: ProtocolVersion,
    now: &NaiveDateTime,
    sink: &mut S,
    config: &AcquisitionConfig,
) -> Result<usize>
where
    P: Port,
    S: SurveySink + ?Sized,
{
    info!("Requesting survey data ({version})");
    match version {
        ProtocolVersion::V1 => {
            let header = time_header(now)?;
            channel.write(&[GETDATA_V1])?;
            pause(config.trigger_delay);
            channel.write(&header)?;
        },
        ProtocolVersion::V2 => channel.write(GETDATA_V2)?,
    }

    let mut buf = vec![0u8; config.chunk_size.max(1)];
    let mut total = 0;
    let mut empty_reads = 0;
    while empty_reads < config.max_empty_reads {
        let n = match channel.read_available(&mut buf, config.read_timeout) {
            Ok(n) => n,
            Err(e) => {
                debug!("Read failed, counted as empty: {e}");
                0
            },
        };
        if n == 0 {
            empty_reads += 1;
            pause(config.backoff);
            continue;
        }
        empty_reads = 0;
        total += n;
        debug!("Received {n} bytes ({total} total)");
        sink.on_data(&buf[..n])?;
    }

    info!("Download finished, {total} bytes");
    Ok(total)
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockPort;
    use chrono::NaiveDate;
    use std::io;

    fn fast() -> AcquisitionConfig {
        AcquisitionConfig::default().with_timing(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_time_header() {
        assert_eq!(time_header(&stamp()).unwrap(), [24, 3, 9, 14, 5]);
    }

    #[test]
    fn test_v1_trigger_bytes() {
        let port = MockPort::new(9600, Duration::ZERO);
        let state = port.handle();
        let mut channel = SerialChannel::open(port, IMPORT_BAUD).unwrap();
        let mut sink = |_: &[u8]| -> Result<()> { Ok(()) };

        acquire_at(&mut channel, ProtocolVersion::V1, &stamp(), &mut sink, &fast()).unwrap();
        assert_eq!(state.lock().unwrap().written, vec![0x43, 24, 3, 9, 14, 5]);
    }

    #[test]
    fn test_v2_trigger_bytes() {
        let port = MockPort::new(9600, Duration::ZERO);
        let state = port.handle();
        let mut channel = SerialChannel::open(port, IMPORT_BAUD).unwrap();
        let mut sink = |_: &[u8]| -> Result<()> { Ok(()) };

        acquire_at(&mut channel, ProtocolVersion::V2, &stamp(), &mut sink, &fast()).unwrap();
        assert_eq!(state.lock().unwrap().written, b"getdata\n".to_vec());
    }

    #[test]
    fn test_empty_reads_reset_on_data() {
        let port = MockPort::new(9600, Duration::ZERO);
        port.push_read(b"ab");
        for _ in 0..4 {
            port.push_read(&[]);
        }
        port.push_read(b"cd");
        for _ in 0..4 {
            port.push_read(&[]);
        }
        port.push_read(b"ef");
        let mut channel = SerialChannel::open(port, IMPORT_BAUD).unwrap();

        let mut received = Vec::new();
        let mut sink = |chunk: &[u8]| -> Result<()> {
            received.push(chunk.to_vec());
            Ok(())
        };
        let total =
            acquire_at(&mut channel, ProtocolVersion::V2, &stamp(), &mut sink, &fast()).unwrap();

        assert_eq!(total, 6);
        assert_eq!(received, vec![b"ab".to_vec(), b"cd".to_vec(), b"ef".to_vec()]);
    }

    #[test]
    fn test_five_empty_reads_end_stream() {
        let port = MockPort::new(9600, Duration::ZERO);
        port.push_read(b"ab");
        for _ in 0..5 {
            port.push_read(&[]);
        }
        port.push_read(b"never");
        let state = port.handle();
        let mut channel = SerialChannel::open(port, IMPORT_BAUD).unwrap();

        let mut sink = |_: &[u8]| -> Result<()> { Ok(()) };
        let total =
            acquire_at(&mut channel, ProtocolVersion::V2, &stamp(), &mut sink, &fast()).unwrap();

        assert_eq!(total, 2);
        assert_eq!(state.lock().unwrap().reads.len(), 1);
    }

    #[test]
    fn test_read_errors_count_as_empty_reads() {
        let port = MockPort::new(9600, Duration::ZERO);
        port.push_read(b"ab");
        port.push_read_error(io::ErrorKind::WouldBlock);
        port.push_read(b"cd");
        for _ in 0..3 {
            port.push_read_error(io::ErrorKind::BrokenPipe);
        }
        port.push_read(&[]);
        port.push_read(&[]);
        port.push_read(b"never");
        let state = port.handle();
        let mut channel = SerialChannel::open(port, IMPORT_BAUD).unwrap();

        let mut received = Vec::new();
        let mut sink = |chunk: &[u8]| -> Result<()> {
            received.extend_from_slice(chunk);
            Ok(())
        };
        let total =
            acquire_at(&mut channel, ProtocolVersion::V2, &stamp(), &mut sink, &fast()).unwrap();

        assert_eq!(total, 4);
        assert_eq!(received, b"abcd");
        assert_eq!(state.lock().unwrap().reads.len(), 1);
    }

    #[test]
    fn test_sink_error_aborts() {
        let port = MockPort::new(9600, Duration::ZERO);
        port.push_read(b"ab");
        let mut channel = SerialChannel::open(port, IMPORT_BAUD).unwrap();

        let mut sink = |_: &[u8]| -> Result<()> { Err(Error::InvalidDump("disk full".into())) };
        assert!(acquire_at(&mut channel, ProtocolVersion::V2, &stamp(), &mut sink, &fast()).is_err());
    }

    #[test]
    fn test_protocol_version_from_str() {
        assert_eq!("v2".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V2);
        assert_eq!("V1".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V1);
        assert!("v3".parse::<ProtocolVersion>().is_err());
    }
}
