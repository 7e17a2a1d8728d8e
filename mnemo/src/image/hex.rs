//! Intel HEX decoding into a flat memory image.
//!
//! Decoding is lenient: a line that is malformed, truncated or fails its
//! checksum is skipped and decoding continues with the next line. Bytes that
//! land outside the image are dropped. Both cases are silent unless a
//! diagnostics hook is installed with [`HexDecoder::decode_with`].
//!
//! Only record types 00 (data), 01 (end of file) and 04 (extended linear
//! address) have an effect; other record types are ignored.
//!
//! ## Record Format
//!
//! ```text
//! +---+-------+---------+------+----------------+----------+
//! | : | count | address | type |      data      | checksum |
//! +---+-------+---------+------+----------------+----------+
//! | 1 |   2   |    4    |  2   |   2 * count    |    2     |
//! +---+-------+---------+------+----------------+----------+
//! ```

use crate::error::Result;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;

/// Default image capacity (1 MiB).
pub const IMAGE_CAPACITY: usize = 1024 * 1024;

/// Value of erased flash.
pub const ERASED_BYTE: u8 = 0xFF;

/// Shortest possible record line (`:` + count + address + type + checksum).
const MIN_RECORD_LEN: usize = 11;

/// Offset of the first data character in a record line.
const DATA_OFFSET: usize = 9;

/// A byte-addressable image initialised to erased flash.
#[derive(Clone, PartialEq, Eq)]
pub struct MemoryImage {
    bytes: Vec<u8>,
    highest_written: usize,
}

impl MemoryImage {
    /// Create an erased image of [`IMAGE_CAPACITY`] bytes.
    pub fn new() -> Self {
        Self::with_capacity(IMAGE_CAPACITY)
    }

    /// Create an erased image of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![ERASED_BYTE; capacity],
            highest_written: 0,
        }
    }

    /// Image capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// One past the highest address written by the decoder.
    pub fn highest_written_address(&self) -> usize {
        self.highest_written
    }

    /// Whole image contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte at `address`, if inside the image.
    pub fn get(&self, address: usize) -> Option<u8> {
        self.bytes.get(address).copied()
    }

    /// Bytes in `range`, if it lies inside the image.
    pub fn slice(&self, range: Range<usize>) -> Option<&[u8]> {
        self.bytes.get(range)
    }

    /// Overwrite a single byte without touching the high-water mark.
    ///
    /// Returns `false` if `address` is outside the image.
    pub fn set(&mut self, address: usize, value: u8) -> bool {
        match self.bytes.get_mut(address) {
            Some(byte) => {
                *byte = value;
                true
            },
            None => false,
        }
    }

    /// Store a decoded byte, updating the high-water mark.
    fn store(&mut self, address: u32, value: u8) -> bool {
        let Ok(address) = usize::try_from(address) else {
            return false;
        };
        if !self.set(address, value) {
            return false;
        }
        self.highest_written = self.highest_written.max(address + 1);
        true
    }
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImage")
            .field("capacity", &self.bytes.len())
            .field("highest_written", &self.highest_written)
            .finish_non_exhaustive()
    }
}

/// Intel HEX record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Data record (0x00).
    Data,
    /// End of file (0x01).
    EndOfFile,
    /// Extended linear address, upper 16 address bits (0x04).
    ExtendedLinearAddress,
    /// Any other record type, ignored.
    Other(u8),
}

impl From<u8> for RecordType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Data,
            0x01 => Self::EndOfFile,
            0x04 => Self::ExtendedLinearAddress,
            other => Self::Other(other),
        }
    }
}

/// Why a line was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Shorter than the smallest record or missing the `:` start code.
    NotARecord,
    /// A field contained a non-hex digit.
    InvalidHex,
    /// The declared byte count runs past the end of the line.
    Truncated,
    /// Record bytes do not sum to zero.
    BadChecksum,
    /// Extended linear address record without a 2-byte payload.
    BadAddressRecord,
}

/// Non-fatal events reported while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexDiagnostic {
    /// A line was rejected.
    Skipped {
        /// 1-based line number.
        line: usize,
        /// Why it was rejected.
        reason: SkipReason,
    },
    /// Data bytes fell outside the image and were dropped.
    OutOfRange {
        /// 1-based line number.
        line: usize,
        /// First dropped address.
        address: u32,
        /// Number of dropped bytes in this record.
        dropped: usize,
    },
}

/// One parsed Intel HEX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    /// Declared payload length.
    pub byte_count: u8,
    /// 16-bit load offset.
    pub address: u16,
    /// Record type.
    pub record_type: RecordType,
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// Trailing checksum byte.
    pub checksum: u8,
}

impl HexRecord {
    /// Parse one line (without its line ending).
    ///
    /// Characters after the checksum are ignored.
    pub fn parse(line: &[u8]) -> std::result::Result<Self, SkipReason> {
        if line.len() < MIN_RECORD_LEN || line[0] != b':' {
            return Err(SkipReason::NotARecord);
        }

        let byte_count = hex_byte(line, 1)?;
        let address_hi = hex_byte(line, 3)?;
        let address_lo = hex_byte(line, 5)?;
        let record_type = hex_byte(line, 7)?;

        let checksum_offset = DATA_OFFSET + usize::from(byte_count) * 2;
        if checksum_offset + 2 > line.len() {
            return Err(SkipReason::Truncated);
        }

        let payload = (0..usize::from(byte_count))
            .map(|i| hex_byte(line, DATA_OFFSET + i * 2))
            .collect::<std::result::Result<Vec<u8>, _>>()?;
        let checksum = hex_byte(line, checksum_offset)?;

        let sum = payload
            .iter()
            .fold(
                byte_count
                    .wrapping_add(address_hi)
                    .wrapping_add(address_lo)
                    .wrapping_add(record_type),
                |acc, b| acc.wrapping_add(*b),
            )
            .wrapping_add(checksum);
        if sum != 0 {
            return Err(SkipReason::BadChecksum);
        }

        Ok(Self {
            byte_count,
            address: u16::from_be_bytes([address_hi, address_lo]),
            record_type: record_type.into(),
            payload,
            checksum,
        })
    }
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

fn hex_byte(line: &[u8], offset: usize) -> std::result::Result<u8, SkipReason> {
    let hi = line.get(offset).copied().and_then(nibble);
    let lo = line.get(offset + 1).copied().and_then(nibble);
    match (hi, lo) {
        (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
        _ => Err(SkipReason::InvalidHex),
    }
}

/// Intel HEX decoder.
#[derive(Debug, Clone)]
pub struct HexDecoder {
    capacity: usize,
}

impl Default for HexDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HexDecoder {
    /// Decoder producing a 1 MiB image.
    pub fn new() -> Self {
        Self {
            capacity: IMAGE_CAPACITY,
        }
    }

    /// Set the image capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Decode HEX text, silently skipping bad lines.
    ///
    /// Returns the image and one past the highest written address.
    pub fn decode<R: BufRead>(&self, reader: R) -> Result<(MemoryImage, usize)> {
        self.decode_with(reader, |_| {})
    }

    /// Decode HEX text, reporting skipped lines and dropped bytes to `on_diagnostic`.
    pub fn decode_with<R, F>(&self, mut reader: R, mut on_diagnostic: F) -> Result<(MemoryImage, usize)>
    where
        R: BufRead,
        F: FnMut(&HexDiagnostic),
    {
        let mut image = MemoryImage::with_capacity(self.capacity);
        let mut base: u32 = 0;
        let mut line = Vec::new();
        let mut line_no = 0;

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            line_no += 1;

            let text = trim_line_ending(&line);
            let record = match HexRecord::parse(text) {
                Ok(record) => record,
                Err(reason) => {
                    on_diagnostic(&HexDiagnostic::Skipped {
                        line: line_no,
                        reason,
                    });
                    continue;
                },
            };

            match record.record_type {
                RecordType::Data => {
                    let start = base.wrapping_add(u32::from(record.address));
                    let mut dropped: Option<(u32, usize)> = None;
                    for (i, value) in (0u32..).zip(&record.payload) {
                        let address = start.wrapping_add(i);
                        if !image.store(address, *value) {
                            dropped.get_or_insert((address, 0)).1 += 1;
                        }
                    }
                    if let Some((address, dropped)) = dropped {
                        on_diagnostic(&HexDiagnostic::OutOfRange {
                            line: line_no,
                            address,
                            dropped,
                        });
                    }
                },
                RecordType::EndOfFile => break,
                RecordType::ExtendedLinearAddress => {
                    if record.payload.len() < 2 {
                        on_diagnostic(&HexDiagnostic::Skipped {
                            line: line_no,
                            reason: SkipReason::BadAddressRecord,
                        });
                        continue;
                    }
                    base = u32::from(u16::from_be_bytes([record.payload[0], record.payload[1]])) << 16;
                },
                RecordType::Other(kind) => {
                    debug!("Ignoring record type {kind:#04x} on line {line_no}");
                },
            }
        }

        let written = image.highest_written_address();
        Ok((image, written))
    }

    /// Decode HEX text held in memory.
    pub fn decode_str(&self, text: &str) -> (MemoryImage, usize) {
        match self.decode(text.as_bytes()) {
            Ok(result) => result,
            // reading from a slice cannot fail
            Err(_) => (MemoryImage::with_capacity(self.capacity), 0),
        }
    }

    /// Decode a HEX file.
    pub fn decode_file<P: AsRef<Path>>(&self, path: P) -> Result<(MemoryImage, usize)> {
        let path = path.as_ref();
        debug!("Loading Intel HEX from: {}", path.display());
        let file = File::open(path)?;
        self.decode(BufReader::new(file))
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
