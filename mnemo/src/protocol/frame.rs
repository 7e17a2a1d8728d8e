//! Bootloader command frames and response decoding.
//!
//! Every request starts with the same fixed 10-byte frame:
//!
//! ```text
//! +------+----+---------+-------------+---------------+-----+
//! | 0x55 | op |  size   | write magic |    address    | pad |
//! +------+----+---------+-------------+---------------+-----+
//! |  1   | 1  | 2 (LE)  | 2 (55 AA)   |    3 (LE)     |  1  |
//! +------+----+---------+-------------+---------------+-----+
//! ```
//!
//! The device echoes the frame and appends an opcode-specific tail. Integers
//! in the tail of `GetVersion` and `Checksum` responses are big-endian, unlike
//! the little-endian request fields.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;

/// Autobaud calibration byte leading every frame.
pub const AUTOBAUD: u8 = 0x55;

/// Length of a command frame in bytes.
pub const FRAME_LEN: usize = 10;

/// Magic marking a write-intent frame.
pub const WRITE_MAGIC: [u8; 2] = [0x55, 0xAA];

/// Length of the `GetVersion` response.
pub const VERSION_RESPONSE_LEN: usize = 26;

/// Status byte for a successful write or erase.
pub const STATUS_SUCCESS: u8 = 0x01;

/// Status byte for an address outside the writable region.
pub const STATUS_ADDRESS_OUT_OF_BOUNDS: u8 = 0xFE;

/// Status byte for an unsupported command.
pub const STATUS_NOT_SUPPORTED: u8 = 0xFF;

/// Largest address a frame can carry (24 bits).
pub const MAX_ADDRESS: u32 = 0x00FF_FFFF;

/// Bootloader opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Read bootloader version and device geometry (0x00).
    GetVersion = 0x00,
    /// Read flash (0x01).
    FlashRead = 0x01,
    /// Write flash (0x02).
    FlashWrite = 0x02,
    /// Erase flash rows (0x03).
    FlashErase = 0x03,
    /// Read EEPROM (0x04).
    EepromRead = 0x04,
    /// Write EEPROM (0x05).
    EepromWrite = 0x05,
    /// Read configuration words (0x06).
    ConfigRead = 0x06,
    /// Write configuration words (0x07).
    ConfigWrite = 0x07,
    /// Checksum a flash range (0x08).
    Checksum = 0x08,
    /// Restart into the application (0x09).
    Reset = 0x09,
}

impl Opcode {
    /// Decode an opcode byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::GetVersion,
            0x01 => Self::FlashRead,
            0x02 => Self::FlashWrite,
            0x03 => Self::FlashErase,
            0x04 => Self::EepromRead,
            0x05 => Self::EepromWrite,
            0x06 => Self::ConfigRead,
            0x07 => Self::ConfigWrite,
            0x08 => Self::Checksum,
            0x09 => Self::Reset,
            _ => return None,
        })
    }

    /// Whether the frame for this opcode carries the write magic.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::FlashWrite | Self::FlashErase | Self::EepromWrite | Self::ConfigWrite
        )
    }

    /// Human-readable opcode name.
    pub fn name(self) -> &'static str {
        match self {
            Self::GetVersion => "GetVersion",
            Self::FlashRead => "FlashRead",
            Self::FlashWrite => "FlashWrite",
            Self::FlashErase => "FlashErase",
            Self::EepromRead => "EepromRead",
            Self::EepromWrite => "EepromWrite",
            Self::ConfigRead => "ConfigRead",
            Self::ConfigWrite => "ConfigWrite",
            Self::Checksum => "Checksum",
            Self::Reset => "Reset",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A 10-byte bootloader command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    opcode: Opcode,
    size: u16,
    address: u32,
    write: bool,
}

impl CommandFrame {
    /// Create a frame; the write magic follows the opcode.
    ///
    /// Addresses are truncated to 24 bits.
    pub fn new(opcode: Opcode, size: u16, address: u32) -> Self {
        Self {
            opcode,
            size,
            address: address & MAX_ADDRESS,
            write: opcode.is_write(),
        }
    }

    /// `GetVersion` request.
    pub fn get_version() -> Self {
        Self::new(Opcode::GetVersion, 0, 0)
    }

    /// `FlashRead` request for `len` bytes at `address`.
    pub fn flash_read(address: u32, len: u16) -> Self {
        Self::new(Opcode::FlashRead, len, address)
    }

    /// `FlashWrite` request; `len` payload bytes follow the frame.
    pub fn flash_write(address: u32, len: u16) -> Self {
        Self::new(Opcode::FlashWrite, len, address)
    }

    /// `FlashErase` request for `rows` erase rows starting at `address`.
    pub fn flash_erase(address: u32, rows: u16) -> Self {
        Self::new(Opcode::FlashErase, rows, address)
    }

    /// `Checksum` request over `len` bytes at `address`.
    pub fn checksum(address: u32, len: u16) -> Self {
        Self::new(Opcode::Checksum, len, address)
    }

    /// `Reset` request.
    pub fn reset() -> Self {
        Self::new(Opcode::Reset, 0, 0)
    }

    /// Opcode of this frame.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Size field (byte count or row count depending on the opcode).
    pub fn size(&self) -> u16 {
        self.size
    }

    /// 24-bit address field.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Whether the frame carries the write magic.
    pub fn is_write(&self) -> bool {
        self.write
    }

    /// Encode the frame.
    pub fn build(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0] = AUTOBAUD;
        buf[1] = self.opcode as u8;
        LittleEndian::write_u16(&mut buf[2..4], self.size);
        if self.write {
            buf[4..6].copy_from_slice(&WRITE_MAGIC);
        }
        LittleEndian::write_u24(&mut buf[6..9], self.address);
        buf
    }

    /// Decode a frame, as the device would.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_LEN {
            return Err(Error::Protocol(format!(
                "command frame is {} bytes, expected {FRAME_LEN}",
                data.len()
            )));
        }
        if data[0] != AUTOBAUD {
            return Err(Error::Protocol(format!(
                "missing autobaud byte, found {:#04x}",
                data[0]
            )));
        }
        let opcode = Opcode::from_u8(data[1])
            .ok_or_else(|| Error::Protocol(format!("unknown opcode {:#04x}", data[1])))?;
        let write = match [data[4], data[5]] {
            WRITE_MAGIC => true,
            [0, 0] => false,
            other => {
                return Err(Error::Protocol(format!(
                    "invalid write magic {:02x}{:02x}",
                    other[0], other[1]
                )));
            },
        };

        Ok(Self {
            opcode,
            size: LittleEndian::read_u16(&data[2..4]),
            address: LittleEndian::read_u24(&data[6..9]),
            write,
        })
    }

    /// Total response length the device sends for this frame.
    ///
    /// `None` for `Reset`, which is never answered.
    pub fn response_len(&self) -> Option<usize> {
        match self.opcode {
            Opcode::GetVersion => Some(VERSION_RESPONSE_LEN),
            Opcode::FlashRead | Opcode::EepromRead | Opcode::ConfigRead => {
                Some(FRAME_LEN + usize::from(self.size))
            },
            Opcode::FlashWrite | Opcode::FlashErase | Opcode::EepromWrite | Opcode::ConfigWrite => {
                Some(FRAME_LEN + 1)
            },
            Opcode::Checksum => Some(FRAME_LEN + 2),
            Opcode::Reset => None,
        }
    }
}

/// Bootloader identification returned by `GetVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderInfo {
    /// Bootloader firmware version.
    pub version: u16,
    /// Largest packet the bootloader accepts.
    pub max_packet_size: u16,
    /// Device identifier.
    pub device_id: u16,
    /// Erase granularity in bytes.
    pub erase_row_size: u8,
    /// Number of write latches.
    pub write_latches: u8,
    /// Configuration words.
    pub config_words: u32,
}

impl BootloaderInfo {
    /// Decode a `GetVersion` response.
    pub fn parse(response: &[u8]) -> Result<Self> {
        if response.len() < VERSION_RESPONSE_LEN {
            return Err(Error::Protocol(format!(
                "version response is {} bytes, expected {VERSION_RESPONSE_LEN}",
                response.len()
            )));
        }

        Ok(Self {
            version: BigEndian::read_u16(&response[10..12]),
            max_packet_size: BigEndian::read_u16(&response[12..14]),
            device_id: BigEndian::read_u16(&response[16..18]),
            erase_row_size: response[20],
            write_latches: response[21],
            config_words: BigEndian::read_u32(&response[22..26]),
        })
    }

    /// Encode as the device would answer `GetVersion`.
    pub fn to_response(&self) -> [u8; VERSION_RESPONSE_LEN] {
        let mut buf = [0u8; VERSION_RESPONSE_LEN];
        buf[..FRAME_LEN].copy_from_slice(&CommandFrame::get_version().build());
        BigEndian::write_u16(&mut buf[10..12], self.version);
        BigEndian::write_u16(&mut buf[12..14], self.max_packet_size);
        BigEndian::write_u16(&mut buf[16..18], self.device_id);
        buf[20] = self.erase_row_size;
        buf[21] = self.write_latches;
        BigEndian::write_u32(&mut buf[22..26], self.config_words);
        buf
    }
}

/// Check the trailing status byte of a write or erase response.
pub fn parse_status(opcode: Opcode, response: &[u8]) -> Result<()> {
    match response.last() {
        Some(&STATUS_SUCCESS) if response.len() == FRAME_LEN + 1 => Ok(()),
        Some(&status) if response.len() == FRAME_LEN + 1 => Err(Error::Status {
            opcode: opcode.name(),
            status,
        }),
        _ => Err(Error::Protocol(format!(
            "{opcode} response is {} bytes, expected {}",
            response.len(),
            FRAME_LEN + 1
        ))),
    }
}

/// Extract the big-endian checksum from a `Checksum` response.
pub fn parse_checksum(response: &[u8]) -> Result<u16> {
    if response.len() != FRAME_LEN + 2 {
        return Err(Error::Protocol(format!(
            "checksum response is {} bytes, expected {}",
            response.len(),
            FRAME_LEN + 2
        )));
    }
    Ok(BigEndian::read_u16(&response[FRAME_LEN..]))
}

/// Extract the data tail of a `FlashRead` response.
pub fn parse_flash_read(response: &[u8], len: u16) -> Result<&[u8]> {
    let expected = FRAME_LEN + usize::from(len);
    if response.len() != expected {
        return Err(Error::Protocol(format!(
            "read response is {} bytes, expected {expected}",
            response.len()
        )));
    }
    Ok(&response[FRAME_LEN..])
}
