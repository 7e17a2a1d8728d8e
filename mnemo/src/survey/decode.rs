//! Decoding survey dumps.
//!
//! A dump is a sequence of surveys. Each survey is a 10-byte header followed
//! by 16-byte shots, the last of which has type `EOC`:
//!
//! ```text
//! header:
//! +-------+------+-------+-----+------+--------+--------+-----------+
//! | magic | year | month | day | hour | minute | name   | direction |
//! +-------+------+-------+-----+------+--------+--------+-----------+
//! |  1    |  1   |   1   |  1  |  1   |   1    |   3    |     1     |
//! +-------+------+-------+-----+------+--------+--------+-----------+
//!
//! shot (big-endian):
//! +------+---------+----------+--------+----------+-----------+----------+-----------+--------+
//! | type | head_in | head_out | length | depth_in | depth_out | pitch_in | pitch_out | marker |
//! +------+---------+----------+--------+----------+-----------+----------+-----------+--------+
//! | i8   | i16/10  | i16/10   | i16/100| i16/100  | i16/100   | i16/10   | i16/10    | i8     |
//! +------+---------+----------+--------+----------+-----------+----------+-----------+--------+
//! ```

use {
    crate::error::{Error, Result},
    byteorder::{BigEndian, ByteOrder},
    chrono::{NaiveDate, NaiveDateTime},
    log::debug,
    std::fmt,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Survey header length.
pub const HEADER_LEN: usize = 10;

/// Shot record length.
pub const SHOT_LEN: usize = 16;

/// First header byte.
pub const SURVEY_MAGIC: i8 = 2;

/// Accepted two-digit years.
pub const YEAR_RANGE: std::ops::RangeInclusive<i8> = 16..=99;

/// Kind of shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShotType {
    /// Cross-section, first side.
    #[cfg_attr(feature = "serde", serde(rename = "CSA"))]
    Csa,
    /// Cross-section, second side.
    #[cfg_attr(feature = "serde", serde(rename = "CSB"))]
    Csb,
    /// Regular survey leg.
    #[cfg_attr(feature = "serde", serde(rename = "STD"))]
    Std,
    /// End of survey.
    #[cfg_attr(feature = "serde", serde(rename = "EOC"))]
    Eoc,
    /// Type code not known to this decoder.
    Unknown(i8),
}

impl From<i8> for ShotType {
    fn from(value: i8) -> Self {
        match value {
            0 => Self::Csa,
            1 => Self::Csb,
            2 => Self::Std,
            3 => Self::Eoc,
            other => Self::Unknown(other),
        }
    }
}

/// Direction in which a survey was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Surveyed going into the cave.
    #[cfg_attr(feature = "serde", serde(rename = "IN"))]
    In,
    /// Surveyed on the way out.
    #[cfg_attr(feature = "serde", serde(rename = "OUT"))]
    Out,
    /// Direction code not known to this decoder.
    Unknown(i8),
}

impl From<i8> for Direction {
    fn from(value: i8) -> Self {
        match value {
            0 => Self::In,
            1 => Self::Out,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => f.write_str("IN"),
            Self::Out => f.write_str("OUT"),
            Self::Unknown(code) => write!(f, "?{code}"),
        }
    }
}

/// One measured leg.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Shot {
    /// Shot kind.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub shot_type: ShotType,
    /// Heading at the start, degrees.
    pub head_in: f64,
    /// Heading at the end, degrees.
    pub head_out: f64,
    /// Length, metres.
    pub length: f64,
    /// Depth at the start, metres.
    pub depth_in: f64,
    /// Depth at the end, metres.
    pub depth_out: f64,
    /// Pitch at the start, degrees.
    pub pitch_in: f64,
    /// Pitch at the end, degrees.
    pub pitch_out: f64,
    /// Marker code.
    pub marker: i8,
}

impl Shot {
    /// Decode a 16-byte shot record.
    pub fn parse(record: &[u8]) -> Result<Self> {
        if record.len() < SHOT_LEN {
            return Err(Error::InvalidDump(format!(
                "shot record is {} bytes, expected {SHOT_LEN}",
                record.len()
            )));
        }
        let word = |at: usize| f64::from(BigEndian::read_i16(&record[at..at + 2]));
        Ok(Self {
            shot_type: signed(record[0]).into(),
            head_in: word(1) / 10.0,
            head_out: word(3) / 10.0,
            length: word(5) / 100.0,
            depth_in: word(7) / 100.0,
            depth_out: word(9) / 100.0,
            pitch_in: word(11) / 10.0,
            pitch_out: word(13) / 10.0,
            marker: signed(record[15]),
        })
    }
}

/// One survey with its shots.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Survey {
    /// Start time as recorded by the logger.
    pub date: NaiveDateTime,
    /// Three-character survey name.
    pub name: String,
    /// Survey direction.
    pub direction: Direction,
    /// Shots in recording order.
    pub shots: Vec<Shot>,
}

impl Survey {
    /// Whether the survey ended with an `EOC` shot.
    pub fn is_complete(&self) -> bool {
        self.shots
            .last()
            .is_some_and(|s| s.shot_type == ShotType::Eoc)
    }

    /// Summed length of the regular legs, metres.
    pub fn total_length(&self) -> f64 {
        self.shots
            .iter()
            .filter(|s| s.shot_type == ShotType::Std)
            .map(|s| s.length)
            .sum()
    }
}

/// Why decoding stopped before the end of the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeIssue {
    /// Header does not start with the survey magic.
    BadMagic {
        /// Header offset.
        offset: usize,
        /// Byte found instead.
        found: i8,
    },
    /// Year outside the accepted range.
    YearOutOfRange {
        /// Header offset.
        offset: usize,
        /// Two-digit year found.
        year: i8,
    },
    /// Header fields do not form a valid date and time.
    InvalidDate {
        /// Header offset.
        offset: usize,
    },
    /// Fewer than a header's worth of bytes remained.
    TrailingBytes {
        /// Offset of the leftover bytes.
        offset: usize,
        /// Number of leftover bytes.
        len: usize,
    },
}

impl fmt::Display for DecodeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic { offset, found } => {
                write!(f, "no survey magic at offset {offset} (found {found})")
            },
            Self::YearOutOfRange { offset, year } => {
                write!(f, "year {year} out of range at offset {offset}")
            },
            Self::InvalidDate { offset } => write!(f, "invalid date in header at offset {offset}"),
            Self::TrailingBytes { offset, len } => {
                write!(f, "{len} trailing bytes at offset {offset}")
            },
        }
    }
}

/// Result of decoding a dump.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Surveys decoded before any problem.
    pub surveys: Vec<Survey>,
    /// Why decoding stopped early, if it did.
    pub issue: Option<DecodeIssue>,
}

fn signed(byte: u8) -> i8 {
    i8::from_ne_bytes([byte])
}

fn parse_header(header: &[u8], offset: usize) -> std::result::Result<Survey, DecodeIssue> {
    let field = |i: usize| signed(header[i]);

    let magic = field(0);
    if magic != SURVEY_MAGIC {
        return Err(DecodeIssue::BadMagic {
            offset,
            found: magic,
        });
    }
    let year = field(1);
    if !YEAR_RANGE.contains(&year) {
        return Err(DecodeIssue::YearOutOfRange { offset, year });
    }

    let unsigned = |i: usize| u32::try_from(field(i)).ok();
    let date = match (unsigned(2), unsigned(3), unsigned(4), unsigned(5)) {
        (Some(month), Some(day), Some(hour), Some(minute)) => {
            NaiveDate::from_ymd_opt(2000 + i32::from(year), month, day)
                .and_then(|d| d.and_hms_opt(hour, minute, 0))
        },
        _ => None,
    }
    .ok_or(DecodeIssue::InvalidDate { offset })?;

    Ok(Survey {
        date,
        name: String::from_utf8_lossy(&header[6..9])
            .trim_end_matches('\0')
            .to_string(),
        direction: field(9).into(),
        shots: Vec::new(),
    })
}

/// Split binary dump data into surveys.
///
/// Decoding stops at the first header that fails validation; the surveys
/// decoded up to that point are kept. A survey whose shots run out before an
/// `EOC` shot is kept with the shots that were complete.
pub fn decode_surveys(data: &[u8]) -> Decoded {
    let mut surveys = Vec::new();
    let mut offset = 0;

    let issue = loop {
        let remaining = data.len() - offset;
        if remaining == 0 {
            break None;
        }
        if remaining < HEADER_LEN {
            break Some(DecodeIssue::TrailingBytes {
                offset,
                len: remaining,
            });
        }

        let mut survey = match parse_header(&data[offset..offset + HEADER_LEN], offset) {
            Ok(survey) => survey,
            Err(issue) => break Some(issue),
        };
        offset += HEADER_LEN;

        while let Some(record) = data.get(offset..offset + SHOT_LEN) {
            offset += SHOT_LEN;
            // a full record always parses
            let Ok(shot) = Shot::parse(record) else { break };
            let end = shot.shot_type == ShotType::Eoc;
            survey.shots.push(shot);
            if end {
                break;
            }
        }

        debug!(
            "Survey {} at {}: {} shots",
            survey.name,
            survey.date,
            survey.shots.len()
        );
        surveys.push(survey);
    };

    Decoded { surveys, issue }
}

/// Parse the `dmp` text form (`N;N;...`) into bytes.
///
/// Values may be signed (`-128..=127`) or unsigned (`0..=255`).
pub fn parse_dump_text(text: &str) -> Result<Vec<u8>> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let value: i16 = s
                .parse()
                .map_err(|_| Error::InvalidDump(format!("'{s}' is not a byte value")))?;
            let wrapped = if value < 0 { value + 256 } else { value };
            if value < -128 {
                return Err(Error::InvalidDump(format!("{value} is out of byte range")));
            }
            u8::try_from(wrapped)
                .map_err(|_| Error::InvalidDump(format!("{value} is out of byte range")))
        })
        .collect()
}

/// Turn a dump file's contents into survey bytes.
///
/// Binary dumps start with the survey magic byte; anything starting with a
/// decimal digit or `-` is treated as `dmp` text.
pub fn load_dump(contents: &[u8]) -> Result<Vec<u8>> {
    let first = contents
        .iter()
        .find(|b| !b.is_ascii_whitespace());
    match first {
        Some(b) if b.is_ascii_digit() || *b == b'-' => {
            let text = std::str::from_utf8(contents)
                .map_err(|e| Error::InvalidDump(format!("dump text is not UTF-8: {e}")))?;
            parse_dump_text(text)
        },
        _ => Ok(contents.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(year: u8, name: &[u8; 3], direction: u8) -> Vec<u8> {
        let mut h = vec![2, year, 7, 14, 9, 30];
        h.extend_from_slice(name);
        h.push(direction);
        h
    }

    fn shot(kind: u8, words: [i16; 7], marker: u8) -> Vec<u8> {
        let mut s = vec![kind];
        for w in words {
            s.extend_from_slice(&w.to_be_bytes());
        }
        s.push(marker);
        s
    }

    #[test]
    fn test_shot_scaling() {
        let record = shot(2, [1234, 3599, 550, -125, 1020, -450, 15], 0);
        let s = Shot::parse(&record).unwrap();
        assert_eq!(s.shot_type, ShotType::Std);
        assert!((s.head_in - 123.4).abs() < 1e-9);
        assert!((s.head_out - 359.9).abs() < 1e-9);
        assert!((s.length - 5.5).abs() < 1e-9);
        assert!((s.depth_in + 1.25).abs() < 1e-9);
        assert!((s.depth_out - 10.2).abs() < 1e-9);
        assert!((s.pitch_in + 45.0).abs() < 1e-9);
        assert!((s.pitch_out - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_two_surveys() {
        let mut data = header(24, b"AB1", 0);
        data.extend(shot(2, [100, 100, 250, 0, 0, 0, 0], 0));
        data.extend(shot(3, [0; 7], 0));
        data.extend(header(23, b"ZZ9", 1));
        data.extend(shot(3, [0; 7], 0));

        let decoded = decode_surveys(&data);
        assert_eq!(decoded.issue, None);
        assert_eq!(decoded.surveys.len(), 2);

        let first = &decoded.surveys[0];
        assert_eq!(first.name, "AB1");
        assert_eq!(first.direction, Direction::In);
        assert_eq!(
            first.date,
            NaiveDate::from_ymd_opt(2024, 7, 14)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap()
        );
        assert_eq!(first.shots.len(), 2);
        assert!(first.is_complete());
        assert!((first.total_length() - 2.5).abs() < 1e-9);

        assert_eq!(decoded.surveys[1].direction, Direction::Out);
    }

    #[test]
    fn test_decode_stops_at_bad_magic() {
        let mut data = header(24, b"AB1", 0);
        data.extend(shot(3, [0; 7], 0));
        data.extend([9u8; 10]);

        let decoded = decode_surveys(&data);
        assert_eq!(decoded.surveys.len(), 1);
        assert_eq!(
            decoded.issue,
            Some(DecodeIssue::BadMagic {
                offset: 26,
                found: 9
            })
        );
    }

    #[test]
    fn test_decode_rejects_year_out_of_range() {
        let data = header(15, b"OLD", 0);
        let decoded = decode_surveys(&data);
        assert!(decoded.surveys.is_empty());
        assert_eq!(
            decoded.issue,
            Some(DecodeIssue::YearOutOfRange { offset: 0, year: 15 })
        );
    }

    #[test]
    fn test_truncated_survey_keeps_complete_shots() {
        let mut data = header(24, b"CUT", 0);
        data.extend(shot(2, [0; 7], 0));
        data.extend([2u8; 5]);

        let decoded = decode_surveys(&data);
        assert_eq!(decoded.surveys.len(), 1);
        assert_eq!(decoded.surveys[0].shots.len(), 1);
        assert!(!decoded.surveys[0].is_complete());
        assert_eq!(
            decoded.issue,
            Some(DecodeIssue::TrailingBytes { offset: 26, len: 5 })
        );
    }

    #[test]
    fn test_parse_dump_text_signed_and_unsigned() {
        assert_eq!(
            parse_dump_text("2;24;-1;255;-128;128;\n").unwrap(),
            vec![2, 24, 0xFF, 0xFF, 0x80, 0x80]
        );
        assert!(parse_dump_text("1;256;").is_err());
        assert!(parse_dump_text("1;x;").is_err());
    }

    #[test]
    fn test_load_dump_detects_format() {
        assert_eq!(load_dump(b"2;-1;").unwrap(), vec![2, 0xFF]);
        assert_eq!(load_dump(&[2, 0xFF]).unwrap(), vec![2, 0xFF]);
        assert!(load_dump(b"").unwrap().is_empty());
    }
}
