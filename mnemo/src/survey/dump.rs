//! Writing downloaded survey bytes to a file.

use {
    crate::{
        error::{Error, Result},
        survey::acquire::SurveySink,
    },
    std::{fmt, io::Write, str::FromStr},
};

/// On-disk format of a survey dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpFormat {
    /// Each byte as a signed decimal followed by `;`.
    #[default]
    Dmp,
    /// Bytes exactly as received.
    Raw,
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dmp => "dmp",
            Self::Raw => "raw",
        })
    }
}

impl FromStr for DumpFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dmp" => Ok(Self::Dmp),
            "raw" => Ok(Self::Raw),
            other => Err(Error::Config(format!("unknown dump format '{other}'"))),
        }
    }
}

/// A [`SurveySink`] writing chunks incrementally to `W`.
#[derive(Debug)]
pub struct DumpWriter<W: Write> {
    inner: W,
    format: DumpFormat,
    bytes: usize,
}

impl<W: Write> DumpWriter<W> {
    /// Wrap `inner`.
    pub fn new(inner: W, format: DumpFormat) -> Self {
        Self {
            inner,
            format,
            bytes: 0,
        }
    }

    /// Survey bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes
    }

    /// Format in use.
    pub fn format(&self) -> DumpFormat {
        self.format
    }

    /// Flush and return the writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> SurveySink for DumpWriter<W> {
    fn on_data(&mut self, chunk: &[u8]) -> Result<()> {
        match self.format {
            DumpFormat::Raw => self.inner.write_all(chunk)?,
            DumpFormat::Dmp => {
                let mut text = String::with_capacity(chunk.len() * 5);
                for &byte in chunk {
                    text.push_str(&i8::from_ne_bytes([byte]).to_string());
                    text.push(';');
                }
                self.inner.write_all(text.as_bytes())?;
            },
        }
        self.inner.flush()?;
        self.bytes += chunk.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dmp_writes_signed_decimals() {
        let mut writer = DumpWriter::new(Vec::new(), DumpFormat::Dmp);
        writer.on_data(&[2, 24, 0x7F]).unwrap();
        writer.on_data(&[0x80, 0xFF]).unwrap();

        assert_eq!(writer.bytes_written(), 5);
        assert_eq!(writer.into_inner().unwrap(), b"2;24;127;-128;-1;".to_vec());
    }

    #[test]
    fn test_raw_writes_bytes_verbatim() {
        let mut writer = DumpWriter::new(Vec::new(), DumpFormat::Raw);
        writer.on_data(&[0x02, 0xFF, 0x00]).unwrap();
        assert_eq!(writer.into_inner().unwrap(), vec![0x02, 0xFF, 0x00]);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("raw".parse::<DumpFormat>().unwrap(), DumpFormat::Raw);
        assert_eq!("DMP".parse::<DumpFormat>().unwrap(), DumpFormat::Dmp);
        assert!("csv".parse::<DumpFormat>().is_err());
    }
}
