//! Survey download, storage and decoding.

pub mod acquire;
pub mod decode;
pub mod dump;

pub use acquire::{AcquisitionConfig, ProtocolVersion, SurveySink, acquire};
pub use decode::{Decoded, DecodeIssue, Direction, Shot, ShotType, Survey, decode_surveys};
pub use dump::{DumpFormat, DumpWriter};
