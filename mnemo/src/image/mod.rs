//! Firmware image handling.

pub mod hex;

pub use hex::{HexDecoder, HexDiagnostic, MemoryImage};
