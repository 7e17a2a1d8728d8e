//! Bootloader protocol implementation.

pub mod checksum;
pub mod frame;

// Re-export common types
pub use checksum::checksum;
pub use frame::{BootloaderInfo, CommandFrame, Opcode};
