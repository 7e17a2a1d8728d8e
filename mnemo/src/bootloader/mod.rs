//! Serial bootloader client and flashing session.

pub mod client;
pub mod flasher;

pub use client::BootloaderClient;
pub use flasher::{
    FlashLayout, FlashOrchestrator, FlashProgress, SessionState, verify_windows,
};
