//! # mnemo
//!
//! A library for talking to the MNEMO cave survey logger over its serial
//! link.
//!
//! This crate provides:
//!
//! - Intel HEX decoding into a flat firmware image
//! - The serial bootloader protocol (framing, checksum, erase/write/verify)
//! - A flashing session that updates the logger firmware
//! - Survey download, dump files and dump decoding
//! - USB autodetection of the logger
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for decoded surveys
//!
//! ## Example
//!
//! ```rust,no_run
//! use mnemo::{BootloaderClient, FlashOrchestrator, HexDecoder, SerialChannel};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Decode the firmware image
//!     let (mut image, _) = HexDecoder::new().decode_file("mnemo.hex")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let path = mnemo::device::autodetect()?;
//!         let port = mnemo::NativePort::open_simple(&path, 460_800)?;
//!         let channel = SerialChannel::open(port, 460_800)?;
//!
//!         let mut flasher = FlashOrchestrator::new(BootloaderClient::new(channel));
//!         flasher.run(&mut image, |p| println!("{}: {}%", p.phase, p.percent))?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootloader;
pub mod channel;
pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod survey;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    bootloader::{BootloaderClient, FlashLayout, FlashOrchestrator, FlashProgress, SessionState},
    channel::SerialChannel,
    device::{DetectedPort, DeviceLocator, MNEMO_PID, MNEMO_VID, autodetect, default_locator},
    error::{Error, FlashPhase, Result},
    image::{HexDecoder, HexDiagnostic, MemoryImage},
    port::{Port, SerialConfig},
    protocol::{BootloaderInfo, CommandFrame, Opcode, checksum},
    survey::{
        AcquisitionConfig, DumpFormat, DumpWriter, ProtocolVersion, Survey, SurveySink,
        decode_surveys,
    },
};
