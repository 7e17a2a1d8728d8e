//! Firmware flashing session.
//!
//! A session runs once over a fixed application window and stops at the
//! first failure:
//!
//! ```text
//! Querying -> Erasing -> Writing -> Verifying -> Resetting -> Done
//!     |          |          |           |            |
//!     +----------+----------+-----------+------------+--> Failed(phase, offset)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use mnemo::{BootloaderClient, FlashOrchestrator, HexDecoder, SerialChannel};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (mut image, _) = HexDecoder::new().decode_file("mnemo.hex")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let port = mnemo::NativePort::open_simple("/dev/ttyUSB0", 460_800)?;
//!         let channel = SerialChannel::open(port, 460_800)?;
//!         let mut flasher = FlashOrchestrator::new(BootloaderClient::new(channel));
//!
//!         flasher.run(&mut image, |p| println!("{} {}%", p.phase, p.percent))?;
//!     }
//!     Ok(())
//! }
//! ```

use {
    crate::{
        bootloader::client::BootloaderClient,
        error::{Error, FlashPhase, Result},
        image::MemoryImage,
        port::Port,
        protocol::{BootloaderInfo, checksum},
    },
    log::{debug, info},
};

/// First byte of the application region.
pub const APP_START: u32 = 0x800;

/// One past the last byte of the application region.
pub const APP_END: u32 = 0x20000;

/// Bytes per `FlashWrite`.
pub const PAGE_SIZE: u32 = 0x80;

/// Largest range covered by one `Checksum` request.
pub const VERIFY_CHUNK: u16 = 0xFFF0;

/// Value forced into the last byte of the region before writing.
pub const SENTINEL: u8 = 0x55;

/// Address window and geometry of a flashing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashLayout {
    /// First address written.
    pub start: u32,
    /// One past the last address written.
    pub end: u32,
    /// Write page size.
    pub page_size: u32,
    /// Verify chunk size.
    pub verify_chunk: u16,
    /// Byte stored at `end - 1` before writing.
    pub sentinel: u8,
}

impl Default for FlashLayout {
    fn default() -> Self {
        Self {
            start: APP_START,
            end: APP_END,
            page_size: PAGE_SIZE,
            verify_chunk: VERIFY_CHUNK,
            sentinel: SENTINEL,
        }
    }
}

impl FlashLayout {
    /// Set the address window.
    #[must_use]
    pub fn with_window(mut self, start: u32, end: u32) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Set the write page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the verify chunk size.
    #[must_use]
    pub fn with_verify_chunk(mut self, verify_chunk: u16) -> Self {
        self.verify_chunk = verify_chunk;
        self
    }

    /// Size of the window in bytes.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verified range: the window minus its last two bytes.
    pub fn verify_end(&self) -> u32 {
        self.end.saturating_sub(2).max(self.start)
    }
}

/// Split `[start, end)` into consecutive `(address, len)` windows of at most
/// `chunk` bytes. The last window is clipped; a zero `chunk` yields nothing.
pub fn verify_windows(start: u32, end: u32, chunk: u16) -> VerifyWindows {
    VerifyWindows {
        next: start,
        end,
        chunk,
    }
}

/// Iterator returned by [`verify_windows`].
#[derive(Debug, Clone)]
pub struct VerifyWindows {
    next: u32,
    end: u32,
    chunk: u16,
}

impl Iterator for VerifyWindows {
    type Item = (u32, u16);

    fn next(&mut self) -> Option<Self::Item> {
        if self.chunk == 0 || self.next >= self.end {
            return None;
        }
        let remaining = self.end - self.next;
        let len = u16::try_from(remaining).map_or(self.chunk, |r| r.min(self.chunk));
        let address = self.next;
        self.next += u32::from(len);
        Some((address, len))
    }
}

/// State of a flashing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started.
    Idle,
    /// Reading bootloader information.
    Querying,
    /// Erasing the window.
    Erasing,
    /// Writing pages.
    Writing,
    /// Comparing checksums.
    Verifying,
    /// Restarting the device.
    Resetting,
    /// Finished successfully.
    Done,
    /// Aborted.
    Failed {
        /// Phase that failed.
        phase: FlashPhase,
        /// Page or window address, for the page-wise phases.
        offset: Option<u32>,
    },
}

/// Progress report emitted per page written and per window verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashProgress {
    /// Current phase.
    pub phase: FlashPhase,
    /// Address just processed.
    pub offset: u32,
    /// Completion of the phase, 0-100.
    pub percent: u8,
}

/// Runs erase, write, verify and reset over a [`FlashLayout`].
pub struct FlashOrchestrator<P: Port> {
    client: BootloaderClient<P>,
    layout: FlashLayout,
    state: SessionState,
}

impl<P: Port> FlashOrchestrator<P> {
    /// Orchestrator over the default application window.
    pub fn new(client: BootloaderClient<P>) -> Self {
        Self {
            client,
            layout: FlashLayout::default(),
            state: SessionState::Idle,
        }
    }

    /// Use a different layout.
    #[must_use]
    pub fn with_layout(mut self, layout: FlashLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Layout in use.
    pub fn layout(&self) -> &FlashLayout {
        &self.layout
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Release the client.
    pub fn into_client(self) -> BootloaderClient<P> {
        self.client
    }

    /// Flash `image` and restart the device.
    ///
    /// The sentinel byte is written into `image` before the write phase.
    /// Errors are [`Error::Flash`] carrying the failed phase.
    pub fn run<F>(&mut self, image: &mut MemoryImage, mut progress: F) -> Result<BootloaderInfo>
    where
        F: FnMut(FlashProgress),
    {
        let layout = self.layout;
        let window_end = usize::try_from(layout.end).unwrap_or(usize::MAX);
        if layout.is_empty() || layout.page_size == 0 || window_end > image.capacity() {
            return Err(Error::Config(format!(
                "flash window {:#x}..{:#x} does not fit a {} byte image",
                layout.start,
                layout.end,
                image.capacity()
            )));
        }

        self.state = SessionState::Querying;
        info!("Querying bootloader");
        let info = self
            .client
            .version()
            .map_err(|e| self.fail(e, FlashPhase::Query, None))?;
        let rows = self
            .erase_rows(&info)
            .map_err(|e| self.fail(e, FlashPhase::Query, None))?;

        self.state = SessionState::Erasing;
        info!("Erasing {rows} rows from {:#x}", layout.start);
        self.client
            .erase(layout.start, rows)
            .map_err(|e| self.fail(e, FlashPhase::Erase, None))?;

        image.set(window_end - 1, layout.sentinel);

        self.state = SessionState::Writing;
        info!("Writing {:#x}..{:#x}", layout.start, layout.end);
        let total = u64::from(layout.len());
        let mut offset = layout.start;
        while offset < layout.end {
            let page_end = offset.saturating_add(layout.page_size).min(layout.end);
            let page = image
                .slice(offset as usize..page_end as usize)
                .unwrap_or_default();
            self.client
                .write_flash(offset, page)
                .map_err(|e| self.fail(e, FlashPhase::Write, Some(offset)))?;
            offset = page_end;
            progress(FlashProgress {
                phase: FlashPhase::Write,
                offset,
                percent: percent(u64::from(offset - layout.start), total),
            });
        }

        self.state = SessionState::Verifying;
        let verify_end = layout.verify_end();
        info!("Verifying {:#x}..{verify_end:#x}", layout.start);
        let verify_total = u64::from(verify_end - layout.start);
        for (address, len) in verify_windows(layout.start, verify_end, layout.verify_chunk) {
            let device = self
                .client
                .device_checksum(address, len)
                .map_err(|e| self.fail(e, FlashPhase::Verify, Some(address)))?;
            let start = address as usize;
            let expected = checksum(image.slice(start..start + usize::from(len)).unwrap_or_default());
            debug!("Window {address:#x}+{len:#x}: device {device:#06x}, image {expected:#06x}");
            if device != expected {
                let mismatch = Error::ChecksumMismatch {
                    address,
                    device,
                    image: expected,
                };
                return Err(self.fail(mismatch, FlashPhase::Verify, Some(address)));
            }
            let done = address + u32::from(len);
            progress(FlashProgress {
                phase: FlashPhase::Verify,
                offset: done,
                percent: percent(u64::from(done - layout.start), verify_total),
            });
        }

        self.state = SessionState::Resetting;
        info!("Resetting device");
        self.client
            .reset()
            .map_err(|e| self.fail(e, FlashPhase::Reset, None))?;

        self.state = SessionState::Done;
        Ok(info)
    }

    fn erase_rows(&self, info: &BootloaderInfo) -> Result<u16> {
        if info.erase_row_size == 0 {
            return Err(Error::Protocol("device reports an erase row size of 0".into()));
        }
        let rows = self.layout.len() / u32::from(info.erase_row_size);
        u16::try_from(rows).map_err(|_| {
            Error::Protocol(format!(
                "{rows} erase rows of {} bytes do not fit one erase command",
                info.erase_row_size
            ))
        })
    }

    fn fail(&mut self, error: Error, phase: FlashPhase, offset: Option<u32>) -> Error {
        self.state = SessionState::Failed { phase, offset };
        error.in_phase(phase, offset)
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(done * 100 / total).unwrap_or(100)
}
