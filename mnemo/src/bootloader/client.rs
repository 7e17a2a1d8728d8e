//! Request/response client for the serial bootloader.

use {
    crate::{
        channel::SerialChannel,
        error::{Error, Result},
        port::Port,
        protocol::frame::{
            self, BootloaderInfo, CommandFrame, FRAME_LEN, Opcode, VERSION_RESPONSE_LEN,
        },
    },
    log::{debug, trace},
};

/// Response timeout for every command except erase.
pub const COMMAND_TIMEOUT_MS: u64 = 1000;

/// Response timeout for `FlashErase`.
pub const ERASE_TIMEOUT_MS: u64 = 5000;

/// Issues bootloader commands over a [`SerialChannel`].
///
/// One command is in flight at a time; every call blocks until the full
/// response has arrived or a wait times out.
pub struct BootloaderClient<P: Port> {
    channel: SerialChannel<P>,
}

impl<P: Port> BootloaderClient<P> {
    /// Wrap an open channel.
    pub fn new(channel: SerialChannel<P>) -> Self {
        Self { channel }
    }

    /// Query version and flash geometry.
    pub fn version(&mut self) -> Result<BootloaderInfo> {
        let response = self.transact(
            &CommandFrame::get_version(),
            &[],
            VERSION_RESPONSE_LEN,
            COMMAND_TIMEOUT_MS,
        )?;
        let info = BootloaderInfo::parse(&response)?;
        debug!(
            "Bootloader v{:#06x}, device {:#06x}, erase row {} bytes",
            info.version, info.device_id, info.erase_row_size
        );
        Ok(info)
    }

    /// Read `len` bytes of flash at `address`.
    pub fn read_flash(&mut self, address: u32, len: u16) -> Result<Vec<u8>> {
        let request = CommandFrame::flash_read(address, len);
        let response = self.transact(
            &request,
            &[],
            FRAME_LEN + usize::from(len),
            COMMAND_TIMEOUT_MS,
        )?;
        frame::parse_flash_read(&response, len).map(<[u8]>::to_vec)
    }

    /// Write one page of flash at `address`.
    pub fn write_flash(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let len = u16::try_from(data.len()).map_err(|_| {
            Error::Protocol(format!("write of {} bytes exceeds a frame", data.len()))
        })?;
        let request = CommandFrame::flash_write(address, len);
        let response = self.transact(&request, data, FRAME_LEN + 1, COMMAND_TIMEOUT_MS)?;
        frame::parse_status(Opcode::FlashWrite, &response)
    }

    /// Erase `rows` erase rows starting at `address`.
    pub fn erase(&mut self, address: u32, rows: u16) -> Result<()> {
        let request = CommandFrame::flash_erase(address, rows);
        let response = self.transact(&request, &[], FRAME_LEN + 1, ERASE_TIMEOUT_MS)?;
        frame::parse_status(Opcode::FlashErase, &response)
    }

    /// Ask the device for the checksum of `len` bytes at `address`.
    pub fn device_checksum(&mut self, address: u32, len: u16) -> Result<u16> {
        let request = CommandFrame::checksum(address, len);
        let response = self.transact(&request, &[], FRAME_LEN + 2, COMMAND_TIMEOUT_MS)?;
        frame::parse_checksum(&response)
    }

    /// Restart into the application. The device does not answer.
    pub fn reset(&mut self) -> Result<()> {
        let request = CommandFrame::reset();
        trace!("Sending {}", request.opcode());
        self.channel.write(&request.build())
    }

    /// Underlying channel.
    pub fn channel_mut(&mut self) -> &mut SerialChannel<P> {
        &mut self.channel
    }

    /// Release the channel.
    pub fn into_channel(self) -> SerialChannel<P> {
        self.channel
    }

    fn transact(
        &mut self,
        request: &CommandFrame,
        payload: &[u8],
        response_len: usize,
        timeout_ms: u64,
    ) -> Result<Vec<u8>> {
        trace!(
            "Sending {} size={} addr={:#08x}",
            request.opcode(),
            request.size(),
            request.address()
        );
        self.channel.write(&request.build())?;
        if !payload.is_empty() {
            self.channel.write(payload)?;
        }
        self.channel.read_exact(response_len, timeout_ms)
    }
}
