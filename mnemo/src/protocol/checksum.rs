//! Bootloader checksum.
//!
//! The device sums flash as big-endian 16-bit words with two 8-bit
//! accumulators: the high byte of each pair goes into `a`, the low byte plus
//! the carry out of `a` goes into `b`. This is not a CRC.

/// Compute the bootloader checksum over `data`.
///
/// A trailing unpaired byte is ignored, matching the device.
pub fn checksum(data: &[u8]) -> u16 {
    let mut a: u8 = 0;
    let mut b: u8 = 0;

    for pair in data.chunks_exact(2) {
        let (sum, carry) = a.overflowing_add(pair[0]);
        a = sum;
        b = b
            .wrapping_add(pair[1])
            .wrapping_add(u8::from(carry));
    }

    u16::from_be_bytes([a, b])
}
