//! CRC32 trailer for datagram frames. The checksum covers the payload bytes
//! that precede it and travels in network order.

use crate::error::{Error, Result};
use crate::serialize::{ByteBuffer, Deserialize, Serialize};

pub const CRC_SIZE: usize = 4;

/// CRC-32 (IEEE) of the buffer.
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Appends the 4-byte CRC of the current contents.
#[inline]
pub fn append_crc32(buf: &mut ByteBuffer) {
    checksum(buf).serialize(buf);
}

/// Verifies and removes the CRC trailer. A short buffer or a checksum
/// mismatch rejects the frame as corrupt.
pub fn strip_crc32(buf: &mut ByteBuffer) -> Result<()> {
    if buf.len() < CRC_SIZE {
        return Err(Error::CorruptFrame);
    }

    let split = buf.len() - CRC_SIZE;
    let mut pos = split;
    let stored = u32::deserialize(buf, &mut pos)?;

    if checksum(&buf[..split]) != stored {
        return Err(Error::CorruptFrame);
    }

    buf.truncate(split);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_strip_roundtrip() {
        let mut buf: ByteBuffer = vec![1, 2, 3, 4, 5];
        append_crc32(&mut buf);

        assert_eq!(buf.len(), 5 + CRC_SIZE);

        strip_crc32(&mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let mut buf = ByteBuffer::new();
        append_crc32(&mut buf);

        strip_crc32(&mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let mut pristine: ByteBuffer = (0u8..32).collect();
        append_crc32(&mut pristine);

        for byte in 0..pristine.len() {
            for bit in 0..8 {
                let mut tampered = pristine.clone();
                tampered[byte] ^= 1 << bit;

                assert_eq!(strip_crc32(&mut tampered).unwrap_err(), Error::CorruptFrame);
            }
        }
    }

    #[test]
    fn test_short_buffer_is_corrupt() {
        let mut buf: ByteBuffer = vec![1, 2, 3];
        assert_eq!(strip_crc32(&mut buf).unwrap_err(), Error::CorruptFrame);
    }
}
