//! The 4-byte integrity field that prefixes every encoded input.
//!
//! The checksum is the standard CRC-32 (IEEE polynomial, zlib-compatible,
//! starting from the zero state) over the payload bytes, stored little-endian.

/// Length in bytes of the checksum field at the front of an encoded input.
pub const CHECKSUM_LEN: usize = 4;

/// Computes the CRC-32 of `payload`, seeded at the algorithm's zero state.
pub fn payload_checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Writes `value` little-endian into the first [`CHECKSUM_LEN`] bytes of `field`.
///
/// Returns `false` without touching `field` when it is too short.
pub fn write_checksum(field: &mut [u8], value: u32) -> bool {
    match field.get_mut(..CHECKSUM_LEN) {
        Some(prefix) => {
            prefix.copy_from_slice(&value.to_le_bytes());
            true
        }
        None => false,
    }
}

/// Reads the stored checksum from the front of `bytes`, if there is room for one.
pub fn stored_checksum(bytes: &[u8]) -> Option<u32> {
    let field: [u8; CHECKSUM_LEN] = bytes.get(..CHECKSUM_LEN)?.try_into().ok()?;
    Some(u32::from_le_bytes(field))
}

/// Builds a consistent `checksum ‖ payload` encoding for `payload`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHECKSUM_LEN + payload.len());
    out.extend_from_slice(&payload_checksum(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}
