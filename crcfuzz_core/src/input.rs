use crate::checksum::{CHECKSUM_LEN, payload_checksum, stored_checksum};

pub trait Input: Clone + Send + Sync + std::fmt::Debug + 'static {
    fn as_bytes(&self) -> &[u8];
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;

    /// Views the bytes as a `checksum ‖ payload` encoding.
    fn encoded(&self) -> EncodedInput<'_> {
        EncodedInput::parse(self.as_bytes())
    }
}

impl Input for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }
    fn len(&self) -> usize {
        self.len()
    }
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

/// A borrowed view splitting an input into its checksum field and payload.
///
/// Inputs shorter than the checksum field have no stored checksum and an
/// empty payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedInput<'a> {
    stored: Option<u32>,
    payload: &'a [u8],
}

impl<'a> EncodedInput<'a> {
    pub fn parse(bytes: &'a [u8]) -> Self {
        Self {
            stored: stored_checksum(bytes),
            payload: bytes.get(CHECKSUM_LEN..).unwrap_or(&[]),
        }
    }

    pub fn stored_checksum(&self) -> Option<u32> {
        self.stored
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// True when a checksum is present and equals the CRC-32 of the payload.
    pub fn is_consistent(&self) -> bool {
        self.stored == Some(payload_checksum(self.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::encode;

    #[test]
    fn vec_u8_impl_input() {
        let data: Vec<u8> = vec![1, 2, 3];
        let empty_data: Vec<u8> = vec![];
        assert_eq!(data.as_bytes(), &[1, 2, 3]);
        assert_eq!(data.len(), 3);
        assert!(!data.is_empty());
        assert!(empty_data.is_empty());
    }

    #[test]
    fn short_input_has_no_checksum_and_empty_payload() {
        let short: Vec<u8> = vec![0xDE, 0xAD];
        let view = short.encoded();
        assert_eq!(view.stored_checksum(), None);
        assert!(view.payload().is_empty());
        assert!(!view.is_consistent(), "missing checksum is never consistent");
    }

    #[test]
    fn bare_zero_checksum_is_consistent_with_empty_payload() {
        let view = EncodedInput::parse(&[0, 0, 0, 0]);
        assert_eq!(view.stored_checksum(), Some(0));
        assert!(view.payload().is_empty());
        assert!(view.is_consistent());
    }

    #[test]
    fn detects_corrupted_payload() {
        let mut encoded = encode(b"hello");
        assert!(encoded.encoded().is_consistent());
        encoded[5] ^= 0x01;
        assert!(!encoded.encoded().is_consistent());
        assert_eq!(encoded.encoded().payload().len(), 5);
    }
}
