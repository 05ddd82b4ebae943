//! Payload decoding

use base64::{engine::general_purpose, Engine as _};
use husk_core::error::HuskError;

use crate::StoreResult;

/// An archive as carried over a text channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarballPayload {
    /// Encoded archive
    pub bitstring: String,
    /// Whether `bitstring` is standard base64
    pub is_base64_encoded: bool,
}

impl TarballPayload {
    /// Payload taken from a publish envelope attachment
    pub fn base64(data: impl Into<String>) -> Self {
        Self {
            bitstring: data.into(),
            is_base64_encoded: true,
        }
    }

    /// Payload carrying binary data one byte per char
    pub fn raw(data: impl Into<String>) -> Self {
        Self {
            bitstring: data.into(),
            is_base64_encoded: false,
        }
    }
}

/// Decode a payload into archive bytes.
///
/// Raw payloads use a single-byte charset: every char must be in
/// `U+0000..=U+00FF` and maps to exactly one byte.
pub fn decode(payload: &TarballPayload) -> StoreResult<Vec<u8>> {
    if payload.is_base64_encoded {
        return general_purpose::STANDARD
            .decode(payload.bitstring.as_bytes())
            .map_err(|e| HuskError::codec("Invalid base64 tarball payload".to_string(), e));
    }

    payload
        .bitstring
        .chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| HuskError::Codec {
                message: format!("character U+{:04X} is outside the single-byte range", u32::from(c)),
                source: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_base64() {
        let payload = TarballPayload::base64("aGVsbG8gd29ybGQ=");
        assert_eq!(decode(&payload).unwrap(), b"hello world");
    }

    #[test]
    fn test_decode_invalid_base64() {
        let payload = TarballPayload::base64("not base64!!");
        assert!(matches!(decode(&payload), Err(HuskError::Codec { .. })));
    }

    #[test]
    fn test_decode_raw_single_byte() {
        let payload = TarballPayload::raw("\u{1f}\u{8b}\u{ff}a");
        assert_eq!(decode(&payload).unwrap(), vec![0x1f, 0x8b, 0xff, b'a']);
    }

    #[test]
    fn test_decode_raw_rejects_wide_chars() {
        let payload = TarballPayload::raw("snow \u{2603}");
        assert!(matches!(decode(&payload), Err(HuskError::Codec { .. })));
    }

    proptest! {
        #[test]
        fn test_both_channels_carry_the_same_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let raw: String = bytes.iter().map(|&b| char::from(b)).collect();
            let encoded = general_purpose::STANDARD.encode(&bytes);

            prop_assert_eq!(decode(&TarballPayload::raw(raw)).unwrap(), bytes.clone());
            prop_assert_eq!(decode(&TarballPayload::base64(encoded)).unwrap(), bytes);
        }
    }
}
