//! Text renderings of a digest.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Lowercase hexadecimal, two characters per byte.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// RFC 4648 base64 with the standard alphabet and `=` padding.
pub(crate) fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lowercase() {
        assert_eq!(to_hex(&[0xAB, 0x01, 0xFF]), "ab01ff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn base64_is_padded() {
        assert_eq!(to_base64(b"ho"), "aG8=");
        assert_eq!(to_base64(&[0xFB, 0xFF]), "+/8=");
    }
}
