//! String encodings the emulator crosses between: DEX string data is MUTF-8,
//! the Java side of the mock layer deals in UTF-16 code units.

use std::borrow::Cow;

/// Decode a MUTF-8 byte run from a DEX string data item. Lossy on purpose;
/// obfuscators routinely embed byte runs that are not valid MUTF-8 and a
/// replacement character is more useful than a dead emulation.
pub fn decode_mutf8(bytes: &[u8]) -> Cow<'_, str> {
    simd_cesu8::mutf8::decode_lossy(bytes)
}

/// The UTF-16 code units of a host string, as `char` values surface them
/// through `charAt` and `toCharArray`.
pub fn utf16_units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// UTF-16LE byte serialisation, the shape `String.getBytes` hands back in
/// the mocked runtime.
pub fn utf16le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Rebuild a host string from UTF-16 code units.
pub fn from_utf16_units(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutf8_round_trips_ascii() {
        assert_eq!(decode_mutf8(b"hello"), "hello");
    }

    #[test]
    fn mutf8_decodes_embedded_nul() {
        // MUTF-8 encodes U+0000 as 0xC0 0x80
        assert_eq!(decode_mutf8(&[0x61, 0xC0, 0x80, 0x62]), "a\u{0}b");
    }

    #[test]
    fn utf16le_little_endian_layout() {
        assert_eq!(utf16le_bytes("hi"), vec![0x68, 0x00, 0x69, 0x00]);
    }

    #[test]
    fn utf16_units_round_trip() {
        let units = utf16_units("héllo");
        assert_eq!(from_utf16_units(&units), "héllo");
    }
}
