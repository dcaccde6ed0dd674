//! Character encodings for string fields written by the binary codec.
//!
//! Compound files and the record formats stored inside them use UTF-16 for
//! most names, but older records carry text in a Windows codepage. This
//! module maps codepage identifiers onto `encoding_rs` encodings and wraps
//! both cases in [`StringEncoding`].

use crate::common::binary::{BinaryError, BinaryResult, ByteOrder};
use encoding_rs::Encoding;

/// Map Windows codepage identifier to encoding_rs Encoding.
///
/// Only single- and multi-byte codepages are returned here; the UTF-16
/// codepages (1200/1201) are handled by [`StringEncoding::Utf16`] because
/// `encoding_rs` cannot encode into UTF-16.
///
/// # Examples
/// ```
/// use longan::common::encoding::codepage_to_encoding;
///
/// let encoding = codepage_to_encoding(936).unwrap();
/// assert_eq!(encoding.name(), "GBK");
/// assert!(codepage_to_encoding(1200).is_none());
/// ```
#[inline]
pub fn codepage_to_encoding(codepage: u32) -> Option<&'static Encoding> {
    match codepage {
        // DOS codepages
        437 | 850 => Some(encoding_rs::IBM866), // approximation

        // Windows codepages (Western scripts)
        874 => Some(encoding_rs::WINDOWS_874),   // Thai
        1250 => Some(encoding_rs::WINDOWS_1250), // Central European
        1251 => Some(encoding_rs::WINDOWS_1251), // Cyrillic
        1252 => Some(encoding_rs::WINDOWS_1252), // Western European (default ANSI)
        1253 => Some(encoding_rs::WINDOWS_1253), // Greek
        1254 => Some(encoding_rs::WINDOWS_1254), // Turkish
        1255 => Some(encoding_rs::WINDOWS_1255), // Hebrew
        1256 => Some(encoding_rs::WINDOWS_1256), // Arabic
        1257 => Some(encoding_rs::WINDOWS_1257), // Baltic
        1258 => Some(encoding_rs::WINDOWS_1258), // Vietnamese

        // East Asian codepages
        932 => Some(encoding_rs::SHIFT_JIS),
        936 => Some(encoding_rs::GBK),
        949 => Some(encoding_rs::EUC_KR),
        950 => Some(encoding_rs::BIG5),
        20932 => Some(encoding_rs::EUC_JP),
        54936 => Some(encoding_rs::GB18030),

        // ISO 8859 series
        28591 => Some(encoding_rs::WINDOWS_1252), // ISO-8859-1 approximation
        28592 => Some(encoding_rs::ISO_8859_2),
        28595 => Some(encoding_rs::ISO_8859_5),
        28597 => Some(encoding_rs::ISO_8859_7),
        28605 => Some(encoding_rs::ISO_8859_15),

        // KOI8 series and Macintosh
        20866 => Some(encoding_rs::KOI8_R),
        21866 => Some(encoding_rs::KOI8_U),
        10000 => Some(encoding_rs::MACINTOSH),

        65001 => Some(encoding_rs::UTF_8),

        _ => None,
    }
}

/// Text encoding applied by the binary codec to string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    /// UTF-16 in the codec's byte order (the compound-file default)
    #[default]
    Utf16,
    /// Any encoding `encoding_rs` can encode into (codepages, UTF-8)
    Codepage(&'static Encoding),
}

impl StringEncoding {
    /// Resolve a Windows codepage identifier.
    ///
    /// Returns `None` for codepages without a known mapping.
    pub fn from_codepage(codepage: u32) -> Option<Self> {
        match codepage {
            1200 | 1201 => Some(Self::Utf16),
            other => codepage_to_encoding(other).map(Self::Codepage),
        }
    }

    /// Width in bytes of one code unit of this encoding.
    ///
    /// Length prefixes written by the codec count code units, not bytes.
    #[inline]
    pub fn code_unit_size(&self) -> usize {
        match self {
            Self::Utf16 => 2,
            Self::Codepage(_) => 1,
        }
    }

    /// Encode a string, failing if any character has no representation.
    pub fn encode(&self, text: &str, order: ByteOrder) -> BinaryResult<Vec<u8>> {
        match self {
            Self::Utf16 => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&order.u16_bytes(unit));
                }
                Ok(out)
            },
            Self::Codepage(encoding) => {
                let (bytes, _, had_errors) = encoding.encode(text);
                if had_errors {
                    return Err(BinaryError::Unrepresentable {
                        text: text.to_string(),
                        encoding: encoding.name(),
                    });
                }
                Ok(bytes.into_owned())
            },
        }
    }

    /// Decode bytes produced by [`encode`](Self::encode).
    ///
    /// Malformed input is an error rather than being replaced, so a decode
    /// of an encode always yields the original string.
    pub fn decode(&self, bytes: &[u8], order: ByteOrder) -> BinaryResult<String> {
        match self {
            Self::Utf16 => {
                if bytes.len() % 2 != 0 {
                    return Err(BinaryError::Malformed(format!(
                        "UTF-16 data has odd length {}",
                        bytes.len()
                    )));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| order.u16_from([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units)
                    .map_err(|e| BinaryError::Malformed(format!("invalid UTF-16: {}", e)))
            },
            Self::Codepage(encoding) => encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned())
                .ok_or_else(|| {
                    BinaryError::Malformed(format!("invalid {} data", encoding.name()))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codepage_lookup() {
        assert_eq!(codepage_to_encoding(1252), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(codepage_to_encoding(99999), None);
        assert_eq!(StringEncoding::from_codepage(1200), Some(StringEncoding::Utf16));
        assert_eq!(
            StringEncoding::from_codepage(1251),
            Some(StringEncoding::Codepage(encoding_rs::WINDOWS_1251))
        );
    }

    #[test]
    fn test_utf16_both_orders() {
        let le = StringEncoding::Utf16.encode("Ab", ByteOrder::LittleEndian).unwrap();
        assert_eq!(le, vec![0x41, 0x00, 0x62, 0x00]);
        let be = StringEncoding::Utf16.encode("Ab", ByteOrder::BigEndian).unwrap();
        assert_eq!(be, vec![0x00, 0x41, 0x00, 0x62]);
        assert_eq!(
            StringEncoding::Utf16.decode(&be, ByteOrder::BigEndian).unwrap(),
            "Ab"
        );
    }

    #[test]
    fn test_codepage_unrepresentable() {
        let cp = StringEncoding::Codepage(encoding_rs::WINDOWS_1252);
        assert_eq!(cp.encode("café", ByteOrder::LittleEndian).unwrap(), b"caf\xE9");
        assert!(cp.encode("日本", ByteOrder::LittleEndian).is_err());
    }

    #[test]
    fn test_utf16_odd_length() {
        assert!(
            StringEncoding::Utf16
                .decode(&[0x41], ByteOrder::LittleEndian)
                .is_err()
        );
    }
}
