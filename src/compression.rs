//! Possible ZIP compression methods.

use crate::result::{ZipError, ZipResult};

/// Method id for storing data without compression.
const METHOD_STORED: u16 = 0;
/// Method id for DEFLATE compression.
const METHOD_DEFLATED: u16 = 8;

/// Compression methods for the contents of a ZIP file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is stored (no compression)
    Stored,
    /// The file is Deflated at the given level
    Deflated(CompressionLevel),
}

/// DEFLATE compression level, as encoded in bits 1-2 of the general
/// purpose flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Normal compression
    #[default]
    Default,
    /// Maximum compression
    Maximum,
    /// Fast compression
    Fast,
    /// Super fast compression
    SuperFast,
}

impl Default for CompressionMethod {
    fn default() -> Self {
        CompressionMethod::Deflated(CompressionLevel::Default)
    }
}

impl CompressionMethod {
    /// Converts a method id from an archive header.
    ///
    /// The Deflated variant starts at the default level; combine with
    /// [`CompressionMethod::with_flag_bits`] to recover the level recorded
    /// in the entry's flags.
    pub fn from_u16(method: u16) -> ZipResult<CompressionMethod> {
        match method {
            METHOD_STORED => Ok(CompressionMethod::Stored),
            METHOD_DEFLATED => Ok(CompressionMethod::Deflated(CompressionLevel::Default)),
            _ => Err(ZipError::UnsupportedArchive(
                "unsupported compression method",
            )),
        }
    }

    /// Returns the method id recorded in archive headers.
    pub fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => METHOD_STORED,
            CompressionMethod::Deflated(_) => METHOD_DEFLATED,
        }
    }

    /// Returns this method's contribution to the general purpose flag.
    pub fn flag_bits(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated(level) => match level {
                CompressionLevel::Default => 0b00 << 1,
                CompressionLevel::Maximum => 0b01 << 1,
                CompressionLevel::Fast => 0b10 << 1,
                CompressionLevel::SuperFast => 0b11 << 1,
            },
        }
    }

    /// Applies the level encoded in an entry's general purpose flag.
    pub fn with_flag_bits(self, flag: u16) -> CompressionMethod {
        match self {
            CompressionMethod::Stored => CompressionMethod::Stored,
            CompressionMethod::Deflated(_) => {
                CompressionMethod::Deflated(match (flag >> 1) & 0b11 {
                    0b00 => CompressionLevel::Default,
                    0b01 => CompressionLevel::Maximum,
                    0b10 => CompressionLevel::Fast,
                    _ => CompressionLevel::SuperFast,
                })
            }
        }
    }
}

impl CompressionLevel {
    /// The flate2 compression level used for this setting.
    ///
    /// SuperFast maps to level 0 (stored DEFLATE blocks); miniz has no
    /// Huffman-only mode.
    pub(crate) fn to_flate2(self) -> flate2::Compression {
        match self {
            CompressionLevel::Default => flate2::Compression::default(),
            CompressionLevel::Maximum => flate2::Compression::best(),
            CompressionLevel::Fast => flate2::Compression::fast(),
            CompressionLevel::SuperFast => flate2::Compression::none(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CompressionLevel, CompressionMethod};

    #[test]
    fn method_ids() {
        assert_eq!(CompressionMethod::Stored.to_u16(), 0);
        assert_eq!(CompressionMethod::default().to_u16(), 8);
        assert_eq!(
            CompressionMethod::from_u16(0).unwrap(),
            CompressionMethod::Stored
        );
        assert_eq!(
            CompressionMethod::from_u16(8).unwrap(),
            CompressionMethod::default()
        );
        assert!(CompressionMethod::from_u16(0x63).is_err());
    }

    #[test]
    fn level_flag_bits() {
        let cases = [
            (CompressionLevel::Default, 0b00 << 1),
            (CompressionLevel::Maximum, 0b01 << 1),
            (CompressionLevel::Fast, 0b10 << 1),
            (CompressionLevel::SuperFast, 0b11 << 1),
        ];
        for (level, bits) in cases {
            let method = CompressionMethod::Deflated(level);
            assert_eq!(method.flag_bits(), bits);
            assert_eq!(CompressionMethod::default().with_flag_bits(bits), method);
        }
        assert_eq!(CompressionMethod::Stored.flag_bits(), 0);
        assert_eq!(
            CompressionMethod::Stored.with_flag_bits(0b11 << 1),
            CompressionMethod::Stored
        );
    }
}
