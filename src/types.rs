//! Types that specify what is contained in a ZIP.

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::compression::CompressionMethod;
use crate::extra_fields::ExtraField;
use crate::system::System;

/// Version needed to extract entries produced by this crate (2.0, DEFLATE).
pub(crate) const DEFAULT_VERSION: u8 = 20;

mod ffi {
    pub const S_IFDIR: u32 = 0o0040000;
    pub const S_IFREG: u32 = 0o0100000;
}

pub(crate) const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
pub(crate) const FLAG_UTF8: u16 = 0x0800;

/// General purpose flag bits recognized by this crate.
///
/// The DEFLATE level also lives in the flag field (bits 1-2) but is carried
/// by [`CompressionMethod::Deflated`] instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    /// CRC-32 and sizes follow the entry data in a data descriptor.
    pub data_descriptor: bool,
    /// File name and comment are UTF-8 encoded.
    pub utf8: bool,
}

impl Flags {
    pub(crate) fn from_bits(flag: u16) -> Flags {
        Flags {
            data_descriptor: flag & FLAG_DATA_DESCRIPTOR != 0,
            utf8: flag & FLAG_UTF8 != 0,
        }
    }

    pub(crate) fn bits(&self) -> u16 {
        let mut flag = 0;
        if self.data_descriptor {
            flag |= FLAG_DATA_DESCRIPTOR;
        }
        if self.utf8 {
            flag |= FLAG_UTF8;
        }
        flag
    }
}

/// Describes a single file within a ZIP archive.
///
/// On the read side every central directory entry is decoded into one of
/// these; on the write side a `FileHeader` configures a new entry, with
/// `crc32` and both sizes computed while the data is written.
#[derive(Clone, Debug, PartialEq)]
pub struct FileHeader {
    /// Version needed to extract the file
    pub minimum_version: u8,
    /// Version used to generate the file
    pub generate_version: u8,
    /// Operating system used to generate the file
    pub generate_os: System,
    /// General purpose flags
    pub flags: Flags,
    /// Compression method
    pub method: CompressionMethod,
    /// Last modification time, `None` when the archive carries no timestamp.
    /// Stored with a 2 second precision.
    pub modified_time: Option<OffsetDateTime>,
    /// CRC-32 of the uncompressed data
    pub crc32: u32,
    /// Compressed data size
    pub compressed_size: u32,
    /// Uncompressed data size
    pub uncompressed_size: u32,
    /// File name
    pub file_name: String,
    /// Extra field data
    pub extra_fields: Vec<ExtraField>,
    /// Internal file attributes
    pub internal_file_attr: u16,
    /// External file attributes
    pub external_file_attr: u32,
    /// File comment
    pub comment: String,
}

impl FileHeader {
    /// Creates a header with this crate's defaults: DEFLATE at the default
    /// level, MS-DOS producer, no timestamp.
    pub fn new<S: Into<String>>(name: S) -> FileHeader {
        FileHeader {
            minimum_version: DEFAULT_VERSION,
            generate_version: DEFAULT_VERSION,
            generate_os: System::Dos,
            flags: Flags::default(),
            method: CompressionMethod::default(),
            modified_time: None,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name: name.into(),
            extra_fields: Vec::new(),
            internal_file_attr: 0,
            external_file_attr: 0,
            comment: String::new(),
        }
    }

    /// Whether this entry is a directory (its name ends with '/').
    pub fn is_dir(&self) -> bool {
        self.file_name.ends_with('/')
    }

    /// Unix mode for the entry, derived from the external attributes.
    ///
    /// UNIX producers store the mode in the upper half of the attribute
    /// word; for MS-DOS producers the directory and read-only bits are
    /// translated. Other producers yield `None`.
    pub fn unix_mode(&self) -> Option<u32> {
        match self.generate_os {
            System::Unix | System::Osx => Some(self.external_file_attr >> 16),
            System::Dos => {
                // interpret the MS-DOS directory and read-only bits
                let mut mode = if self.external_file_attr & 0x10 != 0 {
                    ffi::S_IFDIR | 0o0775
                } else {
                    ffi::S_IFREG | 0o0664
                };
                if self.external_file_attr & 0x01 != 0 {
                    mode &= !0o0222;
                }
                Some(mode)
            }
            _ => None,
        }
    }
}

/// Packs a timestamp into MS-DOS (date, time) words.
///
/// The timestamp is converted to UTC first. Unset times and times before
/// 1980 are represented as `(0, 0)`.
pub(crate) fn datetime_to_dos(datetime: Option<OffsetDateTime>) -> (u16, u16) {
    let t = match datetime {
        Some(t) => t.to_offset(UtcOffset::UTC),
        None => return (0, 0),
    };
    if t.year() < 1980 {
        return (0, 0);
    }

    let date = ((t.year() - 1980) as u16) << 9
        | (u8::from(t.month()) as u16) << 5
        | t.day() as u16;
    let time = (t.hour() as u16) << 11 | (t.minute() as u16) << 5 | (t.second() as u16) / 2;
    (date, time)
}

/// Unpacks MS-DOS (date, time) words into a UTC timestamp.
///
/// `(0, 0)` means "no timestamp"; fields that do not form a real calendar
/// date are treated the same way.
pub(crate) fn datetime_from_dos(date: u16, time: u16) -> Option<OffsetDateTime> {
    if date == 0 && time == 0 {
        return None;
    }

    let year = ((date >> 9) & 0x7f) as i32 + 1980;
    let month = Month::try_from(((date >> 5) & 0x0f) as u8).ok()?;
    let day = (date & 0x1f) as u8;
    let hour = ((time >> 11) & 0x1f) as u8;
    let minute = ((time >> 5) & 0x3f) as u8;
    let second = ((time & 0x1f) * 2) as u8;

    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}

#[cfg(test)]
mod test {
    use time::macros::datetime;

    use super::{datetime_from_dos, datetime_to_dos, Flags};

    #[test]
    fn flags_round_trip() {
        let flags = Flags {
            data_descriptor: true,
            utf8: false,
        };
        assert_eq!(flags.bits(), 0x0008);
        assert_eq!(Flags::from_bits(0x0008), flags);

        let flags = Flags {
            data_descriptor: false,
            utf8: true,
        };
        assert_eq!(flags.bits(), 0x0800);
        assert_eq!(Flags::from_bits(0x0800), flags);

        // unrelated bits are ignored
        assert_eq!(Flags::from_bits(0x0006), Flags::default());
    }

    #[test]
    fn dos_time_pack() {
        let (date, time) = datetime_to_dos(Some(datetime!(2022-05-06 12:34:56 UTC)));
        assert_eq!(date, (42 << 9) | (5 << 5) | 6);
        assert_eq!(time, (12 << 11) | (34 << 5) | 28);
    }

    #[test]
    fn dos_time_round_trip() {
        let t = datetime!(2022-05-06 12:34:56 UTC);
        let (date, time) = datetime_to_dos(Some(t));
        assert_eq!(datetime_from_dos(date, time), Some(t));

        // odd seconds round down to the 2 second grid
        let (date, time) = datetime_to_dos(Some(datetime!(2009-12-31 23:59:59 UTC)));
        assert_eq!(
            datetime_from_dos(date, time),
            Some(datetime!(2009-12-31 23:59:58 UTC))
        );
    }

    #[test]
    fn dos_time_converts_to_utc() {
        let (date, time) = datetime_to_dos(Some(datetime!(2022-05-06 21:34:56 -9)));
        assert_eq!(
            datetime_from_dos(date, time),
            Some(datetime!(2022-05-07 6:34:56 UTC))
        );
    }

    #[test]
    fn unix_mode() {
        use crate::system::System;
        use crate::types::FileHeader;

        let mut header = FileHeader::new("a.txt");
        header.generate_os = System::Unix;
        header.external_file_attr = 0o100644 << 16;
        assert_eq!(header.unix_mode(), Some(0o100644));

        header.generate_os = System::Dos;
        header.external_file_attr = 0x10;
        assert_eq!(header.unix_mode(), Some(0o040775));
        header.external_file_attr = 0x01;
        assert_eq!(header.unix_mode(), Some(0o100444));

        header.generate_os = System::Ntfs;
        assert_eq!(header.unix_mode(), None);
    }

    #[test]
    fn dos_time_unset() {
        assert_eq!(datetime_to_dos(None), (0, 0));
        assert_eq!(datetime_to_dos(Some(datetime!(1969-07-20 20:17:40 UTC))), (0, 0));
        assert_eq!(datetime_from_dos(0, 0), None);
    }
}
