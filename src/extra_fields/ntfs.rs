use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use time::{Duration, OffsetDateTime};

use crate::result::{ZipError, ZipResult};

/// Windows FILETIME tick count at the Unix epoch (1970-01-01).
const FILETIME_UNIX_EPOCH: u64 = 0x019D_B1DE_D53E_8000;
const TICKS_PER_SECOND: u64 = 10_000_000;

/// Attribute tag of the file-times attribute inside the NTFS field.
const ATTR_TIMES: u16 = 0x0001;
/// Size of the file-times attribute: three 64-bit FILETIME values.
const ATTR_TIMES_SIZE: u16 = 24;

/// NTFS extra field (tag `0x000A`) carrying three Windows FILETIME stamps.
#[derive(Clone, Debug, PartialEq)]
pub struct Ntfs {
    /// Last modification time
    pub mtime: OffsetDateTime,
    /// Last access time
    pub atime: OffsetDateTime,
    /// Creation time
    pub ctime: OffsetDateTime,
}

impl Ntfs {
    /// Header ID of the NTFS extra field.
    pub const TAG: u16 = 0x000a;

    /// Decodes a full NTFS extra field record, prefix included.
    pub(crate) fn parse(record: &[u8]) -> ZipResult<Ntfs> {
        let mut r = record;
        if r.read_u16::<LittleEndian>()? != Self::TAG {
            return Err(ZipError::InvalidArchive("extra field is not NTFS"));
        }
        r.read_u16::<LittleEndian>()?; // data size, already sliced by the caller
        r.read_u32::<LittleEndian>()?; // reserved

        if r.read_u16::<LittleEndian>()? != ATTR_TIMES {
            return Err(ZipError::InvalidArchive("undefined NTFS attribute tag"));
        }
        if r.read_u16::<LittleEndian>()? != ATTR_TIMES_SIZE {
            return Err(ZipError::InvalidArchive("unexpected NTFS attribute size"));
        }

        Ok(Ntfs {
            mtime: datetime_from_filetime(r.read_u64::<LittleEndian>()?)?,
            atime: datetime_from_filetime(r.read_u64::<LittleEndian>()?)?,
            ctime: datetime_from_filetime(r.read_u64::<LittleEndian>()?)?,
        })
    }

    /// Serializes the full record, prefix included.
    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        writer.write_u16::<LittleEndian>(Self::TAG)?;
        writer.write_u16::<LittleEndian>(4 + 4 + ATTR_TIMES_SIZE)?;
        writer.write_u32::<LittleEndian>(0)?; // reserved
        writer.write_u16::<LittleEndian>(ATTR_TIMES)?;
        writer.write_u16::<LittleEndian>(ATTR_TIMES_SIZE)?;
        writer.write_u64::<LittleEndian>(filetime_from_datetime(self.mtime))?;
        writer.write_u64::<LittleEndian>(filetime_from_datetime(self.atime))?;
        writer.write_u64::<LittleEndian>(filetime_from_datetime(self.ctime))?;
        Ok(())
    }
}

fn filetime_from_datetime(t: OffsetDateTime) -> u64 {
    (t.unix_timestamp() as u64)
        .wrapping_mul(TICKS_PER_SECOND)
        .wrapping_add(t.nanosecond() as u64)
        .wrapping_add(FILETIME_UNIX_EPOCH)
}

fn datetime_from_filetime(value: u64) -> ZipResult<OffsetDateTime> {
    let seconds = value.wrapping_sub(FILETIME_UNIX_EPOCH) / TICKS_PER_SECOND;
    let nanoseconds = value % TICKS_PER_SECOND;

    OffsetDateTime::from_unix_timestamp(seconds as i64)
        .map(|t| t + Duration::nanoseconds(nanoseconds as i64))
        .map_err(|_| ZipError::InvalidArchive("NTFS timestamp is out of range"))
}

#[cfg(test)]
mod test {
    use time::macros::datetime;

    use super::{datetime_from_filetime, filetime_from_datetime, FILETIME_UNIX_EPOCH};

    #[test]
    fn filetime_epoch() {
        assert_eq!(
            filetime_from_datetime(datetime!(1970-01-01 0:00:00 UTC)),
            FILETIME_UNIX_EPOCH
        );
        assert_eq!(
            datetime_from_filetime(FILETIME_UNIX_EPOCH).unwrap(),
            datetime!(1970-01-01 0:00:00 UTC)
        );
    }

    #[test]
    fn filetime_round_trip() {
        let t = datetime!(2022-06-07 11:06:57.007821851 UTC);
        assert_eq!(datetime_from_filetime(filetime_from_datetime(t)).unwrap(), t);
    }
}
