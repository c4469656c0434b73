//! Types for extra fields

use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::result::{ZipError, ZipResult};

mod ntfs;

pub use ntfs::Ntfs;

/// One record of an entry's extra field area.
///
/// Known tags are decoded into their typed variant; everything else is kept
/// as [`UnknownExtraField`] and round-trips byte for byte.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtraField {
    /// NTFS timestamps extra field
    Ntfs(Ntfs),
    /// Any unrecognized extra field, preserved verbatim
    Unknown(UnknownExtraField),
}

impl ExtraField {
    /// The record's header ID.
    pub fn tag(&self) -> u16 {
        match self {
            ExtraField::Ntfs(_) => Ntfs::TAG,
            ExtraField::Unknown(field) => field.tag,
        }
    }

    /// Serializes the full record, including its tag/size prefix.
    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        match self {
            ExtraField::Ntfs(field) => field.write(writer),
            ExtraField::Unknown(field) => field.write(writer),
        }
    }
}

/// An extra field this crate has no decoder for.
///
/// `data` holds the complete on-disk encoding, 4-byte prefix included, so
/// rewriting the entry reproduces the original bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownExtraField {
    /// The record's header ID
    pub tag: u16,
    /// The record's full encoding, tag/size prefix included
    pub data: Vec<u8>,
}

impl UnknownExtraField {
    fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }
}

/// Splits an extra field area into its records.
pub(crate) fn parse(data: &[u8]) -> ZipResult<Vec<ExtraField>> {
    let mut fields = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(ZipError::InvalidArchive("incomplete extra field header"));
        }
        let mut prefix = rest;
        let tag = prefix.read_u16::<LittleEndian>()?;
        let size = prefix.read_u16::<LittleEndian>()? as usize;
        if rest.len() < 4 + size {
            return Err(ZipError::InvalidArchive(
                "extra field size exceeds extra data",
            ));
        }
        let record = &rest[..4 + size];

        fields.push(match tag {
            Ntfs::TAG => ExtraField::Ntfs(Ntfs::parse(record)?),
            _ => ExtraField::Unknown(UnknownExtraField {
                tag,
                data: record.to_vec(),
            }),
        });
        rest = &rest[4 + size..];
    }

    Ok(fields)
}

/// Concatenates the serialized form of every record.
pub(crate) fn serialize(fields: &[ExtraField]) -> ZipResult<Vec<u8>> {
    let mut buf = Vec::new();
    for field in fields {
        field.write(&mut buf)?;
    }
    Ok(buf)
}
