//! On-disk record structures of the ZIP format.
//!
//! Each record knows how to parse itself from a byte stream and how to
//! serialize itself back; the reader and writer do all positioning through
//! `Seek` and treat these as plain prefix-plus-variable-data blobs.

use std::io;
use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::compression::CompressionMethod;
use crate::extra_fields;
use crate::result::{ZipError, ZipResult};
use crate::system::System;
use crate::types::{datetime_from_dos, datetime_to_dos, FileHeader, Flags};

pub(crate) const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
pub(crate) const CENTRAL_DIRECTORY_HEADER_SIGNATURE: u32 = 0x02014b50;
pub(crate) const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
pub(crate) const CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06054b50;

/// Size of the fixed prefix of an end of central directory record.
pub(crate) const CENTRAL_DIRECTORY_END_SIZE: u64 = 22;

/// Byte offset of the crc-32 field within a local file header; the writer
/// patches crc and sizes in place at this offset when it closes an entry.
pub(crate) const LOCAL_HEADER_CRC32_OFFSET: u64 = 14;

fn read_vec<R: Read>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Local file header: the per-entry preamble immediately before its payload.
#[derive(Debug)]
pub(crate) struct LocalFileHeader {
    pub minimum_version: u16,
    pub flag: u16,
    pub method: u16,
    pub modtime: u16,
    pub moddate: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    pub fn parse<R: Read>(reader: &mut R) -> ZipResult<LocalFileHeader> {
        if reader.read_u32::<LittleEndian>()? != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(ZipError::InvalidArchive("invalid local file header"));
        }

        let minimum_version = reader.read_u16::<LittleEndian>()?;
        let flag = reader.read_u16::<LittleEndian>()?;
        let method = reader.read_u16::<LittleEndian>()?;
        let modtime = reader.read_u16::<LittleEndian>()?;
        let moddate = reader.read_u16::<LittleEndian>()?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;
        let file_name_length = reader.read_u16::<LittleEndian>()?;
        let extra_field_length = reader.read_u16::<LittleEndian>()?;

        if file_name_length == 0 {
            return Err(ZipError::InvalidArchive(
                "local file header with an empty file name",
            ));
        }
        let file_name = read_vec(reader, file_name_length as usize)?;
        let extra_field = read_vec(reader, extra_field_length as usize)?;

        Ok(LocalFileHeader {
            minimum_version,
            flag,
            method,
            modtime,
            moddate,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra_field,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        if self.file_name.is_empty() {
            return Err(ZipError::InvalidArchive(
                "local file header with an empty file name",
            ));
        }

        // local file header signature
        writer.write_u32::<LittleEndian>(LOCAL_FILE_HEADER_SIGNATURE)?;
        // version needed to extract
        writer.write_u16::<LittleEndian>(self.minimum_version)?;
        // general purpose bit flag
        writer.write_u16::<LittleEndian>(self.flag)?;
        // compression method
        writer.write_u16::<LittleEndian>(self.method)?;
        // last mod file time and date
        writer.write_u16::<LittleEndian>(self.modtime)?;
        writer.write_u16::<LittleEndian>(self.moddate)?;
        // crc-32
        writer.write_u32::<LittleEndian>(self.crc32)?;
        // compressed and uncompressed size
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        // file name and extra field lengths
        writer.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.extra_field.len() as u16)?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&self.extra_field)?;

        Ok(())
    }

    /// Builds the record written ahead of a new entry's data.
    ///
    /// When the entry uses a data descriptor the crc and size fields are
    /// genuine zeros; otherwise they start as zeros and are patched on
    /// close. The local extra field stays empty, extra fields are recorded
    /// in the central directory only.
    pub fn from_header(header: &FileHeader) -> LocalFileHeader {
        let (moddate, modtime) = datetime_to_dos(header.modified_time);
        let (crc32, compressed_size, uncompressed_size) = if header.flags.data_descriptor {
            (0, 0, 0)
        } else {
            (
                header.crc32,
                header.compressed_size,
                header.uncompressed_size,
            )
        };

        LocalFileHeader {
            minimum_version: header.minimum_version as u16,
            flag: header.flags.bits() | header.method.flag_bits(),
            method: header.method.to_u16(),
            modtime,
            moddate,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name: header.file_name.clone().into_bytes(),
            extra_field: Vec::new(),
        }
    }
}

/// Central directory header: one per entry, in the table at the archive tail.
#[derive(Debug)]
pub(crate) struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub minimum_version: u16,
    pub flag: u16,
    pub method: u16,
    pub modtime: u16,
    pub moddate: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attr: u16,
    pub external_file_attr: u32,
    pub local_header_offset: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    pub fn parse<R: Read>(reader: &mut R) -> ZipResult<CentralDirectoryHeader> {
        if reader.read_u32::<LittleEndian>()? != CENTRAL_DIRECTORY_HEADER_SIGNATURE {
            return Err(ZipError::InvalidArchive("invalid central directory header"));
        }

        let version_made_by = reader.read_u16::<LittleEndian>()?;
        let minimum_version = reader.read_u16::<LittleEndian>()?;
        let flag = reader.read_u16::<LittleEndian>()?;
        let method = reader.read_u16::<LittleEndian>()?;
        let modtime = reader.read_u16::<LittleEndian>()?;
        let moddate = reader.read_u16::<LittleEndian>()?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;
        let file_name_length = reader.read_u16::<LittleEndian>()?;
        let extra_field_length = reader.read_u16::<LittleEndian>()?;
        let comment_length = reader.read_u16::<LittleEndian>()?;
        let disk_number = reader.read_u16::<LittleEndian>()?;
        let internal_file_attr = reader.read_u16::<LittleEndian>()?;
        let external_file_attr = reader.read_u32::<LittleEndian>()?;
        let local_header_offset = reader.read_u32::<LittleEndian>()?;

        if disk_number != 0 {
            return Err(ZipError::UnsupportedArchive(
                "split zip files are not supported",
            ));
        }
        if file_name_length == 0 {
            return Err(ZipError::InvalidArchive(
                "central directory header with an empty file name",
            ));
        }
        let file_name = read_vec(reader, file_name_length as usize)?;
        let extra_field = read_vec(reader, extra_field_length as usize)?;
        let comment = read_vec(reader, comment_length as usize)?;

        Ok(CentralDirectoryHeader {
            version_made_by,
            minimum_version,
            flag,
            method,
            modtime,
            moddate,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attr,
            external_file_attr,
            local_header_offset,
            file_name,
            extra_field,
            comment,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        if self.file_name.is_empty() {
            return Err(ZipError::InvalidArchive(
                "central directory header with an empty file name",
            ));
        }

        // central file header signature
        writer.write_u32::<LittleEndian>(CENTRAL_DIRECTORY_HEADER_SIGNATURE)?;
        // version made by
        writer.write_u16::<LittleEndian>(self.version_made_by)?;
        // version needed to extract
        writer.write_u16::<LittleEndian>(self.minimum_version)?;
        // general purpose bit flag
        writer.write_u16::<LittleEndian>(self.flag)?;
        // compression method
        writer.write_u16::<LittleEndian>(self.method)?;
        // last mod file time and date
        writer.write_u16::<LittleEndian>(self.modtime)?;
        writer.write_u16::<LittleEndian>(self.moddate)?;
        // crc-32
        writer.write_u32::<LittleEndian>(self.crc32)?;
        // compressed and uncompressed size
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        // file name, extra field and comment lengths
        writer.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.extra_field.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        // disk number start
        writer.write_u16::<LittleEndian>(self.disk_number)?;
        // internal and external file attributes
        writer.write_u16::<LittleEndian>(self.internal_file_attr)?;
        writer.write_u32::<LittleEndian>(self.external_file_attr)?;
        // relative offset of local header
        writer.write_u32::<LittleEndian>(self.local_header_offset)?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&self.extra_field)?;
        writer.write_all(&self.comment)?;

        Ok(())
    }

    pub fn from_header(header: &FileHeader, local_header_offset: u32) -> ZipResult<Self> {
        let (moddate, modtime) = datetime_to_dos(header.modified_time);

        Ok(CentralDirectoryHeader {
            version_made_by: (header.generate_os.to_u8() as u16) << 8
                | header.generate_version as u16,
            minimum_version: header.minimum_version as u16,
            flag: header.flags.bits() | header.method.flag_bits(),
            method: header.method.to_u16(),
            modtime,
            moddate,
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            disk_number: 0,
            internal_file_attr: header.internal_file_attr,
            external_file_attr: header.external_file_attr,
            local_header_offset,
            file_name: header.file_name.clone().into_bytes(),
            extra_field: extra_fields::serialize(&header.extra_fields)?,
            comment: header.comment.clone().into_bytes(),
        })
    }

    pub fn into_header(self) -> ZipResult<FileHeader> {
        let method = CompressionMethod::from_u16(self.method)?.with_flag_bits(self.flag);

        Ok(FileHeader {
            minimum_version: self.minimum_version as u8,
            generate_version: self.version_made_by as u8,
            generate_os: System::from_u8((self.version_made_by >> 8) as u8),
            flags: Flags::from_bits(self.flag),
            method,
            modified_time: datetime_from_dos(self.moddate, self.modtime),
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            file_name: String::from_utf8_lossy(&self.file_name).into_owned(),
            extra_fields: extra_fields::parse(&self.extra_field)?,
            internal_file_attr: self.internal_file_attr,
            external_file_attr: self.external_file_attr,
            comment: String::from_utf8_lossy(&self.comment).into_owned(),
        })
    }
}

/// Data descriptor: trails an entry's payload when crc and sizes were not
/// known at the time the local header was written.
#[derive(Debug, PartialEq)]
pub struct DataDescriptor {
    /// CRC-32 of the uncompressed data
    pub crc32: u32,
    /// Compressed data size
    pub compressed_size: u32,
    /// Uncompressed data size
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    /// Parses a data descriptor, tolerating the optional signature.
    pub fn parse<R: Read>(reader: &mut R) -> ZipResult<DataDescriptor> {
        let first = reader.read_u32::<LittleEndian>()?;
        let (crc32, compressed_size) = if first == DATA_DESCRIPTOR_SIGNATURE {
            (
                reader.read_u32::<LittleEndian>()?,
                reader.read_u32::<LittleEndian>()?,
            )
        } else {
            (first, reader.read_u32::<LittleEndian>()?)
        };
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;

        Ok(DataDescriptor {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    /// Writes the 16-byte signed form.
    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        writer.write_u32::<LittleEndian>(DATA_DESCRIPTOR_SIGNATURE)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        Ok(())
    }
}

/// End of central directory record, the final structure of an archive.
#[derive(Debug)]
pub(crate) struct CentralDirectoryEnd {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub number_of_files_on_this_disk: u16,
    pub number_of_files: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub zip_file_comment: Vec<u8>,
}

impl CentralDirectoryEnd {
    pub fn parse<R: Read>(reader: &mut R) -> ZipResult<CentralDirectoryEnd> {
        if reader.read_u32::<LittleEndian>()? != CENTRAL_DIRECTORY_END_SIGNATURE {
            return Err(ZipError::InvalidArchive(
                "invalid end of central directory record",
            ));
        }
        let disk_number = reader.read_u16::<LittleEndian>()?;
        let disk_with_central_directory = reader.read_u16::<LittleEndian>()?;
        let number_of_files_on_this_disk = reader.read_u16::<LittleEndian>()?;
        let number_of_files = reader.read_u16::<LittleEndian>()?;
        let central_directory_size = reader.read_u32::<LittleEndian>()?;
        let central_directory_offset = reader.read_u32::<LittleEndian>()?;
        let comment_length = reader.read_u16::<LittleEndian>()?;
        let zip_file_comment = read_vec(reader, comment_length as usize)?;

        Ok(CentralDirectoryEnd {
            disk_number,
            disk_with_central_directory,
            number_of_files_on_this_disk,
            number_of_files,
            central_directory_size,
            central_directory_offset,
            zip_file_comment,
        })
    }

    /// Single-disk constraint of this crate.
    pub fn validate(&self) -> ZipResult<()> {
        if self.disk_number != 0
            || self.disk_with_central_directory != 0
            || self.number_of_files_on_this_disk != self.number_of_files
        {
            return Err(ZipError::UnsupportedArchive(
                "split zip files are not supported",
            ));
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        // end of central dir signature
        writer.write_u32::<LittleEndian>(CENTRAL_DIRECTORY_END_SIGNATURE)?;
        // number of this disk / disk with the start of the central directory
        writer.write_u16::<LittleEndian>(self.disk_number)?;
        writer.write_u16::<LittleEndian>(self.disk_with_central_directory)?;
        // entry counts
        writer.write_u16::<LittleEndian>(self.number_of_files_on_this_disk)?;
        writer.write_u16::<LittleEndian>(self.number_of_files)?;
        // size and offset of the central directory
        writer.write_u32::<LittleEndian>(self.central_directory_size)?;
        writer.write_u32::<LittleEndian>(self.central_directory_offset)?;
        // archive comment
        writer.write_u16::<LittleEndian>(self.zip_file_comment.len() as u16)?;
        writer.write_all(&self.zip_file_comment)?;

        Ok(())
    }

    /// Locates and parses the record by scanning the final
    /// `65535 + 22` bytes backward from end-of-file.
    ///
    /// The signature may also occur inside an archive comment; scanning
    /// backward and taking the first candidate that parses makes the
    /// occurrence nearest end-of-file win. Returns the record and its byte
    /// offset.
    pub fn find_and_parse<R: Read + Seek>(
        reader: &mut R,
    ) -> ZipResult<(CentralDirectoryEnd, u64)> {
        let file_length = reader.seek(io::SeekFrom::End(0))?;
        if file_length < CENTRAL_DIRECTORY_END_SIZE {
            return Err(ZipError::InvalidArchive("invalid zip file: too small"));
        }

        let search_upper_bound =
            file_length.saturating_sub(CENTRAL_DIRECTORY_END_SIZE + u16::MAX as u64);
        let mut pos = file_length - CENTRAL_DIRECTORY_END_SIZE;
        loop {
            reader.seek(io::SeekFrom::Start(pos))?;
            if reader.read_u32::<LittleEndian>()? == CENTRAL_DIRECTORY_END_SIGNATURE {
                reader.seek(io::SeekFrom::Start(pos))?;
                if let Ok(footer) = CentralDirectoryEnd::parse(reader) {
                    footer.validate()?;
                    return Ok((footer, pos));
                }
            }
            if pos == search_upper_bound {
                break;
            }
            pos -= 1;
        }

        Err(ZipError::InvalidArchive(
            "could not find end of central directory record",
        ))
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn local_file_header_round_trip() {
        let header = LocalFileHeader {
            minimum_version: 20,
            flag: 0x0800,
            method: 8,
            modtime: (12 << 11) | (34 << 5) | 28,
            moddate: (42 << 9) | (5 << 5) | 6,
            crc32: 0x1c291ca3,
            compressed_size: 8,
            uncompressed_size: 12,
            file_name: b"test.txt".to_vec(),
            extra_field: Vec::new(),
        };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 30 + 8);

        let parsed = LocalFileHeader::parse(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.flag, header.flag);
        assert_eq!(parsed.crc32, header.crc32);
        assert_eq!(parsed.file_name, header.file_name);
    }

    #[test]
    fn local_file_header_rejects_empty_name() {
        let mut buf = Vec::new();
        let header = LocalFileHeader {
            minimum_version: 20,
            flag: 0,
            method: 0,
            modtime: 0,
            moddate: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name: b"a".to_vec(),
            extra_field: Vec::new(),
        };
        header.write(&mut buf).unwrap();
        // force the stored name length to zero
        buf[26] = 0;
        assert!(LocalFileHeader::parse(&mut Cursor::new(&buf)).is_err());
    }

    #[test]
    fn data_descriptor_with_and_without_signature() {
        let descriptor = DataDescriptor {
            crc32: 0x1c291ca3,
            compressed_size: 8,
            uncompressed_size: 12,
        };

        let mut signed = Vec::new();
        descriptor.write(&mut signed).unwrap();
        assert_eq!(signed.len(), 16);
        assert_eq!(
            DataDescriptor::parse(&mut Cursor::new(&signed)).unwrap(),
            descriptor
        );

        // the signature is optional on read
        let bare = &signed[4..];
        assert_eq!(
            DataDescriptor::parse(&mut Cursor::new(bare)).unwrap(),
            descriptor
        );
    }

    fn sample_footer(comment: &[u8]) -> Vec<u8> {
        let footer = CentralDirectoryEnd {
            disk_number: 0,
            disk_with_central_directory: 0,
            number_of_files_on_this_disk: 1,
            number_of_files: 1,
            central_directory_size: 54,
            central_directory_offset: 50,
            zip_file_comment: comment.to_vec(),
        };
        let mut buf = Vec::new();
        footer.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn find_end_of_central_directory() {
        let mut data = vec![0u8; 104];
        let pos = data.len() as u64;
        data.extend_from_slice(&sample_footer(b""));

        let (footer, offset) = CentralDirectoryEnd::find_and_parse(&mut Cursor::new(data)).unwrap();
        assert_eq!(offset, pos);
        assert_eq!(footer.number_of_files, 1);
        assert_eq!(footer.central_directory_offset, 50);
    }

    #[test]
    fn find_end_of_central_directory_with_trailing_junk() {
        let mut data = vec![0u8; 104];
        let pos = data.len() as u64;
        data.extend_from_slice(&sample_footer(b""));
        // garbage after the record, e.g. padding appended by another tool
        data.extend((0..4096u32).map(|i| (i % 251) as u8));

        let (_, offset) = CentralDirectoryEnd::find_and_parse(&mut Cursor::new(data)).unwrap();
        assert_eq!(offset, pos);
    }

    #[test]
    fn find_end_of_central_directory_missing() {
        let data = vec![0u8; 512];
        assert!(CentralDirectoryEnd::find_and_parse(&mut Cursor::new(data)).is_err());
    }

    #[test]
    fn split_archive_rejected() {
        let mut buf = sample_footer(b"");
        buf[4] = 1; // number of this disk
        let err = CentralDirectoryEnd::find_and_parse(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ZipError::UnsupportedArchive(_)));
    }
}
