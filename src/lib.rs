//! A library for reading and writing classic ZIP archives.
//!
//! Supports the PKZIP APPNOTE format with store and DEFLATE compression,
//! data descriptors, entry and archive comments, and NTFS timestamp extra
//! fields. ZIP64, encryption and split archives are out of scope.
//!
//! Reading happens through [`ZipArchive`] over any `Read + Seek` source;
//! writing through [`ZipWriter`] over any `Write + Seek` sink.

#![warn(missing_docs)]

pub use crate::compression::{CompressionLevel, CompressionMethod};
pub use crate::crc32::Crc32Reader;
pub use crate::extra_fields::{ExtraField, Ntfs, UnknownExtraField};
pub use crate::read::{EntryReader, Limiter, ZipArchive, ZipFile};
pub use crate::result::{ZipError, ZipResult};
pub use crate::spec::DataDescriptor;
pub use crate::system::System;
pub use crate::types::{FileHeader, Flags};
pub use crate::write::{FileWriter, ZipWriter};

mod compression;
mod crc32;
mod extra_fields;
mod read;
mod result;
mod spec;
mod system;
mod types;
mod write;
