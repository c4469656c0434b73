//! Types for reading ZIP archives

use std::io;
use std::io::prelude::*;
use std::path::{Component, Path, PathBuf};

use flate2::read::DeflateDecoder;
use time::OffsetDateTime;

use crate::compression::CompressionMethod;
use crate::crc32::Crc32Reader;
use crate::result::{ZipError, ZipResult};
use crate::spec;
use crate::spec::DataDescriptor;
use crate::types::FileHeader;

/// ZIP archive reader
///
/// ```no_run
/// use std::io::prelude::*;
/// fn list_zip_contents(reader: impl Read + Seek) -> flatzip::ZipResult<()> {
///     let mut zip = flatzip::ZipArchive::new(reader)?;
///
///     for i in 0..zip.len() {
///         let file = zip.by_index(i)?;
///         println!("Filename: {}", file.name());
///         let mut contents = Vec::new();
///         file.open()?.read_to_end(&mut contents)?;
///     }
///
///     Ok(())
/// }
/// ```
pub struct ZipArchive<R> {
    reader: R,
    files: Vec<ZipEntry>,
    comment: Vec<u8>,
}

struct ZipEntry {
    header: FileHeader,
    header_offset: u32,
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Read a ZIP archive, collecting the files it contains.
    ///
    /// Metadata comes from the central directory; local file headers are
    /// only consulted when an entry is opened.
    pub fn new(mut reader: R) -> ZipResult<ZipArchive<R>> {
        let (footer, _) = spec::CentralDirectoryEnd::find_and_parse(&mut reader)?;

        reader.seek(io::SeekFrom::Start(footer.central_directory_offset as u64))?;

        let mut files = Vec::with_capacity(footer.number_of_files as usize);
        for _ in 0..footer.number_of_files {
            let directory_header = spec::CentralDirectoryHeader::parse(&mut reader)?;
            files.push(ZipEntry {
                header_offset: directory_header.local_header_offset,
                header: directory_header.into_header()?,
            });
        }

        Ok(ZipArchive {
            reader,
            files,
            comment: footer.zip_file_comment,
        })
    }

    /// Get a handle for the file at the given central directory index.
    pub fn by_index(&mut self, index: usize) -> ZipResult<ZipFile<'_, R>> {
        let entry = self.files.get(index).ok_or(ZipError::FileNotFound)?;
        Ok(ZipFile {
            entry,
            reader: &mut self.reader,
        })
    }

    /// Search for a file entry by name.
    pub fn by_name(&mut self, name: &str) -> ZipResult<ZipFile<'_, R>> {
        let index = self
            .files
            .iter()
            .position(|entry| entry.header.file_name == name)
            .ok_or(ZipError::FileNotFound)?;
        self.by_index(index)
    }

    /// Number of files contained in this zip.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether this zip archive contains no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Get the comment of the zip archive.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Returns an iterator over all the file and directory names in this
    /// archive, in central directory order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|entry| entry.header.file_name.as_str())
    }

    /// Returns an iterator over the entry headers, in central directory
    /// order.
    pub fn headers(&self) -> impl Iterator<Item = &FileHeader> {
        self.files.iter().map(|entry| &entry.header)
    }

    /// Extract the archive into a directory, overwriting files if they
    /// already exist. Paths are sanitized with [`ZipFile::enclosed_name`].
    ///
    /// Extraction is not atomic; if an error is encountered, some of the
    /// files may be left on disk.
    pub fn extract<P: AsRef<Path>>(&mut self, directory: P) -> ZipResult<()> {
        use std::fs;

        for index in 0..self.len() {
            let file = self.by_index(index)?;
            let filepath = file
                .enclosed_name()
                .ok_or(ZipError::InvalidArchive("invalid file path"))?;
            let outpath = directory.as_ref().join(filepath);

            if file.is_dir() {
                fs::create_dir_all(&outpath)?;
                continue;
            }
            if let Some(parent) = outpath.parent() {
                if !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
            }

            #[cfg(unix)]
            let mode = file.header().unix_mode();
            let mut outfile = fs::File::create(&outpath)?;
            io::copy(&mut file.open()?, &mut outfile)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = mode {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
                }
            }
        }
        Ok(())
    }

    /// Unwrap and return the inner reader object.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// A single file entry inside a [`ZipArchive`].
///
/// The handle borrows the archive's reader; opening the entry seeks it, so
/// only one entry can be open at a time.
pub struct ZipFile<'a, R> {
    entry: &'a ZipEntry,
    reader: &'a mut R,
}

impl<'a, R: Read + Seek> ZipFile<'a, R> {
    /// The full entry descriptor from the central directory.
    pub fn header(&self) -> &FileHeader {
        &self.entry.header
    }

    /// Get the name of the file.
    pub fn name(&self) -> &str {
        &self.entry.header.file_name
    }

    /// Whether the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.entry.header.is_dir()
    }

    /// Get the size of the file when uncompressed.
    pub fn size(&self) -> u32 {
        self.entry.header.uncompressed_size
    }

    /// Get the size of the file in the archive.
    pub fn compressed_size(&self) -> u32 {
        self.entry.header.compressed_size
    }

    /// Get the CRC32 hash of the original file.
    pub fn crc32(&self) -> u32 {
        self.entry.header.crc32
    }

    /// Get the comment of the file.
    pub fn comment(&self) -> &str {
        &self.entry.header.comment
    }

    /// Get the time the file was last modified, if the archive recorded one.
    pub fn last_modified(&self) -> Option<OffsetDateTime> {
        self.entry.header.modified_time
    }

    /// The entry name as a safe relative path.
    ///
    /// Returns `None` for names with a root or prefix component, embedded
    /// NUL bytes, or `..` components that would escape the extraction
    /// directory.
    pub fn enclosed_name(&self) -> Option<PathBuf> {
        let name = self.name();
        if name.contains('\0') {
            return None;
        }
        let path = Path::new(name);
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => return None,
                Component::ParentDir => depth = depth.checked_sub(1)?,
                Component::Normal(_) => depth += 1,
                Component::CurDir => (),
            }
        }
        Some(path.to_path_buf())
    }

    /// Opens the raw compressed contents.
    ///
    /// Seeks to the entry's local file header, cross-checks its file name
    /// against the central directory, and returns a reader delivering
    /// exactly `compressed_size` bytes.
    pub fn open_raw(self) -> ZipResult<Limiter<&'a mut R>> {
        self.reader
            .seek(io::SeekFrom::Start(self.entry.header_offset as u64))?;
        let local_header = spec::LocalFileHeader::parse(&mut *self.reader)?;
        if local_header.file_name != self.entry.header.file_name.as_bytes() {
            return Err(ZipError::BrokenEntry(self.entry.header.file_name.clone()));
        }

        Ok(Limiter::take(
            self.reader,
            self.entry.header.compressed_size as u64,
        ))
    }

    /// Reads the data descriptor that trails this entry's payload.
    ///
    /// Only meaningful for entries whose data descriptor flag is set; both
    /// the 16-byte signed form and the bare 12-byte form are accepted.
    pub fn read_data_descriptor(self) -> ZipResult<DataDescriptor> {
        let compressed_size = self.entry.header.compressed_size as i64;
        let reader = self.open_raw()?.into_inner();
        reader.seek(io::SeekFrom::Current(compressed_size))?;
        DataDescriptor::parse(reader)
    }

    /// Opens the decompressed contents.
    ///
    /// The CRC-32 of the data is not verified; use [`ZipFile::open_checked`]
    /// for that.
    pub fn open(self) -> ZipResult<EntryReader<Limiter<&'a mut R>>> {
        let method = self.entry.header.method;
        Ok(make_reader(method, self.open_raw()?))
    }

    /// Opens the decompressed contents with CRC-32 verification.
    ///
    /// Reading past the end of the data fails with an "Invalid checksum"
    /// error if the decompressed bytes do not hash to the entry's crc32.
    pub fn open_checked(self) -> ZipResult<Crc32Reader<EntryReader<Limiter<&'a mut R>>>> {
        let check = self.entry.header.crc32;
        Ok(Crc32Reader::new(self.open()?, check))
    }
}

/// Reader adapter that stops after a fixed number of bytes.
pub struct Limiter<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> Limiter<R> {
    pub(crate) fn take(inner: R, limit: u64) -> Limiter<R> {
        Limiter {
            inner,
            remaining: limit,
        }
    }

    /// Consumes this limiter, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Limiter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = self.remaining.min(buf.len() as u64) as usize;
        if limit == 0 {
            return Ok(0);
        }
        let count = self.inner.read(&mut buf[..limit])?;
        self.remaining -= count as u64;
        Ok(count)
    }
}

/// Decompressing reader over an entry's raw contents.
pub enum EntryReader<R: Read> {
    /// The entry is stored without compression
    Stored(R),
    /// The entry is deflated
    Deflated(DeflateDecoder<R>),
}

impl<R: Read> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryReader::Stored(r) => r.read(buf),
            EntryReader::Deflated(r) => r.read(buf),
        }
    }
}

impl<R: Read> EntryReader<R> {
    /// Consumes this decoder, returning the underlying reader.
    pub fn into_inner(self) -> R {
        match self {
            EntryReader::Stored(r) => r,
            EntryReader::Deflated(r) => r.into_inner(),
        }
    }
}

fn make_reader<R: Read>(method: CompressionMethod, reader: R) -> EntryReader<R> {
    match method {
        CompressionMethod::Stored => EntryReader::Stored(reader),
        CompressionMethod::Deflated(_) => EntryReader::Deflated(DeflateDecoder::new(reader)),
    }
}

#[cfg(test)]
mod test {
    use std::io::Read;

    use super::Limiter;

    #[test]
    fn limiter_stops_at_limit() {
        let data: &[u8] = b"0123456789";
        let mut limiter = Limiter::take(data, 4);

        let mut buf = [0; 3];
        assert_eq!(limiter.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"012");
        assert_eq!(limiter.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'3');
        assert_eq!(limiter.read(&mut buf).unwrap(), 0);
    }
}
