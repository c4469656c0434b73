//! Types for creating ZIP archives

use std::io;
use std::io::prelude::*;
use std::io::SeekFrom;
use std::mem;

use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use flate2::write::DeflateEncoder;
use time::OffsetDateTime;

use crate::compression::CompressionMethod;
use crate::read::ZipFile;
use crate::result::{ZipError, ZipResult};
use crate::spec;
use crate::types::FileHeader;

/// The writer's sink, wrapped by the active entry's compressor.
enum GenericZipWriter<W: Write + Seek> {
    Closed,
    Storer(W),
    Deflater(DeflateEncoder<W>),
}

impl<W: Write + Seek> GenericZipWriter<W> {
    /// Swaps the compressor in front of the sink.
    ///
    /// Leaving the Deflater state flushes the encoder's final block, so a
    /// switch back to Storer completes the entry's compressed stream.
    fn switch_to(&mut self, method: CompressionMethod) -> ZipResult<()> {
        let bare = match mem::replace(self, GenericZipWriter::Closed) {
            GenericZipWriter::Storer(w) => w,
            GenericZipWriter::Deflater(w) => w.finish()?,
            GenericZipWriter::Closed => {
                return Err(ZipError::InvalidOperation(
                    "archive has already been closed",
                ))
            }
        };

        *self = match method {
            CompressionMethod::Stored => GenericZipWriter::Storer(bare),
            CompressionMethod::Deflated(level) => {
                GenericZipWriter::Deflater(DeflateEncoder::new(bare, level.to_flate2()))
            }
        };
        Ok(())
    }

    fn ref_mut(&mut self) -> Option<&mut dyn Write> {
        match self {
            GenericZipWriter::Storer(w) => Some(w as &mut dyn Write),
            GenericZipWriter::Deflater(w) => Some(w as &mut dyn Write),
            GenericZipWriter::Closed => None,
        }
    }

    fn is_closed(&self) -> bool {
        matches!(self, GenericZipWriter::Closed)
    }

    fn get_plain(&mut self) -> &mut W {
        match self {
            GenericZipWriter::Storer(w) => w,
            _ => panic!("should have switched to stored beforehand"),
        }
    }

    fn unwrap(self) -> W {
        match self {
            GenericZipWriter::Storer(w) => w,
            _ => panic!("should have switched to stored beforehand"),
        }
    }
}

/// A central directory slot being accumulated for the final directory.
struct PendingEntry {
    header: FileHeader,
    header_offset: u32,
}

/// Bookkeeping for the entry currently open for writing.
struct EntryState {
    /// The local header has been written and the compressor is active.
    started: bool,
    /// Sink position just past the local header.
    data_start: u64,
    uncompressed_size: u64,
    hasher: Hasher,
}

impl EntryState {
    fn new() -> EntryState {
        EntryState {
            started: false,
            data_start: 0,
            uncompressed_size: 0,
            hasher: Hasher::new(),
        }
    }
}

/// ZIP archive generator
///
/// Entries are emitted strictly in creation order; opening a new entry
/// while the previous one is still open closes the previous one first.
///
/// ```
/// # fn doit() -> flatzip::ZipResult<()>
/// # {
/// use std::io::Write;
///
/// // We use a buffer here, though you'd normally use a `File`
/// let mut zip = flatzip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
///
/// let mut file = zip.create("hello_world.txt")?;
/// file.write_all(b"Hello, World!")?;
/// file.close()?;
///
/// zip.finish()?;
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct ZipWriter<W: Write + Seek> {
    inner: GenericZipWriter<W>,
    files: Vec<PendingEntry>,
    current: Option<EntryState>,
    comment: Vec<u8>,
}

impl<W: Write + Seek> ZipWriter<W> {
    /// Initializes the archive.
    pub fn new(inner: W) -> ZipWriter<W> {
        ZipWriter {
            inner: GenericZipWriter::Storer(inner),
            files: Vec::new(),
            current: None,
            comment: Vec::new(),
        }
    }

    /// Set ZIP archive comment.
    pub fn set_comment<S>(&mut self, comment: S)
    where
        S: Into<String>,
    {
        self.set_raw_comment(comment.into().into())
    }

    /// Set ZIP archive comment from raw bytes.
    pub fn set_raw_comment(&mut self, comment: Vec<u8>) {
        self.comment = comment;
    }

    /// Opens a new entry with default settings: DEFLATE at the default
    /// level and the current wall-clock time as modification time.
    ///
    /// Names ending in '/' create directory entries, which are always
    /// stored. A still-open previous entry is closed first.
    pub fn create(&mut self, name: &str) -> ZipResult<FileWriter<'_, W>> {
        let mut header = FileHeader::new(name);
        header.modified_time = Some(OffsetDateTime::now_utc());
        self.create_from_header(header)
    }

    /// Opens a new entry configured by a caller-supplied header.
    ///
    /// The header's crc and sizes are ignored; they are computed while the
    /// entry data is written.
    pub fn create_from_header(&mut self, mut header: FileHeader) -> ZipResult<FileWriter<'_, W>> {
        self.close_current_entry()?;
        if self.inner.is_closed() {
            return Err(ZipError::InvalidOperation(
                "archive has already been closed",
            ));
        }
        validate_name(&header.file_name)?;
        if header.is_dir() {
            // directories only allow the store method
            header.method = CompressionMethod::Stored;
        }
        header.crc32 = 0;
        header.compressed_size = 0;
        header.uncompressed_size = 0;

        let header_offset = self.inner.get_plain().stream_position()?;
        if header_offset > u32::MAX as u64 {
            return Err(ZipError::UnsupportedArchive(
                "archive exceeds 4 GiB and zip64 is not supported",
            ));
        }

        self.files.push(PendingEntry {
            header,
            header_offset: header_offset as u32,
        });
        self.current = Some(EntryState::new());

        Ok(FileWriter { writer: self })
    }

    /// Copies a file out of some [`crate::ZipArchive`] into this archive
    /// without recompressing it.
    pub fn copy<R: Read + Seek>(&mut self, file: ZipFile<'_, R>) -> ZipResult<()> {
        let header = file.header().clone();
        let mut raw = file.open_raw()?;
        self.copy_from_reader(header, &mut raw)
    }

    /// Adds an entry from a fully populated header and a stream of its raw
    /// compressed data.
    ///
    /// The header's crc and sizes are trusted as-is. If the header requests
    /// a data descriptor, one is emitted after the data.
    pub fn copy_from_reader<S: Read>(&mut self, header: FileHeader, source: &mut S) -> ZipResult<()> {
        self.close_current_entry()?;
        if self.inner.is_closed() {
            return Err(ZipError::InvalidOperation(
                "archive has already been closed",
            ));
        }

        let writer = self.inner.get_plain();
        let header_offset = writer.stream_position()?;
        if header_offset > u32::MAX as u64 {
            return Err(ZipError::UnsupportedArchive(
                "archive exceeds 4 GiB and zip64 is not supported",
            ));
        }

        spec::LocalFileHeader::from_header(&header).write(writer)?;
        io::copy(source, writer)?;
        if header.flags.data_descriptor {
            let descriptor = spec::DataDescriptor {
                crc32: header.crc32,
                compressed_size: header.compressed_size,
                uncompressed_size: header.uncompressed_size,
            };
            descriptor.write(writer)?;
        }

        self.files.push(PendingEntry {
            header,
            header_offset: header_offset as u32,
        });
        Ok(())
    }

    /// Finish the last entry and write the central directory and the end of
    /// central directory record, returning the sink.
    ///
    /// Note that the archive is also finished on drop, silently discarding
    /// any error.
    pub fn finish(&mut self) -> ZipResult<W> {
        self.finalize()?;
        let inner = mem::replace(&mut self.inner, GenericZipWriter::Closed);
        Ok(inner.unwrap())
    }

    fn finalize(&mut self) -> ZipResult<()> {
        self.close_current_entry()?;
        if self.inner.is_closed() {
            return Err(ZipError::InvalidOperation(
                "archive has already been closed",
            ));
        }
        if self.files.len() > u16::MAX as usize {
            return Err(ZipError::UnsupportedArchive(
                "too many entries and zip64 is not supported",
            ));
        }
        if self.comment.len() > u16::MAX as usize {
            return Err(ZipError::InvalidOperation(
                "archive comment may not exceed 65535 bytes",
            ));
        }

        let mut directory_headers = Vec::with_capacity(self.files.len());
        for entry in &self.files {
            directory_headers.push(spec::CentralDirectoryHeader::from_header(
                &entry.header,
                entry.header_offset,
            )?);
        }

        let writer = self.inner.get_plain();
        let central_start = writer.stream_position()?;
        for header in &directory_headers {
            header.write(writer)?;
        }
        let central_end = writer.stream_position()?;
        if central_end > u32::MAX as u64 {
            return Err(ZipError::UnsupportedArchive(
                "archive exceeds 4 GiB and zip64 is not supported",
            ));
        }

        let footer = spec::CentralDirectoryEnd {
            disk_number: 0,
            disk_with_central_directory: 0,
            number_of_files_on_this_disk: self.files.len() as u16,
            number_of_files: self.files.len() as u16,
            central_directory_size: (central_end - central_start) as u32,
            central_directory_offset: central_start as u32,
            zip_file_comment: self.comment.clone(),
        };
        footer.write(writer)?;

        Ok(())
    }

    fn close_current_entry(&mut self) -> ZipResult<()> {
        if self.current.is_some() {
            self.close_entry()?;
        }
        Ok(())
    }

    /// Writes the provisional local header and stacks the compressor over
    /// the sink. Runs on the entry's first write, or on close for entries
    /// without data.
    fn start_entry_data(&mut self) -> ZipResult<()> {
        let entry = self.files.last().unwrap();
        let method = entry.header.method;

        let writer = self.inner.get_plain();
        spec::LocalFileHeader::from_header(&entry.header).write(writer)?;
        let data_start = writer.stream_position()?;
        self.inner.switch_to(method)?;

        let state = self.current.as_mut().unwrap();
        state.started = true;
        state.data_start = data_start;
        Ok(())
    }

    fn write_entry_data(&mut self, buf: &[u8]) -> io::Result<usize> {
        let started = match self.current.as_ref() {
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "file entry is already closed",
                ))
            }
            Some(state) => state.started,
        };
        if !started {
            self.start_entry_data()?;
        }

        let writer = self.inner.ref_mut().expect("entry data was started");
        let count = writer.write(buf)?;

        let state = self.current.as_mut().unwrap();
        state.hasher.update(&buf[..count]);
        state.uncompressed_size += count as u64;
        Ok(count)
    }

    fn close_entry(&mut self) -> ZipResult<()> {
        let started = match self.current.as_ref() {
            None => {
                return Err(ZipError::InvalidOperation("file entry is already closed"))
            }
            Some(state) => state.started,
        };
        if !started {
            self.start_entry_data()?;
        }
        // leaving the compressor state flushes the final DEFLATE block
        self.inner.switch_to(CompressionMethod::Stored)?;

        let state = self.current.take().unwrap();
        let entry = self.files.last_mut().unwrap();
        let writer = self.inner.get_plain();

        let data_end = writer.stream_position()?;
        let compressed_size = data_end - state.data_start;
        if compressed_size > u32::MAX as u64 || state.uncompressed_size > u32::MAX as u64 {
            return Err(ZipError::UnsupportedArchive(
                "entry exceeds 4 GiB and zip64 is not supported",
            ));
        }

        entry.header.crc32 = state.hasher.finalize();
        entry.header.compressed_size = compressed_size as u32;
        entry.header.uncompressed_size = state.uncompressed_size as u32;

        if entry.header.flags.data_descriptor {
            let descriptor = spec::DataDescriptor {
                crc32: entry.header.crc32,
                compressed_size: entry.header.compressed_size,
                uncompressed_size: entry.header.uncompressed_size,
            };
            descriptor.write(writer)?;
        } else {
            writer.seek(SeekFrom::Start(
                entry.header_offset as u64 + spec::LOCAL_HEADER_CRC32_OFFSET,
            ))?;
            writer.write_u32::<LittleEndian>(entry.header.crc32)?;
            writer.write_u32::<LittleEndian>(entry.header.compressed_size)?;
            writer.write_u32::<LittleEndian>(entry.header.uncompressed_size)?;
            writer.seek(SeekFrom::Start(data_end))?;
        }
        Ok(())
    }
}

impl<W: Write + Seek> Drop for ZipWriter<W> {
    fn drop(&mut self) {
        if !self.inner.is_closed() {
            let _ = self.finalize();
        }
    }
}

/// Handle for the entry currently open in a [`ZipWriter`].
///
/// Entry settings may be adjusted until the first byte of data is written;
/// the local header is emitted at that point. [`FileWriter::close`]
/// finalizes crc and sizes. An unclosed handle is closed implicitly when
/// the next entry is created or the archive is finished.
pub struct FileWriter<'a, W: Write + Seek> {
    writer: &'a mut ZipWriter<W>,
}

impl<'a, W: Write + Seek> FileWriter<'a, W> {
    /// Returns the file name.
    pub fn name(&self) -> &str {
        &self.writer.files.last().unwrap().header.file_name
    }

    /// Set the compression method.
    ///
    /// Fails once data has been written, and for directory entries with any
    /// method other than store.
    pub fn set_method(&mut self, method: CompressionMethod) -> ZipResult<()> {
        let header = self.pending_header_mut()?;
        if header.is_dir() && method != CompressionMethod::Stored {
            return Err(ZipError::InvalidOperation(
                "directory entries only support the store method",
            ));
        }
        header.method = method;
        Ok(())
    }

    /// Record crc and sizes in a trailing data descriptor instead of
    /// rewriting the local header in place.
    pub fn set_data_descriptor(&mut self, enabled: bool) -> ZipResult<()> {
        self.pending_header_mut()?.flags.data_descriptor = enabled;
        Ok(())
    }

    /// Set the last modification time; `None` writes no timestamp.
    pub fn set_modified_time(&mut self, modified_time: Option<OffsetDateTime>) -> ZipResult<()> {
        self.pending_header_mut()?.modified_time = modified_time;
        Ok(())
    }

    /// Set the entry comment.
    pub fn set_comment<S: Into<String>>(&mut self, comment: S) -> ZipResult<()> {
        self.pending_header_mut()?.comment = comment.into();
        Ok(())
    }

    /// Finishes the entry.
    ///
    /// Flushes the compressor and fills crc and sizes into the central
    /// directory slot; depending on the data descriptor flag the values are
    /// appended after the data or patched into the local header.
    pub fn close(&mut self) -> ZipResult<()> {
        self.writer.close_entry()
    }

    fn pending_header_mut(&mut self) -> ZipResult<&mut FileHeader> {
        match self.writer.current.as_ref() {
            None => {
                return Err(ZipError::InvalidOperation("file entry is already closed"))
            }
            Some(state) if state.started => {
                return Err(ZipError::InvalidOperation(
                    "file data has already been written",
                ))
            }
            Some(_) => {}
        }
        Ok(&mut self.writer.files.last_mut().unwrap().header)
    }
}

impl<W: Write + Seek> Write for FileWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write_entry_data(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.inner.ref_mut() {
            Some(w) => w.flush(),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "archive has already been closed",
            )),
        }
    }
}

/// Checks an entry name: non-empty after stripping one trailing '/',
/// relative, forward slashes only, free of NUL and of '.'/'..' segments.
fn validate_name(name: &str) -> ZipResult<()> {
    let invalid = || ZipError::InvalidName(name.to_string());

    if name.contains('\\') || name.contains('\0') {
        return Err(invalid());
    }
    if name.starts_with('/') {
        return Err(invalid());
    }
    let stripped = name.strip_suffix('/').unwrap_or(name);
    if stripped.is_empty() {
        return Err(invalid());
    }
    if stripped
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Write};

    use crate::compression::CompressionMethod;
    use crate::result::ZipError;

    use super::{validate_name, ZipWriter};

    #[test]
    fn name_validation() {
        for name in ["", "/", "/abs", "a/../b", "a\\b", "a\0b", "a//b", "./a", "a/.", ".."] {
            assert!(validate_name(name).is_err(), "{name:?} should be rejected");
        }
        for name in ["test.txt", "a/b", "dir/", "a/b/c.bin", "☃.txt"] {
            assert!(validate_name(name).is_ok(), "{name:?} should be accepted");
        }
    }

    #[test]
    fn directory_entries_are_stored() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut dir = zip.create("dir/").unwrap();
        assert!(matches!(
            dir.set_method(CompressionMethod::default()),
            Err(ZipError::InvalidOperation(_))
        ));
        dir.set_method(CompressionMethod::Stored).unwrap();
        dir.close().unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn double_close_fails() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut file = zip.create("test.txt").unwrap();
        file.write_all(b"data").unwrap();
        file.close().unwrap();
        assert!(matches!(
            file.close(),
            Err(ZipError::InvalidOperation("file entry is already closed"))
        ));
    }

    #[test]
    fn write_after_close_fails() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut file = zip.create("test.txt").unwrap();
        file.close().unwrap();
        assert!(file.write(b"data").is_err());
    }

    #[test]
    fn settings_frozen_once_data_written() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut file = zip.create("test.txt").unwrap();
        file.set_comment("early").unwrap();
        file.write_all(b"data").unwrap();
        assert!(file.set_comment("late").is_err());
        assert!(file.set_data_descriptor(true).is_err());
    }

    #[test]
    fn create_after_finish_fails() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.finish().unwrap();
        assert!(matches!(
            zip.create("test.txt"),
            Err(ZipError::InvalidOperation(_))
        ));
    }
}
