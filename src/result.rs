//! Error types that can be emitted from this library

use std::error::Error;
use std::fmt;
use std::io;

/// Generic result type with ZipError as its error variant
pub type ZipResult<T> = Result<T, ZipError>;

/// Error type for Zip
#[derive(Debug)]
pub enum ZipError {
    /// An Error caused by I/O
    Io(io::Error),

    /// This file is probably not a zipfile. The argument is enclosed.
    InvalidArchive(&'static str),

    /// This archive is not supported. The reason is enclosed.
    UnsupportedArchive(&'static str),

    /// The central directory and the local file header disagree for the
    /// named entry.
    BrokenEntry(String),

    /// The requested entry name is not acceptable.
    InvalidName(String),

    /// The operation is not valid in the writer's or entry's current state.
    InvalidOperation(&'static str),

    /// The requested file could not be found in the archive
    FileNotFound,
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> ZipError {
        ZipError::Io(err)
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> io::Error {
        io::Error::new(io::ErrorKind::Other, err)
    }
}

impl fmt::Display for ZipError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ZipError::Io(err) => write!(fmt, "{err}"),
            ZipError::InvalidArchive(err) => write!(fmt, "invalid Zip archive: {err}"),
            ZipError::UnsupportedArchive(err) => write!(fmt, "unsupported Zip archive: {err}"),
            ZipError::BrokenEntry(name) => {
                write!(fmt, "broken zip: file name is different {name:?}")
            }
            ZipError::InvalidName(name) => write!(fmt, "file name is invalid: {name:?}"),
            ZipError::InvalidOperation(err) => write!(fmt, "{err}"),
            ZipError::FileNotFound => write!(fmt, "specified file not found in archive"),
        }
    }
}

impl Error for ZipError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ZipError::Io(err) => Some(err),
            _ => None,
        }
    }
}
