//! Error types shared by every stage of a collision run.

use std::fmt;
use std::path::PathBuf;

use crate::oracle::OracleError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Structural assumption violations raised while laying out a format.
///
/// These point at a template or input problem, never a transient fault, so
/// nothing in the crate retries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The blocks do not first differ at the offset the template steers on
    DiscriminatorMismatch {
        expected: usize,
        found: Option<usize>,
    },
    /// The oracle did not keep the chosen head bytes of the first block
    HeadCorrupted { offset: usize },
    /// The differing byte values cannot drive this format's branch
    UnusableDiscriminator { a: u8, b: u8, reason: String },
    /// A COM/FEXTRA skip would need more than 65535 bytes
    SkipOverflow { span: usize },
    /// A JPEG segment or scan does not fit in a single skip
    SegmentTooLarge { offset: usize, len: usize },
    /// Collision blocks do not fit in the reserved payload
    PayloadOverflow { needed: usize, available: usize },
    /// `prefix ‖ block` lengths differ between the two files
    LengthMismatch { a: usize, b: usize },
    /// An xref entry does not point at its object
    XrefMismatch { object: u32, offset: usize },
    /// Input is not a well-formed instance of the format
    Malformed(String),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::DiscriminatorMismatch { expected, found } => match found {
                Some(found) => write!(
                    f,
                    "blocks first differ at byte {} but the template steers on byte {}",
                    found, expected
                ),
                None => write!(f, "blocks are identical, expected a difference at byte {}", expected),
            },
            FormatError::HeadCorrupted { offset } => {
                write!(f, "collision block does not preserve chosen head byte {}", offset)
            }
            FormatError::UnusableDiscriminator { a, b, reason } => {
                write!(f, "discriminator 0x{:02x}/0x{:02x} unusable: {}", a, b, reason)
            }
            FormatError::SkipOverflow { span } => {
                write!(f, "skip of {} bytes exceeds the 16-bit length field", span)
            }
            FormatError::SegmentTooLarge { offset, len } => {
                write!(f, "segment at offset {} is {} bytes, too large to hop over", offset, len)
            }
            FormatError::PayloadOverflow { needed, available } => {
                write!(f, "payload needs {} bytes but only {} are reserved", needed, available)
            }
            FormatError::LengthMismatch { a, b } => {
                write!(f, "prefix and block lengths differ: {} vs {}", a, b)
            }
            FormatError::XrefMismatch { object, offset } => {
                write!(f, "xref entry for object {} points at offset {} which is not its header", object, offset)
            }
            FormatError::Malformed(msg) => write!(f, "malformed input: {}", msg),
        }
    }
}

impl std::error::Error for FormatError {}

/// Error types for collision runs
#[derive(Debug)]
pub enum Error {
    /// Prefix is too long for the format's header budget
    InvalidPrefix { len: usize, max: usize },
    /// JPEG input is not progressive
    UnsupportedJpegEncoding(String),
    /// Collision oracle failure
    Oracle(OracleError),
    /// Format layout failure
    Format(FormatError),
    /// Destination exists and overwrite was not requested
    OutputConflict(PathBuf),
    /// Filesystem error
    Io(std::io::Error),
    /// PDF load or parse error
    Pdf(lopdf::Error),
    /// Image decode error
    Image(image::ImageError),
    /// Manifest (de)serialization error
    Manifest(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPrefix { len, max } => {
                write!(f, "prefix of {} bytes exceeds the format maximum of {}", len, max)
            }
            Error::UnsupportedJpegEncoding(msg) => write!(f, "unsupported JPEG encoding: {}", msg),
            Error::Oracle(e) => write!(f, "oracle error: {}", e),
            Error::Format(e) => write!(f, "format error: {}", e),
            Error::OutputConflict(path) => write!(f, "output already exists: {}", path.display()),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Pdf(e) => write!(f, "PDF error: {}", e),
            Error::Image(e) => write!(f, "image error: {}", e),
            Error::Manifest(e) => write!(f, "manifest error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Oracle(e) => Some(e),
            Error::Format(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Pdf(e) => Some(e),
            Error::Image(e) => Some(e),
            Error::Manifest(e) => Some(e),
            _ => None,
        }
    }
}

impl From<OracleError> for Error {
    fn from(err: OracleError) -> Self {
        Error::Oracle(err)
    }
}

impl From<FormatError> for Error {
    fn from(err: FormatError) -> Self {
        Error::Format(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::Pdf(err)
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Manifest(err)
    }
}
