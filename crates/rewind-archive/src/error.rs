//! Error types for the archive format.

use std::io;

use rewind_core::ArchiveError;
use thiserror::Error;

/// Errors that can occur while encoding or decoding an archive.
#[derive(Debug, Error)]
pub enum FormatError {
    /// An I/O error occurred during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The data does not start with the expected `b"RWND"` magic bytes.
    #[error("invalid magic bytes (expected b\"RWND\")")]
    InvalidMagic,
    /// The format version is not supported by this build.
    #[error("unsupported format version {found}")]
    UnsupportedVersion {
        /// The version found in the header.
        found: u8,
    },
    /// A record could not be decoded (truncated or corrupt data).
    #[error("malformed record: {detail}")]
    MalformedRecord {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// An enumeration field carries a tag this build does not know.
    #[error("unknown {field} tag {tag}")]
    UnknownTag {
        /// Which field was being decoded.
        field: &'static str,
        /// The unrecognized tag.
        tag: u8,
    },
    /// A record was written with a timestamp earlier than its predecessor.
    #[error("record timestamp {timestamp} precedes previous timestamp {previous}")]
    OutOfOrder {
        /// Timestamp of the previous record.
        previous: u32,
        /// Offending timestamp.
        timestamp: u32,
    },
}

impl FormatError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedRecord {
            detail: detail.into(),
        }
    }
}

impl From<FormatError> for ArchiveError {
    /// Truncation shows up as `UnexpectedEof` from `read_exact`; that is a
    /// content problem, not a storage one, so it maps to `Corrupt`.
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::Io(io) if io.kind() != io::ErrorKind::UnexpectedEof => {
                ArchiveError::Io(io)
            }
            other => ArchiveError::Corrupt {
                detail: other.to_string(),
            },
        }
    }
}
