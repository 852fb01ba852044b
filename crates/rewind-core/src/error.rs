//! Error types shared across the rewind workspace.
//!
//! Subsystem-specific errors (archive format, playback, resolution)
//! live in their own crates and convert into these at the trait seams.

use std::io;

use thiserror::Error;

/// Errors from an [`Archive`](crate::traits::Archive) or the
/// [`PacketStream`](crate::traits::PacketStream) it produces.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The underlying storage failed.
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),
    /// The archive content could not be decoded.
    #[error("archive corrupt: {detail}")]
    Corrupt {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The archive was used after it was closed.
    #[error("archive already closed")]
    Closed,
}

impl ArchiveError {
    /// Shorthand for [`ArchiveError::Corrupt`].
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }
}

/// The outbound path of a connection is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("outbound channel closed")]
pub struct SendError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert() {
        let err: ArchiveError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, ArchiveError::Io(_)));
        assert!(err.to_string().starts_with("archive I/O error"));
    }

    #[test]
    fn corrupt_display() {
        let err = ArchiveError::corrupt("bad header");
        assert_eq!(err.to_string(), "archive corrupt: bad header");
    }
}
