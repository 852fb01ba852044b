//! Archive playback reader.
//!
//! [`ArchiveReader`] reads records from any `Read` source, decoding the
//! binary archive format. The header is validated on construction.

use std::io::Read;

use rewind_core::{ArchiveError, ArchivedPacket, PacketStream};

use crate::codec::{decode_header, decode_record};
use crate::error::FormatError;
use crate::types::ArchiveMetadata;

/// Reads archive records from a byte stream.
///
/// Generic over `R: Read` so tests can use `&[u8]` and production
/// code can use `BufReader<File>`.
pub struct ArchiveReader<R: Read> {
    reader: R,
    metadata: ArchiveMetadata,
    records_read: u64,
    last_timestamp: Option<u32>,
}

impl<R: Read> ArchiveReader<R> {
    /// Open an archive stream, reading and validating the header.
    pub fn open(mut reader: R) -> Result<Self, FormatError> {
        let metadata = decode_header(&mut reader)?;
        Ok(Self {
            reader,
            metadata,
            records_read: 0,
            last_timestamp: None,
        })
    }

    /// Metadata from the archive header.
    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    /// Read the next record, or `None` if the stream is exhausted.
    ///
    /// A record older than its predecessor is reported as
    /// [`FormatError::OutOfOrder`].
    pub fn next_record(&mut self) -> Result<Option<ArchivedPacket>, FormatError> {
        let Some(record) = decode_record(&mut self.reader)? else {
            return Ok(None);
        };
        if let Some(previous) = self.last_timestamp {
            if record.timestamp < previous {
                return Err(FormatError::OutOfOrder {
                    previous,
                    timestamp: record.timestamp,
                });
            }
        }
        self.last_timestamp = Some(record.timestamp);
        self.records_read += 1;
        Ok(Some(record))
    }

    /// Number of records read so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Convert into a record iterator.
    pub fn records(self) -> RecordIter<R> {
        RecordIter {
            inner: self,
            done: false,
        }
    }
}

impl<R: Read + Send> PacketStream for ArchiveReader<R> {
    fn next_packet(&mut self) -> Result<Option<ArchivedPacket>, ArchiveError> {
        Ok(self.next_record()?)
    }
}

/// Iterator adapter over archive records.
///
/// Stops after the first error.
pub struct RecordIter<R: Read> {
    inner: ArchiveReader<R>,
    done: bool,
}

impl<R: Read> Iterator for RecordIter<R> {
    type Item = Result<ArchivedPacket, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
