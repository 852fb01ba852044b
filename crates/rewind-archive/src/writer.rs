//! Archive recording writer.
//!
//! [`ArchiveWriter`] streams records to any `Write` sink, encoding the
//! binary archive format. The header is written immediately on construction.

use std::io::Write;

use rewind_core::{ArchivedPacket, ReplayMillis, ServerPacket};

use crate::codec::{encode_header, encode_record};
use crate::error::FormatError;
use crate::types::ArchiveMetadata;

/// Writes archive records to a byte stream.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and production
/// code can use `BufWriter<File>`.
///
/// # Examples
///
/// ```
/// use rewind_archive::{ArchiveMetadata, ArchiveReader, ArchiveWriter};
/// use rewind_core::{MessageKind, ServerPacket};
///
/// let meta = ArchiveMetadata::default();
/// let chat = ServerPacket::Chat { text: "hi".into(), kind: MessageKind::Chat };
///
/// let mut writer = ArchiveWriter::new(Vec::new(), &meta).unwrap();
/// writer.write(0, &chat).unwrap();
/// writer.write(250, &chat).unwrap();
/// assert_eq!(writer.records_written(), 2);
/// let buf = writer.into_inner();
///
/// let mut reader = ArchiveReader::open(buf.as_slice()).unwrap();
/// assert_eq!(reader.next_record().unwrap().unwrap().timestamp, 0);
/// assert_eq!(reader.next_record().unwrap().unwrap().timestamp, 250);
/// assert!(reader.next_record().unwrap().is_none());
/// ```
pub struct ArchiveWriter<W: Write> {
    writer: W,
    records_written: u64,
    last_timestamp: Option<ReplayMillis>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Create a new archive writer, immediately writing the header.
    pub fn new(mut writer: W, metadata: &ArchiveMetadata) -> Result<Self, FormatError> {
        encode_header(&mut writer, metadata)?;
        Ok(Self {
            writer,
            records_written: 0,
            last_timestamp: None,
        })
    }

    /// Append a packet recorded at `timestamp`.
    ///
    /// Timestamps must be non-decreasing; an earlier timestamp is refused
    /// with [`FormatError::OutOfOrder`] and nothing is written.
    pub fn write(
        &mut self,
        timestamp: ReplayMillis,
        packet: &ServerPacket,
    ) -> Result<(), FormatError> {
        if let Some(previous) = self.last_timestamp {
            if timestamp < previous {
                return Err(FormatError::OutOfOrder {
                    previous,
                    timestamp,
                });
            }
        }
        encode_record(
            &mut self.writer,
            &ArchivedPacket::new(timestamp, packet.clone()),
        )?;
        self.last_timestamp = Some(timestamp);
        self.records_written += 1;
        Ok(())
    }

    /// Append a pre-built record.
    pub fn write_record(&mut self, record: &ArchivedPacket) -> Result<(), FormatError> {
        self.write(record.timestamp, &record.packet)
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), FormatError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Timestamp of the most recent record, if any.
    pub fn last_timestamp(&self) -> Option<ReplayMillis> {
        self.last_timestamp
    }

    /// Consume the writer and return the underlying `Write` sink.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
