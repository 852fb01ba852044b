//! Timestamped packet archive format for the rewind replay server.
//!
//! Stores a recorded session as an ordered sequence of
//! `(timestamp, packet)` records that can be streamed forward from the
//! start any number of times.
//!
//! # Architecture
//!
//! - [`ArchiveWriter`] authors archives to any `Write` sink
//! - [`ArchiveReader`] streams records from any `Read` source and
//!   implements [`PacketStream`](rewind_core::PacketStream)
//! - [`FileArchive`] implements [`Archive`](rewind_core::Archive) over a
//!   file path, opening a fresh reader for every rewind
//! - All I/O uses a custom binary codec (no serde dependency)
//!
//! # Format
//!
//! ```text
//! [MAGIC "RWND"] [VERSION u8] [ArchiveMetadata]
//! [Record 1] [Record 2] ... [Record N]
//! ```
//!
//! Each record is a `u32` millisecond timestamp followed by the
//! length-prefixed packet bytes (packet id, then the body).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod file;
pub mod reader;
pub mod types;
pub mod writer;

pub use error::FormatError;
pub use file::FileArchive;
pub use reader::{ArchiveReader, RecordIter};
pub use types::ArchiveMetadata;
pub use writer::ArchiveWriter;

/// Magic bytes at the start of every archive.
pub const MAGIC: [u8; 4] = *b"RWND";

/// Current binary format version.
pub const FORMAT_VERSION: u8 = 1;
