//! File-backed [`Archive`] implementation.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::{debug, trace};
use rewind_core::{Archive, ArchiveError, PacketStream};

use crate::error::FormatError;
use crate::reader::ArchiveReader;
use crate::types::ArchiveMetadata;
use crate::writer::ArchiveWriter;

/// An archive stored in a single file.
///
/// The header is validated once in [`FileArchive::open`]. Every call to
/// [`Archive::open_packets`] opens the file again, so rewinding is a
/// fresh sequential read from the first record.
#[derive(Debug)]
pub struct FileArchive {
    path: PathBuf,
    label: String,
    metadata: ArchiveMetadata,
}

impl FileArchive {
    /// Open the archive at `path` and validate its header.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FormatError> {
        let path = path.into();
        let reader = ArchiveReader::open(BufReader::new(File::open(&path)?))?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("opened archive {} ({})", label, path.display());
        Ok(Self {
            metadata: reader.metadata().clone(),
            path,
            label,
        })
    }

    /// Create a new archive file at `path` and return a writer for it.
    ///
    /// An existing file is truncated.
    pub fn create(
        path: impl AsRef<Path>,
        metadata: &ArchiveMetadata,
    ) -> Result<ArchiveWriter<BufWriter<File>>, FormatError> {
        ArchiveWriter::new(BufWriter::new(File::create(path)?), metadata)
    }

    /// Location of the archive on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metadata from the archive header.
    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }
}

impl Archive for FileArchive {
    fn label(&self) -> &str {
        &self.label
    }

    fn open_packets(&mut self) -> Result<Box<dyn PacketStream>, ArchiveError> {
        trace!("opening packet stream for {}", self.label);
        let file = File::open(&self.path)?;
        let reader = ArchiveReader::open(BufReader::new(file))?;
        Ok(Box::new(reader))
    }

    fn close(self: Box<Self>) -> Result<(), ArchiveError> {
        debug!("closed archive {}", self.label);
        Ok(())
    }
}
