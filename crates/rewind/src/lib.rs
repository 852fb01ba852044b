//! Rewind: a replay server that streams recorded game sessions to spectators.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! rewind sub-crates. For most users, adding `rewind` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use rewind::prelude::*;
//! # use rewind::types::{NetworkSession, Profile, SendError, ServerPacket};
//! # struct Session;
//! # impl NetworkSession for Session {
//! #     fn send(&self, _: ServerPacket) -> Result<(), SendError> { Ok(()) }
//! #     fn disconnect(&self, _: &str) {}
//! #     fn is_connected(&self) -> bool { true }
//! #     fn profile(&self) -> Option<Profile> { None }
//! # }
//!
//! // Record a short session.
//! let dir = tempfile::tempdir().unwrap();
//! let mut writer = FileArchive::create(
//!     dir.path().join("demo.rwnd"),
//!     &ArchiveMetadata::default(),
//! ).unwrap();
//! writer.write(0, &ServerPacket::Chat {
//!     text: "hello".into(),
//!     kind: rewind::types::MessageKind::Chat,
//! }).unwrap();
//! writer.flush().unwrap();
//!
//! // Serve it.
//! let config = ServerConfig {
//!     selector: SelectorConfig::Fixed { replay_id: ReplayId::from("demo.rwnd") },
//!     database: DatabaseConfig::Directory { folder: dir.path().to_path_buf() },
//!     ..ServerConfig::default()
//! };
//! let mut server = ReplayServer::builder(config).build().unwrap();
//! let conn = server.accept(Arc::new(Session)).unwrap();
//! server.login(&conn);
//!
//! let report = server.shutdown();
//! assert_eq!(report.connections_closed, 1);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `rewind-core` | IDs, packets, errors, archive and network traits |
//! | [`archive`] | `rewind-archive` | Archive format, reader, writer, file archives |
//! | [`engine`] | `rewind-engine` | Playback, workers, replay resolution, server |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`rewind-core`).
///
/// Implement [`types::NetworkSession`] to connect the server to a
/// transport, and [`types::Archive`] to serve recordings from storage
/// other than files.
pub use rewind_core as types;

/// Archive format (`rewind-archive`).
///
/// Author recordings with [`archive::ArchiveWriter`] and serve them with
/// [`archive::FileArchive`].
pub use rewind_archive as archive;

/// Playback engine and server (`rewind-engine`).
///
/// [`engine::ReplayServer`] is the entry point; [`engine::PlaybackSession`]
/// can also be driven directly.
pub use rewind_engine as engine;

/// Common imports for typical rewind usage.
///
/// ```rust
/// use rewind::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use rewind_core::{
        ArchivedPacket, ClientPacket, ConnectionId, Profile, ReplayId, ReplayMillis,
        ServerPacket,
    };

    // Traits
    pub use rewind_core::{Archive, Clock, NetworkSession, PacketStream};

    // Archive
    pub use rewind_archive::{ArchiveMetadata, ArchiveReader, ArchiveWriter, FileArchive};

    // Engine
    pub use rewind_engine::{
        ConnectionHandle, DatabaseConfig, PacketHandler, PlaybackSession, ReplayDatabase,
        ReplaySelector, ReplayServer, SelectionReply, SelectorConfig, ServerConfig, User,
        UserContext,
    };

    // Errors
    pub use rewind_engine::{HandlerError, PlaybackError, ResolveError, ServerError};
}
