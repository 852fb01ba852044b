//! Core types and traits for the rewind replay server.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the rewind workspace:
//! identifiers, the subset of the packet catalog the server inspects,
//! error types, and the traits at the archive and network seams.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod packet;
pub mod traits;

pub use error::{ArchiveError, SendError};
pub use id::{ConnectionId, Profile, ProfileId, ReplayId, ReplayMillis};
pub use packet::{
    ArchivedPacket, ClientPacket, Difficulty, GameMode, JoinGame, Location, MessageKind,
    Notification, NotificationKind, PacketKind, PlayerListAction, PlayerListItem, Respawn,
    ServerPacket, WorldType,
};
pub use traits::{Archive, Clock, MonotonicClock, NetworkSession, PacketStream};
