//! Traits at the seams between the replay server and its collaborators.
//!
//! - [`Archive`] / [`PacketStream`]: random-access-free reading of a
//!   recorded session, restartable from the beginning.
//! - [`NetworkSession`]: the outbound half of a client connection,
//!   owned by the wire protocol layer.
//! - [`Clock`]: wall-clock source for playback scheduling.

use std::time::Instant;

use crate::error::{ArchiveError, SendError};
use crate::id::Profile;
use crate::packet::{ArchivedPacket, ServerPacket};

/// An open replay archive, exclusively owned by one playback session.
///
/// The archive hands out forward-only [`PacketStream`]s. Rewinding is
/// done by dropping the current stream and opening a new one, so
/// implementations must support any number of `open_packets` calls.
pub trait Archive: Send {
    /// Short label used in log lines (file name, database key, ...).
    fn label(&self) -> &str;

    /// Open a stream positioned at the first record.
    fn open_packets(&mut self) -> Result<Box<dyn PacketStream>, ArchiveError>;

    /// Release the archive. Consumes the handle, so it runs at most once.
    fn close(self: Box<Self>) -> Result<(), ArchiveError>;
}

/// Sequential reader over archived packets.
///
/// Records come out in non-decreasing timestamp order. Dropping the
/// stream closes it.
pub trait PacketStream: Send {
    /// Read the next record, or `None` once the archive is exhausted.
    fn next_packet(&mut self) -> Result<Option<ArchivedPacket>, ArchiveError>;
}

/// Outbound side of a client connection.
///
/// Implemented by the wire protocol layer. All methods are called from
/// the connection's worker thread and must not block on the network;
/// implementations queue the packet for their own I/O thread.
pub trait NetworkSession: Send + Sync {
    /// Queue a packet for delivery.
    fn send(&self, packet: ServerPacket) -> Result<(), SendError>;

    /// Close the connection, showing `reason` to the client if possible.
    fn disconnect(&self, reason: &str);

    /// Whether the connection is still open. Once this returns `false`
    /// it never returns `true` again.
    fn is_connected(&self) -> bool;

    /// The profile the client logged in with, once login has completed.
    fn profile(&self) -> Option<Profile>;
}

/// Millisecond wall-clock source.
///
/// Only differences between readings are meaningful.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_millis(&self) -> u64;
}

/// [`Clock`] backed by [`Instant`], counting from its construction.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock at zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
