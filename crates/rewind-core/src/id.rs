//! Strongly-typed identifiers and the [`ReplayMillis`] time unit.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Replay-relative time in milliseconds.
///
/// Archive timestamps and the playback cursor share this unit. Zero is
/// the first instant of the recording.
pub type ReplayMillis = u32;

/// Counter for unique [`ConnectionId`] allocation.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for an accepted network connection.
///
/// Allocated from a monotonic atomic counter via [`ConnectionId::next`].
/// Used as the key of the server's connection registry and as the
/// suffix of the worker thread name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh, unique connection ID.
    ///
    /// Each call returns a new ID that has never been returned before
    /// within this process. Thread-safe.
    pub fn next() -> Self {
        Self(CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies a replay archive, as chosen by a selector and
/// understood by a database.
///
/// The interpretation is up to the database: the directory database
/// treats it as a file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplayId(String);

impl ReplayId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplayId {
    fn from(v: &str) -> Self {
        Self(v.to_owned())
    }
}

impl From<String> for ReplayId {
    fn from(v: String) -> Self {
        Self(v)
    }
}

/// 128-bit account identifier of a player profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileId(pub u128);

impl fmt::Display for ProfileId {
    /// Formats in the hyphenated 8-4-4-4-12 hex layout.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff,
        )
    }
}

/// The identity a client logged in with.
///
/// Selectors key their choice on it, and the spectator announcement
/// sent at session bind carries it into the client's player list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Profile {
    /// Account identifier.
    pub id: ProfileId,
    /// Display name.
    pub name: String,
}

impl Profile {
    /// Create a profile.
    pub fn new(id: ProfileId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
