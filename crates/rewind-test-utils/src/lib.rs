//! Test utilities and mock types for rewind development.
//!
//! Provides mock implementations of the core seams ([`Archive`],
//! [`NetworkSession`], [`Clock`]) plus packet [`fixtures`] for building
//! test timelines.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rewind_core::{
    Archive, ArchiveError, ArchivedPacket, Clock, NetworkSession, PacketKind, PacketStream,
    Profile, SendError, ServerPacket,
};

// ── MemoryArchive ───────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    live_streams: AtomicUsize,
}

/// Shared view of a [`MemoryArchive`]'s lifecycle counters.
///
/// Stays readable after the archive itself has been moved into the
/// code under test.
#[derive(Clone)]
pub struct ArchiveProbe(Arc<Counters>);

impl ArchiveProbe {
    /// Number of `open_packets` calls that succeeded.
    pub fn opens(&self) -> usize {
        self.0.opens.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> usize {
        self.0.closes.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet dropped.
    pub fn live_streams(&self) -> usize {
        self.0.live_streams.load(Ordering::SeqCst)
    }
}

/// In-memory [`Archive`] over a fixed list of records.
pub struct MemoryArchive {
    label: String,
    records: Arc<Vec<ArchivedPacket>>,
    counters: Arc<Counters>,
    fail_open: bool,
    fail_after: Option<usize>,
}

impl MemoryArchive {
    pub fn new(label: impl Into<String>, records: Vec<ArchivedPacket>) -> Self {
        Self {
            label: label.into(),
            records: Arc::new(records),
            counters: Arc::new(Counters::default()),
            fail_open: false,
            fail_after: None,
        }
    }

    /// Make every `open_packets` call fail with an I/O error.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make streams report corruption after yielding `n` records.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn probe(&self) -> ArchiveProbe {
        ArchiveProbe(Arc::clone(&self.counters))
    }
}

impl Archive for MemoryArchive {
    fn label(&self) -> &str {
        &self.label
    }

    fn open_packets(&mut self) -> Result<Box<dyn PacketStream>, ArchiveError> {
        if self.fail_open {
            return Err(ArchiveError::Io(std::io::Error::other(
                "injected open failure",
            )));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.counters.live_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryStream {
            records: Arc::clone(&self.records),
            pos: 0,
            counters: Arc::clone(&self.counters),
            fail_after: self.fail_after,
        }))
    }

    fn close(self: Box<Self>) -> Result<(), ArchiveError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryStream {
    records: Arc<Vec<ArchivedPacket>>,
    pos: usize,
    counters: Arc<Counters>,
    fail_after: Option<usize>,
}

impl PacketStream for MemoryStream {
    fn next_packet(&mut self) -> Result<Option<ArchivedPacket>, ArchiveError> {
        if self.fail_after == Some(self.pos) {
            return Err(ArchiveError::corrupt("injected corruption"));
        }
        let record = self.records.get(self.pos).cloned();
        if record.is_some() {
            self.pos += 1;
        }
        Ok(record)
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.counters.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── RecordingSession ────────────────────────────────────────────

/// [`NetworkSession`] that records everything sent to it.
pub struct RecordingSession {
    sent: Mutex<Vec<ServerPacket>>,
    disconnect_reason: Mutex<Option<String>>,
    connected: AtomicBool,
    profile: Mutex<Option<Profile>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            disconnect_reason: Mutex::new(None),
            connected: AtomicBool::new(true),
            profile: Mutex::new(None),
        }
    }

    pub fn with_profile(profile: Profile) -> Self {
        let session = Self::new();
        session.set_profile(profile);
        session
    }

    /// Simulate login completing.
    pub fn set_profile(&self, profile: Profile) {
        *self.profile.lock().unwrap() = Some(profile);
    }

    /// Snapshot of every packet sent so far.
    pub fn sent(&self) -> Vec<ServerPacket> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_kinds(&self) -> Vec<PacketKind> {
        self.sent.lock().unwrap().iter().map(|p| p.kind()).collect()
    }

    /// Drain the sent packets.
    pub fn take_sent(&self) -> Vec<ServerPacket> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Reason passed to the first `disconnect` call, if any.
    pub fn disconnect_reason(&self) -> Option<String> {
        self.disconnect_reason.lock().unwrap().clone()
    }

    /// Simulate the client going away without a kick.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSession for RecordingSession {
    fn send(&self, packet: ServerPacket) -> Result<(), SendError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SendError);
        }
        self.sent.lock().unwrap().push(packet);
        Ok(())
    }

    fn disconnect(&self, reason: &str) {
        if self.connected.swap(false, Ordering::SeqCst) {
            *self.disconnect_reason.lock().unwrap() = Some(reason.to_owned());
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn profile(&self) -> Option<Profile> {
        self.profile.lock().unwrap().clone()
    }
}

// ── ManualClock ─────────────────────────────────────────────────

/// [`Clock`] that only moves when told to.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
