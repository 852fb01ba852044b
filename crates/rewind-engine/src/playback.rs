//! The playback engine: wall-clock to replay-time mapping and packet emission.
//!
//! A [`PlaybackSession`] owns one archive and streams it to one viewer.
//! Replay time follows `replay = (now - scaled_start) * speed`, where
//! `scaled_start` is re-derived on every speed change or resume so the
//! mapping never jumps. Archives are forward-only: any move backwards
//! reopens the archive and replays from time zero.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use rewind_core::{
    Archive, ArchiveError, ArchivedPacket, Clock, PacketStream, ReplayId, ReplayMillis,
};

use crate::compact::Compactor;
use crate::config::PlaybackConfig;
use crate::error::PlaybackError;
use crate::filter;
use crate::user::User;

/// Result of one [`PlaybackSession::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Playback is paused; nothing was emitted.
    Paused,
    /// The next record becomes due after this long.
    Waiting(Duration),
    /// The archive is exhausted.
    Finished,
}

impl TickOutcome {
    /// The deadline to sleep until, if there is one.
    pub fn delay(self) -> Option<Duration> {
        match self {
            Self::Waiting(d) => Some(d),
            Self::Paused | Self::Finished => None,
        }
    }
}

/// One viewer's playback of one archive.
///
/// All methods run on the owning connection's worker thread.
pub struct PlaybackSession {
    user: Arc<User>,
    replay_id: ReplayId,
    archive: Option<Box<dyn Archive>>,
    stream: Option<Box<dyn PacketStream>>,
    lookahead: Option<ArchivedPacket>,
    exhausted: bool,
    clock: Arc<dyn Clock>,
    speed: f64,
    paused: bool,
    /// Wall clock at the last tick or rebase.
    now_real_time: u64,
    scaled_start: f64,
    now_replay_time: ReplayMillis,
    world_loaded: bool,
}

fn check_speed(value: f64) -> Result<(), PlaybackError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PlaybackError::InvalidSpeed { value })
    }
}

impl PlaybackSession {
    /// Start a session at replay time zero.
    ///
    /// The archive is not read until the first tick.
    pub fn new(
        user: Arc<User>,
        replay_id: ReplayId,
        archive: Box<dyn Archive>,
        clock: Arc<dyn Clock>,
        config: &PlaybackConfig,
    ) -> Result<Self, PlaybackError> {
        check_speed(config.initial_speed)?;
        let now = clock.now_millis();
        Ok(Self {
            user,
            replay_id,
            archive: Some(archive),
            stream: None,
            lookahead: None,
            exhausted: false,
            clock,
            speed: config.initial_speed,
            paused: config.start_paused,
            now_real_time: now,
            scaled_start: now as f64,
            now_replay_time: 0,
            world_loaded: false,
        })
    }

    // ── Ticking ─────────────────────────────────────────────────

    /// Emit every record due at wall-clock `now`.
    ///
    /// Returns how long until the next record is due, floored at 1ms.
    pub fn tick(&mut self, now: u64) -> Result<TickOutcome, PlaybackError> {
        if self.paused {
            return Ok(TickOutcome::Paused);
        }
        self.now_real_time = now;
        let target = self.target_at(now);
        if target < self.now_replay_time {
            debug!(
                "{}: rewinding from {}ms to {target}ms",
                self.replay_id, self.now_replay_time
            );
            self.reopen();
        }

        let next = self.advance_to(target, None)?;
        self.now_replay_time = target;
        match next {
            Some(due) => {
                let wait = f64::from(due - target) / self.speed;
                Ok(TickOutcome::Waiting(Duration::from_millis(
                    (wait.ceil() as u64).max(1),
                )))
            }
            None => Ok(TickOutcome::Finished),
        }
    }

    /// Replay time the mapping yields at wall-clock `now`.
    fn target_at(&self, now: u64) -> ReplayMillis {
        let t = ((now as f64 - self.scaled_start) * self.speed).round();
        t.clamp(0.0, f64::from(ReplayMillis::MAX)) as ReplayMillis
    }

    /// Emit every record with `timestamp <= target`.
    ///
    /// Returns the timestamp of the buffered next record, or `None` once
    /// the archive is exhausted.
    fn advance_to(
        &mut self,
        target: ReplayMillis,
        mut compactor: Option<&mut Compactor>,
    ) -> Result<Option<ReplayMillis>, PlaybackError> {
        let mut emitted = 0usize;
        let next = loop {
            let Some(due) = self.peek()? else {
                break None;
            };
            if due > target {
                break Some(due);
            }
            let Some(record) = self.lookahead.take() else {
                break None;
            };
            let Some(packet) = filter::apply(record.packet, &mut self.world_loaded) else {
                continue;
            };
            match compactor.as_deref_mut() {
                Some(c) => {
                    for p in c.offer(packet) {
                        self.user.send(p)?;
                    }
                }
                None => self.user.send(packet)?,
            }
            emitted += 1;
        };
        if emitted > 0 {
            trace!("{}: emitted {emitted} packets up to {target}ms", self.replay_id);
        }
        Ok(next)
    }

    /// Timestamp of the next record, buffering it if needed.
    ///
    /// Opens the archive stream lazily.
    fn peek(&mut self) -> Result<Option<ReplayMillis>, PlaybackError> {
        if self.lookahead.is_none() && !self.exhausted {
            if self.stream.is_none() {
                let archive = self.archive.as_mut().ok_or(ArchiveError::Closed)?;
                self.stream = Some(archive.open_packets()?);
            }
            if let Some(stream) = self.stream.as_mut() {
                self.lookahead = stream.next_packet()?;
            }
            if self.lookahead.is_none() {
                debug!("{}: end of archive", self.replay_id);
                self.exhausted = true;
                self.stream = None;
            }
        }
        Ok(self.lookahead.as_ref().map(|r| r.timestamp))
    }

    /// Drop the stream and lookahead so the next read starts at time zero.
    fn reopen(&mut self) {
        self.stream = None;
        self.lookahead = None;
        self.exhausted = false;
        self.now_replay_time = 0;
    }

    /// Re-derive `scaled_start` so that `anchor` is the replay time at `now`.
    fn rebase(&mut self, now: u64, anchor: f64) {
        self.now_real_time = now;
        self.scaled_start = now as f64 - anchor / self.speed;
    }

    /// Replay time at `now` under the current mapping, never behind the cursor.
    fn replay_time_at(&self, now: u64) -> f64 {
        ((now as f64 - self.scaled_start) * self.speed).max(f64::from(self.now_replay_time))
    }

    // ── Control ─────────────────────────────────────────────────

    /// Change the playback speed.
    ///
    /// Non-finite or non-positive values are rejected and leave the
    /// session unchanged. While playing, replay time is continuous
    /// across the change.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), PlaybackError> {
        check_speed(speed)?;
        if self.paused {
            self.speed = speed;
        } else {
            let now = self.clock.now_millis();
            let anchor = self.replay_time_at(now);
            self.speed = speed;
            self.rebase(now, anchor);
        }
        debug!("{}: speed {speed}", self.replay_id);
        Ok(())
    }

    /// Pause or resume. Setting the current state again does nothing.
    ///
    /// Pausing freezes replay time at the cursor; resuming continues
    /// from there.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if !paused {
            let now = self.clock.now_millis();
            self.rebase(now, f64::from(self.now_replay_time));
        }
        debug!(
            "{}: {} at {}ms",
            self.replay_id,
            if paused { "paused" } else { "resumed" },
            self.now_replay_time
        );
    }

    /// Jump to replay time `target`.
    ///
    /// Backward jumps reopen the archive. Every record up to `target` is
    /// sent through the spectator filter; with `compact`, superseded
    /// world-state packets are coalesced first. If the viewer's world has
    /// not loaded yet the jump continues to the first position packet so
    /// the client leaves its loading screen. Returns the reached time.
    pub fn set_time(
        &mut self,
        target: ReplayMillis,
        compact: bool,
    ) -> Result<ReplayMillis, PlaybackError> {
        if target < self.now_replay_time {
            self.reopen();
        }
        let mut compactor = compact.then(Compactor::new);
        let mut reached = target;
        let mut next = self.advance_to(target, compactor.as_mut())?;
        while !self.world_loaded {
            let Some(due) = next else { break };
            reached = due;
            next = self.advance_to(due, compactor.as_mut())?;
        }
        if let Some(c) = compactor.as_mut() {
            for p in c.finish() {
                self.user.send(p)?;
            }
            debug!(
                "{}: compacted jump coalesced {} packets",
                self.replay_id,
                c.coalesced()
            );
        }

        self.now_replay_time = reached;
        if !self.paused {
            let now = self.clock.now_millis();
            self.rebase(now, f64::from(reached));
        }
        debug!("{}: jumped to {reached}ms", self.replay_id);
        Ok(reached)
    }

    /// Restart playback from time zero, keeping speed and pause state.
    pub fn restart(&mut self) {
        self.reopen();
        if !self.paused {
            let now = self.clock.now_millis();
            self.rebase(now, 0.0);
        }
        debug!("{}: restarted", self.replay_id);
    }

    /// Release the archive.
    pub fn close(mut self) -> Result<(), ArchiveError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), ArchiveError> {
        self.stream = None;
        self.lookahead = None;
        match self.archive.take() {
            Some(archive) => {
                debug!("{}: closing archive {}", self.replay_id, archive.label());
                archive.close()
            }
            None => Ok(()),
        }
    }

    // ── Accessors ───────────────────────────────────────────────

    /// Replay-time cursor: everything up to here has been emitted.
    pub fn time(&self) -> ReplayMillis {
        self.now_replay_time
    }

    /// Current speed multiplier.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Whether playback is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the last read hit the end of the archive.
    pub fn is_finished(&self) -> bool {
        self.exhausted
    }

    /// Whether a position packet has reached the viewer.
    pub fn has_world_loaded(&self) -> bool {
        self.world_loaded
    }

    /// Id the archive was resolved from.
    pub fn replay_id(&self) -> &ReplayId {
        &self.replay_id
    }

    /// The viewer this session streams to.
    pub fn user(&self) -> &Arc<User> {
        &self.user
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{}: closing archive failed: {e}", self.replay_id);
        }
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("replay_id", &self.replay_id)
            .field("time", &self.now_replay_time)
            .field("real_time", &self.now_real_time)
            .field("speed", &self.speed)
            .field("paused", &self.paused)
            .field("finished", &self.exhausted)
            .finish()
    }
}
