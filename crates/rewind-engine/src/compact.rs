//! Coalescing of superseding world-state packets during long seeks.
//!
//! Only packets whose latest value fully describes the client state are
//! held back: world time, rain on/off, rain strength and thunder
//! strength. Everything else passes straight through.

use indexmap::IndexMap;
use rewind_core::{NotificationKind, ServerPacket};
use smallvec::SmallVec;

/// Packets released by one [`Compactor`] call.
pub(crate) type Released = SmallVec<[ServerPacket; 4]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Slot {
    Time,
    Rain,
    RainStrength,
    ThunderStrength,
}

fn slot_of(packet: &ServerPacket) -> Option<Slot> {
    match packet {
        ServerPacket::TimeUpdate { .. } => Some(Slot::Time),
        ServerPacket::NotifyClient(n) => match n.kind {
            NotificationKind::StartRain | NotificationKind::StopRain => Some(Slot::Rain),
            NotificationKind::RainStrength => Some(Slot::RainStrength),
            NotificationKind::ThunderStrength => Some(Slot::ThunderStrength),
            _ => None,
        },
        _ => None,
    }
}

/// Holds the latest packet per slot until the seek ends or the world changes.
#[derive(Debug, Default)]
pub(crate) struct Compactor {
    held: IndexMap<Slot, ServerPacket>,
    coalesced: usize,
}

impl Compactor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Offer one filtered packet; returns what may be sent now.
    ///
    /// A join-game or respawn resets the client world, so held state is
    /// released ahead of it.
    pub(crate) fn offer(&mut self, packet: ServerPacket) -> Released {
        if let Some(slot) = slot_of(&packet) {
            if self.held.shift_remove(&slot).is_some() {
                self.coalesced += 1;
            }
            self.held.insert(slot, packet);
            return Released::new();
        }
        let mut out = Released::new();
        if matches!(packet, ServerPacket::JoinGame(_) | ServerPacket::Respawn(_)) {
            out.extend(self.held.drain(..).map(|(_, p)| p));
        }
        out.push(packet);
        out
    }

    /// Release everything still held, in order of last update.
    pub(crate) fn finish(&mut self) -> Released {
        self.held.drain(..).map(|(_, p)| p).collect()
    }

    /// Number of packets dropped because a later one replaced them.
    pub(crate) fn coalesced(&self) -> usize {
        self.coalesced
    }
}
