//! Packet and timeline fixtures.
//!
//! Every constructor returns a fresh, fully populated packet so tests
//! only spell out the fields they care about.

use rewind_core::{
    ArchivedPacket, Difficulty, GameMode, JoinGame, Location, MessageKind, Notification,
    NotificationKind, PacketKind, PlayerListAction, PlayerListItem, Profile, ProfileId, Respawn,
    ServerPacket, WorldType,
};
use smallvec::smallvec;

/// Join-game as a recording would contain it: real entity id, survival.
pub fn join_game() -> ServerPacket {
    ServerPacket::JoinGame(JoinGame {
        entity_id: 42,
        hardcore: false,
        game_mode: GameMode::Survival,
        dimension: 0,
        difficulty: Difficulty::Normal,
        max_players: 20,
        world_type: WorldType::Default,
        reduced_debug_info: false,
    })
}

/// Respawn into the nether in creative.
pub fn respawn() -> ServerPacket {
    ServerPacket::Respawn(Respawn {
        dimension: -1,
        difficulty: Difficulty::Hard,
        game_mode: GameMode::Creative,
        world_type: WorldType::Default,
    })
}

pub fn position(x: f64, y: f64, z: f64) -> ServerPacket {
    ServerPacket::PlayerPositionRotation(Location::at(x, y, z))
}

pub fn notification(kind: NotificationKind, value: f32) -> ServerPacket {
    ServerPacket::NotifyClient(Notification { kind, value })
}

/// Alias of [`notification`] for readability in weather tests.
pub fn weather(kind: NotificationKind, value: f32) -> ServerPacket {
    notification(kind, value)
}

pub fn chat(text: &str) -> ServerPacket {
    ServerPacket::Chat {
        text: text.to_owned(),
        kind: MessageKind::Chat,
    }
}

pub fn time_update(world_age: i64, time_of_day: i64) -> ServerPacket {
    ServerPacket::TimeUpdate {
        world_age,
        time_of_day,
    }
}

/// An uninterpreted packet with a one-byte body.
pub fn opaque(kind: PacketKind) -> ServerPacket {
    ServerPacket::opaque(kind, vec![kind.id()])
}

pub fn profile() -> Profile {
    Profile::new(ProfileId(0x1234_5678_9abc_def0_1234_5678_9abc_def0), "Viewer")
}

pub fn spectator_entry(profile: Profile) -> ServerPacket {
    ServerPacket::PlayerListEntry {
        action: PlayerListAction::AddPlayer,
        entries: smallvec![PlayerListItem {
            profile,
            game_mode: GameMode::Spectator,
        }],
    }
}

/// Build a record list from `(timestamp, packet)` pairs.
pub fn timeline(entries: impl IntoIterator<Item = (u32, ServerPacket)>) -> Vec<ArchivedPacket> {
    entries
        .into_iter()
        .map(|(ts, packet)| ArchivedPacket::new(ts, packet))
        .collect()
}

/// Chat markers at the given timestamps, text `"t=<ts>"`.
pub fn chat_markers(stamps: &[u32]) -> Vec<ArchivedPacket> {
    timeline(stamps.iter().map(|&ts| (ts, chat(&format!("t={ts}")))))
}
