//! Spectator enforcement applied to every archived packet before it is sent.
//!
//! [`apply`] is a pure mapping from one archived packet to zero or one
//! outbound packets. The only state it touches is the caller's
//! world-loaded latch.

use rewind_core::{GameMode, PacketKind, ServerPacket};

/// Entity id given to the viewer in rewritten join-game packets.
///
/// Never used by a real entity, so the viewer is not mistaken for the
/// recorded player.
pub const SPECTATOR_ENTITY_ID: i32 = -1_789_435;

/// Packet kinds describing live-player state a spectator must not see.
pub const BLACKLIST: &[PacketKind] = &[
    PacketKind::UpdateHealth,
    PacketKind::OpenWindow,
    PacketKind::CloseWindow,
    PacketKind::SetSlot,
    PacketKind::WindowItems,
    PacketKind::OpenTileEntityEditor,
    PacketKind::Statistics,
    PacketKind::SetExperience,
    PacketKind::ChangeHeldItem,
    PacketKind::SwitchCamera,
    PacketKind::PlayerAbilities,
    PacketKind::Title,
];

/// Whether packets of `kind` are always dropped.
pub fn is_blacklisted(kind: PacketKind) -> bool {
    BLACKLIST.contains(&kind)
}

/// Map one archived packet to what the viewer should receive.
///
/// Join-game and respawn are rewritten to spectator mode, position
/// packets latch `world_loaded`, and world notifications other than
/// weather are dropped along with everything in [`BLACKLIST`].
pub fn apply(packet: ServerPacket, world_loaded: &mut bool) -> Option<ServerPacket> {
    match packet {
        ServerPacket::JoinGame(mut join) => {
            join.entity_id = SPECTATOR_ENTITY_ID;
            join.game_mode = GameMode::Spectator;
            Some(ServerPacket::JoinGame(join))
        }
        ServerPacket::Respawn(mut respawn) => {
            respawn.game_mode = GameMode::Spectator;
            Some(ServerPacket::Respawn(respawn))
        }
        ServerPacket::PlayerPositionRotation(_) => {
            *world_loaded = true;
            Some(packet)
        }
        ServerPacket::NotifyClient(n) if !n.kind.is_weather() => None,
        other if is_blacklisted(other.kind()) => None,
        other => Some(other),
    }
}
