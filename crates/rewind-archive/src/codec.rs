//! Binary encode/decode for the archive format.
//!
//! All integers are little-endian. Strings and byte arrays are length-prefixed
//! with a `u32` length. Booleans are a single `0`/`1` byte.

use std::io::{Read, Write};

use rewind_core::{
    ArchivedPacket, Difficulty, GameMode, JoinGame, Location, MessageKind, Notification,
    NotificationKind, PacketKind, PlayerListAction, PlayerListItem, Profile, ProfileId, Respawn,
    ServerPacket, WorldType,
};
use smallvec::SmallVec;

use crate::error::FormatError;
use crate::types::ArchiveMetadata;
use crate::{FORMAT_VERSION, MAGIC};

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), FormatError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a boolean as a `0`/`1` byte.
pub fn write_bool(w: &mut dyn Write, v: bool) -> Result<(), FormatError> {
    write_u8(w, u8::from(v))
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), FormatError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut dyn Write, v: u64) -> Result<(), FormatError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u128.
pub fn write_u128_le(w: &mut dyn Write, v: u128) -> Result<(), FormatError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian i32.
pub fn write_i32_le(w: &mut dyn Write, v: i32) -> Result<(), FormatError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian i64.
pub fn write_i64_le(w: &mut dyn Write, v: i64) -> Result<(), FormatError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f32.
pub fn write_f32_le(w: &mut dyn Write, v: f32) -> Result<(), FormatError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f64.
pub fn write_f64_le(w: &mut dyn Write, v: f64) -> Result<(), FormatError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes).
pub fn write_length_prefixed_str(w: &mut dyn Write, s: &str) -> Result<(), FormatError> {
    write_length_prefixed_bytes(w, s.as_bytes())
}

/// Write a length-prefixed byte array (u32 length + bytes).
pub fn write_length_prefixed_bytes(w: &mut dyn Write, b: &[u8]) -> Result<(), FormatError> {
    let len = u32::try_from(b.len())
        .map_err(|_| FormatError::malformed(format!("field of {} bytes too long", b.len())))?;
    write_u32_le(w, len)?;
    w.write_all(b)?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, FormatError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a `0`/`1` boolean byte.
pub fn read_bool(r: &mut dyn Read) -> Result<bool, FormatError> {
    match read_u8(r)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(FormatError::malformed(format!(
            "invalid boolean byte: {other}"
        ))),
    }
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, FormatError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian u64.
pub fn read_u64_le(r: &mut dyn Read) -> Result<u64, FormatError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a little-endian u128.
pub fn read_u128_le(r: &mut dyn Read) -> Result<u128, FormatError> {
    let mut buf = [0u8; 16];
    r.read_exact(&mut buf)?;
    Ok(u128::from_le_bytes(buf))
}

/// Read a little-endian i32.
pub fn read_i32_le(r: &mut dyn Read) -> Result<i32, FormatError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Read a little-endian i64.
pub fn read_i64_le(r: &mut dyn Read) -> Result<i64, FormatError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Read a little-endian f32.
pub fn read_f32_le(r: &mut dyn Read) -> Result<f32, FormatError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Read a little-endian f64.
pub fn read_f64_le(r: &mut dyn Read) -> Result<f64, FormatError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Read a length-prefixed UTF-8 string.
pub fn read_length_prefixed_str(r: &mut dyn Read) -> Result<String, FormatError> {
    let buf = read_length_prefixed_bytes(r)?;
    String::from_utf8(buf)
        .map_err(|e| FormatError::malformed(format!("invalid UTF-8 string: {e}")))
}

/// Read a length-prefixed byte array.
///
/// Reads through `take` so a corrupt length cannot force a huge
/// up-front allocation.
pub fn read_length_prefixed_bytes(r: &mut dyn Read) -> Result<Vec<u8>, FormatError> {
    let len = read_u32_le(r)? as usize;
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(FormatError::malformed(format!(
            "truncated field: got {} of {len} bytes",
            buf.len()
        )));
    }
    Ok(buf)
}

// ── Header encode/decode ────────────────────────────────────────

/// Encode the archive header (magic, version, metadata).
pub fn encode_header(w: &mut dyn Write, meta: &ArchiveMetadata) -> Result<(), FormatError> {
    w.write_all(&MAGIC)?;
    write_u8(w, FORMAT_VERSION)?;

    write_length_prefixed_str(w, &meta.server_name)?;
    write_u32_le(w, meta.protocol_version)?;
    write_u64_le(w, meta.recorded_at_ms)?;
    write_u32_le(w, meta.duration_ms)?;
    write_length_prefixed_str(w, &meta.generator)?;
    Ok(())
}

/// Decode and validate the archive header.
pub fn decode_header(r: &mut dyn Read) -> Result<ArchiveMetadata, FormatError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(FormatError::InvalidMagic);
    }

    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion { found: version });
    }

    Ok(ArchiveMetadata {
        server_name: read_length_prefixed_str(r)?,
        protocol_version: read_u32_le(r)?,
        recorded_at_ms: read_u64_le(r)?,
        duration_ms: read_u32_le(r)?,
        generator: read_length_prefixed_str(r)?,
    })
}

// ── Record encode/decode ────────────────────────────────────────

/// Encode a single timestamped record.
pub fn encode_record(w: &mut dyn Write, record: &ArchivedPacket) -> Result<(), FormatError> {
    let mut body = Vec::new();
    encode_packet(&mut body, &record.packet)?;
    write_u32_le(w, record.timestamp)?;
    write_length_prefixed_bytes(w, &body)?;
    Ok(())
}

/// Decode a single timestamped record.
///
/// Returns `Ok(None)` on clean EOF (no bytes available), `Ok(Some(record))`
/// on success, or an error on truncated/corrupt data.
pub fn decode_record(r: &mut dyn Read) -> Result<Option<ArchivedPacket>, FormatError> {
    // Read the timestamp byte-by-byte to tell clean EOF (zero bytes)
    // from truncation (1-3 bytes before EOF).
    let mut ts_buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        match r.read(&mut ts_buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(FormatError::malformed(format!(
                    "truncated record header: got {filled} of 4 bytes for timestamp"
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FormatError::Io(e)),
        }
    }
    let timestamp = u32::from_le_bytes(ts_buf);
    let body = read_length_prefixed_bytes(r)?;
    let packet = decode_packet(&body)?;
    Ok(Some(ArchivedPacket { timestamp, packet }))
}

// ── Packet encode/decode ────────────────────────────────────────

/// Encode a packet as its id byte followed by its body.
pub fn encode_packet(w: &mut dyn Write, packet: &ServerPacket) -> Result<(), FormatError> {
    write_u8(w, packet.kind().id())?;
    match packet {
        ServerPacket::JoinGame(join) => {
            write_i32_le(w, join.entity_id)?;
            write_bool(w, join.hardcore)?;
            write_u8(w, join.game_mode.to_tag())?;
            write_i32_le(w, join.dimension)?;
            write_u8(w, join.difficulty.to_tag())?;
            write_u8(w, join.max_players)?;
            write_u8(w, join.world_type.to_tag())?;
            write_bool(w, join.reduced_debug_info)?;
        }
        ServerPacket::Respawn(respawn) => {
            write_i32_le(w, respawn.dimension)?;
            write_u8(w, respawn.difficulty.to_tag())?;
            write_u8(w, respawn.game_mode.to_tag())?;
            write_u8(w, respawn.world_type.to_tag())?;
        }
        ServerPacket::PlayerPositionRotation(loc) => {
            write_f64_le(w, loc.x)?;
            write_f64_le(w, loc.y)?;
            write_f64_le(w, loc.z)?;
            write_f32_le(w, loc.yaw)?;
            write_f32_le(w, loc.pitch)?;
        }
        ServerPacket::NotifyClient(n) => {
            write_u8(w, n.kind.to_tag())?;
            write_f32_le(w, n.value)?;
        }
        ServerPacket::Chat { text, kind } => {
            write_length_prefixed_str(w, text)?;
            write_u8(w, kind.to_tag())?;
        }
        ServerPacket::Disconnect { reason } => {
            write_length_prefixed_str(w, reason)?;
        }
        ServerPacket::PlayerListEntry { action, entries } => {
            write_u8(w, action.to_tag())?;
            write_u32_le(w, entries.len() as u32)?;
            for item in entries {
                write_u128_le(w, item.profile.id.0)?;
                write_length_prefixed_str(w, &item.profile.name)?;
                write_u8(w, item.game_mode.to_tag())?;
            }
        }
        ServerPacket::TimeUpdate {
            world_age,
            time_of_day,
        } => {
            write_i64_le(w, *world_age)?;
            write_i64_le(w, *time_of_day)?;
        }
        ServerPacket::Opaque { kind, payload } => {
            if kind.is_typed() {
                return Err(FormatError::malformed(format!(
                    "packet id {:#04x} has a typed form and cannot be stored opaque",
                    kind.id()
                )));
            }
            w.write_all(payload)?;
        }
    }
    Ok(())
}

fn tag<T>(field: &'static str, raw: u8, parse: fn(u8) -> Option<T>) -> Result<T, FormatError> {
    parse(raw).ok_or(FormatError::UnknownTag { field, tag: raw })
}

/// Decode a packet from its id byte and body.
///
/// Kinds without a typed variant become [`ServerPacket::Opaque`] carrying
/// the remaining bytes. Typed bodies must be consumed exactly.
pub fn decode_packet(bytes: &[u8]) -> Result<ServerPacket, FormatError> {
    let (&id, mut rest) = bytes
        .split_first()
        .ok_or_else(|| FormatError::malformed("empty packet"))?;
    let kind = PacketKind::from_id(id);
    if !kind.is_typed() {
        return Ok(ServerPacket::Opaque {
            kind,
            payload: rest.to_vec(),
        });
    }

    let r: &mut dyn Read = &mut rest;
    let packet = match kind {
        PacketKind::JoinGame => ServerPacket::JoinGame(JoinGame {
            entity_id: read_i32_le(r)?,
            hardcore: read_bool(r)?,
            game_mode: tag("game mode", read_u8(r)?, GameMode::from_tag)?,
            dimension: read_i32_le(r)?,
            difficulty: tag("difficulty", read_u8(r)?, Difficulty::from_tag)?,
            max_players: read_u8(r)?,
            world_type: tag("world type", read_u8(r)?, WorldType::from_tag)?,
            reduced_debug_info: read_bool(r)?,
        }),
        PacketKind::Respawn => ServerPacket::Respawn(Respawn {
            dimension: read_i32_le(r)?,
            difficulty: tag("difficulty", read_u8(r)?, Difficulty::from_tag)?,
            game_mode: tag("game mode", read_u8(r)?, GameMode::from_tag)?,
            world_type: tag("world type", read_u8(r)?, WorldType::from_tag)?,
        }),
        PacketKind::PlayerPositionRotation => ServerPacket::PlayerPositionRotation(Location {
            x: read_f64_le(r)?,
            y: read_f64_le(r)?,
            z: read_f64_le(r)?,
            yaw: read_f32_le(r)?,
            pitch: read_f32_le(r)?,
        }),
        PacketKind::NotifyClient => ServerPacket::NotifyClient(Notification {
            kind: tag("notification", read_u8(r)?, NotificationKind::from_tag)?,
            value: read_f32_le(r)?,
        }),
        PacketKind::Chat => ServerPacket::Chat {
            text: read_length_prefixed_str(r)?,
            kind: tag("message kind", read_u8(r)?, MessageKind::from_tag)?,
        },
        PacketKind::Disconnect => ServerPacket::Disconnect {
            reason: read_length_prefixed_str(r)?,
        },
        PacketKind::PlayerListEntry => {
            let action = tag("player list action", read_u8(r)?, PlayerListAction::from_tag)?;
            let count = read_u32_le(r)? as usize;
            let mut entries = SmallVec::new();
            for _ in 0..count {
                let id = ProfileId(read_u128_le(r)?);
                let name = read_length_prefixed_str(r)?;
                let game_mode = tag("game mode", read_u8(r)?, GameMode::from_tag)?;
                entries.push(PlayerListItem {
                    profile: Profile::new(id, name),
                    game_mode,
                });
            }
            ServerPacket::PlayerListEntry { action, entries }
        }
        PacketKind::TimeUpdate => ServerPacket::TimeUpdate {
            world_age: read_i64_le(r)?,
            time_of_day: read_i64_le(r)?,
        },
        other => {
            return Err(FormatError::malformed(format!(
                "no decoder for packet id {:#04x}",
                other.id()
            )))
        }
    };

    if !rest.is_empty() {
        return Err(FormatError::malformed(format!(
            "{} trailing bytes after packet id {id:#04x}",
            rest.len()
        )));
    }
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rewind_test_utils::fixtures;

    fn roundtrip(packet: &ServerPacket) -> ServerPacket {
        let mut buf = Vec::new();
        encode_packet(&mut buf, packet).unwrap();
        decode_packet(&buf).unwrap()
    }

    #[test]
    fn header_roundtrip() {
        let meta = ArchiveMetadata {
            server_name: "lobby".into(),
            protocol_version: 47,
            recorded_at_ms: 1_700_000_000_123,
            duration_ms: 60_000,
            generator: "test".into(),
        };
        let mut buf = Vec::new();
        encode_header(&mut buf, &meta).unwrap();
        assert_eq!(&buf[..4], b"RWND");
        let decoded = decode_header(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn bad_magic_rejected() {
        let buf = b"NOPE\x01".to_vec();
        assert!(matches!(
            decode_header(&mut buf.as_slice()),
            Err(FormatError::InvalidMagic)
        ));
    }

    #[test]
    fn future_version_rejected() {
        let mut buf = MAGIC.to_vec();
        buf.push(FORMAT_VERSION + 1);
        assert!(matches!(
            decode_header(&mut buf.as_slice()),
            Err(FormatError::UnsupportedVersion { found }) if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn typed_packets_roundtrip() {
        for packet in [
            fixtures::join_game(),
            fixtures::respawn(),
            fixtures::position(1.5, 64.0, -3.25),
            fixtures::weather(NotificationKind::RainStrength, 0.5),
            fixtures::chat("hello"),
            fixtures::time_update(24_000, 6_000),
            fixtures::spectator_entry(fixtures::profile()),
            ServerPacket::Disconnect {
                reason: "bye".into(),
            },
        ] {
            assert_eq!(roundtrip(&packet), packet);
        }
    }

    #[test]
    fn unknown_ids_stay_opaque() {
        let packet = ServerPacket::opaque(PacketKind::Other(0x7A), vec![9, 8, 7]);
        assert_eq!(roundtrip(&packet), packet);
        let packet = ServerPacket::opaque(PacketKind::ChunkData, Vec::new());
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn opaque_typed_kind_refused() {
        let packet = ServerPacket::opaque(PacketKind::JoinGame, vec![0; 4]);
        assert!(encode_packet(&mut Vec::new(), &packet).is_err());
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut buf = Vec::new();
        encode_packet(&mut buf, &fixtures::time_update(1, 2)).unwrap();
        buf.push(0);
        assert!(matches!(
            decode_packet(&buf),
            Err(FormatError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn unknown_enum_tag_rejected() {
        let buf = [PacketKind::NotifyClient.id(), 200, 0, 0, 0, 0];
        assert!(matches!(
            decode_packet(&buf),
            Err(FormatError::UnknownTag { tag: 200, .. })
        ));
    }

    #[test]
    fn empty_packet_rejected() {
        assert!(decode_packet(&[]).is_err());
    }

    #[test]
    fn clean_eof_vs_truncated_record() {
        let empty: &[u8] = &[];
        assert!(decode_record(&mut &*empty).unwrap().is_none());

        let partial: &[u8] = &[1, 2];
        assert!(matches!(
            decode_record(&mut &*partial),
            Err(FormatError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn truncated_record_body_is_an_error() {
        let mut buf = Vec::new();
        encode_record(
            &mut buf,
            &ArchivedPacket::new(10, fixtures::chat("cut short")),
        )
        .unwrap();
        buf.truncate(buf.len() - 3);
        assert!(decode_record(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn huge_length_prefix_does_not_allocate() {
        let buf = [0xFF, 0xFF, 0xFF, 0x7F];
        assert!(read_length_prefixed_bytes(&mut &buf[..]).is_err());
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_packet(&bytes);
            let _ = decode_record(&mut bytes.as_slice());
        }

        #[test]
        fn positions_survive_encoding(
            x in -3.0e7f64..3.0e7,
            y in -64.0f64..320.0,
            z in -3.0e7f64..3.0e7,
            yaw in -180.0f32..180.0,
            pitch in -90.0f32..90.0,
        ) {
            let packet = ServerPacket::PlayerPositionRotation(Location { x, y, z, yaw, pitch });
            prop_assert_eq!(roundtrip(&packet), packet);
        }
    }
}
