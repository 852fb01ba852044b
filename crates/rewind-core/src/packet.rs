//! The part of the game protocol's packet catalog the replay server inspects.
//!
//! The wire protocol itself (framing, compression, encryption, and the
//! full catalog) lives outside this workspace. Packets the server needs
//! to look into are modelled as typed variants; everything else travels
//! as [`ServerPacket::Opaque`] tagged with its [`PacketKind`].

use smallvec::SmallVec;

use crate::id::{Profile, ReplayMillis};

// ── Enumerations ────────────────────────────────────────────────

/// Player game mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameMode {
    /// Standard play.
    Survival,
    /// Unlimited resources, flight.
    Creative,
    /// Restricted block interaction.
    Adventure,
    /// Non-interactive observer with free movement.
    Spectator,
}

impl GameMode {
    /// Wire tag.
    pub fn to_tag(self) -> u8 {
        match self {
            Self::Survival => 0,
            Self::Creative => 1,
            Self::Adventure => 2,
            Self::Spectator => 3,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Survival),
            1 => Some(Self::Creative),
            2 => Some(Self::Adventure),
            3 => Some(Self::Spectator),
            _ => None,
        }
    }
}

/// World difficulty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Difficulty {
    /// No hostile mobs.
    Peaceful,
    /// Easy.
    Easy,
    /// Normal.
    Normal,
    /// Hard.
    Hard,
}

impl Difficulty {
    /// Wire tag.
    pub fn to_tag(self) -> u8 {
        match self {
            Self::Peaceful => 0,
            Self::Easy => 1,
            Self::Normal => 2,
            Self::Hard => 3,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Peaceful),
            1 => Some(Self::Easy),
            2 => Some(Self::Normal),
            3 => Some(Self::Hard),
            _ => None,
        }
    }
}

/// World generator type, as announced to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorldType {
    /// Default terrain.
    Default,
    /// Superflat.
    Flat,
    /// Large biomes.
    LargeBiomes,
    /// Amplified terrain.
    Amplified,
    /// Customized generator settings.
    Customized,
    /// Debug world.
    Debug,
}

impl WorldType {
    /// Wire tag.
    pub fn to_tag(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Flat => 1,
            Self::LargeBiomes => 2,
            Self::Amplified => 3,
            Self::Customized => 4,
            Self::Debug => 5,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Default),
            1 => Some(Self::Flat),
            2 => Some(Self::LargeBiomes),
            3 => Some(Self::Amplified),
            4 => Some(Self::Customized),
            5 => Some(Self::Debug),
            _ => None,
        }
    }
}

/// Where a chat message is displayed on the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Regular chat line.
    Chat,
    /// System message in the chat area.
    System,
    /// Action bar above the hotbar.
    ActionBar,
}

impl MessageKind {
    /// Wire tag.
    pub fn to_tag(self) -> u8 {
        match self {
            Self::Chat => 0,
            Self::System => 1,
            Self::ActionBar => 2,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Chat),
            1 => Some(Self::System),
            2 => Some(Self::ActionBar),
            _ => None,
        }
    }
}

/// Subtype of a world notification packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// "You have no home bed" style message.
    InvalidBed,
    /// Rain starts.
    StartRain,
    /// Rain stops.
    StopRain,
    /// The recorded player's game mode changed.
    ChangeGameMode,
    /// End-credits sequence.
    EnterCredits,
    /// Demo-mode message.
    DemoMessage,
    /// Arrow-hit sound for the recorded player.
    ArrowHitPlayer,
    /// Rain intensity changed.
    RainStrength,
    /// Thunder intensity changed.
    ThunderStrength,
}

impl NotificationKind {
    /// Wire tag.
    pub fn to_tag(self) -> u8 {
        match self {
            Self::InvalidBed => 0,
            Self::StartRain => 1,
            Self::StopRain => 2,
            Self::ChangeGameMode => 3,
            Self::EnterCredits => 4,
            Self::DemoMessage => 5,
            Self::ArrowHitPlayer => 6,
            Self::RainStrength => 7,
            Self::ThunderStrength => 8,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::InvalidBed),
            1 => Some(Self::StartRain),
            2 => Some(Self::StopRain),
            3 => Some(Self::ChangeGameMode),
            4 => Some(Self::EnterCredits),
            5 => Some(Self::DemoMessage),
            6 => Some(Self::ArrowHitPlayer),
            7 => Some(Self::RainStrength),
            8 => Some(Self::ThunderStrength),
            _ => None,
        }
    }

    /// Whether this subtype only describes weather.
    pub fn is_weather(self) -> bool {
        matches!(
            self,
            Self::StartRain | Self::StopRain | Self::RainStrength | Self::ThunderStrength
        )
    }
}

/// Player list mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayerListAction {
    /// Add entries.
    AddPlayer,
    /// Change the game mode of existing entries.
    UpdateGameMode,
    /// Remove entries.
    RemovePlayer,
}

impl PlayerListAction {
    /// Wire tag.
    pub fn to_tag(self) -> u8 {
        match self {
            Self::AddPlayer => 0,
            Self::UpdateGameMode => 1,
            Self::RemovePlayer => 4,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::AddPlayer),
            1 => Some(Self::UpdateGameMode),
            4 => Some(Self::RemovePlayer),
            _ => None,
        }
    }
}

// ── PacketKind ──────────────────────────────────────────────────

/// Type tag of a clientbound play-state packet.
///
/// The numeric ids follow the classic play-state protocol. Ids the
/// server has no use for map to [`PacketKind::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketKind {
    /// `0x01` join game.
    JoinGame,
    /// `0x02` chat message.
    Chat,
    /// `0x03` world time.
    TimeUpdate,
    /// `0x06` health, food and saturation.
    UpdateHealth,
    /// `0x07` respawn / dimension change.
    Respawn,
    /// `0x08` absolute position and rotation of the recorded player.
    PlayerPositionRotation,
    /// `0x09` selected hotbar slot.
    ChangeHeldItem,
    /// `0x1F` experience bar.
    SetExperience,
    /// `0x21` chunk data.
    ChunkData,
    /// `0x2B` world notification (weather, game mode, ...).
    NotifyClient,
    /// `0x2D` open inventory window.
    OpenWindow,
    /// `0x2E` close inventory window.
    CloseWindow,
    /// `0x2F` set inventory slot.
    SetSlot,
    /// `0x30` full window contents.
    WindowItems,
    /// `0x36` sign editor.
    OpenTileEntityEditor,
    /// `0x37` statistics.
    Statistics,
    /// `0x38` player list entry.
    PlayerListEntry,
    /// `0x39` player abilities (flight, invulnerability).
    PlayerAbilities,
    /// `0x40` disconnect.
    Disconnect,
    /// `0x43` camera entity switch.
    SwitchCamera,
    /// `0x45` on-screen title.
    Title,
    /// `0x48` resource pack offer.
    ResourcePackSend,
    /// Any other packet id.
    Other(u8),
}

impl PacketKind {
    /// The numeric packet id.
    pub fn id(self) -> u8 {
        match self {
            Self::JoinGame => 0x01,
            Self::Chat => 0x02,
            Self::TimeUpdate => 0x03,
            Self::UpdateHealth => 0x06,
            Self::Respawn => 0x07,
            Self::PlayerPositionRotation => 0x08,
            Self::ChangeHeldItem => 0x09,
            Self::SetExperience => 0x1F,
            Self::ChunkData => 0x21,
            Self::NotifyClient => 0x2B,
            Self::OpenWindow => 0x2D,
            Self::CloseWindow => 0x2E,
            Self::SetSlot => 0x2F,
            Self::WindowItems => 0x30,
            Self::OpenTileEntityEditor => 0x36,
            Self::Statistics => 0x37,
            Self::PlayerListEntry => 0x38,
            Self::PlayerAbilities => 0x39,
            Self::Disconnect => 0x40,
            Self::SwitchCamera => 0x43,
            Self::Title => 0x45,
            Self::ResourcePackSend => 0x48,
            Self::Other(id) => id,
        }
    }

    /// Map a numeric packet id to its kind.
    pub fn from_id(id: u8) -> Self {
        match id {
            0x01 => Self::JoinGame,
            0x02 => Self::Chat,
            0x03 => Self::TimeUpdate,
            0x06 => Self::UpdateHealth,
            0x07 => Self::Respawn,
            0x08 => Self::PlayerPositionRotation,
            0x09 => Self::ChangeHeldItem,
            0x1F => Self::SetExperience,
            0x21 => Self::ChunkData,
            0x2B => Self::NotifyClient,
            0x2D => Self::OpenWindow,
            0x2E => Self::CloseWindow,
            0x2F => Self::SetSlot,
            0x30 => Self::WindowItems,
            0x36 => Self::OpenTileEntityEditor,
            0x37 => Self::Statistics,
            0x38 => Self::PlayerListEntry,
            0x39 => Self::PlayerAbilities,
            0x40 => Self::Disconnect,
            0x43 => Self::SwitchCamera,
            0x45 => Self::Title,
            0x48 => Self::ResourcePackSend,
            other => Self::Other(other),
        }
    }

    /// Whether packets of this kind have a typed [`ServerPacket`] variant.
    pub fn is_typed(self) -> bool {
        matches!(
            self,
            Self::JoinGame
                | Self::Chat
                | Self::TimeUpdate
                | Self::Respawn
                | Self::PlayerPositionRotation
                | Self::NotifyClient
                | Self::PlayerListEntry
                | Self::Disconnect
        )
    }
}

// ── Packet bodies ───────────────────────────────────────────────

/// Body of the join-game packet.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinGame {
    /// Entity id the client will treat as itself.
    pub entity_id: i32,
    /// Hardcore flag.
    pub hardcore: bool,
    /// Initial game mode.
    pub game_mode: GameMode,
    /// Dimension id (-1 nether, 0 overworld, 1 end).
    pub dimension: i32,
    /// World difficulty.
    pub difficulty: Difficulty,
    /// Player list size hint.
    pub max_players: u8,
    /// World generator type.
    pub world_type: WorldType,
    /// Whether the debug screen is reduced.
    pub reduced_debug_info: bool,
}

/// Body of the respawn packet.
#[derive(Clone, Debug, PartialEq)]
pub struct Respawn {
    /// Dimension id.
    pub dimension: i32,
    /// World difficulty.
    pub difficulty: Difficulty,
    /// Game mode after respawn.
    pub game_mode: GameMode,
    /// World generator type.
    pub world_type: WorldType,
}

/// Absolute position and look direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Location {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
}

impl Location {
    /// A location with zero rotation.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

/// Body of the world notification packet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Notification {
    /// Subtype.
    pub kind: NotificationKind,
    /// Subtype-specific value (strength, game mode tag, ...).
    pub value: f32,
}

/// One row of a player list entry packet.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerListItem {
    /// The listed profile.
    pub profile: Profile,
    /// Game mode shown for the profile.
    pub game_mode: GameMode,
}

// ── ServerPacket ────────────────────────────────────────────────

/// A clientbound packet.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerPacket {
    /// Join game.
    JoinGame(JoinGame),
    /// Respawn / dimension change.
    Respawn(Respawn),
    /// Absolute position and rotation of the client's player.
    PlayerPositionRotation(Location),
    /// World notification.
    NotifyClient(Notification),
    /// Chat message.
    Chat {
        /// Message text.
        text: String,
        /// Display position.
        kind: MessageKind,
    },
    /// Disconnect with a reason shown to the user.
    Disconnect {
        /// Reason text.
        reason: String,
    },
    /// Player list mutation.
    PlayerListEntry {
        /// What to do with the entries.
        action: PlayerListAction,
        /// Affected rows.
        entries: SmallVec<[PlayerListItem; 1]>,
    },
    /// World age and time of day.
    TimeUpdate {
        /// Total ticks the world has existed.
        world_age: i64,
        /// Ticks into the current day cycle.
        time_of_day: i64,
    },
    /// A packet the server forwards without interpreting.
    Opaque {
        /// Type tag.
        kind: PacketKind,
        /// Raw body bytes, excluding the packet id.
        payload: Vec<u8>,
    },
}

impl ServerPacket {
    /// The type tag of this packet.
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::JoinGame(_) => PacketKind::JoinGame,
            Self::Respawn(_) => PacketKind::Respawn,
            Self::PlayerPositionRotation(_) => PacketKind::PlayerPositionRotation,
            Self::NotifyClient(_) => PacketKind::NotifyClient,
            Self::Chat { .. } => PacketKind::Chat,
            Self::Disconnect { .. } => PacketKind::Disconnect,
            Self::PlayerListEntry { .. } => PacketKind::PlayerListEntry,
            Self::TimeUpdate { .. } => PacketKind::TimeUpdate,
            Self::Opaque { kind, .. } => *kind,
        }
    }

    /// Convenience constructor for an uninterpreted packet.
    pub fn opaque(kind: PacketKind, payload: impl Into<Vec<u8>>) -> Self {
        Self::Opaque {
            kind,
            payload: payload.into(),
        }
    }
}

/// A packet together with the replay time it was recorded at.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchivedPacket {
    /// Milliseconds since the start of the recording.
    pub timestamp: ReplayMillis,
    /// The recorded packet.
    pub packet: ServerPacket,
}

impl ArchivedPacket {
    /// Pair a packet with its timestamp.
    pub fn new(timestamp: ReplayMillis, packet: ServerPacket) -> Self {
        Self { timestamp, packet }
    }
}

// ── ClientPacket ────────────────────────────────────────────────

/// A serverbound packet received from a connected viewer.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientPacket {
    /// Chat line typed by the viewer.
    Chat {
        /// Message text.
        message: String,
    },
    /// Viewer camera movement.
    PositionRotation(Location),
    /// Keep-alive echo.
    KeepAlive(i32),
    /// Anything else.
    Opaque {
        /// Packet id.
        id: u8,
        /// Raw body bytes.
        payload: Vec<u8>,
    },
}
