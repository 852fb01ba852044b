//! Server configuration, validation, and error types.
//!
//! [`ServerConfig`] is the builder input for a
//! [`ReplayServer`](crate::ReplayServer). [`validate()`](ServerConfig::validate)
//! checks every invariant up front so that nothing downstream has to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rewind_core::ReplayId;
use thiserror::Error;

use crate::error::ServerError;
use crate::resolve::{DirectoryReplayDatabase, FixedReplaySelector, ReplayDatabase, ReplaySelector};

// ── PlaybackConfig ─────────────────────────────────────────────────

/// Initial state of every new playback session.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackConfig {
    /// Speed multiplier a session starts with. Default: 1.0.
    pub initial_speed: f64,
    /// Whether a session starts paused. Default: false.
    pub start_paused: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_speed: 1.0,
            start_paused: false,
        }
    }
}

// ── CommandConfig ──────────────────────────────────────────────────

/// Built-in chat command interpreter settings.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandConfig {
    /// Chat line that toggles pause. Default: `"."`.
    pub pause_toggle: String,
    /// Speed set by any other chat line. Default: 3.0.
    pub fast_forward_speed: f64,
    /// Whether chat lines are interpreted at all. Default: true.
    pub enabled: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            pause_toggle: ".".into(),
            fast_forward_speed: 3.0,
            enabled: true,
        }
    }
}

// ── EndOfReplay ────────────────────────────────────────────────────

/// What happens once playback runs past the last archived record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EndOfReplay {
    /// Stay connected and keep polling for control input.
    #[default]
    Idle,
    /// Kick the viewer with "Replay finished.".
    Disconnect,
    /// Restart playback from time zero.
    Loop,
}

// ── Strategy selection ─────────────────────────────────────────────

/// Which [`ReplaySelector`] to construct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectorConfig {
    /// Every viewer gets the same replay.
    Fixed {
        /// Id handed to the database.
        replay_id: ReplayId,
    },
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self::Fixed {
            replay_id: ReplayId::from("replay.rwnd"),
        }
    }
}

impl SelectorConfig {
    /// Construct the configured selector.
    pub fn build(&self) -> Arc<dyn ReplaySelector> {
        match self {
            Self::Fixed { replay_id } => Arc::new(FixedReplaySelector::new(replay_id.clone())),
        }
    }
}

/// Which [`ReplayDatabase`] to construct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// Archives are files in a folder, addressed by file name.
    Directory {
        /// Folder holding the archives. Must exist.
        folder: PathBuf,
    },
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::Directory {
            folder: PathBuf::from("replays"),
        }
    }
}

impl DatabaseConfig {
    /// Construct the configured database.
    pub fn build(&self) -> Result<Arc<dyn ReplayDatabase>, ServerError> {
        match self {
            Self::Directory { folder } => {
                let db = DirectoryReplayDatabase::new(folder).map_err(ServerError::Database)?;
                Ok(Arc::new(db))
            }
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`ServerConfig::validate()`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A speed is NaN, infinite, zero or negative.
    #[error("{field} must be finite and positive, got {value}")]
    InvalidSpeed {
        /// Which setting.
        field: &'static str,
        /// The invalid value.
        value: f64,
    },
    /// `idle_poll_ms` is zero.
    #[error("idle_poll_ms must be at least 1")]
    IdlePollZero,
    /// The pause toggle command is empty.
    #[error("commands.pause_toggle must not be empty")]
    EmptyPauseToggle,
    /// The fixed selector has an empty replay id.
    #[error("selector replay_id must not be empty")]
    EmptyReplayId,
    /// The directory database has an empty folder path.
    #[error("database folder must not be empty")]
    EmptyFolder,
    /// Worker threads would be unnamed.
    #[error("worker_name_prefix must not be empty")]
    EmptyWorkerPrefix,
}

fn check_speed(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidSpeed { field, value })
    }
}

// ── ServerConfig ───────────────────────────────────────────────────

/// Complete configuration for a replay server.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Worker sleep when no playback deadline exists, in ms. Default: 100.
    pub idle_poll_ms: u64,
    /// Initial session state.
    pub playback: PlaybackConfig,
    /// Chat command interpreter.
    pub commands: CommandConfig,
    /// Behaviour at the end of the archive.
    pub end_of_replay: EndOfReplay,
    /// Replay selection strategy.
    pub selector: SelectorConfig,
    /// Archive storage strategy.
    pub database: DatabaseConfig,
    /// Worker threads are named `"{prefix}-{connection id}"`.
    pub worker_name_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 100,
            playback: PlaybackConfig::default(),
            commands: CommandConfig::default(),
            end_of_replay: EndOfReplay::default(),
            selector: SelectorConfig::default(),
            database: DatabaseConfig::default(),
            worker_name_prefix: "rewind-conn".into(),
        }
    }
}

impl ServerConfig {
    /// Validate all invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_poll_ms == 0 {
            return Err(ConfigError::IdlePollZero);
        }
        check_speed("playback.initial_speed", self.playback.initial_speed)?;
        check_speed("commands.fast_forward_speed", self.commands.fast_forward_speed)?;
        if self.commands.pause_toggle.is_empty() {
            return Err(ConfigError::EmptyPauseToggle);
        }
        match &self.selector {
            SelectorConfig::Fixed { replay_id } if replay_id.as_str().is_empty() => {
                return Err(ConfigError::EmptyReplayId);
            }
            SelectorConfig::Fixed { .. } => {}
        }
        match &self.database {
            DatabaseConfig::Directory { folder } if folder.as_os_str().is_empty() => {
                return Err(ConfigError::EmptyFolder);
            }
            DatabaseConfig::Directory { .. } => {}
        }
        if self.worker_name_prefix.is_empty() {
            return Err(ConfigError::EmptyWorkerPrefix);
        }
        Ok(())
    }

    /// [`idle_poll_ms`](Self::idle_poll_ms) as a `Duration`.
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}
