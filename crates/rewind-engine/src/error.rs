//! Error types for playback, resolution and the connection worker.

use std::io;

use rewind_core::{ArchiveError, ReplayId, SendError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by a [`PlaybackSession`](crate::PlaybackSession).
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Requested speed was NaN, infinite, zero or negative.
    /// The session is left unchanged.
    #[error("playback speed must be finite and positive, got {value}")]
    InvalidSpeed {
        /// The rejected value.
        value: f64,
    },
    /// Reading the archive failed.
    #[error("archive: {0}")]
    Archive(#[from] ArchiveError),
    /// The viewer's outbound channel is closed.
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Why a connection could not be given a replay.
///
/// The `Display` text is shown to the viewer as the disconnect reason.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The selector produced no replay for this viewer.
    #[error("No replay selected.")]
    NoReplaySelected,
    /// The database has no archive under this id.
    #[error("No such replay: {id}")]
    NotFound {
        /// The requested id.
        id: ReplayId,
    },
    /// The archive exists but cannot be read.
    #[error("Replay file corrupted: {id}")]
    Corrupt {
        /// The requested id.
        id: ReplayId,
        /// Underlying cause, for logs only.
        detail: String,
    },
}

/// Failure reported by a [`PacketHandler`](crate::PacketHandler).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler-specific failure.
    #[error("{handler}: {reason}")]
    Failed {
        /// Name of the failing handler.
        handler: String,
        /// What went wrong.
        reason: String,
    },
    /// A playback control call made by the handler failed.
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    /// The handler could not reach the viewer.
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Connection-fatal failure inside a worker iteration.
///
/// Any of these ends the connection with an internal-error kick.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Playback failed while ticking or binding.
    #[error("playback: {0}")]
    Playback(#[from] PlaybackError),
    /// A packet handler failed.
    #[error("packet handler: {0}")]
    Handler(#[from] HandlerError),
    /// The viewer could not be reached.
    #[error(transparent)]
    Send(#[from] SendError),
    /// Something on the worker thread panicked.
    #[error("worker panicked: {message}")]
    Panicked {
        /// Panic payload, if it was a string.
        message: String,
    },
}

/// Errors from building or operating a [`ReplayServer`](crate::ReplayServer).
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The replay database could not be set up.
    #[error("replay database unavailable: {0}")]
    Database(#[source] io::Error),
    /// A connection worker thread could not be spawned.
    #[error("failed to spawn connection worker: {0}")]
    Spawn(#[source] io::Error),
    /// The server has already been shut down.
    #[error("server is shut down")]
    ShutDown,
}
