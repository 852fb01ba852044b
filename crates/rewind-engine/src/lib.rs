//! Playback engine for the rewind replay server.
//!
//! Streams recorded sessions to connected viewers as if they were live.
//! Each accepted connection gets a dedicated worker thread that owns its
//! [`PlaybackSession`]; everything else reaches that session by enqueuing
//! tasks through the connection's [`ConnectionHandle`].
//!
//! # Architecture
//!
//! - [`ReplayServer`] accepts connections, runs replay selection on
//!   login and joins workers on shutdown
//! - [`ReplaySelector`] and [`ReplayDatabase`] decide which archive a
//!   viewer gets and open it
//! - [`PlaybackSession`] maps wall-clock time to replay time, emits due
//!   records through the spectator [`filter`] and supports pause, speed
//!   changes, jumps and restarts
//! - [`PacketHandler`]s and the built-in [`CommandInterpreter`] process
//!   inbound packets on the worker thread
//!
//! Failures are contained per connection: an error or panic on a worker
//! disconnects that viewer with [`INTERNAL_ERROR`] and nobody else.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod compact;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod playback;
pub mod resolve;
pub mod server;
pub mod user;
mod worker;

pub use config::{
    CommandConfig, ConfigError, DatabaseConfig, EndOfReplay, PlaybackConfig, SelectorConfig,
    ServerConfig,
};
pub use error::{HandlerError, PlaybackError, ResolveError, ServerError, WorkerError};
pub use handler::{CommandInterpreter, PacketHandler, UserContext};
pub use playback::{PlaybackSession, TickOutcome};
pub use resolve::{
    DirectoryReplayDatabase, FixedReplaySelector, ReplayDatabase, ReplaySelector, SelectionReply,
};
pub use server::{ConnectionInfo, ReplayServer, ServerBuilder, ShutdownReport, SERVER_SHUTDOWN};
pub use user::{ConnectionHandle, Task, User};
pub use worker::{INTERNAL_ERROR, REPLAY_FINISHED};
