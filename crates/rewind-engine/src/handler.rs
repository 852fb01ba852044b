//! Inbound packet handling on the worker thread.
//!
//! Every inbound packet goes through the configured [`PacketHandler`]
//! chain in order, then through the built-in [`CommandInterpreter`].

use std::sync::Arc;

use log::{debug, warn};
use rewind_core::{ClientPacket, GameMode, PlayerListAction, PlayerListItem, ServerPacket};
use smallvec::smallvec;

use crate::config::CommandConfig;
use crate::error::{HandlerError, WorkerError};
use crate::playback::PlaybackSession;
use crate::user::User;

/// Pluggable processor for inbound packets.
///
/// Handlers run on the connection's worker thread, in registration
/// order, before built-in command handling. They must not block:
/// a blocking handler stalls playback for its connection.
pub trait PacketHandler: Send + Sync {
    /// Process one inbound packet. An error ends the connection.
    fn handle(&self, ctx: &mut UserContext<'_>, packet: &ClientPacket) -> Result<(), HandlerError>;
}

/// Worker-owned view of one connection, lent to handlers and tasks.
pub struct UserContext<'a> {
    user: &'a Arc<User>,
    playback: &'a mut Option<PlaybackSession>,
}

impl<'a> UserContext<'a> {
    pub(crate) fn new(user: &'a Arc<User>, playback: &'a mut Option<PlaybackSession>) -> Self {
        Self { user, playback }
    }

    /// The viewer.
    pub fn user(&self) -> &Arc<User> {
        self.user
    }

    /// The bound playback session, if resolution has completed.
    pub fn current_playback_session(&self) -> Option<&PlaybackSession> {
        self.playback.as_ref()
    }

    /// Mutable access to the bound playback session.
    pub fn playback_mut(&mut self) -> Option<&mut PlaybackSession> {
        self.playback.as_mut()
    }

    /// Bind a resolved session, announcing the viewer as a spectator.
    ///
    /// A previously bound session is closed first.
    pub(crate) fn bind(&mut self, session: PlaybackSession) -> Result<(), WorkerError> {
        if let Some(previous) = self.playback.take() {
            if let Err(e) = previous.close() {
                warn!("connection {}: closing previous archive: {e}", self.user.id());
            }
        }
        if let Some(profile) = self.user.profile() {
            self.user.send(ServerPacket::PlayerListEntry {
                action: PlayerListAction::AddPlayer,
                entries: smallvec![PlayerListItem {
                    profile,
                    game_mode: GameMode::Spectator,
                }],
            })?;
        }
        *self.playback = Some(session);
        Ok(())
    }
}

/// Built-in chat commands.
///
/// The pause-toggle line flips pause; any other chat line sets the
/// fast-forward speed.
#[derive(Clone, Debug)]
pub struct CommandInterpreter {
    config: CommandConfig,
}

impl CommandInterpreter {
    /// Interpreter with the given settings.
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    /// Apply `packet` if it is a command.
    pub fn interpret(
        &self,
        ctx: &mut UserContext<'_>,
        packet: &ClientPacket,
    ) -> Result<(), HandlerError> {
        let ClientPacket::Chat { message } = packet else {
            return Ok(());
        };
        if !self.config.enabled {
            return Ok(());
        }
        let id = ctx.user().id();
        let Some(playback) = ctx.playback_mut() else {
            debug!("connection {id}: ignoring chat before a replay is bound");
            return Ok(());
        };
        if *message == self.config.pause_toggle {
            let paused = !playback.is_paused();
            playback.set_paused(paused);
        } else {
            playback.set_speed(self.config.fast_forward_speed)?;
        }
        Ok(())
    }
}
