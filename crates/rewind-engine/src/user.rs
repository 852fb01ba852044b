//! The viewer's side of a connection.
//!
//! [`User`] is the facade the engine talks to: send, kick, teleport and
//! connectivity. [`ConnectionHandle`] is what the network layer keeps:
//! every call on it enqueues work for the connection's worker and wakes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, info};
use rewind_core::{
    ClientPacket, ConnectionId, Location, MessageKind, NetworkSession, Profile, SendError,
    ServerPacket,
};

use crate::error::WorkerError;
use crate::handler::UserContext;

/// A unit of work executed on a connection's worker thread.
pub type Task = Box<dyn FnOnce(&mut UserContext<'_>) -> Result<(), WorkerError> + Send>;

/// A connected viewer.
pub struct User {
    id: ConnectionId,
    session: Arc<dyn NetworkSession>,
    closed: AtomicBool,
}

impl User {
    /// Wrap a network session, allocating a fresh [`ConnectionId`].
    pub fn new(session: Arc<dyn NetworkSession>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            session,
            closed: AtomicBool::new(false),
        })
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a packet for the viewer.
    pub fn send(&self, packet: ServerPacket) -> Result<(), SendError> {
        self.session.send(packet)
    }

    /// Send a chat line.
    pub fn send_chat(&self, text: impl Into<String>, kind: MessageKind) -> Result<(), SendError> {
        self.send(ServerPacket::Chat {
            text: text.into(),
            kind,
        })
    }

    /// Move the viewer's camera.
    pub fn teleport(&self, location: Location) -> Result<(), SendError> {
        self.send(ServerPacket::PlayerPositionRotation(location))
    }

    /// Disconnect the viewer with `reason`. Only the first call has an effect.
    pub fn kick(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("kicking connection {}: {reason}", self.id);
        self.session.disconnect(reason);
    }

    /// Whether the connection is still open.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.session.is_connected()
    }

    /// Profile the viewer logged in with, once known.
    pub fn profile(&self) -> Option<Profile> {
        self.session.profile()
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Network-side handle to a connection's worker.
///
/// Cheap to clone. Calls never block; each one wakes the worker so the
/// new input is handled without waiting out the current sleep.
#[derive(Clone)]
pub struct ConnectionHandle {
    user: Arc<User>,
    inbound: Sender<ClientPacket>,
    tasks: Sender<Task>,
    wake: Sender<()>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        user: Arc<User>,
        inbound: Sender<ClientPacket>,
        tasks: Sender<Task>,
        wake: Sender<()>,
    ) -> Self {
        Self {
            user,
            inbound,
            tasks,
            wake,
        }
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.user.id()
    }

    /// The viewer facade.
    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    /// Hand an inbound packet to the worker.
    ///
    /// Returns `false` if the worker has already exited.
    pub fn packet_received(&self, packet: ClientPacket) -> bool {
        let queued = self.inbound.send(packet).is_ok();
        self.wake();
        queued
    }

    /// Run `task` on the worker thread.
    ///
    /// This is the only way for other threads to touch the connection's
    /// playback state. Returns `false` if the worker has already exited.
    pub fn execute<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut UserContext<'_>) -> Result<(), WorkerError> + Send + 'static,
    {
        let queued = self.tasks.send(Box::new(task)).is_ok();
        if !queued {
            debug!("connection {} dropped a task after exit", self.id());
        }
        self.wake();
        queued
    }

    /// The network layer saw the connection close.
    pub fn disconnected(&self) {
        self.user.mark_closed();
        self.wake();
    }

    fn wake(&self) {
        // Best-effort: a full slot already guarantees a wakeup.
        let _ = self.wake.try_send(());
    }
}
