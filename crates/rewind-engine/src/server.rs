//! Server facade: accepts connections, runs login, tracks workers.
//!
//! Each accepted connection gets its own named worker thread. The server
//! keeps a registry of live connections for diagnostics and shutdown;
//! workers remove themselves when they exit.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use indexmap::IndexMap;
use log::{debug, info, warn};
use rewind_core::{Clock, ConnectionId, MonotonicClock, NetworkSession, ReplayId, ReplayMillis};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::{CommandInterpreter, PacketHandler};
use crate::resolve::{Binder, ReplayDatabase, ReplaySelector, SelectionReply};
use crate::user::{ConnectionHandle, User};
use crate::worker::{ConnectionWorker, WorkerChannels, WorkerSettings};

/// Disconnect reason used by [`ReplayServer::shutdown`].
pub const SERVER_SHUTDOWN: &str = "Server shutting down.";

// ── ConnectionInfo ───────────────────────────────────────────────

/// Diagnostic snapshot of one connection.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionInfo {
    /// Connection id.
    pub id: ConnectionId,
    /// Name the viewer logged in with, once known.
    pub profile_name: Option<String>,
    /// Bound replay, once resolved.
    pub replay_id: Option<ReplayId>,
    /// Replay-time cursor of the bound session.
    pub replay_time: ReplayMillis,
    /// Speed of the bound session.
    pub speed: f64,
    /// Whether the bound session is paused.
    pub paused: bool,
}

impl ConnectionInfo {
    fn new(id: ConnectionId) -> Self {
        Self {
            id,
            profile_name: None,
            replay_id: None,
            replay_time: 0,
            speed: 1.0,
            paused: false,
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────

pub(crate) struct ConnectionEntry {
    handle: ConnectionHandle,
    status: Arc<Mutex<ConnectionInfo>>,
    thread: Option<JoinHandle<()>>,
}

/// Live connections, in accept order.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Mutex<IndexMap<ConnectionId, ConnectionEntry>>,
}

impl Registry {
    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<ConnectionId, ConnectionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection; returns the status cell its worker updates.
    pub(crate) fn insert(&self, handle: ConnectionHandle) -> Arc<Mutex<ConnectionInfo>> {
        let status = Arc::new(Mutex::new(ConnectionInfo::new(handle.id())));
        self.lock().insert(
            handle.id(),
            ConnectionEntry {
                handle,
                status: Arc::clone(&status),
                thread: None,
            },
        );
        status
    }

    /// Attach the worker thread. If the worker already exited, hands the
    /// thread back so the caller can join it.
    fn attach(&self, id: ConnectionId, thread: JoinHandle<()>) -> Option<JoinHandle<()>> {
        match self.lock().get_mut(&id) {
            Some(entry) => {
                entry.thread = Some(thread);
                None
            }
            None => Some(thread),
        }
    }

    pub(crate) fn remove(&self, id: ConnectionId) {
        self.lock().shift_remove(&id);
    }

    pub(crate) fn snapshot(&self) -> Vec<ConnectionInfo> {
        self.lock()
            .values()
            .map(|e| e.status.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }

    fn drain(&self) -> Vec<ConnectionEntry> {
        self.lock().drain(..).map(|(_, e)| e).collect()
    }
}

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from [`ReplayServer::shutdown`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent shutting down.
    pub total_ms: u64,
    /// Connections that were still registered.
    pub connections_closed: usize,
    /// Worker threads joined.
    pub workers_joined: usize,
}

// ── ServerBuilder ────────────────────────────────────────────────

/// Builder for [`ReplayServer`].
///
/// Strategies not supplied explicitly are built from the config.
pub struct ServerBuilder {
    config: ServerConfig,
    selector: Option<Arc<dyn ReplaySelector>>,
    database: Option<Arc<dyn ReplayDatabase>>,
    handlers: Vec<Arc<dyn PacketHandler>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ServerBuilder {
    /// Use `selector` instead of the configured one.
    pub fn selector(mut self, selector: Arc<dyn ReplaySelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Use `database` instead of the configured one.
    pub fn database(mut self, database: Arc<dyn ReplayDatabase>) -> Self {
        self.database = Some(database);
        self
    }

    /// Append a packet handler. Handlers run in the order added.
    pub fn handler(mut self, handler: Arc<dyn PacketHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Use `clock` for playback scheduling.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the config and construct the server.
    pub fn build(self) -> Result<ReplayServer, ServerError> {
        self.config.validate()?;
        let selector = match self.selector {
            Some(s) => s,
            None => self.config.selector.build(),
        };
        let database = match self.database {
            Some(d) => d,
            None => self.config.database.build()?,
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };

        let settings = WorkerSettings {
            handlers: self.handlers.into(),
            commands: CommandInterpreter::new(self.config.commands.clone()),
            clock: Arc::clone(&clock),
            idle_poll: self.config.idle_poll(),
            end_of_replay: self.config.end_of_replay,
        };
        let binder = Arc::new(Binder {
            database,
            clock,
            playback: self.config.playback.clone(),
        });
        Ok(ReplayServer {
            worker_name_prefix: self.config.worker_name_prefix,
            selector,
            binder,
            settings,
            registry: Arc::new(Registry::default()),
            shut_down: false,
        })
    }
}

// ── ReplayServer ─────────────────────────────────────────────────

/// Serves replays to connected viewers.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use rewind_engine::{ReplayServer, ServerConfig};
/// # fn session() -> Arc<dyn rewind_core::NetworkSession> { unimplemented!() }
///
/// let mut server = ReplayServer::builder(ServerConfig::default()).build().unwrap();
///
/// // Called by the network layer.
/// let conn = server.accept(session()).unwrap();
/// server.login(&conn);
///
/// let report = server.shutdown();
/// assert_eq!(report.workers_joined, 1);
/// ```
pub struct ReplayServer {
    worker_name_prefix: String,
    selector: Arc<dyn ReplaySelector>,
    binder: Arc<Binder>,
    settings: WorkerSettings,
    registry: Arc<Registry>,
    shut_down: bool,
}

impl ReplayServer {
    /// Start building a server from `config`.
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder {
            config,
            selector: None,
            database: None,
            handlers: Vec::new(),
            clock: None,
        }
    }

    /// Register a new connection and start its worker thread.
    pub fn accept(&self, session: Arc<dyn NetworkSession>) -> Result<ConnectionHandle, ServerError> {
        if self.shut_down {
            return Err(ServerError::ShutDown);
        }
        let user = User::new(session);
        let id = user.id();
        let (in_tx, in_rx) = crossbeam_channel::unbounded();
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let handle = ConnectionHandle::new(Arc::clone(&user), in_tx, task_tx, wake_tx.clone());

        // Registered before spawning so the worker's removal always
        // finds its entry.
        let status = self.registry.insert(handle.clone());
        let worker = ConnectionWorker::new(
            user,
            WorkerChannels {
                inbound: in_rx,
                tasks: task_rx,
                wake_rx,
                _wake_tx: wake_tx,
            },
            self.settings.clone(),
            status,
            Arc::clone(&self.registry),
        );
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.worker_name_prefix, id.get()))
            .spawn(move || worker.run());
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.registry.remove(id);
                return Err(ServerError::Spawn(e));
            }
        };
        if let Some(finished) = self.registry.attach(id, thread) {
            let _ = finished.join();
        }
        info!("connection {id}: accepted");
        Ok(handle)
    }

    /// Run replay selection for a connection whose login has completed.
    ///
    /// Never blocks on resolution; the outcome is applied on the
    /// connection's worker.
    pub fn login(&self, handle: &ConnectionHandle) {
        let user = handle.user();
        match user.profile() {
            Some(profile) => debug!("connection {}: login as {profile}", user.id()),
            None => debug!("connection {}: login without profile", user.id()),
        }
        let reply = SelectionReply::new(handle.clone(), Arc::clone(&self.binder));
        self.selector.select(user, reply);
    }

    /// Snapshot of every live connection, in accept order.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.snapshot()
    }

    /// Disconnect everyone and join every worker.
    ///
    /// Idempotent; later calls return an empty report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.shut_down {
            return ShutdownReport::default();
        }
        self.shut_down = true;
        let start = Instant::now();

        // Removed from the registry first: workers deregister on exit
        // and must not contend with the joins below.
        let entries = self.registry.drain();
        let connections_closed = entries.len();
        for entry in &entries {
            entry.handle.user().kick(SERVER_SHUTDOWN);
            entry.handle.disconnected();
        }

        let mut workers_joined = 0;
        for entry in entries {
            let Some(thread) = entry.thread else { continue };
            match thread.join() {
                Ok(()) => workers_joined += 1,
                Err(_) => warn!("connection {}: worker thread panicked", entry.handle.id()),
            }
        }

        let total_ms = start.elapsed().as_millis() as u64;
        info!("shutdown closed {connections_closed} connections in {total_ms}ms");
        ShutdownReport {
            total_ms,
            connections_closed,
            workers_joined,
        }
    }
}

impl Drop for ReplayServer {
    fn drop(&mut self) {
        if !self.shut_down {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::error::ResolveError;
    use crate::resolve::FixedReplaySelector;
    use rewind_core::{Archive, ArchivedPacket, Profile};
    use rewind_test_utils::{fixtures, MemoryArchive, RecordingSession};
    use std::time::Duration;

    struct OneReplay(Vec<ArchivedPacket>);

    impl ReplayDatabase for OneReplay {
        fn open(&self, _: Option<&Profile>, id: &ReplayId) -> Result<Box<dyn Archive>, ResolveError> {
            if id.as_str() != "only" {
                return Err(ResolveError::NotFound { id: id.clone() });
            }
            Ok(Box::new(MemoryArchive::new("only", self.0.clone())))
        }
    }

    fn server(selected: &str) -> ReplayServer {
        ReplayServer::builder(ServerConfig::default())
            .selector(Arc::new(FixedReplaySelector::new(selected)))
            .database(Arc::new(OneReplay(fixtures::chat_markers(&[0, 1_000_000]))))
            .build()
            .unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn login_binds_and_shutdown_joins() {
        let mut server = server("only");
        let net = Arc::new(RecordingSession::with_profile(fixtures::profile()));
        let conn = server.accept(net.clone()).unwrap();
        server.login(&conn);

        assert!(wait_until(|| server
            .connections()
            .first()
            .is_some_and(|c| c.replay_id.is_some())));
        let info = &server.connections()[0];
        assert_eq!(info.id, conn.id());
        assert_eq!(info.profile_name.as_deref(), Some("Viewer"));
        assert_eq!(info.replay_id, Some(ReplayId::from("only")));
        assert_eq!(net.sent()[0], fixtures::spectator_entry(fixtures::profile()));

        let report = server.shutdown();
        assert_eq!(report.connections_closed, 1);
        assert_eq!(report.workers_joined, 1);
        assert_eq!(net.disconnect_reason().as_deref(), Some(SERVER_SHUTDOWN));
        assert!(server.connections().is_empty());
        assert_eq!(server.shutdown(), ShutdownReport::default());
    }

    #[test]
    fn failed_resolution_removes_connection() {
        let server = server("missing");
        let net = Arc::new(RecordingSession::new());
        let conn = server.accept(net.clone()).unwrap();
        server.login(&conn);

        assert!(wait_until(|| server.connections().is_empty()));
        assert_eq!(
            net.disconnect_reason().as_deref(),
            Some("No such replay: missing")
        );
    }

    #[test]
    fn accept_after_shutdown_is_refused() {
        let mut server = server("only");
        server.shutdown();
        let err = server.accept(Arc::new(RecordingSession::new())).err();
        assert!(matches!(err, Some(ServerError::ShutDown)));
    }

    #[test]
    fn build_validates_config() {
        let config = ServerConfig {
            idle_poll_ms: 0,
            ..ServerConfig::default()
        };
        let err = ReplayServer::builder(config)
            .database(Arc::new(OneReplay(Vec::new())))
            .build()
            .err();
        assert!(matches!(
            err,
            Some(ServerError::Config(ConfigError::IdlePollZero))
        ));
    }

    #[test]
    fn worker_threads_are_named_after_the_connection() {
        let server = server("only");
        let conn = server.accept(Arc::new(RecordingSession::new())).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        conn.execute(move |_| {
            let _ = tx.send(thread::current().name().map(str::to_owned));
            Ok(())
        });
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name, Some(format!("rewind-conn-{}", conn.id().get())));
    }

    #[test]
    fn drop_shuts_down() {
        let net = Arc::new(RecordingSession::new());
        {
            let server = server("only");
            server.accept(net.clone()).unwrap();
        }
        assert_eq!(net.disconnect_reason().as_deref(), Some(SERVER_SHUTDOWN));
    }
}
