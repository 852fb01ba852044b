//! Per-connection worker loop.
//!
//! The worker thread owns the connection's [`PlaybackSession`]
//! exclusively. No locks on the hot path: inbound packets and tasks
//! arrive over crossbeam channels, and a one-slot wake channel cuts the
//! sleep short whenever a producer enqueues something.
//!
//! Each iteration: drain inbound packets, drain tasks, tick playback,
//! sleep until the next deadline.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use rewind_core::{ClientPacket, Clock, ConnectionId};

use crate::config::EndOfReplay;
use crate::error::WorkerError;
use crate::handler::{CommandInterpreter, PacketHandler, UserContext};
use crate::playback::{PlaybackSession, TickOutcome};
use crate::server::{ConnectionInfo, Registry};
use crate::user::{Task, User};

/// Disconnect reason after a connection-fatal failure.
pub const INTERNAL_ERROR: &str = "Internal Server Error";

/// Disconnect reason under [`EndOfReplay::Disconnect`].
pub const REPLAY_FINISHED: &str = "Replay finished.";

/// Receiving ends and shared state a worker is started with.
pub(crate) struct WorkerChannels {
    pub inbound: Receiver<ClientPacket>,
    pub tasks: Receiver<Task>,
    pub wake_rx: Receiver<()>,
    /// Held so `wake_rx` never reports disconnection.
    pub _wake_tx: Sender<()>,
}

/// Settings shared by every worker of a server.
#[derive(Clone)]
pub(crate) struct WorkerSettings {
    pub handlers: Arc<[Arc<dyn PacketHandler>]>,
    pub commands: CommandInterpreter,
    pub clock: Arc<dyn Clock>,
    pub idle_poll: Duration,
    pub end_of_replay: EndOfReplay,
}

/// State held by a connection worker's main loop.
pub(crate) struct ConnectionWorker {
    user: Arc<User>,
    playback: Option<PlaybackSession>,
    channels: WorkerChannels,
    settings: WorkerSettings,
    status: Arc<Mutex<ConnectionInfo>>,
    registry: Arc<Registry>,
    end_reported: bool,
    /// Wall-clock time the next loop pass may start.
    loop_due: Option<u64>,
}

impl ConnectionWorker {
    pub fn new(
        user: Arc<User>,
        channels: WorkerChannels,
        settings: WorkerSettings,
        status: Arc<Mutex<ConnectionInfo>>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            user,
            playback: None,
            channels,
            settings,
            status,
            registry,
            end_reported: false,
            loop_due: None,
        }
    }

    /// Main loop. Runs until the viewer disconnects or a fatal error.
    ///
    /// Errors and panics inside the loop kick the viewer with
    /// [`INTERNAL_ERROR`]. The archive is released exactly once on the
    /// way out and the connection leaves the registry.
    pub fn run(mut self) {
        let id = self.user.id();
        debug!("connection {id}: worker started");

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.run_loop())) {
            Ok(result) => result,
            Err(payload) => Err(WorkerError::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        };
        if let Err(e) = outcome {
            if self.user.is_connected() {
                error!("connection {id}: {e}");
                self.user.kick(INTERNAL_ERROR);
            } else {
                debug!("connection {id}: stopped after disconnect: {e}");
            }
        }
        self.teardown(id);
    }

    fn run_loop(&mut self) -> Result<(), WorkerError> {
        while self.user.is_connected() {
            // 1. Inbound packets, in arrival order.
            self.drain_inbound()?;
            // 2. Cross-thread tasks.
            self.drain_tasks()?;
            if !self.user.is_connected() {
                break;
            }
            // 3. Playback.
            let sleep = self.tick()?;
            self.publish_status();
            // 4. Interruptible sleep.
            let _ = self.channels.wake_rx.recv_timeout(sleep);
        }
        Ok(())
    }

    fn drain_inbound(&mut self) -> Result<(), WorkerError> {
        while let Ok(packet) = self.channels.inbound.try_recv() {
            let mut ctx = UserContext::new(&self.user, &mut self.playback);
            for handler in self.settings.handlers.iter() {
                handler.handle(&mut ctx, &packet)?;
            }
            self.settings.commands.interpret(&mut ctx, &packet)?;
        }
        Ok(())
    }

    fn drain_tasks(&mut self) -> Result<(), WorkerError> {
        while let Ok(task) = self.channels.tasks.try_recv() {
            let mut ctx = UserContext::new(&self.user, &mut self.playback);
            task(&mut ctx)?;
        }
        Ok(())
    }

    /// Tick the bound session and pick the next sleep.
    fn tick(&mut self) -> Result<Duration, WorkerError> {
        let idle = self.settings.idle_poll;
        let Some(playback) = self.playback.as_mut() else {
            return Ok(idle);
        };
        match playback.tick(self.settings.clock.now_millis())? {
            TickOutcome::Waiting(delay) => {
                self.end_reported = false;
                self.loop_due = None;
                Ok(delay)
            }
            TickOutcome::Paused => Ok(idle),
            TickOutcome::Finished => match self.settings.end_of_replay {
                EndOfReplay::Idle => {
                    if !self.end_reported {
                        info!(
                            "connection {}: finished {}",
                            self.user.id(),
                            playback.replay_id()
                        );
                        self.end_reported = true;
                    }
                    Ok(idle)
                }
                EndOfReplay::Disconnect => {
                    self.user.kick(REPLAY_FINISHED);
                    Ok(Duration::ZERO)
                }
                EndOfReplay::Loop => {
                    // A pass shorter than the idle poll waits out the rest
                    // of it before the next one starts.
                    let now = self.settings.clock.now_millis();
                    let due = *self.loop_due.get_or_insert_with(|| {
                        let pass = f64::from(playback.time()) / playback.speed();
                        now + (idle.as_millis() as u64).saturating_sub(pass as u64)
                    });
                    if now < due {
                        return Ok(Duration::from_millis(due - now));
                    }
                    debug!(
                        "connection {}: looping {}",
                        self.user.id(),
                        playback.replay_id()
                    );
                    self.loop_due = None;
                    playback.restart();
                    Ok(Duration::from_millis(1))
                }
            },
        }
    }

    fn publish_status(&self) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.profile_name = self.user.profile().map(|p| p.name);
        match &self.playback {
            Some(p) => {
                status.replay_id = Some(p.replay_id().clone());
                status.replay_time = p.time();
                status.speed = p.speed();
                status.paused = p.is_paused();
            }
            None => status.replay_id = None,
        }
    }

    fn teardown(&mut self, id: ConnectionId) {
        if let Some(playback) = self.playback.take() {
            if let Err(e) = playback.close() {
                warn!("connection {id}: closing archive failed: {e}");
            }
        }
        self.registry.remove(id);
        info!("connection {id}: closed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandConfig;
    use crate::error::HandlerError;
    use crate::user::ConnectionHandle;
    use rewind_core::{ReplayId, ServerPacket};
    use rewind_test_utils::{fixtures, ArchiveProbe, MemoryArchive, RecordingSession};
    use std::thread;
    use std::time::Instant;

    struct Panicky;

    impl PacketHandler for Panicky {
        fn handle(&self, _: &mut UserContext<'_>, packet: &ClientPacket) -> Result<(), HandlerError> {
            if matches!(packet, ClientPacket::KeepAlive(13)) {
                panic!("unlucky");
            }
            Ok(())
        }
    }

    struct Failing;

    impl PacketHandler for Failing {
        fn handle(&self, _: &mut UserContext<'_>, _: &ClientPacket) -> Result<(), HandlerError> {
            Err(HandlerError::Failed {
                handler: "failing".into(),
                reason: "always".into(),
            })
        }
    }

    struct Rig {
        net: Arc<RecordingSession>,
        handle: ConnectionHandle,
        registry: Arc<Registry>,
        clock: Arc<dyn Clock>,
        thread: thread::JoinHandle<()>,
    }

    fn start(handlers: Vec<Arc<dyn PacketHandler>>, end_of_replay: EndOfReplay) -> Rig {
        start_with_idle(handlers, end_of_replay, Duration::from_secs(5))
    }

    fn start_with_idle(
        handlers: Vec<Arc<dyn PacketHandler>>,
        end_of_replay: EndOfReplay,
        idle_poll: Duration,
    ) -> Rig {
        let net = Arc::new(RecordingSession::new());
        let user = User::new(net.clone());
        let (in_tx, in_rx) = crossbeam_channel::unbounded();
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let handle = ConnectionHandle::new(Arc::clone(&user), in_tx, task_tx, wake_tx.clone());
        let registry = Arc::new(Registry::default());
        let status = registry.insert(handle.clone());
        let clock: Arc<dyn Clock> = Arc::new(rewind_core::MonotonicClock::new());
        let worker = ConnectionWorker::new(
            user,
            WorkerChannels {
                inbound: in_rx,
                tasks: task_rx,
                wake_rx,
                _wake_tx: wake_tx,
            },
            WorkerSettings {
                handlers: handlers.into(),
                commands: CommandInterpreter::new(CommandConfig::default()),
                clock: Arc::clone(&clock),
                idle_poll,
                end_of_replay,
            },
            status,
            Arc::clone(&registry),
        );
        let thread = thread::spawn(move || worker.run());
        Rig {
            net,
            handle,
            registry,
            clock,
            thread,
        }
    }

    fn bind(rig: &Rig, stamps: &[u32]) -> ArchiveProbe {
        bind_archive(rig, MemoryArchive::new("mem", fixtures::chat_markers(stamps)))
    }

    fn bind_archive(rig: &Rig, archive: MemoryArchive) -> ArchiveProbe {
        let probe = archive.probe();
        let clock = Arc::clone(&rig.clock);
        rig.handle.execute(move |ctx| {
            let session = PlaybackSession::new(
                Arc::clone(ctx.user()),
                ReplayId::from("mem"),
                Box::new(archive),
                clock,
                &Default::default(),
            )?;
            ctx.bind(session)
        });
        probe
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
    fn task_wakes_the_worker_promptly() {
        let rig = start(Vec::new(), EndOfReplay::Idle);
        // Idle poll is 5s; the task must run long before that.
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        let (tx, rx) = crossbeam_channel::bounded(1);
        rig.handle.execute(move |_| {
            let _ = tx.send(());
            Ok(())
        });
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        rig.handle.disconnected();
        rig.thread.join().unwrap();
    }

    #[test]
    fn handler_panic_kicks_with_internal_error() {
        let rig = start(vec![Arc::new(Panicky)], EndOfReplay::Idle);
        let probe = bind(&rig, &[0, 1_000_000]);
        assert!(wait_until(|| probe.opens() == 1));
        rig.handle.packet_received(ClientPacket::KeepAlive(13));
        rig.thread.join().unwrap();

        assert_eq!(rig.net.disconnect_reason().as_deref(), Some(INTERNAL_ERROR));
        assert_eq!(probe.closes(), 1);
        assert!(rig.registry.snapshot().is_empty());
    }

    #[test]
    fn handler_error_is_fatal() {
        let rig = start(vec![Arc::new(Failing)], EndOfReplay::Idle);
        rig.handle.packet_received(ClientPacket::KeepAlive(1));
        rig.thread.join().unwrap();
        assert_eq!(rig.net.disconnect_reason().as_deref(), Some(INTERNAL_ERROR));
    }

    #[test]
    fn disconnect_releases_archive_once() {
        let rig = start(Vec::new(), EndOfReplay::Idle);
        let probe = bind(&rig, &[0, 1_000_000]);
        assert!(wait_until(|| probe.opens() == 1));
        rig.net.drop_connection();
        rig.handle.disconnected();
        rig.thread.join().unwrap();
        assert_eq!(probe.closes(), 1);
        assert_eq!(probe.live_streams(), 0);
        assert_eq!(rig.net.disconnect_reason(), None);
    }

    #[test]
    fn end_of_replay_disconnect_policy() {
        let rig = start(Vec::new(), EndOfReplay::Disconnect);
        bind(&rig, &[0]);
        rig.thread.join().unwrap();
        assert_eq!(rig.net.disconnect_reason().as_deref(), Some(REPLAY_FINISHED));
    }

    #[test]
    fn end_of_replay_loop_policy_replays_again() {
        let rig = start_with_idle(Vec::new(), EndOfReplay::Loop, Duration::from_millis(20));
        let probe = bind(&rig, &[0]);
        assert!(wait_until(|| probe.opens() >= 3));
        let first_chats = rig
            .net
            .sent()
            .iter()
            .filter(|p| matches!(p, ServerPacket::Chat { .. }))
            .count();
        assert!(first_chats >= 2);
        rig.handle.disconnected();
        rig.thread.join().unwrap();
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn loop_over_an_instant_replay_is_paced_by_the_idle_poll() {
        let rig = start_with_idle(Vec::new(), EndOfReplay::Loop, Duration::from_millis(100));
        let empty = bind(&rig, &[]);
        assert!(wait_until(|| empty.opens() >= 1));
        thread::sleep(Duration::from_millis(300));
        assert!(empty.opens() <= 10, "reopened {} times", empty.opens());

        let instant = bind(&rig, &[0]);
        assert!(wait_until(|| instant.opens() >= 1));
        rig.net.take_sent();
        thread::sleep(Duration::from_millis(300));
        let sent = rig.net.sent().len();
        assert!(sent <= 10, "sent {sent} packets");
        assert!(instant.opens() <= 10, "reopened {} times", instant.opens());

        rig.handle.disconnected();
        rig.thread.join().unwrap();
        assert_eq!(empty.closes(), 1);
        assert_eq!(instant.closes(), 1);
    }

    #[test]
    fn archive_read_failure_kicks_with_internal_error() {
        let rig = start(Vec::new(), EndOfReplay::Idle);
        let archive =
            MemoryArchive::new("mem", fixtures::chat_markers(&[0, 1_000_000])).failing_after(1);
        let probe = bind_archive(&rig, archive);
        rig.thread.join().unwrap();

        assert_eq!(rig.net.disconnect_reason().as_deref(), Some(INTERNAL_ERROR));
        assert_eq!(probe.closes(), 1);
        assert_eq!(probe.live_streams(), 0);
        assert!(rig.registry.snapshot().is_empty());
    }

    #[test]
    fn archive_open_failure_kicks_with_internal_error() {
        let rig = start(Vec::new(), EndOfReplay::Idle);
        let archive = MemoryArchive::new("mem", fixtures::chat_markers(&[0])).failing_open();
        let probe = bind_archive(&rig, archive);
        rig.thread.join().unwrap();

        assert_eq!(rig.net.disconnect_reason().as_deref(), Some(INTERNAL_ERROR));
        assert_eq!(probe.opens(), 0);
        assert_eq!(probe.closes(), 1);
        assert!(rig.registry.snapshot().is_empty());
        assert!(rig.net.sent().is_empty());
    }

    #[test]
    fn panic_message_extracts_strings() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }
}
