//! Integration test: viewers connecting to a running server.
//!
//! Drives the full accept, login, resolve, play, disconnect lifecycle
//! through the public API with recording network sessions. Workers run
//! on real threads, so assertions poll with a deadline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rewind_archive::{ArchiveMetadata, FileArchive};
use rewind_core::{
    Archive, ArchivedPacket, ClientPacket, GameMode, PacketKind, Profile, ReplayId, ServerPacket,
};
use rewind_engine::filter::SPECTATOR_ENTITY_ID;
use rewind_engine::{
    DatabaseConfig, ReplayDatabase, ReplaySelector, ReplayServer, ResolveError, SelectionReply,
    SelectorConfig, ServerConfig, User,
};
use rewind_test_utils::{fixtures, ArchiveProbe, MemoryArchive, RecordingSession};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
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

// ── Test strategies ──────────────────────────────────────────────────

/// In-memory archives by id, with a probe per opened archive.
#[derive(Default)]
struct MemoryDatabase {
    replays: HashMap<&'static str, Vec<ArchivedPacket>>,
    probes: Mutex<Vec<ArchiveProbe>>,
}

impl MemoryDatabase {
    fn with(id: &'static str, records: Vec<ArchivedPacket>) -> Self {
        let mut db = Self::default();
        db.replays.insert(id, records);
        db
    }

    fn probes(&self) -> Vec<ArchiveProbe> {
        self.probes.lock().unwrap().clone()
    }
}

impl ReplayDatabase for MemoryDatabase {
    fn open(&self, _: Option<&Profile>, id: &ReplayId) -> Result<Box<dyn Archive>, ResolveError> {
        let records = self
            .replays
            .get(id.as_str())
            .ok_or_else(|| ResolveError::NotFound { id: id.clone() })?;
        let archive = MemoryArchive::new(id.as_str(), records.clone());
        self.probes.lock().unwrap().push(archive.probe());
        Ok(Box::new(archive))
    }
}

enum Choice {
    Replay(&'static str),
    Nothing,
    Dropped,
    Later(&'static str, Duration),
}

struct ScriptedSelector(Choice);

impl ReplaySelector for ScriptedSelector {
    fn select(&self, _user: &Arc<User>, reply: SelectionReply) {
        match self.0 {
            Choice::Replay(id) => reply.complete(Some(ReplayId::from(id))),
            Choice::Nothing => reply.complete(None),
            Choice::Dropped => drop(reply),
            Choice::Later(id, delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    reply.complete(Some(ReplayId::from(id)));
                });
            }
        }
    }
}

fn server(choice: Choice, db: Arc<MemoryDatabase>) -> ReplayServer {
    init_logging();
    ReplayServer::builder(ServerConfig {
        idle_poll_ms: 10,
        ..ServerConfig::default()
    })
    .selector(Arc::new(ScriptedSelector(choice)))
    .database(db)
    .build()
    .unwrap()
}

fn long_replay() -> Vec<ArchivedPacket> {
    let mut records = fixtures::timeline([
        (0, fixtures::join_game()),
        (0, fixtures::position(8.0, 72.0, 8.0)),
        (0, fixtures::opaque(PacketKind::UpdateHealth)),
    ]);
    records.extend(fixtures::chat_markers(&[0, 3_600_000]));
    records
}

// ── Resolution ───────────────────────────────────────────────────────

#[test]
fn unknown_replay_disconnects_without_a_session() {
    let db = Arc::new(MemoryDatabase::with("known", long_replay()));
    let server = server(Choice::Replay("ghost"), db.clone());
    let net = Arc::new(RecordingSession::with_profile(fixtures::profile()));
    let conn = server.accept(net.clone()).unwrap();
    server.login(&conn);

    assert!(wait_until(|| net.disconnect_reason().is_some()));
    assert_eq!(
        net.disconnect_reason().as_deref(),
        Some("No such replay: ghost")
    );
    assert!(net.sent().is_empty());
    assert!(db.probes().is_empty());
    assert!(wait_until(|| server.connections().is_empty()));
}

#[test]
fn no_selection_disconnects() {
    let db = Arc::new(MemoryDatabase::default());
    for choice in [Choice::Nothing, Choice::Dropped] {
        let server = server(choice, db.clone());
        let net = Arc::new(RecordingSession::new());
        let conn = server.accept(net.clone()).unwrap();
        server.login(&conn);

        assert!(wait_until(|| net.disconnect_reason().is_some()));
        assert_eq!(net.disconnect_reason().as_deref(), Some("No replay selected."));
    }
}

#[test]
fn late_selection_from_another_thread_binds() {
    let db = Arc::new(MemoryDatabase::with("late", long_replay()));
    let server = server(Choice::Later("late", Duration::from_millis(200)), db.clone());
    let net = Arc::new(RecordingSession::with_profile(fixtures::profile()));
    let conn = server.accept(net.clone()).unwrap();
    server.login(&conn);

    assert!(server.connections()[0].replay_id.is_none());
    assert!(wait_until(|| net.sent().len() >= 4));
    assert_eq!(net.sent()[0], fixtures::spectator_entry(fixtures::profile()));
    assert_eq!(
        server.connections()[0].replay_id,
        Some(ReplayId::from("late"))
    );
}

#[test]
fn selection_after_disconnect_is_dropped() {
    let db = Arc::new(MemoryDatabase::with("late", long_replay()));
    let server = server(Choice::Later("late", Duration::from_millis(50)), db.clone());
    let net = Arc::new(RecordingSession::new());
    let conn = server.accept(net.clone()).unwrap();
    server.login(&conn);
    conn.disconnected();

    assert!(wait_until(|| server.connections().is_empty()));
    thread::sleep(Duration::from_millis(100));
    assert!(db.probes().is_empty());
    assert!(net.sent().is_empty());
}

// ── Playback ─────────────────────────────────────────────────────────

#[test]
fn viewer_sees_spectator_view_of_the_recording() {
    let db = Arc::new(MemoryDatabase::with("r", long_replay()));
    let server = server(Choice::Replay("r"), db.clone());
    let net = Arc::new(RecordingSession::with_profile(fixtures::profile()));
    let conn = server.accept(net.clone()).unwrap();
    server.login(&conn);

    assert!(wait_until(|| net.sent().len() >= 4));
    let sent = net.sent();
    assert_eq!(sent[0], fixtures::spectator_entry(fixtures::profile()));
    match &sent[1] {
        ServerPacket::JoinGame(join) => {
            assert_eq!(join.entity_id, SPECTATOR_ENTITY_ID);
            assert_eq!(join.game_mode, GameMode::Spectator);
        }
        other => panic!("expected join game, got {other:?}"),
    }
    assert_eq!(sent[2], fixtures::position(8.0, 72.0, 8.0));
    assert_eq!(sent[3], fixtures::chat("t=0"));
    assert!(!net.sent_kinds().contains(&PacketKind::UpdateHealth));
}

#[test]
fn chat_commands_pause_and_fast_forward() {
    let db = Arc::new(MemoryDatabase::with("r", long_replay()));
    let server = server(Choice::Replay("r"), db.clone());
    let net = Arc::new(RecordingSession::new());
    let conn = server.accept(net.clone()).unwrap();

    // Before binding: ignored.
    conn.packet_received(ClientPacket::Chat {
        message: ".".into(),
    });
    server.login(&conn);
    assert!(wait_until(|| server.connections()[0].replay_id.is_some()));
    assert!(!server.connections()[0].paused);

    conn.packet_received(ClientPacket::Chat {
        message: ".".into(),
    });
    assert!(wait_until(|| server.connections()[0].paused));

    conn.packet_received(ClientPacket::Chat {
        message: "go".into(),
    });
    assert!(wait_until(|| server.connections()[0].speed == 3.0));
    assert!(server.connections()[0].paused);
}

#[test]
fn disconnect_closes_the_archive_once() {
    let db = Arc::new(MemoryDatabase::with("r", long_replay()));
    let server = server(Choice::Replay("r"), db.clone());
    let net = Arc::new(RecordingSession::new());
    let conn = server.accept(net.clone()).unwrap();
    server.login(&conn);
    assert!(wait_until(|| db.probes().len() == 1));

    net.drop_connection();
    conn.disconnected();
    assert!(wait_until(|| server.connections().is_empty()));

    let probe = &db.probes()[0];
    assert_eq!(probe.closes(), 1);
    assert_eq!(probe.live_streams(), 0);
    assert!(!conn.packet_received(ClientPacket::KeepAlive(1)));
}

#[test]
fn connections_are_isolated() {
    let db = Arc::new(MemoryDatabase::with("r", long_replay()));
    let mut server = server(Choice::Replay("r"), db.clone());
    let nets: Vec<_> = (0..4).map(|_| Arc::new(RecordingSession::new())).collect();
    let conns: Vec<_> = nets
        .iter()
        .map(|n| server.accept(n.clone()).unwrap())
        .collect();
    for c in &conns {
        server.login(c);
    }
    assert!(wait_until(|| db.probes().len() == 4));

    conns[1].disconnected();
    assert!(wait_until(|| server.connections().len() == 3));
    let ids: Vec<_> = server.connections().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![conns[0].id(), conns[2].id(), conns[3].id()]);

    let report = server.shutdown();
    assert_eq!(report.connections_closed, 3);
    assert_eq!(report.workers_joined, 3);
    assert!(db.probes().iter().all(|p| p.closes() == 1));
}

// ── File-backed ──────────────────────────────────────────────────────

#[test]
fn serves_archives_from_a_directory() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut writer =
        FileArchive::create(dir.path().join("match.rwnd"), &ArchiveMetadata::default()).unwrap();
    writer.write(0, &fixtures::join_game()).unwrap();
    writer.write(0, &fixtures::position(0.0, 64.0, 0.0)).unwrap();
    writer.write(5, &fixtures::chat("gg")).unwrap();
    writer.flush().unwrap();
    drop(writer);
    std::fs::write(dir.path().join("broken.rwnd"), b"RWND\x09").unwrap();

    let config = |id: &str| ServerConfig {
        idle_poll_ms: 10,
        selector: SelectorConfig::Fixed {
            replay_id: ReplayId::from(id),
        },
        database: DatabaseConfig::Directory {
            folder: dir.path().to_path_buf(),
        },
        ..ServerConfig::default()
    };

    let server = ReplayServer::builder(config("match.rwnd")).build().unwrap();
    let net = Arc::new(RecordingSession::new());
    let conn = server.accept(net.clone()).unwrap();
    server.login(&conn);
    assert!(wait_until(|| net.sent().len() == 3));
    assert_eq!(net.sent()[2], fixtures::chat("gg"));
    assert_eq!(net.disconnect_reason(), None);

    let server = ReplayServer::builder(config("broken.rwnd")).build().unwrap();
    let net = Arc::new(RecordingSession::new());
    let conn = server.accept(net.clone()).unwrap();
    server.login(&conn);
    assert!(wait_until(|| net.disconnect_reason().is_some()));
    assert_eq!(
        net.disconnect_reason().as_deref(),
        Some("Replay file corrupted: broken.rwnd")
    );
}
