//! Replay resolution: which replay a viewer gets and where it comes from.
//!
//! A [`ReplaySelector`] picks a [`ReplayId`] for a connecting viewer and
//! answers through a one-shot [`SelectionReply`], possibly from another
//! thread. The reply is marshalled onto the connection's worker, where a
//! [`ReplayDatabase`] opens the archive and a playback session is bound.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use rewind_archive::{FileArchive, FormatError};
use rewind_core::{Archive, Clock, Profile, ReplayId};

use crate::config::PlaybackConfig;
use crate::error::{ResolveError, WorkerError};
use crate::handler::UserContext;
use crate::playback::PlaybackSession;
use crate::user::{ConnectionHandle, User};

// ── Traits ─────────────────────────────────────────────────────────

/// Chooses the replay a viewer will watch.
///
/// Called on the thread that completed login. Implementations that may
/// block must move the work elsewhere and complete `reply` from there.
pub trait ReplaySelector: Send + Sync {
    /// Start selection for `user`. Dropping `reply` means "no replay".
    fn select(&self, user: &Arc<User>, reply: SelectionReply);
}

/// Opens archives by id.
///
/// Called synchronously on the connection's worker thread.
pub trait ReplayDatabase: Send + Sync {
    /// Open the archive `id` for the viewer with `profile`.
    fn open(&self, profile: Option<&Profile>, id: &ReplayId)
        -> Result<Box<dyn Archive>, ResolveError>;
}

// ── SelectionReply ─────────────────────────────────────────────────

/// Everything needed to turn a selection into a bound session.
pub(crate) struct Binder {
    pub(crate) database: Arc<dyn ReplayDatabase>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) playback: PlaybackConfig,
}

impl Binder {
    /// Runs on the worker thread.
    fn bind(&self, ctx: &mut UserContext<'_>, choice: Option<ReplayId>) -> Result<(), WorkerError> {
        let user = Arc::clone(ctx.user());
        let Some(id) = choice else {
            refuse(&user, ResolveError::NoReplaySelected);
            return Ok(());
        };
        let profile = user.profile();
        debug!("connection {}: opening replay {id}", user.id());
        let archive = match self.database.open(profile.as_ref(), &id) {
            Ok(archive) => archive,
            Err(e) => {
                refuse(&user, e);
                return Ok(());
            }
        };
        let session = PlaybackSession::new(
            Arc::clone(&user),
            id.clone(),
            archive,
            Arc::clone(&self.clock),
            &self.playback,
        )?;
        ctx.bind(session)?;
        info!("connection {}: watching {id}", user.id());
        Ok(())
    }
}

fn refuse(user: &User, reason: ResolveError) {
    warn!("connection {}: resolution failed: {reason}", user.id());
    user.kick(&reason.to_string());
}

/// One-shot completion of a replay selection.
///
/// Completing enqueues the bind on the connection's worker. Dropping the
/// reply without completing it is the same as `complete(None)`.
pub struct SelectionReply {
    handle: ConnectionHandle,
    binder: Option<Arc<Binder>>,
}

impl SelectionReply {
    pub(crate) fn new(handle: ConnectionHandle, binder: Arc<Binder>) -> Self {
        Self {
            handle,
            binder: Some(binder),
        }
    }

    /// Deliver the selector's choice.
    pub fn complete(mut self, choice: Option<ReplayId>) {
        self.deliver(choice);
    }

    fn deliver(&mut self, choice: Option<ReplayId>) {
        let Some(binder) = self.binder.take() else {
            return;
        };
        let id = self.handle.id();
        if !self.handle.execute(move |ctx| binder.bind(ctx, choice)) {
            debug!("connection {id}: selection arrived after disconnect");
        }
    }
}

impl Drop for SelectionReply {
    fn drop(&mut self) {
        self.deliver(None);
    }
}

// ── FixedReplaySelector ────────────────────────────────────────────

/// Gives every viewer the same replay.
#[derive(Clone, Debug)]
pub struct FixedReplaySelector {
    id: ReplayId,
}

impl FixedReplaySelector {
    /// Always select `id`.
    pub fn new(id: impl Into<ReplayId>) -> Self {
        Self { id: id.into() }
    }
}

impl ReplaySelector for FixedReplaySelector {
    fn select(&self, _user: &Arc<User>, reply: SelectionReply) {
        reply.complete(Some(self.id.clone()));
    }
}

// ── DirectoryReplayDatabase ────────────────────────────────────────

/// Serves archive files from one folder, addressed by file name.
#[derive(Clone, Debug)]
pub struct DirectoryReplayDatabase {
    folder: PathBuf,
}

impl DirectoryReplayDatabase {
    /// Serve from `folder`, which must be an existing directory.
    pub fn new(folder: impl Into<PathBuf>) -> io::Result<Self> {
        let folder = folder.into();
        if !folder.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", folder.display()),
            ));
        }
        Ok(Self { folder })
    }

    /// Folder archives are served from.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Path for `id`, if it names a plain file inside the folder.
    fn path_for(&self, id: &ReplayId) -> Option<PathBuf> {
        let mut components = Path::new(id.as_str()).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if !id.as_str().contains(['/', '\\']) => {
                Some(self.folder.join(name))
            }
            _ => None,
        }
    }
}

impl ReplayDatabase for DirectoryReplayDatabase {
    fn open(
        &self,
        _profile: Option<&Profile>,
        id: &ReplayId,
    ) -> Result<Box<dyn Archive>, ResolveError> {
        let not_found = || ResolveError::NotFound { id: id.clone() };
        let path = self.path_for(id).ok_or_else(not_found)?;
        if !path.is_file() {
            return Err(not_found());
        }
        match FileArchive::open(&path) {
            Ok(archive) => Ok(Box::new(archive)),
            Err(FormatError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(ResolveError::Corrupt {
                id: id.clone(),
                detail: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_archive::ArchiveMetadata;
    use rewind_test_utils::fixtures;

    fn folder_with_archive() -> (tempfile::TempDir, DirectoryReplayDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            FileArchive::create(dir.path().join("good.rwnd"), &ArchiveMetadata::default())
                .unwrap();
        writer.write(0, &fixtures::join_game()).unwrap();
        writer.flush().unwrap();
        std::fs::write(dir.path().join("bad.rwnd"), b"garbage").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let db = DirectoryReplayDatabase::new(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn opens_existing_archive() {
        let (dir, db) = folder_with_archive();
        assert_eq!(db.folder(), dir.path());
        let archive = db.open(None, &ReplayId::from("good.rwnd")).unwrap();
        assert_eq!(archive.label(), "good.rwnd");
    }

    #[test]
    fn missing_archive_is_not_found() {
        let (_dir, db) = folder_with_archive();
        let err = db.open(None, &ReplayId::from("absent.rwnd")).err();
        assert_eq!(
            err,
            Some(ResolveError::NotFound {
                id: ReplayId::from("absent.rwnd")
            })
        );
    }

    #[test]
    fn unreadable_archive_is_corrupt() {
        let (_dir, db) = folder_with_archive();
        let err = db.open(None, &ReplayId::from("bad.rwnd")).err();
        assert!(matches!(err, Some(ResolveError::Corrupt { .. })));
    }

    #[test]
    fn escaping_ids_are_not_found() {
        let (_dir, db) = folder_with_archive();
        for id in ["../good.rwnd", "sub/x", "..", ".", "", "/etc/passwd", "a\\b", "sub"] {
            let err = db.open(None, &ReplayId::from(id)).err();
            assert!(
                matches!(err, Some(ResolveError::NotFound { .. })),
                "{id:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn folder_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectoryReplayDatabase::new(dir.path().join("missing")).is_err());
    }
}
