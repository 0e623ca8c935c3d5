//! remote::push
//!
//! Push protocol for one ref.
//!
//! # Lifecycle
//!
//! ```text
//! Validate -> Plan -> Upload -> Lock -> Verify -> Write -> Release
//! ```
//!
//! - **Validate**: refuse deleting the remote's current branch; for a
//!   non-force update, require the remote value to be known locally
//!   (`fetch first`) and an ancestor of the new value (`non-fast-forward`)
//! - **Plan**: objects reachable from the new value and absent remotely
//! - **Upload**: objects are created before the ref moves, so a reader that
//!   sees the new ref value always finds its whole closure
//! - **Lock/Verify/Write/Release**: the remote ref is re-read under its
//!   lock; a non-force push whose observed old value no longer matches is
//!   rejected without writing. The lock is released on every path.
//!
//! Force changes only the fast-forward policy; a forced push still takes
//! the lock. Objects orphaned by a forced push stay on the remote.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::core::object::RawObject;
use crate::core::types::{Oid, RefName};
use crate::git::{GitError, LocalGitBridge};

use super::error::SyncError;
use super::lock::LockManager;
use super::objects::ObjectStore;
use super::planner::TransferPlanner;
use super::refs::RefStore;

/// Objects read from git and uploaded per parallel round.
const UPLOAD_CHUNK: usize = 256;

/// One ref update requested by git.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Local source as git wrote it; `None` for a deletion
    pub src: Option<String>,
    /// Remote ref to update
    pub dst: RefName,
    /// Remote value observed before planning
    pub old_oid: Option<Oid>,
    /// Value to write; `None` deletes the ref
    pub new_oid: Option<Oid>,
    /// Skip fast-forward checks
    pub force: bool,
}

impl PushRequest {
    /// Whether this request deletes `dst`.
    pub fn is_delete(&self) -> bool {
        self.new_oid.is_none()
    }
}

/// Outcome of a successful push of one ref.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Objects written to the remote
    pub uploaded: usize,
    /// Planned objects another writer stored first
    pub skipped: usize,
    /// Whether the ref was removed
    pub deleted: bool,
}

/// Executes ref updates against one remote repository.
pub struct PushEngine<'a, G: LocalGitBridge> {
    git: &'a G,
    refs: &'a RefStore,
    objects: &'a ObjectStore,
    locks: &'a LockManager,
    pool: &'a ThreadPool,
    dry_run: bool,
    progress: bool,
}

impl<'a, G: LocalGitBridge> PushEngine<'a, G> {
    pub fn new(
        git: &'a G,
        refs: &'a RefStore,
        objects: &'a ObjectStore,
        locks: &'a LockManager,
        pool: &'a ThreadPool,
    ) -> Self {
        Self {
            git,
            refs,
            objects,
            locks,
            pool,
            dry_run: false,
            progress: false,
        }
    }

    /// Plan and validate only; upload and write nothing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Report upload progress at info level.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Build a request from a `push` line.
    ///
    /// An empty `src` requests deletion, which is always forced. The old
    /// value is read fresh from the remote.
    pub fn prepare(&self, src: &str, dst: &str, force: bool) -> Result<PushRequest, SyncError> {
        let dst = RefName::new(dst).map_err(|e| SyncError::Malformed(e.to_string()))?;
        let old_oid = self.refs.resolve(&dst)?;

        if src.is_empty() {
            return Ok(PushRequest {
                src: None,
                dst,
                old_oid,
                new_oid: None,
                force: true,
            });
        }

        let new_oid = self
            .git
            .resolve_ref(src)?
            .ok_or_else(|| SyncError::UnknownSource(src.to_string()))?;

        Ok(PushRequest {
            src: Some(src.to_string()),
            dst,
            old_oid,
            new_oid: Some(new_oid),
            force,
        })
    }

    /// Run the push protocol for `request`.
    ///
    /// `remote_tips` are the targets of refs known to exist remotely;
    /// `remote_head` is the branch the remote `HEAD` points at.
    pub fn push(
        &self,
        request: &PushRequest,
        remote_tips: &[Oid],
        remote_head: Option<&RefName>,
    ) -> Result<PushSummary, SyncError> {
        let mut summary = PushSummary::default();

        match &request.new_oid {
            None => {
                if remote_head == Some(&request.dst) {
                    return Err(SyncError::RefusedDelete);
                }
                if self.dry_run {
                    return Ok(summary);
                }
                summary.deleted = request.old_oid.is_some();
            }
            Some(new) => {
                if !request.force {
                    if let Some(old) = &request.old_oid {
                        self.check_fast_forward(old, new)?;
                    }
                }

                let planner = TransferPlanner::new(self.git, self.objects, self.pool);
                let plan = planner.plan_push(new, remote_tips)?;

                if self.dry_run {
                    tracing::info!(
                        dst = %request.dst,
                        objects = plan.upload_set.len(),
                        "dry run: would upload"
                    );
                    summary.uploaded = plan.upload_set.len();
                    return Ok(summary);
                }

                let uploaded = self.upload(&plan.upload_set)?;
                summary.uploaded = uploaded;
                summary.skipped = plan.upload_set.len() - uploaded;
            }
        }

        self.update_ref(request)?;

        tracing::info!(
            dst = %request.dst,
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            deleted = summary.deleted,
            "pushed"
        );
        Ok(summary)
    }

    fn check_fast_forward(&self, old: &Oid, new: &Oid) -> Result<(), SyncError> {
        if !self.git.object_exists(old)? {
            return Err(SyncError::FetchFirst);
        }
        if !self.git.is_ancestor(old, new)? {
            return Err(SyncError::NonFastForward);
        }
        Ok(())
    }

    /// Upload `oids`, returning how many were newly written.
    fn upload(&self, oids: &[Oid]) -> Result<usize, SyncError> {
        let mut uploaded = 0;
        let mut done = 0;
        for chunk in oids.chunks(UPLOAD_CHUNK) {
            // The local repository is read serially; uploads fan out
            let batch: Vec<(&Oid, RawObject)> = chunk
                .iter()
                .map(|oid| self.git.read_object(oid).map(|object| (oid, object)))
                .collect::<Result<_, GitError>>()?;

            let objects = self.objects;
            let written: Vec<bool> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|(oid, object)| objects.write(oid, object))
                    .collect::<Result<_, _>>()
            })?;
            uploaded += written.into_iter().filter(|w| *w).count();
            done += chunk.len();
            if self.progress {
                tracing::info!(done, total = oids.len(), "uploading objects");
            }
        }
        Ok(uploaded)
    }

    fn update_ref(&self, request: &PushRequest) -> Result<(), SyncError> {
        let guard = self.locks.acquire(&request.dst)?;
        let result = self.verify_and_write(request);
        if let Err(e) = guard.release() {
            tracing::warn!(dst = %request.dst, error = %e, "failed to release lock");
        }
        result
    }

    fn verify_and_write(&self, request: &PushRequest) -> Result<(), SyncError> {
        let current = self.refs.resolve(&request.dst)?;
        if !request.force && current != request.old_oid {
            tracing::info!(
                dst = %request.dst,
                expected = ?request.old_oid,
                found = ?current,
                "remote ref moved during push"
            );
            return Err(SyncError::NonFastForward);
        }

        match &request.new_oid {
            Some(new) => self.refs.write(&request.dst, new)?,
            None => {
                if !self.refs.delete(&request.dst)? {
                    tracing::debug!(dst = %request.dst, "deleted ref was already absent");
                }
            }
        }
        Ok(())
    }
}
