//! remote::planner
//!
//! Decides which objects cross the wire.
//!
//! Push planning starts from the local approximation of "already on the
//! remote" (everything reachable from remote ref tips that exist locally)
//! and then probes the object store for each remaining candidate, so a
//! partially completed earlier push is resumed rather than repeated.
//!
//! Fetch planning walks one frontier at a time: the caller downloads the
//! frontier, extracts references, and asks for the next frontier until it
//! is empty.

use std::collections::HashSet;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::core::types::Oid;
use crate::git::LocalGitBridge;

use super::error::SyncError;
use super::objects::ObjectStore;

/// Objects to move for one push or fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    /// Objects missing from the remote
    pub upload_set: Vec<Oid>,
    /// Objects missing locally
    pub download_set: Vec<Oid>,
}

/// Computes transfer plans.
pub struct TransferPlanner<'a, G: LocalGitBridge> {
    git: &'a G,
    objects: &'a ObjectStore,
    pool: &'a ThreadPool,
}

impl<'a, G: LocalGitBridge> TransferPlanner<'a, G> {
    pub fn new(git: &'a G, objects: &'a ObjectStore, pool: &'a ThreadPool) -> Self {
        Self { git, objects, pool }
    }

    /// Objects reachable from `new` that the remote lacks.
    ///
    /// `remote_tips` are the current targets of remote refs; tips unknown
    /// locally are ignored by the local walk.
    pub fn plan_push(&self, new: &Oid, remote_tips: &[Oid]) -> Result<TransferPlan, SyncError> {
        let candidates = self.git.reachable_objects(new, remote_tips)?;
        let total = candidates.len();

        let objects = self.objects;
        let probed: Vec<(Oid, bool)> = self.pool.install(|| {
            candidates
                .into_par_iter()
                .map(|oid| objects.exists(&oid).map(|present| (oid, present)))
                .collect::<Result<_, _>>()
        })?;

        let upload_set: Vec<Oid> = probed
            .into_iter()
            .filter_map(|(oid, present)| (!present).then_some(oid))
            .collect();

        tracing::debug!(
            new = %new,
            candidates = total,
            missing = upload_set.len(),
            "planned push"
        );

        Ok(TransferPlan {
            upload_set,
            download_set: Vec::new(),
        })
    }

    /// The next fetch frontier: `candidates` not yet seen in this batch and
    /// not present locally. Every returned id is added to `seen`.
    pub fn plan_fetch(
        &self,
        candidates: &[Oid],
        seen: &mut HashSet<Oid>,
    ) -> Result<TransferPlan, SyncError> {
        let mut download_set = Vec::new();
        for oid in candidates {
            if seen.contains(oid) {
                continue;
            }
            seen.insert(oid.clone());
            if !self.git.object_exists(oid)? {
                download_set.push(oid.clone());
            }
        }
        Ok(TransferPlan {
            upload_set: Vec::new(),
            download_set,
        })
    }
}
