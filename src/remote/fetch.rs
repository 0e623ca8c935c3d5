//! remote::fetch
//!
//! Fetch protocol: make the closure of the requested objects local.
//!
//! The walk proceeds in rounds. Each round downloads the current frontier
//! in parallel (every download is rehashed against its id), reads the
//! references out of the downloaded objects, and plans the next frontier
//! from the ones not seen yet and not present locally. Objects already in
//! the local repository are assumed to have their closure present, as git
//! itself assumes.
//!
//! Downloaded objects are handed to git children first, so an object that
//! appears locally always has its references present, even if the fetch
//! fails halfway.
//!
//! # Memory
//!
//! Nothing is written until the last round finishes, so every object a
//! batch downloads is held in memory (decompressed) until then. A clone of
//! an empty repository therefore peaks at roughly the uncompressed size of
//! the whole remote repository.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::core::object::RawObject;
use crate::core::types::Oid;
use crate::git::LocalGitBridge;

use super::error::SyncError;
use super::objects::ObjectStore;
use super::planner::TransferPlanner;

/// Outcome of a fetch batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Objects downloaded and written locally
    pub downloaded: usize,
}

/// Downloads object closures into the local repository.
pub struct FetchEngine<'a, G: LocalGitBridge> {
    git: &'a G,
    objects: &'a ObjectStore,
    pool: &'a ThreadPool,
    progress: bool,
}

impl<'a, G: LocalGitBridge> FetchEngine<'a, G> {
    pub fn new(git: &'a G, objects: &'a ObjectStore, pool: &'a ThreadPool) -> Self {
        Self {
            git,
            objects,
            pool,
            progress: false,
        }
    }

    /// Report download progress at info level.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Fetch the closures of `wants`.
    ///
    /// # Errors
    ///
    /// Any missing, corrupt, or malformed object aborts the whole batch.
    pub fn fetch(&self, wants: &[Oid]) -> Result<FetchSummary, SyncError> {
        let planner = TransferPlanner::new(self.git, self.objects, self.pool);
        let mut seen = HashSet::new();
        let mut downloaded: HashMap<Oid, RawObject> = HashMap::new();
        let mut children: HashMap<Oid, Vec<Oid>> = HashMap::new();

        let roots = planner.plan_fetch(wants, &mut seen)?.download_set;
        let mut frontier = roots.clone();
        let mut round = 0usize;

        while !frontier.is_empty() {
            round += 1;
            tracing::debug!(round, objects = frontier.len(), "downloading frontier");

            let objects = self.objects;
            let batch: Vec<(Oid, RawObject)> = self.pool.install(|| {
                frontier
                    .par_iter()
                    .map(|oid| objects.read(oid).map(|object| (oid.clone(), object)))
                    .collect::<Result<_, _>>()
            })?;

            let mut next = Vec::new();
            for (oid, object) in batch {
                let references = object.references(oid.hash_kind())?;
                next.extend(references.iter().cloned());
                children.insert(oid.clone(), references);
                downloaded.insert(oid, object);
            }

            if self.progress {
                tracing::info!(round, received = downloaded.len(), "downloading objects");
            }
            frontier = planner.plan_fetch(&next, &mut seen)?.download_set;
        }

        let written = self.write_children_first(&roots, &downloaded, &children)?;
        if written > 0 {
            tracing::info!(objects = written, "fetched objects");
        }
        Ok(FetchSummary {
            downloaded: written,
        })
    }

    /// Write every downloaded object reachable from `roots`, references
    /// before referrers.
    fn write_children_first(
        &self,
        roots: &[Oid],
        downloaded: &HashMap<Oid, RawObject>,
        children: &HashMap<Oid, Vec<Oid>>,
    ) -> Result<usize, SyncError> {
        let mut written = HashSet::new();

        for root in roots {
            let mut stack = vec![(root.clone(), false)];
            while let Some((oid, expanded)) = stack.pop() {
                if written.contains(&oid) {
                    continue;
                }
                // Not downloaded means already local
                let Some(object) = downloaded.get(&oid) else {
                    continue;
                };

                if expanded {
                    let actual = self.git.write_object(object)?;
                    if actual != oid {
                        return Err(SyncError::CorruptObject {
                            expected: oid.to_string(),
                            actual: actual.to_string(),
                        });
                    }
                    written.insert(oid);
                    continue;
                }

                stack.push((oid.clone(), true));
                for child in children.get(&oid).into_iter().flatten() {
                    if !written.contains(child) {
                        stack.push((child.clone(), false));
                    }
                }
            }
        }

        Ok(written.len())
    }
}
