//! protocol::session
//!
//! The remote-helper read-eval loop.
//!
//! # Architecture
//!
//! A [`RemoteHelperSession`] owns the local repository bridge, the remote
//! stores, and a bounded worker pool. It processes one command (or one
//! batch) at a time, strictly in order:
//!
//! - `capabilities`, `list`, `option` are answered directly
//! - a `push` batch runs [`PushEngine`] per ref; each ref gets its own
//!   `ok`/`error` line and one ref's failure never stops the others
//! - a `fetch` batch runs [`FetchEngine`] once for all requested objects;
//!   any failure aborts the session
//!
//! Configuration arrives as a [`HelperConfig`] value; the session reads no
//! environment and no global state.

use std::io::{BufRead, Write};
use std::sync::Arc;

use rayon::ThreadPool;
use thiserror::Error;

use crate::core::config::Config;
use crate::core::paths::RemoteLayout;
use crate::core::types::{Oid, RefName};
use crate::git::LocalGitBridge;
use crate::remote::{
    FetchEngine, LockConfig, LockManager, ObjectStore, PushEngine, RefStore, SyncError,
};
use crate::storage::{StorageBackend, WriteMode};

use super::command::{Command, FetchSpec, ProtocolReader, PushSpec};
use super::writer::ProtocolWriter;
use super::ProtocolError;

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Protocol violation or broken pipe.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The remote could not be read at all.
    #[error("cannot read remote: {0}")]
    Remote(#[source] SyncError),

    /// A fetch batch failed.
    #[error("fetch failed: {0}")]
    Fetch(#[source] SyncError),

    /// The worker pool could not be started.
    #[error("failed to start transfer workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Protocol(ProtocolError::Io(err))
    }
}

/// Resolved settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperConfig {
    /// Lock scope and timing
    pub lock: LockConfig,
    /// Transfer worker count
    pub jobs: usize,
    /// Verbosity before git sends `option verbosity`
    pub verbosity: u8,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            lock: LockConfig::default(),
            jobs: 8,
            verbosity: 1,
        }
    }
}

impl HelperConfig {
    /// Resolve from merged configuration files.
    pub fn from_config(config: &Config) -> Self {
        Self {
            lock: config.lock_config(),
            jobs: config.transfer_jobs(),
            verbosity: config.verbosity(),
        }
    }
}

/// Options git set with `option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// `option verbosity <n>`
    pub verbosity: u8,
    /// `option progress <bool>`
    pub progress: bool,
    /// `option dry-run <bool>`
    pub dry_run: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            verbosity: 1,
            progress: false,
            dry_run: false,
        }
    }
}

/// Callback applying a new verbosity level.
pub type VerbosityHook = Box<dyn Fn(u8)>;

/// One helper process worth of protocol state.
pub struct RemoteHelperSession<G: LocalGitBridge> {
    git: G,
    refs: RefStore,
    objects: ObjectStore,
    locks: LockManager,
    pool: ThreadPool,
    options: TransportOptions,
    on_verbosity: Option<VerbosityHook>,
    first_push: bool,
}

impl<G: LocalGitBridge> RemoteHelperSession<G> {
    /// Create a session against the repository at `layout` on `backend`.
    pub fn new(
        git: G,
        backend: Arc<dyn StorageBackend>,
        layout: RemoteLayout,
        config: &HelperConfig,
    ) -> Result<Self, SessionError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs.max(1))
            .thread_name(|i| format!("transfer-{i}"))
            .build()?;

        Ok(Self {
            refs: RefStore::new(backend.clone(), layout.clone()),
            objects: ObjectStore::new(backend.clone(), layout.clone()),
            locks: LockManager::new(backend, layout, config.lock.clone()),
            pool,
            options: TransportOptions {
                verbosity: config.verbosity,
                ..TransportOptions::default()
            },
            on_verbosity: None,
            first_push: true,
            git,
        })
    }

    /// Call `hook` whenever git changes the verbosity.
    pub fn on_verbosity(mut self, hook: impl Fn(u8) + 'static) -> Self {
        self.on_verbosity = Some(Box::new(hook));
        self
    }

    /// Options set so far.
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// The local repository bridge.
    pub fn git(&self) -> &G {
        &self.git
    }

    /// Serve commands from `input` until a blank line or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, output: W) -> Result<(), SessionError> {
        let mut reader = ProtocolReader::new(input);
        let mut writer = ProtocolWriter::new(output);

        loop {
            match reader.read_command()? {
                Some(Command::Empty) | None => {
                    tracing::debug!("session finished");
                    return Ok(());
                }
                Some(Command::Capabilities) => writer.write_capabilities()?,
                Some(Command::List { for_push }) => self.list(&mut writer, for_push)?,
                Some(Command::Option { name, value }) => {
                    self.set_option(&mut writer, &name, &value)?
                }
                Some(Command::Push(first)) => {
                    let batch = reader.read_push_batch(first)?;
                    self.push_batch(&mut writer, &batch)?;
                }
                Some(Command::Fetch(first)) => {
                    let batch = reader.read_fetch_batch(first)?;
                    self.fetch_batch(&mut writer, &batch)?;
                }
            }
        }
    }

    fn list<W: Write>(
        &mut self,
        writer: &mut ProtocolWriter<W>,
        for_push: bool,
    ) -> Result<(), SessionError> {
        let listing = self
            .refs
            .list_all()
            .map_err(|e| SessionError::Remote(e.into()))?;
        tracing::debug!(refs = listing.refs.len(), for_push, "listing remote refs");

        for r in &listing.refs {
            writer.write_ref(&r.target, &r.name)?;
        }
        // A dangling HEAD is not advertised
        if let Some(head) = &listing.head {
            if listing.get(head).is_some() {
                writer.write_symref_head(head)?;
            }
        }
        writer.write_end()?;
        Ok(())
    }

    fn set_option<W: Write>(
        &mut self,
        writer: &mut ProtocolWriter<W>,
        name: &str,
        value: &str,
    ) -> Result<(), SessionError> {
        match name {
            "verbosity" => match value.parse::<u8>() {
                Ok(level) => {
                    self.options.verbosity = level;
                    if let Some(hook) = &self.on_verbosity {
                        hook(level);
                    }
                    writer.write_option_response(true)?;
                }
                Err(_) => writer.write_option_error(&format!("invalid verbosity '{value}'"))?,
            },
            "progress" | "dry-run" => match parse_bool(value) {
                Some(flag) => {
                    if name == "progress" {
                        self.options.progress = flag;
                    } else {
                        self.options.dry_run = flag;
                    }
                    writer.write_option_response(true)?;
                }
                None => writer.write_option_error(&format!("invalid {name} '{value}'"))?,
            },
            _ => {
                tracing::debug!(option = name, "unsupported option");
                writer.write_option_response(false)?;
            }
        }
        Ok(())
    }

    fn push_batch<W: Write>(
        &mut self,
        writer: &mut ProtocolWriter<W>,
        batch: &[PushSpec],
    ) -> Result<(), SessionError> {
        let listing = self
            .refs
            .list_all()
            .map_err(|e| SessionError::Remote(e.into()))?;
        let local_head = self.git.symbolic_head().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "cannot read local HEAD");
            None
        });

        let mut tips = listing.targets();
        let mut head_candidate: Option<RefName> = None;
        let engine = PushEngine::new(&self.git, &self.refs, &self.objects, &self.locks, &self.pool)
            .dry_run(self.options.dry_run)
            .progress(self.options.progress);

        for spec in batch {
            let outcome = engine
                .prepare(&spec.src, &spec.dst, spec.force)
                .and_then(|request| {
                    engine
                        .push(&request, &tips, listing.head.as_ref())
                        .map(|_| request)
                });

            match outcome {
                Ok(request) => {
                    writer.write_push_ok(&spec.dst)?;
                    if let Some(new) = request.new_oid {
                        tips.push(new);
                        let is_local_head = local_head.as_deref() == Some(spec.src.as_str());
                        if request.dst.is_branch_ref()
                            && (head_candidate.is_none() || is_local_head)
                        {
                            head_candidate = Some(request.dst);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(dst = %spec.dst, error = %e, "push rejected");
                    writer.write_push_error(&spec.dst, &e.wire_message())?;
                }
            }
        }

        if std::mem::take(&mut self.first_push) && listing.head.is_none() && !self.options.dry_run {
            self.init_remote_head(head_candidate.as_ref());
        }

        writer.write_end()?;
        Ok(())
    }

    /// Point a HEAD-less remote at `target`.
    fn init_remote_head(&self, target: Option<&RefName>) {
        let Some(target) = target else {
            tracing::debug!("no branch pushed, remote HEAD left unset");
            return;
        };
        match self.refs.write_head(target, WriteMode::CreateOnly) {
            Ok(true) => tracing::info!(head = %target, "set remote HEAD"),
            Ok(false) => tracing::debug!("remote HEAD was set concurrently"),
            Err(e) => tracing::warn!(error = %e, "failed to set remote HEAD"),
        }
    }

    fn fetch_batch<W: Write>(
        &mut self,
        writer: &mut ProtocolWriter<W>,
        batch: &[FetchSpec],
    ) -> Result<(), SessionError> {
        let wants: Vec<Oid> = batch.iter().map(|spec| spec.oid.clone()).collect();
        tracing::debug!(wants = wants.len(), "fetch batch");

        FetchEngine::new(&self.git, &self.objects, &self.pool)
            .progress(self.options.progress)
            .fetch(&wants)
            .map_err(SessionError::Fetch)?;

        writer.write_end()?;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
