// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Virtual file overlay.
//!
//! The overlay keeps a declarative set of auxiliary source files (shared
//! preambles, snippet fragments, figures) in sync with engine working storage,
//! lazily: callers mutate the tracked set whenever they like, and the queue
//! worker calls [`SharedOverlay::sync`] right before each compile. Staleness
//! is the overlay's own business — callers never touch it directly.
//!
//! `sync` on a never-configured overlay does not fail immediately: the first
//! compile often races the host application still collecting its files, so it
//! polls with backoff (never blocking the worker's thread of control) until a
//! caller provides a file set or the configured deadline passes.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use std::sync::Arc;

use crate::engine::EngineAdapter;
use crate::errors::OverlayError;

/// One tracked auxiliary file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    /// Unique name, as the engine will see it in working storage.
    pub name: String,
    pub content: String,
    /// Auto-use files are implicitly included in every compile; the rest are
    /// only pulled in when a task asks for them by name.
    pub auto_use: bool,
}

impl VirtualFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { name: name.into(), content: content.into(), auto_use: false }
    }

    pub fn auto_use(mut self) -> Self {
        self.auto_use = true;
        self
    }
}

/// Whether the tracked set has been written into engine storage since its
/// last change. Mutated only by the overlay itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// No caller has configured a file set yet.
    Unset,
    /// The tracked set changed since the last write-through.
    Outdated,
    /// Engine storage matches the tracked set.
    UpToDate,
    /// The last write-through failed; the next sync retries from scratch.
    Error,
}

pub struct VirtualFileOverlay {
    enabled: bool,
    files: BTreeMap<String, VirtualFile>,
    staleness: Staleness,
    config_timeout: Duration,
}

impl VirtualFileOverlay {
    pub fn new(enabled: bool, config_timeout: Duration) -> Self {
        Self { enabled, files: BTreeMap::new(), staleness: Staleness::Unset, config_timeout }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn staleness(&self) -> Staleness {
        self.staleness
    }

    /// Replace the whole tracked set.
    pub fn set_files(&mut self, files: Vec<VirtualFile>) {
        self.files = files.into_iter().map(|f| (f.name.clone(), f)).collect();
        self.staleness = Staleness::Outdated;
    }

    /// Insert or update one file by name.
    pub fn add_file(&mut self, file: VirtualFile) {
        self.files.insert(file.name.clone(), file);
        self.staleness = Staleness::Outdated;
    }

    /// Mark exactly `names` as auto-use. Every name must already be tracked.
    pub fn set_auto_use(&mut self, names: &[String]) -> Result<(), OverlayError> {
        for name in names {
            if !self.files.contains_key(name) {
                return Err(OverlayError::UnknownFile(name.clone()));
            }
        }
        for file in self.files.values_mut() {
            file.auto_use = names.contains(&file.name);
        }
        Ok(())
    }

    pub fn auto_use_names(&self) -> Vec<String> {
        self.files.values().filter(|f| f.auto_use).map(|f| f.name.clone()).collect()
    }

    pub fn tracked_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Flush engine working storage and write every tracked file.
    async fn write_through(&mut self, adapter: &mut EngineAdapter) -> Result<(), OverlayError> {
        let result: Result<(), crate::errors::EngineError> = async {
            adapter.flush_work_cache().await?;
            for file in self.files.values() {
                adapter.write_file(file.name.clone(), file.content.clone()).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.staleness = Staleness::UpToDate;
                Ok(())
            }
            Err(e) => {
                self.staleness = Staleness::Error;
                Err(OverlayError::Engine(e))
            }
        }
    }
}

/// Clonable handle to the process-wide overlay.
///
/// Callers mutate the tracked set through this handle from any task; the
/// queue worker is the only one that ever drives `sync` and `teardown`, so
/// engine writes keep their single-writer discipline.
#[derive(Clone)]
pub struct SharedOverlay {
    inner: Arc<Mutex<VirtualFileOverlay>>,
}

impl SharedOverlay {
    pub fn new(overlay: VirtualFileOverlay) -> Self {
        Self { inner: Arc::new(Mutex::new(overlay)) }
    }

    pub async fn set_files(&self, files: Vec<VirtualFile>) {
        self.inner.lock().await.set_files(files);
    }

    pub async fn add_file(&self, file: VirtualFile) {
        self.inner.lock().await.add_file(file);
    }

    pub async fn set_auto_use(&self, names: &[String]) -> Result<(), OverlayError> {
        self.inner.lock().await.set_auto_use(names)
    }

    pub async fn auto_use_names(&self) -> Vec<String> {
        self.inner.lock().await.auto_use_names()
    }

    pub async fn staleness(&self) -> Staleness {
        self.inner.lock().await.staleness()
    }

    /// Bring engine storage up to date with the tracked set.
    ///
    /// Returns `Ok(false)` when nothing had to be written (disabled overlay or
    /// already up to date), `Ok(true)` after a write-through. A write failure
    /// marks the overlay `Error` and propagates; the caller must not proceed
    /// to compile.
    pub async fn sync(&self, adapter: &mut EngineAdapter) -> Result<bool, OverlayError> {
        let (deadline, mut backoff) = {
            let guard = self.inner.lock().await;
            (Instant::now() + guard.config_timeout, Duration::from_millis(25))
        };

        loop {
            {
                let mut guard = self.inner.lock().await;
                if !guard.enabled {
                    return Ok(false);
                }
                match guard.staleness {
                    Staleness::UpToDate => return Ok(false),
                    Staleness::Outdated | Staleness::Error => {
                        guard.write_through(adapter).await?;
                        return Ok(true);
                    }
                    // Never configured: fall through to the backoff wait, with
                    // the lock released so a caller can actually configure it.
                    Staleness::Unset => {}
                }
            }
            if Instant::now() >= deadline {
                let timeout = self.inner.lock().await.config_timeout;
                return Err(OverlayError::ConfigTimeout(timeout));
            }
            sleep(backoff.min(deadline.saturating_duration_since(Instant::now()))).await;
            backoff = (backoff * 2).min(Duration::from_millis(200));
        }
    }

    /// Disable the overlay: forget the tracked set and flush engine working
    /// storage so no stale file lingers for the next user.
    pub async fn teardown(&self, adapter: &mut EngineAdapter) -> Result<(), OverlayError> {
        let mut guard = self.inner.lock().await;
        guard.files.clear();
        guard.enabled = false;
        guard.staleness = Staleness::Unset;
        adapter.flush_work_cache().await.map_err(OverlayError::Engine)
    }
}
