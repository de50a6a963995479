// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Serialized compilation task queue.
//!
//! The compute engine is single-instance and non-reentrant, so this queue is
//! the one gate every compile goes through: a strictly concurrency-1 FIFO
//! drained by a single worker task that owns the engine adapter outright.
//! Serialization comes from that ownership, not from a lock — there is no
//! code path that can reach the engine without going through the worker.
//!
//! Scheduling behavior beyond plain FIFO:
//! - **Supersession**: at most one task per `block_id` is queued at a time;
//!   a new submission for a block replaces the pending one (last-writer-wins).
//! - **Cache short-circuit**: a task whose source hash is already rendered
//!   completes immediately without touching the engine.
//! - **Coalescing**: after every successful render the remaining queue is
//!   re-scanned, and tasks whose content is now cached complete on the spot.
//! - **Cooldown**: a configurable delay separates drains after real compiles
//!   (engine warm-up is not free); cache hits skip it.

mod worker;

#[cfg(test)]
mod integration_tests;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{source_key, RemoteAssetCache, RenderCache};
use crate::engine::{EngineAdapter, EngineGate, EngineState};
use crate::errors::TaskError;
use crate::observability::messages::queue::{QueueAborted, TaskSubmitted, TaskSuperseded};
use crate::observability::messages::StructuredLog;
use crate::overlay::SharedOverlay;

/// Name of the staged entry file inside engine working storage.
pub const MAIN_FILE: &str = "main.tex";

/// What a caller submits: one block of source plus its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    /// Stable identity of the logical block; drives supersession.
    pub block_id: String,
    pub source: String,
    /// Host document path that wants this render, recorded as a cache origin.
    pub origin: String,
    /// Overlay files to `\input` for this task, on top of the auto-use set.
    pub auto_includes: Vec<String>,
}

/// A finished render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub artifact: Vec<u8>,
    pub from_cache: bool,
}

pub type TaskResult = Result<Rendered, TaskError>;

pub(crate) struct Task {
    pub(crate) request: CompileRequest,
    pub(crate) source_hash: String,
    pub(crate) done: oneshot::Sender<TaskResult>,
}

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Pause between drains after a real compile.
    pub cooldown: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self { cooldown: Duration::from_millis(200) }
    }
}

pub(crate) struct QueueShared {
    pub(crate) pending: Mutex<VecDeque<Task>>,
    pub(crate) notify: Notify,
    pub(crate) cancel: CancellationToken,
}

/// Handle to the compile queue. Cloneable-by-Arc through its accessors; the
/// worker runs until [`shutdown`](CompileQueue::shutdown) or an engine fault.
pub struct CompileQueue {
    shared: Arc<QueueShared>,
    gate: EngineGate,
    render_cache: Arc<Mutex<RenderCache>>,
    worker: JoinHandle<()>,
}

impl CompileQueue {
    /// Spawn the worker. The adapter must already be loaded; the queue takes
    /// sole ownership of it from here on.
    pub fn spawn(
        adapter: EngineAdapter,
        overlay: SharedOverlay,
        render_cache: Arc<Mutex<RenderCache>>,
        assets: Arc<Mutex<RemoteAssetCache>>,
        options: QueueOptions,
    ) -> Self {
        let shared = Arc::new(QueueShared {
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            cancel: CancellationToken::new(),
        });
        let gate = adapter.gate();
        let context = worker::WorkerContext {
            shared: Arc::clone(&shared),
            adapter,
            overlay,
            render_cache: Arc::clone(&render_cache),
            assets,
            options,
        };
        let worker = tokio::spawn(worker::run(context));
        Self { shared, gate, render_cache, worker }
    }

    /// Queue one compile request.
    ///
    /// Any pending task with the same `block_id` is removed first and
    /// completed as `Superseded` — only the newest content for a block is
    /// ever compiled. The returned receiver resolves once the task completes,
    /// from cache or from the engine.
    pub async fn submit(&self, request: CompileRequest) -> oneshot::Receiver<TaskResult> {
        let (done, receiver) = oneshot::channel();

        if self.shared.cancel.is_cancelled() || self.gate.state() == EngineState::Error {
            // The worker is gone; parking the task would hang the caller.
            let _ = done.send(Err(TaskError::Aborted));
            return receiver;
        }

        let source_hash = source_key(&request.source);
        let mut pending = self.shared.pending.lock().await;
        if let Some(position) =
            pending.iter().position(|task| task.request.block_id == request.block_id)
        {
            if let Some(old) = pending.remove(position) {
                TaskSuperseded { block_id: &old.request.block_id }.log();
                let _ = old.done.send(Err(TaskError::Superseded));
            }
        }
        TaskSubmitted { block_id: &request.block_id, queue_depth: pending.len() + 1 }.log();
        pending.push_back(Task { request, source_hash, done });
        drop(pending);

        self.shared.notify.notify_one();
        receiver
    }

    /// Drain and discard every pending task without invoking the engine.
    /// The queue is immediately re-armed for new submissions.
    pub async fn abort(&self) {
        let mut pending = self.shared.pending.lock().await;
        let dropped = pending.len();
        while let Some(task) = pending.pop_front() {
            let _ = task.done.send(Err(TaskError::Aborted));
        }
        QueueAborted { dropped }.log();
    }

    pub async fn len(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    /// Readiness view for code that wants off-queue engine access; poll with
    /// [`EngineGate::wait_ready`], never by blocking the worker.
    pub fn engine_gate(&self) -> EngineGate {
        self.gate.clone()
    }

    /// Direct access to the render cache for lookups and invalidation.
    /// Cache operations are plain key-value reads/writes, safe from any
    /// caller.
    pub fn render_cache(&self) -> Arc<Mutex<RenderCache>> {
        Arc::clone(&self.render_cache)
    }

    /// Stop the worker, fail remaining tasks as `Aborted`, and send the
    /// engine its one-way `Grace`.
    pub async fn shutdown(self) {
        self.shared.cancel.cancel();
        self.shared.notify.notify_one();
        let _ = self.worker.await;
    }
}
