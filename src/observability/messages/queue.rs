// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for compile queue scheduling and cache events.
//!
//! This module contains message types for logging events related to:
//! * Task submission, supersession, and abort
//! * Render cache hits and stores
//! * Compile completion and cooldown

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// A task entered the queue.
///
/// # Log Level
/// `debug!` - High-frequency scheduling event
pub struct TaskSubmitted<'a> {
    pub block_id: &'a str,
    pub queue_depth: usize,
}

impl Display for TaskSubmitted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Queued block '{}', depth {}", self.block_id, self.queue_depth)
    }
}

impl StructuredLog for TaskSubmitted<'_> {
    fn log(&self) {
        tracing::debug!(block_id = self.block_id, queue_depth = self.queue_depth, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("task", span_name = name, block_id = self.block_id)
    }
}

/// A queued task was replaced by a newer submission for the same block.
///
/// # Log Level
/// `debug!` - Expected behavior under rapid edits
pub struct TaskSuperseded<'a> {
    pub block_id: &'a str,
}

impl Display for TaskSuperseded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Superseded pending task for block '{}'", self.block_id)
    }
}

impl StructuredLog for TaskSuperseded<'_> {
    fn log(&self) {
        tracing::debug!(block_id = self.block_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("supersede", span_name = name, block_id = self.block_id)
    }
}

/// A task resolved from the render cache without touching the engine.
///
/// # Log Level
/// `debug!` - The common case once a document stabilizes
pub struct RenderCacheHit<'a> {
    pub block_id: &'a str,
    pub source_hash: &'a str,
}

impl Display for RenderCacheHit<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Render cache hit for block '{}' ({})", self.block_id, self.source_hash)
    }
}

impl StructuredLog for RenderCacheHit<'_> {
    fn log(&self) {
        tracing::debug!(block_id = self.block_id, source_hash = self.source_hash, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("cache_hit", span_name = name, block_id = self.block_id)
    }
}

/// A real compile finished (either way).
///
/// # Log Level
/// `info!` - Important operational event
pub struct CompileFinished<'a> {
    pub block_id: &'a str,
    pub status: i32,
    pub duration_ms: u128,
}

impl Display for CompileFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Compile of block '{}' finished with status {} in {}ms",
            self.block_id, self.status, self.duration_ms
        )
    }
}

impl StructuredLog for CompileFinished<'_> {
    fn log(&self) {
        tracing::info!(
            block_id = self.block_id,
            status = self.status,
            duration_ms = self.duration_ms as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("compile", span_name = name, block_id = self.block_id)
    }
}

/// The queue was aborted and its pending tasks discarded.
///
/// # Log Level
/// `info!` - Deliberate, caller-initiated event
pub struct QueueAborted {
    pub dropped: usize,
}

impl Display for QueueAborted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Queue aborted, {} pending task(s) dropped", self.dropped)
    }
}

impl StructuredLog for QueueAborted {
    fn log(&self) {
        tracing::info!(dropped = self.dropped, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("abort", span_name = name, dropped = self.dropped)
    }
}

/// A newly resolved remote asset was copied into the host cache.
///
/// # Log Level
/// `debug!` - Bookkeeping detail
pub struct AssetFetched<'a> {
    pub class: &'a str,
    pub key: &'a str,
}

impl Display for AssetFetched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Fetched {} asset '{}' into host cache", self.class, self.key)
    }
}

impl StructuredLog for AssetFetched<'_> {
    fn log(&self) {
        tracing::debug!(class = self.class, key = self.key, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("asset", span_name = name, class = self.class, key = self.key)
    }
}
