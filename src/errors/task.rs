// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::log::ClassifiedLog;

use super::{CacheError, EngineError, OverlayError};

/// Terminal outcome of a queued compile task that did not produce an artifact.
///
/// The variants follow the propagation policy: `Compile` is a recoverable,
/// per-task failure carrying classified diagnostics; `Overlay` and `Cache`
/// abort only the affected task; `Engine` with a fatal inner error means the
/// whole engine handle is gone and the owner must reload.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The compiler ran and reported a non-zero status. Diagnostics are the
    /// classified view of the raw log.
    #[error("compilation failed with status {status}")]
    Compile { status: i32, diagnostics: ClassifiedLog },

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("engine error: {0}")]
    Engine(EngineError),

    /// A newer submission for the same block replaced this task before it ran.
    #[error("superseded by a newer submission for the same block")]
    Superseded,

    /// `abort` drained the queue before this task ran.
    #[error("queue aborted before the task ran")]
    Aborted,
}
