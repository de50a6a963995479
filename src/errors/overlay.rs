// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use thiserror::Error;

use super::EngineError;

/// Errors raised by the virtual file overlay.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// A named file is not part of the tracked set.
    #[error("overlay does not track a file named '{0}'")]
    UnknownFile(String),

    /// `sync` waited for the overlay to be configured but no caller ever
    /// provided a file set within the deadline.
    #[error("overlay was never configured within {0:?}")]
    ConfigTimeout(Duration),

    /// Writing the tracked files into engine storage failed. The overlay is
    /// now marked `Error` and the current task must not proceed to compile.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
