// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for a consistent human-readable
//! rendering; the richer ones also implement [`StructuredLog`] to attach
//! their fields to the tracing event instead of flattening everything into
//! the format string.

use std::fmt::Display;

use tracing::Span;

/// A log message that knows how to emit itself with structured fields.
pub trait StructuredLog: Display {
    /// Emit this message at its natural level with structured fields.
    fn log(&self);

    /// Build a span carrying this message's fields.
    fn span(&self, name: &str) -> Span;
}

pub mod engine;
pub mod queue;
pub mod wasm;
