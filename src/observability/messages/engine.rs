// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for engine adapter lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Engine loading and readiness
//! * Protocol and transport faults that end an engine handle

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// Engine loaded and ready to accept commands.
///
/// # Log Level
/// `info!` - Important operational event
pub struct EngineLoaded<'a> {
    pub backend: &'a str,
    pub fuel_per_command: u64,
}

impl Display for EngineLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Engine loaded via {} backend, fuel budget {} per command",
            self.backend, self.fuel_per_command
        )
    }
}

impl StructuredLog for EngineLoaded<'_> {
    fn log(&self) {
        tracing::info!(
            backend = self.backend,
            fuel_per_command = self.fuel_per_command,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "engine",
            span_name = name,
            backend = self.backend,
            fuel_per_command = self.fuel_per_command,
        )
    }
}

/// The engine handle hit a terminal protocol or transport fault.
///
/// # Log Level
/// `error!` - The handle is gone; the owner must load a fresh engine
pub struct EngineHandleLost<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for EngineHandleLost<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Engine handle lost, full reload required: {}", self.error)
    }
}

impl StructuredLog for EngineHandleLost<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("engine_fault", span_name = name)
    }
}
