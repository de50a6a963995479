// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for WASM engine module loading events.

use std::fmt::{Display, Formatter};

/// Engine module loaded successfully.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ModuleLoaded<'a> {
    pub module_path: &'a str,
    pub size_bytes: usize,
}

impl Display for ModuleLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded engine module: {} ({} bytes)",
            self.module_path, self.size_bytes
        )
    }
}

/// Engine module loading failed.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ModuleLoadFailed<'a> {
    pub module_path: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ModuleLoadFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to load engine module '{}': {}",
            self.module_path, self.error
        )
    }
}
