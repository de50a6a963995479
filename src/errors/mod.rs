// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod cache;
mod engine;
mod overlay;
mod task;

pub use cache::CacheError;
pub use engine::{EngineError, TransportError};
pub use overlay::OverlayError;
pub use task::TaskError;
