// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod error;
pub mod loader;
pub mod transport;

pub use error::{WasmError, WasmResult};
pub use transport::WasmEngineHost;
