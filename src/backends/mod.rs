// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Engine transport backends.
//!
//! A backend is anything that implements [`EngineTransport`](crate::traits::EngineTransport)
//! and can therefore sit behind the adapter. There is exactly one production
//! backend — the wasmtime-hosted engine module — plus a scripted stub that
//! only exists in test builds.
//!
//! # Available Backends
//!
//! ## WASM Backend
//! Hosts the external typesetter engine as a sandboxed core WASM module:
//! - **Isolation**: no WASI, no host functions, bounded fuel per command
//! - **Statefulness**: one instance per engine lifetime; its storage persists
//!   across commands, which the virtual file overlay relies on
//!
//! ## Stub Backend (Test-Only)
//! Scripted transport for adapter and queue tests:
//! - canned compile results, manifests, and transport faults
//! - a shared journal recording command order and overlap
//! - **Note**: NOT available in production builds

#[cfg(test)]
pub mod stub;
pub mod wasm;
