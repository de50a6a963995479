// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for WASM engine hosting.
//!
//! Covers loading, validation, instantiation, and per-command execution of the
//! engine module. All errors implement `std::error::Error` via the `thiserror`
//! crate for consistent error handling.

use thiserror::Error;

/// Error type for all WASM engine-hosting operations.
#[derive(Error, Debug)]
pub enum WasmError {
    /// Invalid or malformed WASM binary format.
    #[error("Invalid WASM binary: {0}")]
    InvalidWasmBinary(String),

    /// Memory allocation or access error in WASM linear memory.
    #[error("Memory error: {0}")]
    MemoryError(String),

    /// Invalid pointer value (null or out of bounds).
    #[error("Invalid pointer: {0}")]
    InvalidPointer(i32),

    /// Module compilation or instantiation error.
    #[error("WASM module error: {0}")]
    ModuleError(String),

    /// File I/O error during module loading.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Wasmtime runtime execution error.
    #[error("WASM execution error: {0}")]
    ExecutionError(#[from] wasmtime::Error),

    /// Input validation error (size limits, format, etc.).
    #[error("Invalid input: {0}")]
    ValidationError(String),

    /// Wasmtime engine creation or configuration error.
    #[error("Engine creation error: {0}")]
    EngineError(String),

    /// WASM binary parsing error from wasmparser.
    #[error("WASM parser error: {0}")]
    ParserError(#[from] wasmparser::BinaryReaderError),
}

/// Result type alias for WASM operations.
pub type WasmResult<T> = Result<T, WasmError>;
