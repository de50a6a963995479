// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Engine module loading and validation.
//!
//! Reads the engine binary from disk, checks the size cap, performs a
//! spec-compliant parse with wasmparser to confirm it is a classic core
//! module, and enforces the sandbox rules: no WASI imports, and the full
//! dispatch ABI (`memory`, `allocate`, `deallocate`, `dispatch`) exported.

use std::path::Path;

use wasmparser::{Encoding, Parser, Payload};
use wasmtime::{Engine, ExternType, Module};

use crate::backends::wasm::error::{WasmError, WasmResult};
use crate::observability::messages::wasm::{ModuleLoadFailed, ModuleLoaded};

/// Maximum allowed size for the engine binary (128 MB). Typesetter engines
/// ship their format files inside the module, so they run large.
const MAX_ENGINE_SIZE: usize = 128 * 1024 * 1024;

/// Exports every engine module must provide.
pub const REQUIRED_EXPORTS: [&str; 4] = ["memory", "allocate", "deallocate", "dispatch"];

/// Loads the engine binary from a file and validates its size.
pub fn load_engine_bytes<P: AsRef<Path>>(path: P) -> WasmResult<Vec<u8>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        let error = WasmError::IoError(e);
        tracing::error!(
            "{}",
            ModuleLoadFailed { module_path: &path.display().to_string(), error: &error }
        );
        error
    })?;

    if bytes.len() > MAX_ENGINE_SIZE {
        let error = WasmError::ValidationError(format!(
            "engine binary too large: {} bytes (max: {} bytes)",
            bytes.len(),
            MAX_ENGINE_SIZE
        ));
        tracing::error!(
            "{}",
            ModuleLoadFailed { module_path: &path.display().to_string(), error: &error }
        );
        return Err(error);
    }

    tracing::info!(
        "{}",
        ModuleLoaded { module_path: &path.display().to_string(), size_bytes: bytes.len() }
    );

    Ok(bytes)
}

/// Spec-compliant check that `bytes` is a classic core WASM module.
///
/// Component Model binaries are rejected: the engine ABI is C-style exports
/// over linear memory, nothing else.
pub fn ensure_core_module(bytes: &[u8]) -> WasmResult<()> {
    let parser = Parser::new(0);
    let mut encoding = None;
    for payload in parser.parse_all(bytes) {
        if let Payload::Version { encoding: enc, .. } = payload? {
            encoding = Some(enc);
            break;
        }
    }
    match encoding {
        Some(Encoding::Module) => Ok(()),
        Some(Encoding::Component) => Err(WasmError::InvalidWasmBinary(
            "Component Model binary; the engine must be a core WASM module".to_string(),
        )),
        None => Err(WasmError::InvalidWasmBinary("missing version header".to_string())),
    }
}

/// Compile the engine module and enforce the sandbox contract.
pub fn compile_engine_module(engine: &Engine, bytes: &[u8]) -> WasmResult<Module> {
    ensure_core_module(bytes)?;

    let module = Module::new(engine, bytes).map_err(|e| WasmError::ModuleError(e.to_string()))?;

    // No ambient system access: the engine sees only what the host writes in.
    for import in module.imports() {
        if import.module().starts_with("wasi") {
            return Err(WasmError::ValidationError(format!(
                "WASI imports are not allowed: {}",
                import.module()
            )));
        }
    }

    for required in REQUIRED_EXPORTS {
        let found = module.exports().any(|export| {
            export.name() == required
                && match required {
                    "memory" => matches!(export.ty(), ExternType::Memory(_)),
                    _ => matches!(export.ty(), ExternType::Func(_)),
                }
        });
        if !found {
            return Err(WasmError::ValidationError(format!(
                "engine module must export '{required}'"
            )));
        }
    }

    Ok(module)
}
