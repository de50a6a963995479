// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Wasmtime-hosted engine transport.
//!
//! The compute engine is a core WASM module exporting a C-style dispatch ABI:
//!
//! ```c
//! uint8_t* dispatch(const uint8_t* cmd_ptr, size_t cmd_len, size_t* out_len);
//! void*    allocate(size_t size);
//! void     deallocate(void* ptr, size_t size);
//! ```
//!
//! Commands go in as CBOR, responses come back as CBOR; binary artifact and
//! file payloads cross the boundary as raw bytes inside that encoding. Unlike
//! a per-job processor, the engine is stateful across commands (files written
//! into its storage must survive until the compile that uses them), so one
//! `Store` and one `Instance` live for the whole engine lifetime. Fuel is
//! topped up per command instead.
//!
//! Sandboxing: no WASI, no host functions at all. The engine sees nothing the
//! host does not explicitly write through the protocol.

use std::path::Path;

use async_trait::async_trait;
use wasmtime::{Config, Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

use crate::backends::wasm::error::{WasmError, WasmResult};
use crate::backends::wasm::loader;
use crate::errors::TransportError;
use crate::protocol::{EngineCommand, EngineResponse};
use crate::traits::EngineTransport;

// 64MB per command; WriteCacheFile can carry whole font files.
const MAX_COMMAND_SIZE: usize = 64 * 1024 * 1024;

// 256MB per response; a compile response carries the artifact plus the log.
const MAX_RESPONSE_SIZE: usize = 256 * 1024 * 1024;

pub struct WasmEngineHost {
    store: Store<()>,
    memory: Memory,
    allocate: TypedFunc<i32, i32>,
    deallocate: TypedFunc<(i32, i32), ()>,
    dispatch: TypedFunc<(i32, i32, i32), i32>,
    fuel_per_command: u64,
}

impl WasmEngineHost {
    /// Load, validate, and instantiate the engine module at `module_path`.
    ///
    /// `fuel_per_command` is the computational budget re-granted before every
    /// command; a compile that exhausts it traps, which surfaces as a
    /// transport fault.
    pub fn new<P: AsRef<Path>>(module_path: P, fuel_per_command: u64) -> WasmResult<Self> {
        let mut config = Config::new();

        // Fuel prevents a runaway compile from wedging the host.
        config.consume_fuel(true);
        // Must stay disabled or long compiles hit spurious "interrupt" traps.
        config.epoch_interruption(false);

        // Single-threaded, single-memory, 32-bit core module only.
        config.wasm_threads(false);
        config.wasm_simd(false);
        config.wasm_relaxed_simd(false);
        config.wasm_multi_memory(false);
        config.wasm_memory64(false);
        config.wasm_component_model(false);

        let engine = Engine::new(&config).map_err(|e| WasmError::EngineError(e.to_string()))?;

        let bytes = loader::load_engine_bytes(module_path)?;
        let module: Module = loader::compile_engine_module(&engine, &bytes)?;

        let mut store = Store::new(&engine, ());
        store.set_fuel(fuel_per_command)?;

        // Deliberately empty linker: the sandbox has no imports to satisfy.
        let linker: Linker<()> = Linker::new(&engine);
        let instance: Instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| WasmError::ModuleError(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| WasmError::ModuleError("engine module must export 'memory'".into()))?;
        let allocate = instance.get_typed_func::<i32, i32>(&mut store, "allocate")?;
        let deallocate = instance.get_typed_func::<(i32, i32), ()>(&mut store, "deallocate")?;
        let dispatch = instance.get_typed_func::<(i32, i32, i32), i32>(&mut store, "dispatch")?;

        Ok(Self { store, memory, allocate, deallocate, dispatch, fuel_per_command })
    }

    /// One raw exchange: payload bytes in, response bytes out.
    fn call(&mut self, payload: &[u8]) -> WasmResult<Vec<u8>> {
        if payload.len() > MAX_COMMAND_SIZE {
            return Err(WasmError::ValidationError(format!(
                "command too large: {} bytes (max: {} bytes)",
                payload.len(),
                MAX_COMMAND_SIZE
            )));
        }

        self.store.set_fuel(self.fuel_per_command)?;

        let cmd_len = payload.len() as i32;
        let cmd_ptr = self.allocate.call(&mut self.store, cmd_len)?;
        if cmd_ptr == 0 {
            return Err(WasmError::InvalidPointer(cmd_ptr));
        }
        self.memory
            .write(&mut self.store, cmd_ptr as usize, payload)
            .map_err(|e| WasmError::MemoryError(e.to_string()))?;

        let out_len_ptr = self.allocate.call(&mut self.store, 4)?;
        if out_len_ptr == 0 {
            return Err(WasmError::InvalidPointer(out_len_ptr));
        }

        let out_ptr = self.dispatch.call(&mut self.store, (cmd_ptr, cmd_len, out_len_ptr))?;
        if out_ptr == 0 {
            return Err(WasmError::InvalidPointer(out_ptr));
        }

        let mut len_buf = [0u8; 4];
        self.memory
            .read(&self.store, out_len_ptr as usize, &mut len_buf)
            .map_err(|e| WasmError::MemoryError(e.to_string()))?;
        let out_len = u32::from_le_bytes(len_buf) as usize;
        if out_len > MAX_RESPONSE_SIZE {
            return Err(WasmError::MemoryError(format!(
                "response too large: {out_len} bytes (max: {MAX_RESPONSE_SIZE} bytes)"
            )));
        }

        let mut output = vec![0u8; out_len];
        self.memory
            .read(&self.store, out_ptr as usize, &mut output)
            .map_err(|e| WasmError::MemoryError(e.to_string()))?;

        self.deallocate.call(&mut self.store, (cmd_ptr, cmd_len))?;
        self.deallocate.call(&mut self.store, (out_len_ptr, 4))?;
        self.deallocate.call(&mut self.store, (out_ptr, out_len as i32))?;

        Ok(output)
    }
}

#[async_trait]
impl EngineTransport for WasmEngineHost {
    async fn roundtrip(&mut self, command: EngineCommand) -> Result<EngineResponse, TransportError> {
        let mut wire = Vec::new();
        ciborium::ser::into_writer(&command, &mut wire)
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        let output = self.call(&wire).map_err(|e| TransportError::Fault(e.to_string()))?;

        ciborium::de::from_reader(output.as_slice())
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn send(&mut self, command: EngineCommand) -> Result<(), TransportError> {
        let mut wire = Vec::new();
        ciborium::ser::into_writer(&command, &mut wire)
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        // One-way: the engine is free to tear itself down without answering,
        // so a trap here is expected and ignored.
        let _ = self.call(&wire);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DUMMY_ENGINE: &str = r#"(module
        (memory (export "memory") 1)
        (func (export "allocate") (param i32) (result i32) i32.const 8)
        (func (export "deallocate") (param i32 i32))
        (func (export "dispatch") (param i32 i32 i32) (result i32) i32.const 0))"#;

    fn write_module(wat: &str) -> NamedTempFile {
        let bytes = wat::parse_str(wat).unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file
    }

    #[test]
    fn instantiates_a_module_with_the_dispatch_abi() {
        let file = write_module(DUMMY_ENGINE);
        WasmEngineHost::new(file.path(), 1_000_000).unwrap();
    }

    #[tokio::test]
    async fn null_dispatch_result_is_a_transport_fault() {
        let file = write_module(DUMMY_ENGINE);
        let mut host = WasmEngineHost::new(file.path(), 1_000_000).unwrap();
        match host.roundtrip(EngineCommand::FlushWorkCache).await {
            Err(TransportError::Fault(detail)) => assert!(detail.contains("Invalid pointer")),
            other => panic!("expected Fault, got {other:?}"),
        }
    }
}
