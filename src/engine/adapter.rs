// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stateful adapter over the engine command protocol.
//!
//! The adapter wraps one [`EngineTransport`] and exposes typed async
//! operations, one per protocol command. It owns the engine lifecycle state
//! machine:
//!
//! ```text
//! Init -[load_engine]-> Ready -[any op]-> Busy -[response]-> Ready
//!                         any transport/protocol fault -> Error (terminal)
//! ```
//!
//! Every operation sends exactly one command and awaits exactly one response;
//! the response's correlation tag must match the command's, and the payload
//! variant must be the one that command produces. Anything else is a
//! `ProtocolMismatch`, not something to be silently ignored. An engine that
//! answers `Failed` is a different case entirely: that is the engine doing its
//! job, the adapter returns `CommandFailed` and stays `Ready`.

use tracing::warn;

use crate::errors::EngineError;
use crate::engine::gate::{EngineGate, EngineState};
use crate::protocol::{
    CacheManifest, CommandTag, CompileResult, EngineCommand, EngineResponse, FileData,
    ResponseBody,
};
use crate::traits::EngineTransport;

pub struct EngineAdapter {
    transport: Box<dyn EngineTransport>,
    state: EngineState,
    gate: EngineGate,
}

impl EngineAdapter {
    /// Wrap a transport. The adapter starts in `Init`; call
    /// [`load_engine`](Self::load_engine) before issuing commands.
    pub fn new(transport: Box<dyn EngineTransport>) -> Self {
        Self { transport, state: EngineState::Init, gate: EngineGate::new() }
    }

    /// Shared readiness view for off-queue pollers.
    pub fn gate(&self) -> EngineGate {
        self.gate.clone()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// Arm the adapter: `Init -> Ready`. At most one engine per adapter; a
    /// second call is a usage error, not a reload.
    pub fn load_engine(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Init => {
                self.transition(EngineState::Ready);
                Ok(())
            }
            EngineState::Error => Err(EngineError::NotReady),
            _ => Err(EngineError::AlreadyLoaded),
        }
    }

    fn transition(&mut self, state: EngineState) {
        self.state = state;
        self.gate.set(state);
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Ready => {
                self.transition(EngineState::Busy);
                Ok(())
            }
            EngineState::Busy => Err(EngineError::Busy),
            EngineState::Init | EngineState::Error => Err(EngineError::NotReady),
        }
    }

    fn fault(&mut self, error: EngineError) -> EngineError {
        warn!(error = %error, "engine handle faulted");
        self.transition(EngineState::Error);
        error
    }

    /// Send one command, await the one matching response.
    ///
    /// This is the single funnel every typed operation goes through, so the
    /// state machine and the correlation check live in exactly one place.
    async fn task(&mut self, command: EngineCommand) -> Result<ResponseBody, EngineError> {
        let sent = command.tag();
        self.begin()?;
        let response: EngineResponse = match self.transport.roundtrip(command).await {
            Ok(response) => response,
            Err(transport) => return Err(self.fault(EngineError::Fault(transport))),
        };
        if response.cmd != sent {
            return Err(self.fault(EngineError::ProtocolMismatch { sent, received: response.cmd }));
        }
        self.transition(EngineState::Ready);
        match response.body {
            ResponseBody::Failed { message } => Err(EngineError::CommandFailed { cmd: sent, message }),
            body => Ok(body),
        }
    }

    /// Expect a bare acknowledgement.
    async fn task_ack(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        let cmd = command.tag();
        match self.task(command).await? {
            ResponseBody::Ok => Ok(()),
            _ => Err(self.fault(EngineError::UnexpectedBody { cmd })),
        }
    }

    /// Run the typesetter. Returns `Ok` for compiler-reported failures too:
    /// a non-zero `status` is a result, not an engine fault, and the adapter
    /// is `Ready` again either way.
    pub async fn compile(&mut self) -> Result<CompileResult, EngineError> {
        match self.task(EngineCommand::Compile).await? {
            ResponseBody::Compile(result) => Ok(result),
            _ => Err(self.fault(EngineError::UnexpectedBody { cmd: CommandTag::Compile })),
        }
    }

    pub async fn write_file(
        &mut self,
        name: impl Into<String>,
        data: impl Into<FileData>,
    ) -> Result<(), EngineError> {
        self.task_ack(EngineCommand::WriteFile { name: name.into(), data: data.into() }).await
    }

    pub async fn remove_file(&mut self, name: impl Into<String>) -> Result<(), EngineError> {
        self.task_ack(EngineCommand::RemoveFile { name: name.into() }).await
    }

    pub async fn write_cache_file(
        &mut self,
        name: impl Into<String>,
        data: impl Into<FileData>,
    ) -> Result<(), EngineError> {
        self.task_ack(EngineCommand::WriteCacheFile { name: name.into(), data: data.into() }).await
    }

    pub async fn set_main_file(&mut self, name: impl Into<String>) -> Result<(), EngineError> {
        self.task_ack(EngineCommand::SetMainFile { name: name.into() }).await
    }

    pub async fn make_directory(&mut self, path: impl Into<String>) -> Result<(), EngineError> {
        self.task_ack(EngineCommand::MkDir { path: path.into() }).await
    }

    pub async fn flush_work_cache(&mut self) -> Result<(), EngineError> {
        self.task_ack(EngineCommand::FlushWorkCache).await
    }

    pub async fn flush_tex_cache(&mut self) -> Result<(), EngineError> {
        self.task_ack(EngineCommand::FlushTexCache).await
    }

    pub async fn fetch_file(&mut self, name: impl Into<String>) -> Result<Vec<u8>, EngineError> {
        match self.task(EngineCommand::FetchFile { name: name.into() }).await? {
            ResponseBody::FileContent { content } => Ok(content),
            _ => Err(self.fault(EngineError::UnexpectedBody { cmd: CommandTag::FetchFile })),
        }
    }

    pub async fn fetch_cache_manifest(&mut self) -> Result<CacheManifest, EngineError> {
        match self.task(EngineCommand::FetchCache).await? {
            ResponseBody::CacheManifest(manifest) => Ok(manifest),
            _ => Err(self.fault(EngineError::UnexpectedBody { cmd: CommandTag::FetchCache })),
        }
    }

    pub async fn set_endpoint(&mut self, url: impl Into<String>) -> Result<(), EngineError> {
        self.task_ack(EngineCommand::SetEndpoint { url: url.into() }).await
    }

    /// One-way `Grace`: terminate the engine. Consumes the adapter since the
    /// handle is meaningless afterwards.
    pub async fn shutdown(mut self) -> Result<(), EngineError> {
        if self.state == EngineState::Busy {
            return Err(EngineError::Busy);
        }
        self.transition(EngineState::Error);
        self.transport
            .send(EngineCommand::Grace)
            .await
            .map_err(EngineError::Fault)
    }
}
