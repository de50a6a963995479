// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scripted engine transport for tests.
//!
//! `StubEngine` answers every command with a plausible default (ack, empty
//! manifest, canned compile success) unless a response or fault has been
//! scripted ahead of time. A shared [`StubJournal`] records every command in
//! order and whether two roundtrips ever overlapped, which is what the queue
//! serialization tests assert on.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::protocol::{
    CacheManifest, CompileResult, EngineCommand, EngineResponse, ResponseBody,
};
use crate::traits::EngineTransport;

enum ScriptStep {
    Respond(EngineResponse),
    Fault(String),
}

struct JournalInner {
    commands: Mutex<Vec<EngineCommand>>,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
    compiles: AtomicUsize,
}

/// Shared record of everything a [`StubEngine`] was asked to do.
#[derive(Clone)]
pub struct StubJournal {
    inner: Arc<JournalInner>,
}

impl StubJournal {
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.inner.commands.lock().unwrap().clone()
    }

    /// Number of `Compile` commands the engine received.
    pub fn compile_count(&self) -> usize {
        self.inner.compiles.load(Ordering::SeqCst)
    }

    /// True if a second command ever arrived while one was still in flight.
    pub fn overlapped(&self) -> bool {
        self.inner.overlapped.load(Ordering::SeqCst)
    }
}

pub struct StubEngine {
    script: VecDeque<ScriptStep>,
    compile_results: VecDeque<CompileResult>,
    manifests: VecDeque<CacheManifest>,
    files: HashMap<String, Vec<u8>>,
    roundtrip_delay: Option<Duration>,
    journal: StubJournal,
}

impl StubEngine {
    pub fn new() -> (Self, StubJournal) {
        let journal = StubJournal {
            inner: Arc::new(JournalInner {
                commands: Mutex::new(Vec::new()),
                in_flight: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
                compiles: AtomicUsize::new(0),
            }),
        };
        let stub = Self {
            script: VecDeque::new(),
            compile_results: VecDeque::new(),
            manifests: VecDeque::new(),
            files: HashMap::new(),
            roundtrip_delay: None,
            journal: journal.clone(),
        };
        (stub, journal)
    }

    /// Queue an exact response for the next command, overriding defaults.
    pub fn push_response(&mut self, response: EngineResponse) {
        self.script.push_back(ScriptStep::Respond(response));
    }

    /// Queue a transport fault for the next command.
    pub fn push_fault(&mut self, detail: impl Into<String>) {
        self.script.push_back(ScriptStep::Fault(detail.into()));
    }

    /// Queue the result of the next `Compile` command.
    pub fn push_compile(&mut self, result: CompileResult) {
        self.compile_results.push_back(result);
    }

    /// Queue the manifest returned by the next `FetchCache` command.
    pub fn push_manifest(&mut self, manifest: CacheManifest) {
        self.manifests.push_back(manifest);
    }

    /// Serve `content` for `FetchFile { name }`.
    pub fn provide_file(&mut self, name: impl Into<String>, content: Vec<u8>) {
        self.files.insert(name.into(), content);
    }

    /// Hold every roundtrip open for `delay`, widening the window in which an
    /// illegal concurrent command would be observed.
    pub fn set_roundtrip_delay(&mut self, delay: Duration) {
        self.roundtrip_delay = Some(delay);
    }

    fn default_response(&mut self, command: &EngineCommand) -> EngineResponse {
        let tag = command.tag();
        match command {
            EngineCommand::Compile => {
                let result = self.compile_results.pop_front().unwrap_or(CompileResult {
                    artifact: Some(b"%PDF-1.5 stub".to_vec()),
                    status: 0,
                    log: "This is a stub engine log.".to_string(),
                });
                EngineResponse { cmd: tag, body: ResponseBody::Compile(result) }
            }
            EngineCommand::FetchCache => {
                let manifest = self.manifests.pop_front().unwrap_or_default();
                EngineResponse { cmd: tag, body: ResponseBody::CacheManifest(manifest) }
            }
            EngineCommand::FetchFile { name } => match self.files.get(name) {
                Some(content) => EngineResponse {
                    cmd: tag,
                    body: ResponseBody::FileContent { content: content.clone() },
                },
                None => EngineResponse::failed(tag, format!("no file '{name}' in engine storage")),
            },
            _ => EngineResponse::ok(tag),
        }
    }
}

#[async_trait]
impl EngineTransport for StubEngine {
    async fn roundtrip(&mut self, command: EngineCommand) -> Result<EngineResponse, TransportError> {
        let inner = Arc::clone(&self.journal.inner);
        if inner.in_flight.swap(true, Ordering::SeqCst) {
            inner.overlapped.store(true, Ordering::SeqCst);
        }
        if matches!(command, EngineCommand::Compile) {
            inner.compiles.fetch_add(1, Ordering::SeqCst);
        }
        inner.commands.lock().unwrap().push(command.clone());

        if let Some(delay) = self.roundtrip_delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = match self.script.pop_front() {
            Some(ScriptStep::Respond(response)) => Ok(response),
            Some(ScriptStep::Fault(detail)) => Err(TransportError::Fault(detail)),
            None => Ok(self.default_response(&command)),
        };

        inner.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn send(&mut self, command: EngineCommand) -> Result<(), TransportError> {
        self.journal.inner.commands.lock().unwrap().push(command);
        Ok(())
    }
}
