// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The engine command protocol.
//!
//! The compute engine is a black box reached through a fixed vocabulary of
//! request/response messages. A request is one [`EngineCommand`]; the matching
//! response is one [`EngineResponse`] whose [`CommandTag`] must equal the
//! request's tag. The protocol is strictly not pipelined: a second command may
//! only be sent after the first response (or a transport fault) has arrived.
//! The adapter in [`crate::engine`] enforces that contract.
//!
//! Commands and responses are closed tagged unions so dispatch is checked
//! exhaustively at compile time rather than falling through a runtime default
//! case. On the wire they are CBOR, which carries artifact and file bytes as
//! raw buffers without any text re-encoding.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Payload of a file write: either source text or raw bytes.
///
/// Binary content (fonts, packages, intermediate artifacts) must round-trip
/// untouched, so the two shapes are kept distinct instead of forcing
/// everything through a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileData {
    Text(String),
    Bytes(Vec<u8>),
}

impl FileData {
    pub fn len(&self) -> usize {
        match self {
            FileData::Text(text) => text.len(),
            FileData::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for FileData {
    fn from(text: &str) -> Self {
        FileData::Text(text.to_string())
    }
}

impl From<String> for FileData {
    fn from(text: String) -> Self {
        FileData::Text(text)
    }
}

impl From<Vec<u8>> for FileData {
    fn from(bytes: Vec<u8>) -> Self {
        FileData::Bytes(bytes)
    }
}

/// A request message to the compute engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum EngineCommand {
    /// Run the typesetter over the staged working directory.
    Compile,
    /// Write a file into the engine's working (in-memory) storage.
    WriteFile { name: String, data: FileData },
    /// Remove a file from working storage.
    RemoveFile { name: String },
    /// Write a file into the engine's persistent package/font cache.
    WriteCacheFile { name: String, data: FileData },
    /// Select the entry file for the next compile.
    SetMainFile { name: String },
    /// Create a directory inside working storage.
    MkDir { path: String },
    /// Drop everything in working storage.
    FlushWorkCache,
    /// Drop the persistent package/font cache.
    FlushTexCache,
    /// Read a file back out of engine storage.
    FetchFile { name: String },
    /// Read the engine's record of resolved and missing remote assets.
    FetchCache,
    /// Point the engine's dependency resolution at a remote distribution.
    SetEndpoint { url: String },
    /// Terminate the engine. One-way: no response is ever produced.
    Grace,
}

impl EngineCommand {
    /// The correlation tag a response to this command must carry.
    pub fn tag(&self) -> CommandTag {
        match self {
            EngineCommand::Compile => CommandTag::Compile,
            EngineCommand::WriteFile { .. } => CommandTag::WriteFile,
            EngineCommand::RemoveFile { .. } => CommandTag::RemoveFile,
            EngineCommand::WriteCacheFile { .. } => CommandTag::WriteCacheFile,
            EngineCommand::SetMainFile { .. } => CommandTag::SetMainFile,
            EngineCommand::MkDir { .. } => CommandTag::MkDir,
            EngineCommand::FlushWorkCache => CommandTag::FlushWorkCache,
            EngineCommand::FlushTexCache => CommandTag::FlushTexCache,
            EngineCommand::FetchFile { .. } => CommandTag::FetchFile,
            EngineCommand::FetchCache => CommandTag::FetchCache,
            EngineCommand::SetEndpoint { .. } => CommandTag::SetEndpoint,
            EngineCommand::Grace => CommandTag::Grace,
        }
    }

    /// `Grace` is fire-and-forget; everything else expects exactly one response.
    pub fn expects_response(&self) -> bool {
        !matches!(self, EngineCommand::Grace)
    }
}

/// Correlation tag identifying which command a response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandTag {
    Compile,
    WriteFile,
    RemoveFile,
    WriteCacheFile,
    SetMainFile,
    MkDir,
    FlushWorkCache,
    FlushTexCache,
    FetchFile,
    FetchCache,
    SetEndpoint,
    Grace,
}

impl CommandTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandTag::Compile => "compile",
            CommandTag::WriteFile => "write_file",
            CommandTag::RemoveFile => "remove_file",
            CommandTag::WriteCacheFile => "write_cache_file",
            CommandTag::SetMainFile => "set_main_file",
            CommandTag::MkDir => "mk_dir",
            CommandTag::FlushWorkCache => "flush_work_cache",
            CommandTag::FlushTexCache => "flush_tex_cache",
            CommandTag::FetchFile => "fetch_file",
            CommandTag::FetchCache => "fetch_cache",
            CommandTag::SetEndpoint => "set_endpoint",
            CommandTag::Grace => "grace",
        }
    }
}

impl Display for CommandTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one compile run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    /// The rendered artifact. Present exactly when `status == 0`.
    pub artifact: Option<Vec<u8>>,
    /// Compiler exit status; zero is success.
    pub status: i32,
    /// Raw compiler log text, fed to the log parser either way.
    pub log: String,
}

impl CompileResult {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// The engine's record of remote-asset resolution, per asset class.
///
/// `*_found` maps a cache key to the path of the local copy inside engine
/// storage; `*_missing` holds keys the engine asked the remote for and got
/// nothing back. Both halves are populated lazily by the engine's own
/// dependency resolution while compiling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    #[serde(default)]
    pub packages_found: BTreeMap<String, String>,
    #[serde(default)]
    pub packages_missing: BTreeSet<String>,
    #[serde(default)]
    pub fonts_found: BTreeMap<String, String>,
    #[serde(default)]
    pub fonts_missing: BTreeSet<String>,
}

/// A response message from the compute engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    /// Correlation tag; must match the command this answers.
    pub cmd: CommandTag,
    pub body: ResponseBody,
}

impl EngineResponse {
    /// Plain acknowledgement for commands with no payload.
    pub fn ok(cmd: CommandTag) -> Self {
        Self { cmd, body: ResponseBody::Ok }
    }

    /// Engine-reported failure for a command it understood but could not do.
    pub fn failed(cmd: CommandTag, message: impl Into<String>) -> Self {
        Self { cmd, body: ResponseBody::Failed { message: message.into() } }
    }
}

/// Payload carried by an [`EngineResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBody {
    /// Success with no payload.
    Ok,
    /// The engine understood the command but could not perform it.
    Failed { message: String },
    /// Answer to `Compile`.
    Compile(CompileResult),
    /// Answer to `FetchFile`.
    FileContent { content: Vec<u8> },
    /// Answer to `FetchCache`.
    CacheManifest(CacheManifest),
}
