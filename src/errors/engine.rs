// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for the engine adapter and its transports.
//!
//! The split mirrors the propagation policy: `TransportError` is raised by a
//! transport implementation and is always fatal to the current engine handle,
//! while `EngineError` covers the full adapter surface including recoverable
//! usage errors (`NotReady`, `Busy`) and engine-reported command failures.

use thiserror::Error;

use crate::protocol::CommandTag;

/// Transport-level failure while exchanging a command with the engine.
///
/// Any of these transitions the adapter into its terminal `Error` state;
/// recovery requires loading a fresh engine instance.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The engine instance trapped, died, or otherwise failed mid-exchange.
    #[error("engine transport fault: {0}")]
    Fault(String),

    /// A command could not be encoded for the wire.
    #[error("failed to encode engine command: {0}")]
    Encode(String),

    /// Bytes came back from the engine but did not decode as a response.
    #[error("failed to decode engine response: {0}")]
    Decode(String),
}

/// Errors surfaced by [`EngineAdapter`](crate::engine::EngineAdapter) operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The adapter has not been armed with `load_engine` yet, or has faulted.
    #[error("engine is not ready")]
    NotReady,

    /// A command is already in flight. The protocol is not pipelined.
    #[error("engine is busy with another command")]
    Busy,

    /// `load_engine` was called on an adapter that already holds an engine.
    #[error("an engine instance is already loaded")]
    AlreadyLoaded,

    /// The response carried a different correlation tag than the request.
    #[error("protocol mismatch: sent '{sent}', response tagged '{received}'")]
    ProtocolMismatch { sent: CommandTag, received: CommandTag },

    /// The response tag matched but the payload variant was wrong for it.
    #[error("protocol mismatch: unexpected response body for '{cmd}'")]
    UnexpectedBody { cmd: CommandTag },

    /// The engine processed the command and reported failure. Recoverable;
    /// the adapter stays `Ready`.
    #[error("engine rejected '{cmd}': {message}")]
    CommandFailed { cmd: CommandTag, message: String },

    /// The transport failed. The adapter is now in its terminal `Error` state.
    #[error(transparent)]
    Fault(#[from] TransportError),
}

impl EngineError {
    /// Whether this error left the engine handle unusable.
    ///
    /// Fatal errors require a full engine reload; everything else leaves the
    /// adapter `Ready` and the caller may retry or continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ProtocolMismatch { .. }
                | EngineError::UnexpectedBody { .. }
                | EngineError::Fault(_)
        )
    }
}
