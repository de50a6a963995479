// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::protocol::{EngineCommand, EngineResponse};

/// One hop to a compute engine instance.
///
/// A transport owns exactly one engine and exchanges exactly one message pair
/// at a time; `&mut self` makes a second in-flight command unrepresentable,
/// which is how the no-pipelining contract is enforced at the type level.
/// Implementations must not retry or reorder on their own — a failed exchange
/// is fatal to the engine handle and the adapter decides what happens next.
#[async_trait]
pub trait EngineTransport: Send {
    /// Send one command and await its single response.
    async fn roundtrip(&mut self, command: EngineCommand) -> Result<EngineResponse, TransportError>;

    /// Send a fire-and-forget command (`Grace`). No response is awaited.
    async fn send(&mut self, command: EngineCommand) -> Result<(), TransportError>;
}
