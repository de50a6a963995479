// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Published engine lifecycle state, readable from outside the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed, `load_engine` not called yet.
    Init,
    /// Idle and able to accept one command.
    Ready,
    /// One command is in flight.
    Busy,
    /// Terminal: a protocol or transport fault occurred. Requires a fresh
    /// adapter and engine instance.
    Error,
}

impl EngineState {
    fn as_u8(self) -> u8 {
        match self {
            EngineState::Init => 0,
            EngineState::Ready => 1,
            EngineState::Busy => 2,
            EngineState::Error => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => EngineState::Init,
            1 => EngineState::Ready,
            2 => EngineState::Busy,
            _ => EngineState::Error,
        }
    }
}

/// Shared, lock-free view of the adapter's state.
///
/// The queue worker is the only writer; any other task that wants to issue an
/// off-queue engine operation must wait here with [`EngineGate::wait_ready`],
/// which polls with bounded backoff instead of blocking the worker's thread of
/// control.
#[derive(Debug, Clone)]
pub struct EngineGate {
    state: Arc<AtomicU8>,
}

impl EngineGate {
    pub(crate) fn new() -> Self {
        Self { state: Arc::new(AtomicU8::new(EngineState::Init.as_u8())) }
    }

    pub(crate) fn set(&self, state: EngineState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Poll until the engine is `Ready` or the timeout elapses.
    ///
    /// Returns `false` on timeout and also as soon as the engine reaches its
    /// terminal `Error` state, since no amount of waiting helps there.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut backoff = Duration::from_millis(10);
        loop {
            match self.state() {
                EngineState::Ready => return true,
                EngineState::Error => return false,
                EngineState::Init | EngineState::Busy => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(backoff.min(deadline.saturating_duration_since(Instant::now()))).await;
            backoff = (backoff * 2).min(Duration::from_millis(160));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_reports_transitions() {
        let gate = EngineGate::new();
        assert_eq!(gate.state(), EngineState::Init);
        gate.set(EngineState::Ready);
        assert!(gate.is_ready());
        gate.set(EngineState::Busy);
        assert!(!gate.is_ready());
    }

    #[tokio::test]
    async fn wait_ready_times_out_without_a_writer() {
        let gate = EngineGate::new();
        assert!(!gate.wait_ready(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn wait_ready_gives_up_on_terminal_error() {
        let gate = EngineGate::new();
        gate.set(EngineState::Error);
        assert!(!gate.wait_ready(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn wait_ready_observes_a_concurrent_writer() {
        let gate = EngineGate::new();
        let observer = gate.clone();
        let waiter = tokio::spawn(async move { observer.wait_ready(Duration::from_secs(2)).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        gate.set(EngineState::Ready);
        assert!(waiter.await.unwrap());
    }
}
