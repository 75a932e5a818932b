//! Scripted in-memory transport for tests

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{MessageSet, RpcResult};
use transport::TransportError;

use crate::transport::Transport;

/// How the fake collector at one address answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    Accept,
    TryLater,
    /// Answer `OtherError`
    Fail,
    /// Connection refused
    Unreachable,
}

#[derive(Debug, Default)]
struct MockState {
    default: Option<MockBehavior>,
    behaviors: HashMap<SocketAddr, MockBehavior>,
    scripts: HashMap<SocketAddr, VecDeque<MockBehavior>>,
    calls: Vec<SocketAddr>,
    delivered: Vec<(SocketAddr, MessageSet)>,
}

/// `Transport` answering from per-address scripts
///
/// Resolution order per call: pending script step, fixed behavior, default
/// (`Accept` unless changed).
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    latency: Option<Duration>,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_default(&self, behavior: MockBehavior) {
        self.lock().default = Some(behavior);
    }

    pub fn set_behavior(&self, addr: SocketAddr, behavior: MockBehavior) {
        self.lock().behaviors.insert(addr, behavior);
    }

    /// Queue one-shot answers for `addr`
    pub fn script(&self, addr: SocketAddr, steps: impl IntoIterator<Item = MockBehavior>) {
        self.lock().scripts.entry(addr).or_default().extend(steps);
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn calls_to(&self, addr: SocketAddr) -> usize {
        self.lock().calls.iter().filter(|a| **a == addr).count()
    }

    /// Batches answered `Accept`, in acceptance order
    pub fn delivered(&self) -> Vec<MessageSet> {
        self.lock().delivered.iter().map(|(_, set)| set.clone()).collect()
    }

    pub fn delivered_to(&self, addr: SocketAddr) -> usize {
        self.lock().delivered.iter().filter(|(a, _)| *a == addr).count()
    }

    pub fn delivered_messages(&self) -> usize {
        self.lock().delivered.iter().map(|(_, set)| set.len()).sum()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn next_behavior(&self, addr: SocketAddr, set: &MessageSet) -> MockBehavior {
        let mut state = self.lock();
        state.calls.push(addr);
        let behavior = state
            .scripts
            .get_mut(&addr)
            .and_then(VecDeque::pop_front)
            .or_else(|| state.behaviors.get(&addr).copied())
            .or(state.default)
            .unwrap_or(MockBehavior::Accept);
        if behavior == MockBehavior::Accept {
            state.delivered.push((addr, set.clone()));
        }
        behavior
    }
}

impl Transport for MockTransport {
    async fn call(&self, addr: SocketAddr, set: &MessageSet) -> Result<RpcResult, TransportError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.next_behavior(addr, set) {
            MockBehavior::Accept => Ok(RpcResult::ok()),
            MockBehavior::TryLater => Ok(RpcResult::try_later("mock: busy")),
            MockBehavior::Fail => Ok(RpcResult::other_error("mock: failure")),
            MockBehavior::Unreachable => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock: unreachable",
            ))),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
