//! ServerPool - collector endpoints, health tracking and selection

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use contracts::{ClientConfig, SelectionStrategyKind};
use tracing::{debug, info, warn};

use crate::PoolError;

/// Endpoint health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Up,
    /// Recent failure; tried again after the cool-down
    Suspect,
    /// Suspect for longer than `reconnect_time_interval`
    Down,
}

/// Reconnect policy shared by all endpoints of a pool
#[derive(Debug, Clone, Copy)]
pub struct PoolPolicy {
    /// Cool-down after a failure or a `TryLater`
    pub minimum_reconnect_interval: Duration,
    /// Minimum spacing between attempts on a non-Up endpoint
    pub reconnect_interval: Duration,
    /// Suspect -> Down threshold
    pub reconnect_time_interval: Duration,
}

impl PoolPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            minimum_reconnect_interval: config.minimum_reconnect_interval(),
            reconnect_interval: config.reconnect_interval(),
            reconnect_time_interval: config.reconnect_time_interval(),
        }
    }
}

#[derive(Debug)]
struct EndpointState {
    health: Health,
    last_attempt: Option<Instant>,
    last_success: Option<Instant>,
    last_failure: Option<Instant>,
    busy_until: Option<Instant>,
    last_retry: Option<Instant>,
    suspect_since: Option<Instant>,
}

impl EndpointState {
    fn new() -> Self {
        Self {
            health: Health::Up,
            last_attempt: None,
            last_success: None,
            last_failure: None,
            busy_until: None,
            last_retry: None,
            suspect_since: None,
        }
    }

    fn demote_if_stale(&mut self, now: Instant, policy: &PoolPolicy) -> bool {
        let stale = self.health == Health::Suspect
            && self
                .suspect_since
                .is_some_and(|since| now.saturating_duration_since(since) >= policy.reconnect_time_interval);
        if stale {
            self.health = Health::Down;
        }
        stale
    }

    fn is_eligible(&self, now: Instant, policy: &PoolPolicy) -> bool {
        if self.busy_until.is_some_and(|until| now < until) {
            return false;
        }
        match self.health {
            Health::Up => true,
            Health::Suspect | Health::Down => {
                let cooled = self.last_failure.map_or(true, |at| {
                    now.saturating_duration_since(at) >= policy.minimum_reconnect_interval
                });
                let retry_due = self
                    .last_retry
                    .map_or(true, |at| now.saturating_duration_since(at) >= policy.reconnect_interval);
                cooled && retry_due
            }
        }
    }
}

/// One collector address and its health state
///
/// All transitions happen under the endpoint's own lock.
pub struct Endpoint {
    addr: SocketAddr,
    state: Mutex<EndpointState>,
}

impl Endpoint {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: Mutex::new(EndpointState::new()),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn health(&self) -> Health {
        self.lock().health
    }

    fn lock(&self) -> MutexGuard<'_, EndpointState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_eligible(&self, now: Instant, policy: &PoolPolicy) -> bool {
        let mut state = self.lock();
        state.demote_if_stale(now, policy);
        state.is_eligible(now, policy)
    }

    /// Re-check eligibility and reserve the endpoint for one call
    ///
    /// Non-Up endpoints record the attempt so concurrent pickers back off.
    fn claim(&self, now: Instant, policy: &PoolPolicy) -> bool {
        let mut state = self.lock();
        state.demote_if_stale(now, policy);
        if !state.is_eligible(now, policy) {
            return false;
        }
        if state.health != Health::Up {
            state.last_retry = Some(now);
        }
        state.last_attempt = Some(now);
        true
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("addr", &self.addr)
            .field("health", &self.health())
            .finish()
    }
}

/// Introspection view of one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSnapshot {
    pub addr: SocketAddr,
    pub health: Health,
    pub eligible: bool,
    pub busy: bool,
    /// Time since the endpoint was last picked
    pub since_last_attempt: Option<Duration>,
    pub since_last_success: Option<Duration>,
}

/// Chooses among eligible endpoints
pub trait SelectionStrategy: Send + Sync + fmt::Debug {
    /// Index into `candidates` (never empty)
    fn select(&self, candidates: &[Arc<Endpoint>]) -> usize;

    fn name(&self) -> &'static str;
}

/// Rotate over eligible endpoints
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl SelectionStrategy for RoundRobin {
    fn select(&self, candidates: &[Arc<Endpoint>]) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len()
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// First eligible endpoint in configured order
#[derive(Debug, Default)]
pub struct Ordered;

impl SelectionStrategy for Ordered {
    fn select(&self, _candidates: &[Arc<Endpoint>]) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "ordered"
    }
}

fn strategy_for(kind: SelectionStrategyKind) -> Box<dyn SelectionStrategy> {
    match kind {
        SelectionStrategyKind::RoundRobin => Box::new(RoundRobin::default()),
        SelectionStrategyKind::Ordered => Box::new(Ordered),
    }
}

/// Set of collector endpoints shared by all delivery tasks
pub struct ServerPool {
    endpoints: RwLock<Vec<Arc<Endpoint>>>,
    strategy: Box<dyn SelectionStrategy>,
    policy: PoolPolicy,
}

impl ServerPool {
    /// Build a pool; an empty list is rejected
    pub fn new(
        addrs: Vec<SocketAddr>,
        policy: PoolPolicy,
        strategy: Box<dyn SelectionStrategy>,
    ) -> Result<Self, PoolError> {
        if addrs.is_empty() {
            return Err(PoolError::NoServers);
        }
        let mut endpoints: Vec<Arc<Endpoint>> = Vec::with_capacity(addrs.len());
        for addr in addrs {
            if !endpoints.iter().any(|e| e.addr == addr) {
                endpoints.push(Arc::new(Endpoint::new(addr)));
            }
        }
        info!(
            servers = endpoints.len(),
            strategy = strategy.name(),
            "server pool created"
        );
        Ok(Self {
            endpoints: RwLock::new(endpoints),
            strategy,
            policy,
        })
    }

    /// Build from client configuration, resolving every server entry
    pub fn from_config(config: &ClientConfig) -> Result<Self, PoolError> {
        if config.servers.is_empty() {
            return Err(PoolError::NoServers);
        }
        let addrs = config.resolve_servers()?;
        Self::new(addrs, PoolPolicy::from_config(config), strategy_for(config.selection))
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Select an endpoint for one call
    ///
    /// `avoid` is skipped when any other endpoint is eligible.
    pub fn pick(&self, avoid: Option<SocketAddr>) -> Option<Arc<Endpoint>> {
        let now = Instant::now();
        let mut eligible: Vec<Arc<Endpoint>> = self
            .endpoints()
            .into_iter()
            .filter(|e| e.is_eligible(now, &self.policy))
            .collect();

        if let Some(avoid) = avoid {
            if eligible.iter().any(|e| e.addr != avoid) {
                eligible.retain(|e| e.addr != avoid);
            }
        }

        while !eligible.is_empty() {
            let index = self.strategy.select(&eligible).min(eligible.len() - 1);
            let candidate = eligible.remove(index);
            if candidate.claim(now, &self.policy) {
                return Some(candidate);
            }
        }
        None
    }

    /// Whether any endpoint could be picked right now
    pub fn has_eligible(&self) -> bool {
        let now = Instant::now();
        self.endpoints()
            .iter()
            .any(|e| e.is_eligible(now, &self.policy))
    }

    pub fn report_success(&self, endpoint: &Endpoint) {
        let mut state = endpoint.lock();
        if state.health != Health::Up {
            info!(server = %endpoint.addr, "endpoint recovered");
        }
        state.health = Health::Up;
        state.last_success = Some(Instant::now());
        state.last_failure = None;
        state.suspect_since = None;
        state.last_retry = None;
        state.busy_until = None;
    }

    /// Server answered `TryLater`: back off without changing health
    pub fn report_busy(&self, endpoint: &Endpoint) {
        let mut state = endpoint.lock();
        state.busy_until = Some(Instant::now() + self.policy.minimum_reconnect_interval);
        debug!(server = %endpoint.addr, "endpoint busy");
    }

    /// Call failed or answered `OtherError`
    pub fn report_failure(&self, endpoint: &Endpoint) {
        let now = Instant::now();
        let mut state = endpoint.lock();
        state.last_failure = Some(now);
        match state.health {
            Health::Up => {
                state.health = Health::Suspect;
                state.suspect_since = Some(now);
                warn!(server = %endpoint.addr, "endpoint suspect");
            }
            Health::Suspect => {
                if state.demote_if_stale(now, &self.policy) {
                    warn!(server = %endpoint.addr, "endpoint down");
                }
            }
            Health::Down => {}
        }
    }

    /// Add an endpoint; returns false if already present
    pub fn add_server(&self, addr: SocketAddr) -> bool {
        let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        if endpoints.iter().any(|e| e.addr == addr) {
            return false;
        }
        endpoints.push(Arc::new(Endpoint::new(addr)));
        info!(server = %addr, "endpoint added");
        true
    }

    /// Remove an endpoint; in-flight holders keep their `Arc` until they finish
    pub fn remove_server(&self, addr: SocketAddr) -> bool {
        let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        let before = endpoints.len();
        endpoints.retain(|e| e.addr != addr);
        let removed = endpoints.len() != before;
        if removed {
            info!(server = %addr, "endpoint removed");
        }
        removed
    }

    /// Replace the endpoint set, keeping state for addresses that remain
    pub fn update_servers(&self, addrs: Vec<SocketAddr>) -> Result<(), PoolError> {
        if addrs.is_empty() {
            return Err(PoolError::NoServers);
        }
        let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<Arc<Endpoint>> = Vec::with_capacity(addrs.len());
        for addr in addrs {
            if next.iter().any(|e| e.addr == addr) {
                continue;
            }
            let endpoint = endpoints
                .iter()
                .find(|e| e.addr == addr)
                .cloned()
                .unwrap_or_else(|| Arc::new(Endpoint::new(addr)));
            next.push(endpoint);
        }
        info!(servers = next.len(), "endpoint set updated");
        *endpoints = next;
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let now = Instant::now();
        self.endpoints()
            .iter()
            .map(|e| {
                let mut state = e.lock();
                state.demote_if_stale(now, &self.policy);
                EndpointSnapshot {
                    addr: e.addr,
                    health: state.health,
                    eligible: state.is_eligible(now, &self.policy),
                    busy: state.busy_until.is_some_and(|until| now < until),
                    since_last_attempt: state.last_attempt.map(|at| now.saturating_duration_since(at)),
                    since_last_success: state.last_success.map(|at| now.saturating_duration_since(at)),
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every endpoint (used at shutdown)
    pub fn clear(&self) {
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPool")
            .field("endpoints", &self.endpoints())
            .field("strategy", &self.strategy.name())
            .finish()
    }
}
