//! SinkRegistry - the current set of named sinks
//!
//! Readers take an `Arc<SinkSet>` snapshot and never observe a partially
//! built set. A rebuild constructs the new set completely, swaps it in, and
//! only then closes the sinks of the previous set.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use contracts::SinkDescriptor;
use tracing::{info, instrument, warn};

use crate::error::{RegistryError, SinkBuildError, SinkBuildReason};
use crate::factory::SinkFactory;
use crate::handle::SinkHandle;

/// Immutable set of sinks in registration order
#[derive(Debug, Default)]
pub struct SinkSet {
    ordered: Vec<Arc<SinkHandle>>,
    by_name: HashMap<String, Arc<SinkHandle>>,
}

impl SinkSet {
    fn insert(&mut self, handle: SinkHandle) {
        let handle = Arc::new(handle);
        self.by_name.insert(handle.name().to_string(), Arc::clone(&handle));
        self.ordered.push(handle);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SinkHandle>> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Sinks in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SinkHandle>> {
        self.ordered.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.ordered.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Outcome of a (partially) successful build
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Names of the sinks now active, in registration order
    pub built: Vec<String>,
    /// Descriptors that were skipped
    pub errors: Vec<SinkBuildError>,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Owner of all sink instances
pub struct SinkRegistry {
    factory: SinkFactory,
    current: RwLock<Arc<SinkSet>>,
}

impl SinkRegistry {
    /// Empty registry; call `build` to populate it
    pub fn new(factory: SinkFactory) -> Self {
        Self {
            factory,
            current: RwLock::new(Arc::new(SinkSet::default())),
        }
    }

    pub fn factory(&self) -> &SinkFactory {
        &self.factory
    }

    /// Build one sink per descriptor and replace the current set
    ///
    /// Bad descriptors are reported per entry and skipped. If nothing could
    /// be built the previous set stays in place.
    #[instrument(
        name = "sink_registry_build",
        skip(self, descriptors),
        fields(descriptors = descriptors.len())
    )]
    pub async fn build(&self, descriptors: &[SinkDescriptor]) -> Result<BuildReport, RegistryError> {
        let mut next = SinkSet::default();
        let mut errors = Vec::new();

        for descriptor in descriptors {
            if next.contains(&descriptor.name) {
                errors.push(SinkBuildError::new(&descriptor.name, SinkBuildReason::DuplicateName));
                continue;
            }
            match self.factory.build(descriptor) {
                Ok(handle) => next.insert(handle),
                Err(e) => errors.push(e),
            }
        }

        for error in &errors {
            warn!(sink = %error.name, reason = %error.reason, "Sink not built");
        }

        if next.is_empty() {
            return Err(RegistryError::NoSinks { errors });
        }

        let built = next.names();
        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, Arc::new(next))
        };

        for handle in previous.iter() {
            handle.close().await;
        }

        info!(sinks = ?built, failed = errors.len(), "Sink registry built");
        Ok(BuildReport { built, errors })
    }

    /// Current set
    pub fn snapshot(&self) -> Arc<SinkSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<SinkHandle>> {
        self.snapshot().get(name).cloned()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.snapshot().names()
    }

    /// `name:stat_line open|closed` for every sink, in registration order
    pub fn status_snapshot(&self) -> Vec<String> {
        self.snapshot().iter().map(|h| h.status_line()).collect()
    }

    /// Close every current sink; the set stays visible as closed
    #[instrument(name = "sink_registry_close_all", skip(self))]
    pub async fn close_all(&self) {
        let set = self.snapshot();
        for handle in set.iter() {
            handle.close().await;
        }
        info!(sinks = set.len(), "All sinks closed");
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("sinks", &self.sink_names())
            .finish()
    }
}
