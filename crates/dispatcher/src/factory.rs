//! SinkFactory - explicit mapping from sink type name to constructor

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use contracts::{DataSink, SinkDescriptor};
use tracing::instrument;

use crate::error::{SinkBuildError, SinkBuildReason};
use crate::handle::SinkHandle;
use crate::sinks::{FileSink, LogSink, NetworkSink};

type Constructor = Arc<dyn Fn(&SinkDescriptor) -> Result<SinkHandle, SinkBuildReason> + Send + Sync>;

/// Resolves `SinkDescriptor::sink_type` to a running `SinkHandle`
#[derive(Clone)]
pub struct SinkFactory {
    constructors: HashMap<String, Constructor>,
}

impl Default for SinkFactory {
    /// Factory knowing the built-in `log`, `file` and `network` types
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register("log", |d: &SinkDescriptor| Ok(LogSink::new(&d.name)));
        factory.register("file", |d: &SinkDescriptor| {
            FileSink::from_params(&d.name, &d.params).map_err(|e| e.to_string())
        });
        factory.register("network", |d: &SinkDescriptor| NetworkSink::from_params(&d.name, &d.params));
        factory
    }
}

impl SinkFactory {
    /// Factory with no known types
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for `sink_type`
    ///
    /// The constructor receives the full descriptor; an `Err` becomes
    /// `SinkBuildReason::InvalidParams`.
    pub fn register<S, F>(&mut self, sink_type: impl Into<String>, constructor: F)
    where
        S: DataSink + 'static,
        F: Fn(&SinkDescriptor) -> Result<S, String> + Send + Sync + 'static,
    {
        let constructor: Constructor = Arc::new(move |descriptor: &SinkDescriptor| {
            let sink = constructor(descriptor).map_err(SinkBuildReason::InvalidParams)?;
            Ok(SinkHandle::spawn(sink, descriptor.queue_capacity))
        });
        self.constructors.insert(sink_type.into(), constructor);
    }

    pub fn supports(&self, sink_type: &str) -> bool {
        self.constructors.contains_key(sink_type)
    }

    /// Known type names, sorted
    pub fn sink_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Build and start the sink described by `descriptor`
    #[instrument(
        name = "sink_factory_build",
        skip(self, descriptor),
        fields(sink = %descriptor.name, sink_type = %descriptor.sink_type)
    )]
    pub fn build(&self, descriptor: &SinkDescriptor) -> Result<SinkHandle, SinkBuildError> {
        if descriptor.queue_capacity == 0 {
            return Err(SinkBuildError::invalid_params(
                &descriptor.name,
                "queue_capacity must be greater than 0",
            ));
        }
        let constructor = self.constructors.get(&descriptor.sink_type).ok_or_else(|| {
            SinkBuildError::new(
                &descriptor.name,
                SinkBuildReason::UnknownType(descriptor.sink_type.clone()),
            )
        })?;
        constructor(descriptor).map_err(|reason| SinkBuildError::new(&descriptor.name, reason))
    }
}

impl fmt::Debug for SinkFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkFactory")
            .field("sink_types", &self.sink_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_known_types() {
        let factory = SinkFactory::default();
        assert_eq!(factory.sink_types(), vec!["file", "log", "network"]);

        let handle = factory.build(&SinkDescriptor::new("default", "log")).unwrap();
        assert_eq!(handle.name(), "default");
        assert!(handle.is_open());
        handle.close().await;
    }

    #[tokio::test]
    async fn unknown_type_and_bad_params_are_reported() {
        let factory = SinkFactory::default();

        let err = factory.build(&SinkDescriptor::new("q", "kafka")).unwrap_err();
        assert_eq!(err.name, "q");
        assert_eq!(err.reason, SinkBuildReason::UnknownType("kafka".into()));

        let err = factory
            .build(&SinkDescriptor::new("udp", "network").with_param("addr", "nowhere"))
            .unwrap_err();
        assert!(matches!(err.reason, SinkBuildReason::InvalidParams(_)));

        let err = factory
            .build(&SinkDescriptor::new("zero", "log").with_queue_capacity(0))
            .unwrap_err();
        assert!(matches!(err.reason, SinkBuildReason::InvalidParams(_)));
    }

    #[tokio::test]
    async fn custom_types_can_be_registered() {
        let mut factory = SinkFactory::empty();
        assert!(!factory.supports("log"));

        factory.register("console", |d: &SinkDescriptor| Ok(LogSink::new(&d.name)));
        let handle = factory.build(&SinkDescriptor::new("out", "console")).unwrap();
        assert_eq!(handle.name(), "out");
        handle.close().await;
    }
}
