//! Collector - wires the RPC server, intake queue, routers and sinks

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use contracts::{resolve_address, CollectorConfig, SinkDescriptor};
use dispatcher::{
    BuildReport, RegistryError, Router, RouterStatsSnapshot, RoutingTable, SinkFactory, SinkRegistry,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use transport::{MessageService, RpcServer};

use crate::error::CollectorError;
use crate::intake::IntakeQueue;
use crate::service::CollectorService;
use crate::status::{serve_status, StatusState};

const ROUTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary returned by `Collector::shutdown`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorReport {
    /// Batches queued when intake stopped
    pub pending_at_stop: u64,
    /// Router tasks aborted after the drain timeout
    pub routers_aborted: usize,
    pub router: RouterStatsSnapshot,
}

enum Lifecycle {
    Running {
        rpc: JoinHandle<()>,
        routers: Vec<JoinHandle<()>>,
        status: Option<JoinHandle<()>>,
    },
    Stopped(CollectorReport),
}

/// A running collector
pub struct Collector {
    name: String,
    rpc_addr: SocketAddr,
    status_addr: Option<SocketAddr>,
    service: Arc<CollectorService>,
    intake: Arc<IntakeQueue>,
    registry: Arc<SinkRegistry>,
    router: Arc<Router>,
    rpc_cancel: CancellationToken,
    router_cancel: CancellationToken,
    status_cancel: CancellationToken,
    build_report: BuildReport,
    lifecycle: Mutex<Lifecycle>,
}

impl Collector {
    /// Build the sinks, then start routers, the RPC listener and the status server
    ///
    /// Fails when no sink can be built or a listener cannot be bound.
    #[instrument(name = "collector_start", skip_all, fields(collector = %config.name))]
    pub async fn start(config: &CollectorConfig, factory: SinkFactory) -> Result<Self, CollectorError> {
        let rpc_bind = resolve_address(&config.rpc_addr)?;
        let status_bind = config.status_addr.as_deref().map(resolve_address).transpose()?;

        let registry = Arc::new(SinkRegistry::new(factory));
        let build_report = registry.build(&config.sinks).await?;

        let intake = Arc::new(IntakeQueue::new(config.intake_capacity));
        let service = Arc::new(CollectorService::new(&config.name, Arc::clone(&intake)));
        let router = Arc::new(Router::new(
            Arc::clone(&registry),
            RoutingTable::from_config(&config.routing),
        ));

        let router_cancel = CancellationToken::new();
        let router_workers = config.router_workers.max(1);
        let routers = (0..router_workers)
            .map(|_| {
                let router = Arc::clone(&router);
                let rx = intake.receiver();
                let cancel = router_cancel.clone();
                tokio::spawn(async move { router.run(rx, cancel).await })
            })
            .collect();

        let server = match RpcServer::bind(rpc_bind).await {
            Ok(server) => server,
            Err(e) => {
                router_cancel.cancel();
                registry.close_all().await;
                return Err(e.into());
            }
        };
        let rpc_addr = server.local_addr();
        let rpc_cancel = CancellationToken::new();
        let rpc = tokio::spawn(server.serve(Arc::clone(&service), rpc_cancel.clone()));

        let status_cancel = CancellationToken::new();
        let (status, status_addr) = match status_bind {
            Some(addr) => {
                let listener = match TcpListener::bind(addr).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        rpc_cancel.cancel();
                        router_cancel.cancel();
                        registry.close_all().await;
                        return Err(e.into());
                    }
                };
                let local = listener.local_addr()?;
                let state = StatusState {
                    service: Arc::clone(&service),
                    registry: Arc::clone(&registry),
                    intake: Arc::clone(&intake),
                    rpc_addr,
                };
                let cancel = status_cancel.clone();
                let handle = tokio::spawn(async move {
                    if let Err(e) = serve_status(listener, state, cancel).await {
                        error!(error = %e, "Status server failed");
                    }
                });
                (Some(handle), Some(local))
            }
            None => (None, None),
        };

        info!(
            %rpc_addr,
            status_addr = ?status_addr,
            sinks = ?build_report.built,
            intake_capacity = intake.capacity(),
            router_workers,
            "Collector started"
        );

        Ok(Self {
            name: config.name.clone(),
            rpc_addr,
            status_addr,
            service,
            intake,
            registry,
            router,
            rpc_cancel,
            router_cancel,
            status_cancel,
            build_report,
            lifecycle: Mutex::new(Lifecycle::Running { rpc, routers, status }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound RPC address (resolves port 0)
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status_addr
    }

    pub fn service(&self) -> &Arc<CollectorService> {
        &self.service
    }

    pub fn intake(&self) -> &IntakeQueue {
        &self.intake
    }

    pub fn registry(&self) -> &SinkRegistry {
        &self.registry
    }

    pub fn router_stats(&self) -> RouterStatsSnapshot {
        self.router.stats()
    }

    /// Sink errors skipped during startup
    pub fn build_report(&self) -> &BuildReport {
        &self.build_report
    }

    /// Replace the sink set while traffic keeps flowing
    pub async fn rebuild_sinks(&self, descriptors: &[SinkDescriptor]) -> Result<BuildReport, RegistryError> {
        self.registry.build(descriptors).await
    }

    /// Stop intake, drain routers into the sinks, close sinks, stop listeners
    ///
    /// Idempotent: later calls return the first report.
    #[instrument(name = "collector_shutdown", skip(self), fields(collector = %self.name))]
    pub async fn shutdown(&self) -> CollectorReport {
        let mut lifecycle = self.lifecycle.lock().await;
        let (rpc, routers, status) =
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped(CollectorReport::default())) {
                Lifecycle::Running { rpc, routers, status } => (rpc, routers, status),
                Lifecycle::Stopped(report) => {
                    *lifecycle = Lifecycle::Stopped(report);
                    return report;
                }
            };

        let pending_at_stop = self.service.shutdown();
        info!(pending = pending_at_stop, "Collector shutting down");

        self.rpc_cancel.cancel();
        if let Err(e) = rpc.await {
            warn!(error = %e, "RPC server task failed");
        }

        let deadline = tokio::time::Instant::now() + ROUTER_DRAIN_TIMEOUT;
        let mut routers_aborted = 0;
        for mut router in routers {
            match tokio::time::timeout_at(deadline, &mut router).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Router task failed"),
                Err(_) => {
                    self.router_cancel.cancel();
                    if router.await.is_err() {
                        warn!("Router task failed after cancel");
                    }
                    routers_aborted += 1;
                }
            }
        }
        if routers_aborted > 0 {
            warn!(routers = routers_aborted, remaining = self.intake.depth(), "Router drain timed out");
        }

        self.registry.close_all().await;

        self.status_cancel.cancel();
        if let Some(status) = status {
            if let Err(e) = status.await {
                warn!(error = %e, "Status server task failed");
            }
        }

        let report = CollectorReport {
            pending_at_stop,
            routers_aborted,
            router: self.router.stats(),
        };
        info!(
            batches = report.router.batches,
            messages = report.router.messages,
            unrouted = report.router.unrouted,
            "Collector stopped"
        );
        *lifecycle = Lifecycle::Stopped(report);
        report
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.rpc_cancel.cancel();
        self.router_cancel.cancel();
        self.status_cancel.cancel();
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("rpc_addr", &self.rpc_addr)
            .field("status_addr", &self.status_addr)
            .field("sinks", &self.registry.sink_names())
            .finish()
    }
}
