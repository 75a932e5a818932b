//! Monitoring HTTP endpoints
//!
//! - `GET /healthcheck` 200 while the collector accepts batches and its RPC
//!   port answers, 500 otherwise
//! - `GET /sinkstat` one `name:stat open|closed` line per sink
//! - `GET /intakestat` intake queue counters as JSON

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use dispatcher::SinkRegistry;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::intake::{IntakeQueue, IntakeStats};
use crate::service::CollectorService;

const CONNECT_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared state of the status handlers
#[derive(Clone)]
pub struct StatusState {
    pub service: Arc<CollectorService>,
    pub registry: Arc<SinkRegistry>,
    pub intake: Arc<IntakeQueue>,
    pub rpc_addr: SocketAddr,
}

pub fn status_router(state: StatusState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/sinkstat", get(sinkstat))
        .route("/intakestat", get(intakestat))
        .with_state(state)
}

/// Serve the status routes on `listener` until `cancel` fires
pub async fn serve_status(
    listener: TcpListener,
    state: StatusState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Status server listening");
    axum::serve(listener, status_router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    info!(%addr, "Status server stopped");
    Ok(())
}

async fn healthcheck(State(state): State<StatusState>) -> impl IntoResponse {
    if !state.service.is_alive() {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    let target = connect_target(state.rpc_addr);
    match tokio::time::timeout(CONNECT_CHECK_TIMEOUT, TcpStream::connect(target)).await {
        Ok(Ok(_)) => StatusCode::OK,
        Ok(Err(e)) => {
            debug!(%target, error = %e, "RPC port check failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(_) => {
            debug!(%target, "RPC port check timed out");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn sinkstat(State(state): State<StatusState>) -> impl IntoResponse {
    let mut body = String::new();
    for line in state.registry.status_snapshot() {
        body.push_str(&line);
        body.push('\n');
    }
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
}

async fn intakestat(State(state): State<StatusState>) -> Json<IntakeStats> {
    Json(state.intake.stats())
}

/// A wildcard listener is reached through loopback
fn connect_target(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{MessageSet, SinkDescriptor};
    use dispatcher::SinkFactory;
    use transport::MessageService;

    async fn state(rpc_addr: SocketAddr) -> StatusState {
        let registry = Arc::new(SinkRegistry::new(SinkFactory::default()));
        registry
            .build(&[
                SinkDescriptor::new("sink1", "log"),
                SinkDescriptor::new("default", "log"),
            ])
            .await
            .unwrap();
        let intake = Arc::new(IntakeQueue::new(8));
        StatusState {
            service: Arc::new(CollectorService::new("test", Arc::clone(&intake))),
            registry,
            intake,
            rpc_addr,
        }
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn healthcheck_follows_service_and_rpc_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = state(SocketAddr::from(([0, 0, 0, 0], port))).await;

        let status = healthcheck(State(state.clone())).await.into_response().status();
        assert_eq!(status, StatusCode::OK);

        state.service.shutdown();
        let status = healthcheck(State(state.clone())).await.into_response().status();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        state.registry.close_all().await;
    }

    #[tokio::test]
    async fn healthcheck_fails_when_rpc_port_is_closed() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let state = state(addr).await;

        let status = healthcheck(State(state.clone())).await.into_response().status();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        state.registry.close_all().await;
    }

    #[tokio::test]
    async fn sinkstat_lists_every_sink() {
        let state = state(SocketAddr::from(([127, 0, 0, 1], 1))).await;

        let response = sinkstat(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            body_text(response).await,
            "sink1:logged=0 open\ndefault:logged=0 open\n"
        );

        state.registry.close_all().await;
        let response = sinkstat(State(state)).await.into_response();
        assert_eq!(
            body_text(response).await,
            "sink1:logged=0 closed\ndefault:logged=0 closed\n"
        );
    }

    #[tokio::test]
    async fn intakestat_reports_queue_counters() {
        let state = state(SocketAddr::from(([127, 0, 0, 1], 1))).await;
        state
            .intake
            .offer(MessageSet::builder("app").with_message("m").build())
            .unwrap();

        let response = intakestat(State(state.clone())).await.into_response();
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["depth"], 1);
        assert_eq!(json["capacity"], 8);
        assert_eq!(json["accepted"], 1);
        assert_eq!(json["rejected"], 0);
        state.registry.close_all().await;
    }
}
