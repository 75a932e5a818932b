//! RPC accept loop

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{handle_request, read_frame, write_frame, MessageService, Request, Response, TransportError};
use crate::frame::DEFAULT_MAX_FRAME_BYTES;

/// TCP server speaking the framed request/response protocol
pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_frame_bytes: usize,
}

impl RpcServer {
    /// Bind the listener; port 0 picks an ephemeral port
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        })
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `cancel` fires
    ///
    /// Each connection runs on its own task. A connection task finishes the
    /// request it is handling before observing cancellation.
    pub async fn serve<S>(self, service: Arc<S>, cancel: CancellationToken)
    where
        S: MessageService,
    {
        info!(addr = %self.local_addr, "RPC server listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let service = service.clone();
                        let cancel = cancel.clone();
                        let max = self.max_frame_bytes;
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, peer, service, cancel, max).await {
                                debug!(%peer, error = %e, "connection closed with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }

        info!(addr = %self.local_addr, "RPC server stopped");
    }
}

async fn serve_connection<S: MessageService>(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<S>,
    cancel: CancellationToken,
    max_frame_bytes: usize,
) -> Result<(), TransportError> {
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    debug!(%peer, "connection accepted");

    loop {
        let request: Request = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            frame = read_frame(&mut reader, max_frame_bytes) => match frame? {
                Some(request) => request,
                None => return Ok(()),
            },
        };

        let response: Response = handle_request(service.as_ref(), request);
        write_frame(&mut write_half, &response, max_frame_bytes).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RpcConnection;
    use contracts::{MessageSet, RpcResult, ServiceStatus};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[derive(Default)]
    struct CountingService {
        messages: AtomicU64,
    }

    impl MessageService for CountingService {
        fn process(&self, set: MessageSet) -> RpcResult {
            self.messages.fetch_add(set.len() as u64, Ordering::SeqCst);
            RpcResult::ok()
        }

        fn status(&self) -> ServiceStatus {
            ServiceStatus::Alive
        }

        fn name(&self) -> String {
            "counting".into()
        }

        fn shutdown(&self) -> u64 {
            0
        }
    }

    async fn start() -> (SocketAddr, Arc<CountingService>, CancellationToken) {
        let server = RpcServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = server.local_addr();
        let service = Arc::new(CountingService::default());
        let cancel = CancellationToken::new();
        tokio::spawn(server.serve(service.clone(), cancel.clone()));
        (addr, service, cancel)
    }

    #[tokio::test]
    async fn process_and_metadata_calls() {
        let (addr, service, cancel) = start().await;
        let timeout = Duration::from_secs(2);
        let mut conn = RpcConnection::connect(addr, timeout).await.unwrap();

        let set = MessageSet::builder("app").with_message("a").with_message("b").build();
        let result = conn.process(&set, timeout).await.unwrap();
        assert!(result.is_ok());
        assert_eq!(service.messages.load(Ordering::SeqCst), 2);

        match conn.call(Request::Name, timeout).await.unwrap() {
            Response::Text(name) => assert_eq!(name, "counting"),
            other => panic!("unexpected response: {other:?}"),
        }
        match conn.call(Request::Status, timeout).await.unwrap() {
            Response::Status(status) => assert_eq!(status, ServiceStatus::Alive),
            other => panic!("unexpected response: {other:?}"),
        }

        cancel.cancel();
    }

    #[tokio::test]
    async fn malformed_frame_only_drops_that_connection() {
        let (addr, _service, cancel) = start().await;
        let timeout = Duration::from_secs(2);

        let mut raw = TcpStream::connect(addr).await.unwrap();
        raw.write_u32(3).await.unwrap();
        raw.write_all(&[0xff, 0xff, 0xff]).await.unwrap();
        raw.flush().await.unwrap();

        let mut conn = RpcConnection::connect(addr, timeout).await.unwrap();
        let set = MessageSet::builder("app").with_message("still up").build();
        assert!(conn.process(&set, timeout).await.unwrap().is_ok());

        cancel.cancel();
    }
}
