//! Server-side service contract

use contracts::{MessageSet, RpcResult, ServiceStatus};

use crate::{Request, Response};

/// Operations a collector exposes over RPC
///
/// Implementations are shared across connection tasks and must not block.
pub trait MessageService: Send + Sync + 'static {
    /// Offer a batch; a full intake answers `TryLater`
    fn process(&self, set: MessageSet) -> RpcResult;

    fn status(&self) -> ServiceStatus;

    fn name(&self) -> String;

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// Stop accepting batches; returns the number still pending
    fn shutdown(&self) -> u64;
}

/// Dispatch one decoded request to `service`
pub fn handle_request<S: MessageService + ?Sized>(service: &S, request: Request) -> Response {
    match request {
        Request::Process(set) => Response::Result(service.process(set)),
        Request::Status => Response::Status(service.status()),
        Request::Name => Response::Text(service.name()),
        Request::Version => Response::Text(service.version()),
        Request::Shutdown => Response::Count(service.shutdown()),
    }
}
