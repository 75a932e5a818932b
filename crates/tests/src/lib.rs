//! # Integration Tests
//!
//! 基于真实 TCP 连接的端到端测试。
//!
//! 覆盖：
//! - 客户端对接 stub collector（负载分散、重试、restore 与 drain）
//! - 客户端对接完整 collector（路由、sink 顺序、状态接口）
//! - 同一配置文件驱动两端

#[cfg(test)]
mod support {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use contracts::{
        ClientConfig, ContractError, DataSink, Message, MessageSet, RpcResult, ServiceStatus,
        SinkDescriptor,
    };
    use dispatcher::SinkFactory;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;
    use transport::{MessageService, RpcServer};

    /// Stub collector that accepts or answers `TryLater`
    #[derive(Default)]
    pub struct StubService {
        try_later: AtomicBool,
        /// Every call, answered or not
        calls: AtomicU64,
        batches: AtomicU64,
        messages: AtomicU64,
        payloads: Mutex<Vec<String>>,
    }

    impl StubService {
        pub fn set_try_later(&self, on: bool) {
            self.try_later.store(on, Ordering::SeqCst);
        }

        pub fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn batches(&self) -> u64 {
            self.batches.load(Ordering::SeqCst)
        }

        pub fn messages(&self) -> u64 {
            self.messages.load(Ordering::SeqCst)
        }

        pub fn payloads(&self) -> Vec<String> {
            self.payloads.lock().unwrap().clone()
        }
    }

    impl MessageService for StubService {
        fn process(&self, set: MessageSet) -> RpcResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.try_later.load(Ordering::SeqCst) {
                return RpcResult::try_later("busy");
            }
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.messages.fetch_add(set.len() as u64, Ordering::SeqCst);
            self.payloads
                .lock()
                .unwrap()
                .extend(set.messages().iter().map(payload_text));
            RpcResult::ok()
        }

        fn status(&self) -> ServiceStatus {
            ServiceStatus::Alive
        }

        fn name(&self) -> String {
            "stub".to_string()
        }

        fn shutdown(&self) -> u64 {
            0
        }
    }

    /// A stub collector listening on a real port
    pub struct TestServer {
        pub addr: SocketAddr,
        pub service: Arc<StubService>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    impl TestServer {
        pub async fn start() -> Self {
            Self::start_on("127.0.0.1:0".parse().unwrap()).await
        }

        pub async fn start_on(addr: SocketAddr) -> Self {
            let server = RpcServer::bind(addr).await.unwrap();
            let addr = server.local_addr();
            let service = Arc::new(StubService::default());
            let cancel = CancellationToken::new();
            let task = tokio::spawn(server.serve(Arc::clone(&service), cancel.clone()));
            Self {
                addr,
                service,
                cancel,
                task,
            }
        }

        pub async fn stop(self) {
            self.cancel.cancel();
            self.task.await.unwrap();
        }
    }

    /// Reserve a port nobody listens on
    pub async fn free_addr() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    /// Client tuned for fast tests
    pub fn client_config(app: &str, servers: &[SocketAddr]) -> ClientConfig {
        let mut config = ClientConfig::new(app, servers.iter().map(ToString::to_string).collect());
        config.worker_count = 1;
        config.minimum_reconnect_interval_ms = 50;
        config.reconnect_interval_ms = 50;
        config.restore_interval_ms = 100;
        config.connect_timeout_ms = 500;
        config.response_timeout_ms = 1_000;
        config.shutdown_timeout_ms = 5_000;
        config
    }

    pub fn batch(app: &str, prefix: &str, count: usize) -> MessageSet {
        let mut builder = MessageSet::builder(app);
        for i in 0..count {
            builder.push(format!("{prefix}-{i}"));
        }
        builder.build()
    }

    pub fn payload_text(message: &Message) -> String {
        String::from_utf8_lossy(message.payload()).into_owned()
    }

    /// Poll `condition` every 20ms until it holds or `limit` elapses
    pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    pub type Recorded = Arc<Mutex<HashMap<String, Vec<String>>>>;

    /// Sink that records payloads under its own name
    pub struct RecordingSink {
        name: String,
        seen: Recorded,
        count: u64,
    }

    impl DataSink for RecordingSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn stat_line(&self) -> String {
            format!("recorded={}", self.count)
        }

        async fn write(&mut self, message: &Message) -> Result<(), ContractError> {
            self.seen
                .lock()
                .unwrap()
                .entry(self.name.clone())
                .or_default()
                .push(payload_text(message));
            self.count += 1;
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    /// Default factory plus a `recording` type writing into `seen`
    pub fn recording_factory(seen: &Recorded) -> SinkFactory {
        let mut factory = SinkFactory::default();
        let seen = Arc::clone(seen);
        factory.register("recording", move |d: &SinkDescriptor| {
            Ok(RecordingSink {
                name: d.name.clone(),
                seen: Arc::clone(&seen),
                count: 0,
            })
        });
        factory
    }

    /// Minimal HTTP/1.1 GET returning (status code, body)
    pub async fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();

        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap();
        (status, body.to_string())
    }
}

#[cfg(test)]
mod client_e2e {
    use std::sync::Arc;
    use std::time::Duration;

    use client::AsyncClient;

    use crate::support::*;

    #[tokio::test]
    async fn single_batch_reaches_the_only_server() {
        let server = TestServer::start().await;
        let client = AsyncClient::with_tcp(&client_config("app", &[server.addr])).unwrap();

        client.send(batch("app", "m", 3)).unwrap();
        let report = client.shutdown().await;

        assert_eq!(report.counters.sent, 3);
        assert_eq!(report.counters.retried, 0);
        assert_eq!(report.counters.restored, 0);
        assert_eq!(server.service.messages(), 3);
        assert_eq!(server.service.payloads(), vec!["m-0", "m-1", "m-2"]);
        server.stop().await;
    }

    #[tokio::test]
    async fn batches_spread_over_all_servers() {
        let servers = [TestServer::start().await, TestServer::start().await, TestServer::start().await];
        let addrs: Vec<_> = servers.iter().map(|s| s.addr).collect();
        let mut config = client_config("app", &addrs);
        config.worker_count = 3;
        let client = AsyncClient::with_tcp(&config).unwrap();

        for i in 0..30 {
            client.send(batch("app", &format!("b{i}"), 2)).unwrap();
        }
        let report = client.shutdown().await;

        assert_eq!(report.counters.sent, 60);
        assert_eq!(report.pending_batches, 0);
        let total: u64 = servers.iter().map(|s| s.service.batches()).sum();
        assert_eq!(total, 30);
        for server in &servers {
            assert!(server.service.batches() > 0, "server {} got nothing", server.addr);
        }
        for server in servers {
            server.stop().await;
        }
    }

    #[tokio::test]
    async fn busy_server_pushes_batches_to_the_other() {
        let busy = TestServer::start().await;
        busy.service.set_try_later(true);
        let healthy = TestServer::start().await;
        let client = AsyncClient::with_tcp(&client_config("app", &[busy.addr, healthy.addr])).unwrap();

        for i in 0..5 {
            client.send(batch("app", &format!("b{i}"), 1)).unwrap();
        }
        let report = client.shutdown().await;

        assert_eq!(report.counters.sent, 5);
        assert!(report.counters.retried >= 1);
        assert_eq!(report.counters.restored, 0);
        assert_eq!(busy.service.batches(), 0);
        assert_eq!(healthy.service.batches(), 5);
        busy.stop().await;
        healthy.stop().await;
    }

    #[tokio::test]
    async fn retries_are_bounded_then_batch_is_restored() {
        let servers = [TestServer::start().await, TestServer::start().await, TestServer::start().await];
        for server in &servers {
            server.service.set_try_later(true);
        }
        let addrs: Vec<_> = servers.iter().map(|s| s.addr).collect();
        let mut config = client_config("app", &addrs);
        config.max_retries = 2;
        // a busy server stays out of rotation for the rest of the test
        config.minimum_reconnect_interval_ms = 60_000;
        config.restore_interval_ms = 60_000;
        let client = AsyncClient::with_tcp(&config).unwrap();

        client.send(batch("app", "m", 4)).unwrap();
        assert!(wait_until(Duration::from_secs(5), || client.restored_message_count() == 4).await);

        let calls: u64 = servers.iter().map(|s| s.service.calls()).sum();
        assert_eq!(calls, 3);
        for server in &servers {
            assert_eq!(server.service.calls(), 1, "server {} called twice", server.addr);
        }
        assert_eq!(client.retried_count(), 2);
        assert_eq!(client.sent_message_count(), 0);
        assert_eq!(client.restore_store().len(), 1);

        let report = client.shutdown().await;
        assert_eq!(report.drained, 0);
        assert_eq!(report.pending_batches, 1);
        assert_eq!(report.pending_messages, 4);
        let calls: u64 = servers.iter().map(|s| s.service.calls()).sum();
        assert_eq!(calls, 3);
        for server in servers {
            server.stop().await;
        }
    }

    #[tokio::test]
    async fn busy_server_recovers_and_takes_the_restored_batch() {
        let busy = TestServer::start().await;
        busy.service.set_try_later(true);
        let mut config = client_config("app", &[busy.addr]);
        config.max_retries = 2;
        config.minimum_reconnect_interval_ms = 10;
        config.restore_interval_ms = 60_000;
        let client = AsyncClient::with_tcp(&config).unwrap();

        client.send(batch("app", "m", 4)).unwrap();
        assert!(wait_until(Duration::from_secs(5), || client.restored_message_count() == 4).await);
        assert_eq!(client.sent_message_count(), 0);

        busy.service.set_try_later(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = client.shutdown().await;
        assert_eq!(report.drained, 1);
        assert_eq!(report.counters.sent, 4);
        assert_eq!(busy.service.payloads(), vec!["m-0", "m-1", "m-2", "m-3"]);
        busy.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_share_one_client() {
        let servers = [TestServer::start().await, TestServer::start().await];
        let addrs: Vec<_> = servers.iter().map(|s| s.addr).collect();
        let mut config = client_config("app", &addrs);
        config.worker_count = 4;
        config.queue_capacity = 1_000;
        let client = Arc::new(AsyncClient::with_tcp(&config).unwrap());

        const PRODUCERS: usize = 8;
        const BATCHES: usize = 25;
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    for b in 0..BATCHES {
                        client.send(batch("app", &format!("p{p}-b{b}"), 3)).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        let report = client.shutdown().await;

        let expected = (PRODUCERS * BATCHES * 3) as u64;
        assert_eq!(report.counters.sent, expected);
        assert_eq!(report.pending_batches, 0);
        let received: u64 = servers.iter().map(|s| s.service.messages()).sum();
        assert_eq!(received, expected);
        let mut payloads: Vec<String> = servers.iter().flat_map(|s| s.service.payloads()).collect();
        payloads.sort();
        payloads.dedup();
        assert_eq!(payloads.len() as u64, expected);
        for server in servers {
            server.stop().await;
        }
    }

    #[tokio::test]
    async fn unreachable_collector_then_recovery_drains_restore_store() {
        let addr = free_addr().await;
        let client = AsyncClient::with_tcp(&client_config("app", &[addr])).unwrap();

        client.send(batch("app", "m", 600)).unwrap();
        assert!(wait_until(Duration::from_secs(5), || client.restored_message_count() == 600).await);
        assert_eq!(client.sent_message_count(), 0);

        let server = TestServer::start_on(addr).await;
        assert!(
            wait_until(Duration::from_secs(10), || client.sent_message_count() == 600).await,
            "replay never delivered"
        );
        assert!(client.restore_store().is_empty());

        let report = client.shutdown().await;
        assert_eq!(report.counters.restored, 600);
        assert_eq!(report.pending_batches, 0);
        assert_eq!(server.service.messages(), 600);
        server.stop().await;
    }

    #[tokio::test]
    async fn restore_directory_survives_client_restart() {
        let dir = tempfile::tempdir().unwrap();
        let addr = free_addr().await;
        let mut config = client_config("app", &[addr]);
        config.restore_dir = Some(dir.path().to_path_buf());
        config.shutdown_timeout_ms = 500;

        let first = AsyncClient::with_tcp(&config).unwrap();
        first.send(batch("app", "kept", 2)).unwrap();
        assert!(wait_until(Duration::from_secs(5), || first.restored_message_count() == 2).await);
        let report = first.shutdown().await;
        assert_eq!(report.pending_batches, 1);
        drop(first);

        let server = TestServer::start_on(addr).await;
        let second = AsyncClient::with_tcp(&config).unwrap();
        assert!(wait_until(Duration::from_secs(10), || server.service.messages() == 2).await);
        let report = second.shutdown().await;

        assert_eq!(report.pending_batches, 0);
        assert_eq!(server.service.payloads(), vec!["kept-0", "kept-1"]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        server.stop().await;
    }
}

#[cfg(test)]
mod collector_e2e {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use client::AsyncClient;
    use collector::{Collector, CollectorService, IntakeQueue};
    use contracts::{CollectorConfig, ResultCode, SinkDescriptor};
    use tokio_util::sync::CancellationToken;
    use transport::{MessageService, RpcConnection, RpcServer};

    use crate::support::*;

    fn collector_config(sinks: Vec<SinkDescriptor>) -> CollectorConfig {
        let mut config = CollectorConfig::new(sinks);
        config.rpc_addr = "127.0.0.1:0".into();
        config.status_addr = Some("127.0.0.1:0".into());
        config
    }

    #[tokio::test]
    async fn messages_are_routed_in_order() {
        let seen = Recorded::default();
        let mut config = collector_config(vec![
            SinkDescriptor::new("sink1", "recording"),
            SinkDescriptor::new("default", "recording"),
        ]);
        config.routing.routes = HashMap::from([("audit".to_string(), vec!["sink1".to_string()])]);
        let collector = Collector::start(&config, recording_factory(&seen)).await.unwrap();

        let audit = AsyncClient::with_tcp(&client_config("audit", &[collector.rpc_addr()])).unwrap();
        let web = AsyncClient::with_tcp(&client_config("web", &[collector.rpc_addr()])).unwrap();
        audit.send(batch("audit", "a", 50)).unwrap();
        web.send(batch("web", "w", 5)).unwrap();
        assert_eq!(audit.shutdown().await.counters.sent, 50);
        assert_eq!(web.shutdown().await.counters.sent, 5);

        let report = collector.shutdown().await;
        assert_eq!(report.router.messages, 55);
        assert_eq!(report.router.unrouted, 0);

        let seen = seen.lock().unwrap();
        let expected: Vec<String> = (0..50).map(|i| format!("a-{i}")).collect();
        assert_eq!(seen["sink1"], expected);
        assert_eq!(seen["default"], vec!["w-0", "w-1", "w-2", "w-3", "w-4"]);
    }

    #[tokio::test]
    async fn status_endpoints_report_sinks_and_health() {
        let seen = Recorded::default();
        let collector = Collector::start(
            &collector_config(vec![
                SinkDescriptor::new("sink1", "recording"),
                SinkDescriptor::new("default", "log"),
            ]),
            recording_factory(&seen),
        )
        .await
        .unwrap();
        let status = collector.status_addr().unwrap();

        let (code, body) = http_get(status, "/sinkstat").await;
        assert_eq!(code, 200);
        assert_eq!(body, "sink1:recorded=0 open\ndefault:logged=0 open\n");

        let (code, _) = http_get(status, "/healthcheck").await;
        assert_eq!(code, 200);

        let (code, body) = http_get(status, "/intakestat").await;
        assert_eq!(code, 200);
        assert!(body.contains("\"capacity\":1000"), "{body}");

        collector.service().shutdown();
        let (code, _) = http_get(status, "/healthcheck").await;
        assert_eq!(code, 500);

        collector.shutdown().await;
    }

    #[tokio::test]
    async fn full_intake_answers_try_later_and_client_restores() {
        let intake = Arc::new(IntakeQueue::new(1));
        let service = Arc::new(CollectorService::new("tiny", Arc::clone(&intake)));
        let server = RpcServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = server.local_addr();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.serve(Arc::clone(&service), cancel.clone()));

        let timeout = Duration::from_secs(1);
        let mut conn = RpcConnection::connect(addr, timeout).await.unwrap();
        assert_eq!(conn.process(&batch("app", "x", 1), timeout).await.unwrap().code, ResultCode::Ok);
        assert_eq!(
            conn.process(&batch("app", "y", 1), timeout).await.unwrap().code,
            ResultCode::TryLater
        );

        let mut config = client_config("app", &[addr]);
        config.max_retries = 1;
        config.minimum_reconnect_interval_ms = 10;
        config.restore_interval_ms = 60_000;
        config.shutdown_timeout_ms = 500;
        let client = AsyncClient::with_tcp(&config).unwrap();
        client.send(batch("app", "z", 3)).unwrap();
        assert!(wait_until(Duration::from_secs(5), || client.restored_message_count() == 3).await);

        let stats = intake.stats();
        assert_eq!(stats.accepted, 1);
        assert!(stats.rejected >= 2);
        assert_eq!(client.shutdown().await.pending_batches, 1);

        cancel.cancel();
        task.await.unwrap();
    }
}

#[cfg(test)]
mod config_e2e {
    use std::sync::Arc;
    use std::sync::Mutex;

    use client::AsyncClient;
    use collector::Collector;
    use config_loader::{ConfigFormat, ConfigLoader};

    use crate::support::*;

    const CONFIG: &str = r#"
[client]
app = "billing"
servers = ["127.0.0.1:1"]
max_retries = 3
worker_count = 1
restore_interval_ms = 100

[collector]
rpc_addr = "127.0.0.1:0"
intake_capacity = 16

[collector.routing]
default_sink = "default"

[collector.routing.routes]
billing = ["ledger", "default"]

[[collector.sinks]]
name = "ledger"
sink_type = "recording"

[[collector.sinks]]
name = "default"
sink_type = "recording"
"#;

    #[tokio::test]
    async fn one_file_configures_both_sides() {
        let blueprint = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let mut collector_config = blueprint.collector.unwrap();
        collector_config.status_addr = None;
        let seen: Recorded = Arc::new(Mutex::new(Default::default()));
        let collector = Collector::start(&collector_config, recording_factory(&seen)).await.unwrap();
        assert_eq!(collector.status_addr(), None);

        let mut client_config = blueprint.client.unwrap();
        client_config.servers = vec![collector.rpc_addr().to_string()];
        let client = AsyncClient::with_tcp(&client_config).unwrap();
        client.send(batch("billing", "inv", 3)).unwrap();
        assert_eq!(client.shutdown().await.counters.sent, 3);

        collector.shutdown().await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen["ledger"], vec!["inv-0", "inv-1", "inv-2"]);
        assert_eq!(seen["default"], vec!["inv-0", "inv-1", "inv-2"]);
    }
}
