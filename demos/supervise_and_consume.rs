//! # Example: supervise_and_consume
//!
//! An in-memory broker stands in for a real client library. Its factory
//! refuses the first two connection attempts, so the supervisor backs off and
//! retries. Once a connection is published the listener binds, receives a
//! message, and after an injected fault is rebound to the replacement
//! connection.
//!
//! ## Flow
//! ```text
//! publish ConnectionFactory ──► supervise() ──► create (fails ×2, backoff) ──► Connection published
//!                                                                                   │
//! consumer_pool.register("audit") ─────────────── bind task polls ──────────────────┘
//!                                                     └─► session + consumer ──► deliver "hello"
//! fault ──► unpublish, reconnect ──► listener rebinds ──► deliver "again"
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example supervise_and_consume
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use connvisor::consumers::ListenerSettings;
use connvisor::provider::{
    AckMode, CONNECTION_FACTORY_TYPE, Connection, ConnectionFactory, Consumer, Credentials,
    Destination, FaultHandler, Message, MessageHandler, Session,
};
use connvisor::{
    BackoffPolicy, Config, Coordinator, Event, Filter, Properties, ProviderError, Subscribe,
};
use parking_lot::Mutex;

/// Prints every lifecycle event.
struct Console;

#[async_trait]
impl Subscribe for Console {
    async fn on_event(&self, ev: &Event) {
        println!(
            "[event] {:?} subject={} attempt={:?} reason={}",
            ev.kind,
            ev.subject.as_deref().unwrap_or("-"),
            ev.attempt,
            ev.reason.as_deref().unwrap_or("-"),
        );
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

#[derive(Default)]
struct Broker {
    refusals: AtomicU32,
    connections: Mutex<Vec<Arc<MemoryConnection>>>,
}

#[async_trait]
impl ConnectionFactory for Broker {
    async fn create(
        &self,
        _credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn Connection>, ProviderError> {
        if self.refusals.fetch_add(1, Ordering::SeqCst) < 2 {
            return Err(ProviderError::construction("broker still starting"));
        }
        let connection = Arc::new(MemoryConnection::default());
        self.connections.lock().push(Arc::clone(&connection));
        Ok(connection)
    }
}

type Consumers = Arc<Mutex<Vec<Arc<MemoryConsumer>>>>;

#[derive(Default)]
struct MemoryConnection {
    handler: Mutex<Option<FaultHandler>>,
    consumers: Consumers,
}

impl MemoryConnection {
    fn fault(&self, reason: &str) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(ProviderError::fault(reason));
        }
    }

    async fn deliver(&self, body: &str) {
        let consumers = self.consumers.lock().clone();
        for consumer in consumers {
            let handler = consumer.handler.lock().clone();
            if let Some(handler) = handler {
                let message = Message {
                    body: body.as_bytes().to_vec(),
                    ..Message::default()
                };
                handler.on_message(&message).await;
            }
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn set_client_id(&self, _client_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    fn set_fault_handler(&self, handler: FaultHandler) {
        *self.handler.lock() = Some(handler);
    }

    async fn start(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.consumers.lock().clear();
        Ok(())
    }

    async fn create_session(
        &self,
        _transacted: bool,
        _ack_mode: AckMode,
    ) -> Result<Arc<dyn Session>, ProviderError> {
        Ok(Arc::new(MemorySession {
            consumers: Arc::clone(&self.consumers),
        }))
    }
}

struct MemorySession {
    consumers: Consumers,
}

#[async_trait]
impl Session for MemorySession {
    async fn create_consumer(
        &self,
        destination: &Destination,
        _selector: Option<&str>,
        _no_local: bool,
    ) -> Result<Arc<dyn Consumer>, ProviderError> {
        println!("[broker] consumer on {destination}");
        let consumer = Arc::new(MemoryConsumer::default());
        self.consumers.lock().push(Arc::clone(&consumer));
        Ok(consumer)
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryConsumer {
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
}

impl Consumer for MemoryConsumer {
    fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ProviderError> {
        *self.handler.lock() = Some(handler);
        Ok(())
    }
}

struct Audit;

#[async_trait]
impl MessageHandler for Audit {
    async fn on_message(&self, message: &Message) {
        println!("[audit] received {:?}", String::from_utf8_lossy(&message.body));
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Short backoff and polling so the demo finishes quickly
    let cfg = Config {
        backoff: BackoffPolicy::constant(Duration::from_millis(200)),
        bind_poll: Duration::from_millis(20),
        drain_poll: Duration::from_millis(20),
        ..Config::default()
    };
    let coordinator = Coordinator::builder(cfg)
        .with_subscribers(vec![Arc::new(Console) as Arc<dyn Subscribe>])
        .build();

    // 2. Publish the broker's connection factory
    let broker = Arc::new(Broker::default());
    let _factory = coordinator.registry().publish::<dyn ConnectionFactory>(
        CONNECTION_FACTORY_TYPE,
        Arc::clone(&broker) as Arc<dyn ConnectionFactory>,
        Properties::new().with("name", "memory"),
    );

    // 3. Keep a connection up while the factory exists, and bind a listener to it
    let chain = coordinator.supervise(None, &Properties::new().with("name", "orders"))?;
    let pool = coordinator.consumer_pool("orders", Filter::eq("name", "orders"))?;
    pool.register("audit", ListenerSettings::queue("orders.created"), Arc::new(Audit))?;

    let first = wait_for_connection(&broker, 1).await;
    wait_for(|| !first.consumers.lock().is_empty()).await;
    first.deliver("hello").await;

    // 4. A fault replaces the connection; the listener follows it
    first.fault("socket reset");
    let second = wait_for_connection(&broker, 2).await;
    wait_for(|| !second.consumers.lock().is_empty()).await;
    second.deliver("again").await;

    // 5. Drain listeners, withdraw the connection, flush events
    pool.unregister("audit");
    pool.shutdown_gracefully().await?;
    chain.deactivate().await;
    coordinator.shutdown().await;
    Ok(())
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    while !cond() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_connection(broker: &Broker, n: usize) -> Arc<MemoryConnection> {
    loop {
        if let Some(connection) = broker.connections.lock().get(n - 1).cloned() {
            return connection;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
