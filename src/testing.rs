//! In-memory broker doubles for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ProviderError;
use crate::factory::{
    ConfigLoader, ConnectionFactoryFactory, FactoryKind, PooledConnectionFactoryFactory,
    StringEncryptor,
};
use crate::properties::Properties;
use crate::provider::{
    AckMode, Connection, ConnectionFactory, ConnectionMetadata, Consumer, Credentials, Destination,
    FaultHandler, Message, MessageHandler, Session,
};

/// Factory whose next outcomes can be scripted.
#[derive(Default)]
pub struct MockFactory {
    script: Mutex<VecDeque<ProviderError>>,
    attempts: Mutex<Vec<tokio::time::Instant>>,
    created: Mutex<Vec<Arc<MockConnection>>>,
    credentials: Mutex<Vec<Option<Credentials>>>,
    /// Connections created from now on fail `create_session`.
    pub fail_sessions: AtomicBool,
    /// Connections created from now on fail `start`.
    pub fail_start: AtomicBool,
    /// Connections created from now on take this long to accept a client id.
    pub client_id_delay: Mutex<Option<Duration>>,
    /// The next connection created reports a fault as soon as its handler is installed.
    pub fault_on_install: AtomicBool,
    pub closed: AtomicBool,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `n` create calls fail.
    pub fn fail_next(&self, n: usize) {
        let mut script = self.script.lock();
        for i in 0..n {
            script.push_back(ProviderError::construction(format!("broker unreachable ({i})")));
        }
    }

    pub fn attempts(&self) -> Vec<tokio::time::Instant> {
        self.attempts.lock().clone()
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.created.lock().clone()
    }

    pub fn last(&self) -> Option<Arc<MockConnection>> {
        self.created.lock().last().cloned()
    }

    pub fn credentials(&self) -> Vec<Option<Credentials>> {
        self.credentials.lock().clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn Connection>, ProviderError> {
        self.attempts.lock().push(tokio::time::Instant::now());
        self.credentials.lock().push(credentials.cloned());
        if let Some(err) = self.script.lock().pop_front() {
            return Err(err);
        }
        let mut created = self.created.lock();
        let conn = Arc::new(MockConnection::new(created.len() + 1));
        conn.fail_sessions
            .store(self.fail_sessions.load(Ordering::SeqCst), Ordering::SeqCst);
        conn.fail_start
            .store(self.fail_start.load(Ordering::SeqCst), Ordering::SeqCst);
        conn.fault_on_install
            .store(self.fault_on_install.swap(false, Ordering::SeqCst), Ordering::SeqCst);
        *conn.client_id_delay.lock() = *self.client_id_delay.lock();
        created.push(Arc::clone(&conn));
        Ok(conn)
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connection that records every lifecycle call.
#[derive(Default)]
pub struct MockConnection {
    pub id: usize,
    pub client_id: Mutex<Option<String>>,
    handler: Mutex<Option<FaultHandler>>,
    pub ops: Mutex<Vec<&'static str>>,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_sessions: AtomicBool,
    pub fault_on_install: AtomicBool,
    pub client_id_delay: Mutex<Option<Duration>>,
    pub closed: AtomicBool,
    sessions: Mutex<Vec<Arc<MockSession>>>,
}

impl MockConnection {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Fires the installed fault handler, as the client library would.
    pub fn fault(&self, reason: &str) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(ProviderError::fault(reason));
        }
    }

    pub fn has_fault_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn set_client_id(&self, client_id: &str) -> Result<(), ProviderError> {
        self.ops.lock().push("client_id");
        let delay = *self.client_id_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *self.client_id.lock() = Some(client_id.to_string());
        Ok(())
    }

    fn set_fault_handler(&self, handler: FaultHandler) {
        self.ops.lock().push("fault_handler");
        *self.handler.lock() = Some(handler);
        if self.fault_on_install.swap(false, Ordering::SeqCst) {
            self.fault("dropped during handshake");
        }
    }

    async fn start(&self) -> Result<(), ProviderError> {
        self.ops.lock().push("start");
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ProviderError::fault("start refused"));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.ops.lock().push("stop");
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ProviderError::fault("stop refused"));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.ops.lock().push("close");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_session(
        &self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> Result<Arc<dyn Session>, ProviderError> {
        if self.is_closed() {
            return Err(ProviderError::Closed);
        }
        let session = Arc::new(MockSession {
            transacted,
            ack_mode,
            fail_consumers: self.fail_sessions.load(Ordering::SeqCst),
            ..MockSession::default()
        });
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }

    fn metadata(&self) -> Option<ConnectionMetadata> {
        Some(ConnectionMetadata {
            provider_name: "mock".into(),
            provider_version: "1.0".into(),
            protocol_version: "1.1".into(),
        })
    }
}

#[derive(Default)]
pub struct MockSession {
    pub transacted: bool,
    pub ack_mode: AckMode,
    fail_consumers: bool,
    pub closed: AtomicBool,
    pub close_calls: AtomicUsize,
    consumers: Mutex<Vec<Arc<MockConsumer>>>,
}

impl MockSession {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn consumers(&self) -> Vec<Arc<MockConsumer>> {
        self.consumers.lock().clone()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn create_consumer(
        &self,
        destination: &Destination,
        selector: Option<&str>,
        no_local: bool,
    ) -> Result<Arc<dyn Consumer>, ProviderError> {
        if self.fail_consumers {
            return Err(ProviderError::construction("destination rejected"));
        }
        let consumer = Arc::new(MockConsumer {
            destination: destination.clone(),
            selector: selector.map(str::to_string),
            no_local,
            handler: Mutex::new(None),
        });
        self.consumers.lock().push(Arc::clone(&consumer));
        Ok(consumer)
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockConsumer {
    pub destination: Destination,
    pub selector: Option<String>,
    pub no_local: bool,
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
}

impl MockConsumer {
    /// Delivers `message` to the attached handler; false if none is attached.
    pub async fn deliver(&self, message: &Message) -> bool {
        let handler = self.handler.lock().clone();
        match handler {
            Some(h) => {
                h.on_message(message).await;
                true
            }
            None => false,
        }
    }
}

impl Consumer for MockConsumer {
    fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ProviderError> {
        *self.handler.lock() = Some(handler);
        Ok(())
    }
}

/// Handler that counts deliveries.
#[derive(Default)]
pub struct CountingHandler {
    pub received: AtomicUsize,
}

#[async_trait]
impl MessageHandler for CountingHandler {
    async fn on_message(&self, _message: &Message) {
        self.received.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory factory recording every request it serves.
#[derive(Default)]
pub struct MockFactoryFactory {
    requests: Mutex<Vec<(FactoryKind, Properties)>>,
    created: Mutex<Vec<Arc<MockFactory>>>,
    pub fail: AtomicBool,
}

impl MockFactoryFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> Vec<(FactoryKind, Properties)> {
        self.requests.lock().clone()
    }

    pub fn last(&self) -> Option<Arc<MockFactory>> {
        self.created.lock().last().cloned()
    }

    fn serve(
        &self,
        kind: FactoryKind,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError> {
        self.requests.lock().push((kind, properties.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::construction("invalid broker url"));
        }
        let factory = MockFactory::new();
        self.created.lock().push(Arc::clone(&factory));
        Ok(factory)
    }
}

impl ConnectionFactoryFactory for MockFactoryFactory {
    fn create_connection_factory(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError> {
        self.serve(FactoryKind::Plain, properties)
    }

    fn create_xa_connection_factory(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError> {
        self.serve(FactoryKind::Xa, properties)
    }
}

/// Pool that wraps whatever the base factory factory produces.
#[derive(Default)]
pub struct MockPool {
    wrapped: Mutex<Vec<Arc<MockFactory>>>,
}

impl MockPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn wrapped(&self) -> usize {
        self.wrapped.lock().len()
    }

    pub fn last(&self) -> Option<Arc<MockFactory>> {
        self.wrapped.lock().last().cloned()
    }
}

impl PooledConnectionFactoryFactory for MockPool {
    fn create(
        &self,
        base: Arc<dyn ConnectionFactoryFactory>,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError> {
        base.create_connection_factory(properties)?;
        let pooled = MockFactory::new();
        self.wrapped.lock().push(Arc::clone(&pooled));
        Ok(pooled)
    }
}

/// Encryptor whose ciphertext is the reversed plaintext.
pub struct ReversingEncryptor;

impl StringEncryptor for ReversingEncryptor {
    fn decrypt(&self, ciphertext: &str) -> Result<String, ProviderError> {
        if ciphertext.is_empty() {
            return Err(ProviderError::construction("empty ciphertext"));
        }
        Ok(ciphertext.chars().rev().collect())
    }
}

/// Loader that answers to the given name and returns its argument unchanged.
pub struct EchoLoader(pub &'static str);

impl ConfigLoader for EchoLoader {
    fn name(&self) -> &str {
        self.0
    }

    fn resolve(&self, argument: &str) -> Result<String, ProviderError> {
        Ok(argument.to_string())
    }
}

/// Polls `cond` until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
