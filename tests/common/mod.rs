//! In-memory fake broker implementing the protocol traits.
//!
//! One [`FakeBroker`] plays the transport, every connection, and every
//! channel. State is shared so tests can inject failures (refused connects,
//! killed connections/channels), push deliveries into registered consumers,
//! and assert on the operations the runtime performed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use subvisor::{Channel, Connection, Delivery, ProtocolError, Transport};

const CONSUMER_BUFFER: usize = 16;

#[derive(Default)]
struct Shared {
    conn_tokens: Vec<CancellationToken>,
    channel_tokens: Vec<CancellationToken>,
    /// Declares/binds/consumes, in call order, as compact strings.
    operations: Vec<String>,
    published: Vec<(String, String, Vec<u8>)>,
    acks: Vec<u64>,
    nacks: Vec<(u64, bool)>,
    consumers: HashMap<String, mpsc::Sender<Delivery>>,
}

/// Fake transport + broker with injectable failures and full call recording.
pub struct FakeBroker {
    connect_attempts: AtomicUsize,
    connections_made: AtomicUsize,
    inflight_connects: AtomicUsize,
    max_inflight_connects: AtomicUsize,
    /// Remaining connect attempts to refuse.
    fail_connects: AtomicUsize,
    connect_delay: Mutex<Duration>,
    state: Arc<Mutex<Shared>>,
}

impl FakeBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connect_attempts: AtomicUsize::new(0),
            connections_made: AtomicUsize::new(0),
            inflight_connects: AtomicUsize::new(0),
            max_inflight_connects: AtomicUsize::new(0),
            fail_connects: AtomicUsize::new(0),
            connect_delay: Mutex::new(Duration::ZERO),
            state: Arc::new(Mutex::new(Shared::default())),
        })
    }

    /// Refuses the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Makes every connect attempt take `delay` before resolving.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().expect("lock") = delay;
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn connections_made(&self) -> usize {
        self.connections_made.load(Ordering::SeqCst)
    }

    pub fn max_inflight_connects(&self) -> usize {
        self.max_inflight_connects.load(Ordering::SeqCst)
    }

    pub fn live_connections(&self) -> usize {
        let state = self.state.lock().expect("lock");
        state
            .conn_tokens
            .iter()
            .filter(|t| !t.is_cancelled())
            .count()
    }

    pub fn channels_open(&self) -> usize {
        let state = self.state.lock().expect("lock");
        state
            .channel_tokens
            .iter()
            .filter(|t| !t.is_cancelled())
            .count()
    }

    /// Terminates the current connection (and, through it, its channels).
    pub fn kill_connection(&self) {
        let state = self.state.lock().expect("lock");
        if let Some(token) = state.conn_tokens.last() {
            token.cancel();
        }
    }

    /// Terminates the most recently opened channel.
    pub fn kill_last_channel(&self) {
        let state = self.state.lock().expect("lock");
        if let Some(token) = state.channel_tokens.last() {
            token.cancel();
        }
    }

    pub fn operations(&self) -> Vec<String> {
        self.state.lock().expect("lock").operations.clone()
    }

    pub fn published(&self) -> Vec<(String, String, Vec<u8>)> {
        self.state.lock().expect("lock").published.clone()
    }

    pub fn acks(&self) -> Vec<u64> {
        self.state.lock().expect("lock").acks.clone()
    }

    pub fn nacks(&self) -> Vec<(u64, bool)> {
        self.state.lock().expect("lock").nacks.clone()
    }

    /// Pushes one delivery to the consumer registered on `queue`.
    ///
    /// Returns `false` if no live consumer is registered.
    pub fn deliver(&self, queue: &str, body: &[u8], delivery_tag: u64) -> bool {
        let state = self.state.lock().expect("lock");
        match state.consumers.get(queue) {
            Some(tx) => tx
                .try_send(Delivery {
                    body: body.to_vec(),
                    delivery_tag,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Like [`FakeBroker::deliver`], but waits for a consumer to register
    /// first. Panics if none shows up.
    pub async fn deliver_eventually(&self, queue: &str, body: &[u8], delivery_tag: u64) {
        for _ in 0..1000 {
            if self.deliver(queue, body, delivery_tag) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no consumer registered on queue '{queue}'");
    }
}

#[async_trait]
impl Transport for FakeBroker {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn Connection>, ProtocolError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let inflight = self.inflight_connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight_connects.fetch_max(inflight, Ordering::SeqCst);

        let delay = *self.connect_delay.lock().expect("lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inflight_connects.fetch_sub(1, Ordering::SeqCst);

        let refuse = self
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(ProtocolError::ConnectFailed {
                reason: "broker unavailable".to_string(),
            });
        }

        let token = CancellationToken::new();
        self.state
            .lock()
            .expect("lock")
            .conn_tokens
            .push(token.clone());
        self.connections_made.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            state: Arc::clone(&self.state),
            token,
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<Shared>>,
    token: CancellationToken,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn open_channel(&self) -> Result<Arc<dyn Channel>, ProtocolError> {
        if self.token.is_cancelled() {
            return Err(ProtocolError::ConnectionClosed);
        }
        // Child token: killing the connection kills its channels.
        let token = self.token.child_token();
        self.state
            .lock()
            .expect("lock")
            .channel_tokens
            .push(token.clone());
        Ok(Arc::new(FakeChannel {
            state: Arc::clone(&self.state),
            token,
        }))
    }

    async fn close(&self) {
        self.token.cancel();
    }

    async fn closed(&self) {
        self.token.cancelled().await;
    }

    fn is_open(&self) -> bool {
        !self.token.is_cancelled()
    }
}

struct FakeChannel {
    state: Arc<Mutex<Shared>>,
    token: CancellationToken,
}

impl FakeChannel {
    fn record(&self, op: String) -> Result<(), ProtocolError> {
        if self.token.is_cancelled() {
            return Err(ProtocolError::ChannelClosed);
        }
        self.state.lock().expect("lock").operations.push(op);
        Ok(())
    }
}

#[async_trait]
impl Channel for FakeChannel {
    async fn declare_exchange(&self, name: &str, durable: bool) -> Result<(), ProtocolError> {
        self.record(format!("exchange:{name}:durable={durable}"))
    }

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), ProtocolError> {
        self.record(format!("queue:{name}:durable={durable}"))
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), ProtocolError> {
        self.record(format!("bind:{queue}:{exchange}:{routing_key}"))
    }

    async fn consume(
        &self,
        queue: &str,
        auto_ack: bool,
    ) -> Result<mpsc::Receiver<Delivery>, ProtocolError> {
        self.record(format!("consume:{queue}:auto_ack={auto_ack}"))?;
        let (tx, rx) = mpsc::channel(CONSUMER_BUFFER);
        // One consumer per queue; a re-consume replaces (and thereby ends)
        // the previous delivery stream.
        self.state
            .lock()
            .expect("lock")
            .consumers
            .insert(queue.to_string(), tx);
        Ok(rx)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), ProtocolError> {
        if self.token.is_cancelled() {
            return Err(ProtocolError::ChannelClosed);
        }
        self.state.lock().expect("lock").published.push((
            exchange.to_string(),
            routing_key.to_string(),
            payload.to_vec(),
        ));
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), ProtocolError> {
        if self.token.is_cancelled() {
            return Err(ProtocolError::ChannelClosed);
        }
        self.state.lock().expect("lock").acks.push(delivery_tag);
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), ProtocolError> {
        if self.token.is_cancelled() {
            return Err(ProtocolError::ChannelClosed);
        }
        self.state
            .lock()
            .expect("lock")
            .nacks
            .push((delivery_tag, requeue));
        Ok(())
    }

    async fn close(&self) {
        self.token.cancel();
    }

    async fn closed(&self) {
        self.token.cancelled().await;
    }

    fn is_open(&self) -> bool {
        !self.token.is_cancelled()
    }
}
