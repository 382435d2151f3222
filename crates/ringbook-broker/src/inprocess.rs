// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process broker implementing the transport traits.
//!
//! Direct exchanges route by exact routing-key match. A queue asserted with
//! a message TTL and a dead-letter target holds each publish for the TTL
//! (a spawned timer task) and then republishes to the dead-letter
//! exchange: the same delayed-retry contract a dead-lettering AMQP broker
//! provides, inside one process.
//!
//! Queue and exchange state survives reconnects, like durable declarations
//! on a real broker; only channels come and go.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ringbook_core::RingbookError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::transport::{Broker, BrokerChannel, Delivery, QueueArgs};

#[derive(Debug, Clone)]
struct Binding {
    queue: String,
    routing_key: String,
}

struct QueueState {
    args: QueueArgs,
    buffer: VecDeque<Delivery>,
    consumer: Option<mpsc::UnboundedSender<Delivery>>,
    acked: u64,
}

#[derive(Default)]
struct Inner {
    exchanges: HashMap<String, Vec<Binding>>,
    queues: HashMap<String, QueueState>,
}

/// A single-process broker shared by every channel opened on it.
#[derive(Default)]
pub struct InProcessBroker {
    inner: Arc<Mutex<Inner>>,
    closed_senders: Mutex<Vec<watch::Sender<bool>>>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a connection drop: every open channel's `closed()` watch
    /// fires and the connection manager reconnects. Queue state survives.
    pub fn sever(&self) {
        let mut senders = self.closed_senders.lock().expect("closed lock");
        for tx in senders.drain(..) {
            let _ = tx.send(true);
        }
    }

    /// Messages acknowledged on a queue so far (test observability).
    pub fn acked_count(&self, queue: &str) -> u64 {
        self.inner
            .lock()
            .expect("broker lock")
            .queues
            .get(queue)
            .map(|q| q.acked)
            .unwrap_or(0)
    }

    /// Messages sitting unconsumed in a queue's buffer (test observability).
    pub fn buffered_count(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .expect("broker lock")
            .queues
            .get(queue)
            .map(|q| q.buffer.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for InProcessBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, RingbookError> {
        let (tx, rx) = watch::channel(false);
        self.closed_senders.lock().expect("closed lock").push(tx);
        Ok(Arc::new(InProcessChannel {
            inner: Arc::clone(&self.inner),
            closed_rx: rx,
        }))
    }
}

/// One channel on the in-process broker. All channels share queue state.
pub struct InProcessChannel {
    inner: Arc<Mutex<Inner>>,
    closed_rx: watch::Receiver<bool>,
}

/// Route a payload through an exchange to its bound queues.
///
/// Synchronous on purpose: delay-queue expiry tasks re-enter it from a
/// spawned timer without any recursive future type.
fn route(
    inner: &Arc<Mutex<Inner>>,
    exchange: &str,
    routing_key: &str,
    payload: &[u8],
    attempts: u32,
) -> Result<(), RingbookError> {
    // Resolve targets, deliver into buffers/consumers, and collect any
    // TTL expirations to schedule after the lock is released.
    let mut expirations: Vec<(std::time::Duration, String, String, Vec<u8>, u32)> = Vec::new();
    {
        let mut guard = inner.lock().expect("broker lock");

        let targets: Vec<String> = if exchange.is_empty() {
            // Default-exchange semantics: straight to the named queue.
            if !guard.queues.contains_key(routing_key) {
                return Err(RingbookError::Broker {
                    message: format!("publish to unknown queue `{routing_key}`"),
                    source: None,
                });
            }
            vec![routing_key.to_string()]
        } else {
            let Some(bindings) = guard.exchanges.get(exchange) else {
                return Err(RingbookError::Broker {
                    message: format!("publish to unknown exchange `{exchange}`"),
                    source: None,
                });
            };
            bindings
                .iter()
                .filter(|b| b.routing_key == routing_key)
                .map(|b| b.queue.clone())
                .collect()
        };

        if targets.is_empty() {
            warn!(exchange, routing_key, "publish matched no binding, dropping");
            return Ok(());
        }

        for target in targets {
            let Some(state) = guard.queues.get_mut(&target) else {
                warn!(queue = %target, "bound queue missing, dropping");
                continue;
            };

            // TTL + dead-letter queues never deliver to consumers; they
            // hold the message and expire it into the dead-letter target.
            if let (Some(ttl), Some(dl_exchange)) =
                (state.args.message_ttl, state.args.dead_letter_exchange.clone())
            {
                let dl_routing_key = state
                    .args
                    .dead_letter_routing_key
                    .clone()
                    .unwrap_or_else(|| target.clone());
                expirations.push((ttl, dl_exchange, dl_routing_key, payload.to_vec(), attempts));
                continue;
            }

            let delivery = Delivery {
                queue: target.clone(),
                payload: payload.to_vec(),
                attempts,
            };
            match &state.consumer {
                Some(tx) => {
                    if let Err(err) = tx.send(delivery) {
                        // Consumer went away; keep the message.
                        state.buffer.push_back(err.0);
                        state.consumer = None;
                    }
                }
                None => state.buffer.push_back(delivery),
            }
        }
    }

    for (ttl, dl_exchange, dl_routing_key, payload, attempts) in expirations {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = route(&inner, &dl_exchange, &dl_routing_key, &payload, attempts) {
                warn!(error = %e, "delay-queue expiry routing failed");
            }
        });
    }

    Ok(())
}

#[async_trait]
impl BrokerChannel for InProcessChannel {
    async fn assert_exchange(&self, name: &str) -> Result<(), RingbookError> {
        let mut guard = self.inner.lock().expect("broker lock");
        guard.exchanges.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn assert_queue(&self, name: &str, args: QueueArgs) -> Result<(), RingbookError> {
        let mut guard = self.inner.lock().expect("broker lock");
        guard.queues.entry(name.to_string()).or_insert_with(|| QueueState {
            args,
            buffer: VecDeque::new(),
            consumer: None,
            acked: 0,
        });
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), RingbookError> {
        let mut guard = self.inner.lock().expect("broker lock");
        let bindings = guard.exchanges.entry(exchange.to_string()).or_default();
        let exists = bindings
            .iter()
            .any(|b| b.queue == queue && b.routing_key == routing_key);
        if !exists {
            bindings.push(Binding {
                queue: queue.to_string(),
                routing_key: routing_key.to_string(),
            });
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        attempts: u32,
    ) -> Result<(), RingbookError> {
        route(&self.inner, exchange, routing_key, payload, attempts)
    }

    async fn consume(
        &self,
        queue: &str,
    ) -> Result<mpsc::UnboundedReceiver<Delivery>, RingbookError> {
        let mut guard = self.inner.lock().expect("broker lock");
        let Some(state) = guard.queues.get_mut(queue) else {
            return Err(RingbookError::Broker {
                message: format!("consume on unknown queue `{queue}`"),
                source: None,
            });
        };
        let (tx, rx) = mpsc::unbounded_channel();
        while let Some(delivery) = state.buffer.pop_front() {
            // Receiver is in hand; send cannot fail here.
            let _ = tx.send(delivery);
        }
        state.consumer = Some(tx);
        debug!(queue, "consumer attached");
        Ok(rx)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), RingbookError> {
        let mut guard = self.inner.lock().expect("broker lock");
        if let Some(state) = guard.queues.get_mut(&delivery.queue) {
            state.acked += 1;
        }
        Ok(())
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }
}
