// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervised broker connection lifecycle.
//!
//! The manager owns the long-lived connection as an explicit state machine
//! (`Disconnected -> Connecting -> Ready`), re-asserting the topology and
//! re-wiring every consumer after each (re)connect, with a fixed backoff
//! between attempts. State transitions are observable through a `watch`
//! channel for health checks and tests.

use std::sync::Arc;
use std::time::Duration;

use ringbook_core::RingbookError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::binder::{ChannelBinder, HandlerRegistry};
use crate::topology::Topology;
use crate::transport::{Broker, BrokerChannel};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

/// Supervises one broker connection and its consumers.
pub struct ConnectionManager {
    broker: Arc<dyn Broker>,
    topology: Arc<Topology>,
    registry: HandlerRegistry,
    reconnect_delay: Duration,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        broker: Arc<dyn Broker>,
        topology: Arc<Topology>,
        registry: HandlerRegistry,
        reconnect_delay: Duration,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        (
            Self {
                broker,
                topology,
                registry,
                reconnect_delay,
                state_tx,
            },
            state_rx,
        )
    }

    /// Connect once and bind everything, without supervision.
    ///
    /// Returns the live channel, for callers that need a publishing handle
    /// alongside the supervised loop (the serve path connects first, hands
    /// the channel to the dispatcher, then spawns `run`).
    pub async fn connect_and_bind(&self) -> Result<Arc<dyn BrokerChannel>, RingbookError> {
        self.state_tx.send_replace(ConnectionState::Connecting);
        let channel = self.broker.connect().await?;
        self.bind_all(&channel).await?;
        self.state_tx.send_replace(ConnectionState::Ready);
        Ok(channel)
    }

    /// Run the supervision loop forever.
    ///
    /// Each iteration connects, asserts topology, wires consumers, and then
    /// parks until the channel reports closure; failures back off by the
    /// fixed reconnect delay and try again.
    pub async fn run(self) {
        loop {
            self.state_tx.send_replace(ConnectionState::Connecting);

            let channel = match self.broker.connect().await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(error = %e, "broker connect failed, backing off");
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    tokio::time::sleep(self.reconnect_delay).await;
                    continue;
                }
            };

            let consumers = match self.bind_all(&channel).await {
                Ok(consumers) => consumers,
                Err(e) => {
                    error!(error = %e, "topology binding failed, backing off");
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    tokio::time::sleep(self.reconnect_delay).await;
                    continue;
                }
            };

            self.state_tx.send_replace(ConnectionState::Ready);
            info!(consumers = consumers.len(), "broker connection ready");

            // Park until the channel goes away.
            let mut closed = channel.closed();
            while !*closed.borrow() {
                if closed.changed().await.is_err() {
                    break;
                }
            }

            warn!("broker channel closed, reconnecting");
            self.state_tx.send_replace(ConnectionState::Disconnected);
            for consumer in consumers {
                consumer.abort();
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// Assert every topology entry; spawn consumers for entries with a
    /// registered handler. Entries without handlers are still asserted so
    /// their queues exist for publishing.
    async fn bind_all(
        &self,
        channel: &Arc<dyn BrokerChannel>,
    ) -> Result<Vec<JoinHandle<()>>, RingbookError> {
        let binder = ChannelBinder::new(Arc::clone(channel));
        let mut consumers = Vec::new();

        for entry in self.topology.entries() {
            match self.registry.get(&entry.name) {
                Some(handler) => {
                    let handle = binder.bind(entry.clone(), handler).await?;
                    consumers.push(handle);
                }
                None => binder.assert_entry(entry).await?,
            }
        }

        Ok(consumers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{HandlerOutcome, QueueHandler};
    use crate::inprocess::InProcessBroker;
    use crate::transport::Delivery;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        count: AtomicU32,
    }

    #[async_trait]
    impl QueueHandler for CountingHandler {
        async fn handle(&self, _delivery: &Delivery) -> Result<HandlerOutcome, RingbookError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerOutcome::Ack)
        }
    }

    #[tokio::test]
    async fn reaches_ready_and_consumes() {
        let broker = Arc::new(InProcessBroker::new());
        let topology = Arc::new(Topology::lead_assignment().unwrap());
        let handler = Arc::new(CountingHandler { count: AtomicU32::new(0) });

        let mut registry = HandlerRegistry::new();
        registry.register("lead_assign", handler.clone());

        let (manager, mut state_rx) = ConnectionManager::new(
            broker.clone(),
            topology,
            registry,
            Duration::from_millis(10),
        );
        assert_eq!(*state_rx.borrow(), ConnectionState::Disconnected);

        tokio::spawn(manager.run());

        // Wait for Ready.
        while *state_rx.borrow() != ConnectionState::Ready {
            state_rx.changed().await.unwrap();
        }

        // Publish through a second channel; the supervised consumer acks it.
        let publisher = broker.connect().await.unwrap();
        publisher
            .publish("lead_exchange", "lead_assignment", b"{}", 0)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handler.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reconnects_after_sever() {
        let broker = Arc::new(InProcessBroker::new());
        let topology = Arc::new(Topology::lead_assignment().unwrap());
        let handler = Arc::new(CountingHandler { count: AtomicU32::new(0) });

        let mut registry = HandlerRegistry::new();
        registry.register("lead_assign", handler.clone());

        let (manager, mut state_rx) = ConnectionManager::new(
            broker.clone(),
            topology,
            registry,
            Duration::from_millis(10),
        );
        tokio::spawn(manager.run());

        while *state_rx.borrow() != ConnectionState::Ready {
            state_rx.changed().await.unwrap();
        }

        broker.sever();

        // Disconnected, then Ready again after the backoff.
        let mut saw_disconnected = false;
        loop {
            state_rx.changed().await.unwrap();
            let state = *state_rx.borrow();
            if state == ConnectionState::Disconnected {
                saw_disconnected = true;
            }
            if saw_disconnected && state == ConnectionState::Ready {
                break;
            }
        }

        // Consumers are re-wired: messages still get processed.
        let publisher = broker.connect().await.unwrap();
        publisher
            .publish("lead_exchange", "lead_assignment", b"{}", 0)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handler.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_and_bind_returns_channel() {
        let broker = Arc::new(InProcessBroker::new());
        let topology = Arc::new(Topology::lead_assignment().unwrap());
        let (manager, state_rx) = ConnectionManager::new(
            broker,
            topology,
            HandlerRegistry::new(),
            Duration::from_millis(10),
        );

        let channel = manager.connect_and_bind().await.unwrap();
        assert_eq!(*state_rx.borrow(), ConnectionState::Ready);

        // All primary queues exist for publishing.
        channel
            .publish("lead_exchange", "lead_reattempt", b"{}", 0)
            .await
            .unwrap();
    }
}
