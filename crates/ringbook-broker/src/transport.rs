// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker transport traits.
//!
//! The binder and connection manager are written against these traits; the
//! default implementation is the in-process broker in [`crate::inprocess`].
//! Implementations must honor direct-exchange routing (exact routing-key
//! match) and TTL dead-lettering on queues declared with
//! [`QueueArgs::message_ttl`].

use std::time::Duration;

use async_trait::async_trait;
use ringbook_core::RingbookError;
use tokio::sync::{mpsc, watch};

/// Arguments for queue assertion.
///
/// A queue declared with both `message_ttl` and a dead-letter target holds
/// each message for the TTL and then republishes it to the dead-letter
/// exchange/routing-key. That is the delayed-retry mechanism; no native
/// scheduled-delivery primitive is assumed.
#[derive(Debug, Clone, Default)]
pub struct QueueArgs {
    pub message_ttl: Option<Duration>,
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
    /// Broker may drop the queue after this idle period.
    pub expires: Option<Duration>,
}

/// One message delivered to a consumer.
///
/// `attempts` is the application-level failure counter carried with the
/// message; it is the single source of truth for retry escalation.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub payload: Vec<u8>,
    pub attempts: u32,
}

/// A broker endpoint that can open channels.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a logical connection and return a channel on it.
    async fn connect(&self) -> Result<std::sync::Arc<dyn BrokerChannel>, RingbookError>;
}

/// One multiplexed channel on a broker connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Assert a direct exchange.
    async fn assert_exchange(&self, name: &str) -> Result<(), RingbookError>;

    /// Assert a queue with the given arguments.
    async fn assert_queue(&self, name: &str, args: QueueArgs) -> Result<(), RingbookError>;

    /// Bind a queue to an exchange under a routing key.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), RingbookError>;

    /// Publish a payload. An empty exchange name routes directly to the
    /// queue named by `routing_key` (default-exchange semantics).
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        attempts: u32,
    ) -> Result<(), RingbookError>;

    /// Start consuming a queue. The consumer loop must process one delivery
    /// to completion before taking the next (prefetch-1 semantics).
    async fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, RingbookError>;

    /// Acknowledge a delivery, removing it from the queue.
    async fn ack(&self, delivery: &Delivery) -> Result<(), RingbookError>;

    /// Observe channel closure. The receiver yields `true` once the channel
    /// (or its connection) is gone; the connection manager reconnects then.
    fn closed(&self) -> watch::Receiver<bool>;
}

/// Publishes onto one topology entry's primary binding.
///
/// The dispatcher-side counterpart of the consumer machinery: a thin handle
/// carrying the exchange and routing key so business code never touches
/// topology details.
#[derive(Clone)]
pub struct QueuePublisher {
    channel: std::sync::Arc<dyn BrokerChannel>,
    exchange: String,
    routing_key: String,
}

impl QueuePublisher {
    pub fn new(
        channel: std::sync::Arc<dyn BrokerChannel>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Build a publisher for a topology entry's primary binding.
    pub fn for_entry(
        channel: std::sync::Arc<dyn BrokerChannel>,
        entry: &crate::topology::TopologyEntry,
    ) -> Self {
        Self::new(channel, entry.exchange.clone(), entry.routing_key.clone())
    }

    /// Publish a fresh message (attempt counter zero).
    pub async fn publish(&self, payload: &[u8]) -> Result<(), RingbookError> {
        self.channel
            .publish(&self.exchange, &self.routing_key, payload, 0)
            .await
    }
}
