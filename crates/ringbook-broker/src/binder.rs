// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel binder: asserts a topology entry's graph on a channel, wires
//! consumption, and implements the generic retry/escalation/dead-letter
//! algorithm around each handler invocation.
//!
//! A handler resolves each delivery to one of three outcomes. `Ack` removes
//! the message; `Requeue` pushes it back onto the primary queue
//! immediately; `Fail` (or a handler error) enters the escalation path:
//! pick the delay tier for the current attempt count, republish into that
//! tier's TTL queue with the counter bumped, and ack the original. Once the
//! counter reaches the entry's maximum the payload is parked in the static
//! dead queue instead, exactly once, then acked.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ringbook_core::RingbookError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::topology::{TopologyEntry, DELAY_QUEUE_EXPIRY};
use crate::transport::{BrokerChannel, Delivery, QueueArgs};

/// Result of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Success; remove the message.
    Ack,
    /// Push the message back onto the same queue immediately.
    Requeue,
    /// No success signal; enter the delayed-retry path.
    Fail,
}

/// A consumer bound to one topology entry.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<HandlerOutcome, RingbookError>;
}

/// Maps topology entry names to their handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn QueueHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry_name: impl Into<String>, handler: Arc<dyn QueueHandler>) {
        self.handlers.insert(entry_name.into(), handler);
    }

    pub fn get(&self, entry_name: &str) -> Option<Arc<dyn QueueHandler>> {
        self.handlers.get(entry_name).cloned()
    }
}

/// Binds topology entries onto one channel.
pub struct ChannelBinder {
    channel: Arc<dyn BrokerChannel>,
}

impl ChannelBinder {
    pub fn new(channel: Arc<dyn BrokerChannel>) -> Self {
        Self { channel }
    }

    /// Assert the entry's exchange, primary queue, static dead destination,
    /// and every delay-tier queue, then create the bindings.
    pub async fn assert_entry(&self, entry: &TopologyEntry) -> Result<(), RingbookError> {
        let ch = &self.channel;

        ch.assert_exchange(&entry.exchange).await?;
        ch.assert_queue(&entry.queue, QueueArgs::default()).await?;
        ch.bind_queue(&entry.queue, &entry.exchange, &entry.routing_key).await?;

        if let Some(dead) = &entry.static_dead {
            ch.assert_exchange(&dead.exchange).await?;
            ch.assert_queue(&dead.queue, QueueArgs::default()).await?;
            ch.bind_queue(&dead.queue, &dead.exchange, &dead.routing_key).await?;
        }

        for (idx, tier) in entry.delay_tiers.iter().enumerate() {
            ch.assert_queue(
                &entry.delay_queue_name(idx),
                QueueArgs {
                    message_ttl: Some(tier.delay),
                    dead_letter_exchange: Some(entry.retry_exchange.clone()),
                    dead_letter_routing_key: Some(entry.retry_routing_key.clone()),
                    expires: Some(DELAY_QUEUE_EXPIRY),
                },
            )
            .await?;
        }

        debug!(entry = %entry.name, queue = %entry.queue, "topology entry asserted");
        Ok(())
    }

    /// Assert the entry and spawn its consumer loop.
    ///
    /// The loop processes one delivery to completion before taking the
    /// next; that sequencing is the per-queue backpressure mechanism.
    pub async fn bind(
        &self,
        entry: TopologyEntry,
        handler: Arc<dyn QueueHandler>,
    ) -> Result<JoinHandle<()>, RingbookError> {
        self.assert_entry(&entry).await?;

        let mut rx = self.channel.consume(&entry.queue).await?;
        let channel = Arc::clone(&self.channel);

        let handle = tokio::spawn(async move {
            info!(entry = %entry.name, queue = %entry.queue, "consumer started");
            while let Some(delivery) = rx.recv().await {
                process_delivery(&channel, &entry, handler.as_ref(), delivery).await;
            }
            info!(entry = %entry.name, "consumer stopped");
        });

        Ok(handle)
    }
}

/// Run one delivery through its handler and settle the message.
async fn process_delivery(
    channel: &Arc<dyn BrokerChannel>,
    entry: &TopologyEntry,
    handler: &dyn QueueHandler,
    delivery: Delivery,
) {
    let outcome = match handler.handle(&delivery).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Handler errors are never propagated; they take the retry path.
            warn!(entry = %entry.name, error = %e, "handler failed, escalating");
            HandlerOutcome::Fail
        }
    };

    let settled = match outcome {
        HandlerOutcome::Ack => Ok(()),
        HandlerOutcome::Requeue => {
            channel
                .publish(&entry.exchange, &entry.routing_key, &delivery.payload, delivery.attempts)
                .await
        }
        HandlerOutcome::Fail => escalate(channel, entry, &delivery).await,
    };

    if let Err(e) = settled {
        error!(entry = %entry.name, error = %e, "failed to settle delivery");
    }

    if let Err(e) = channel.ack(&delivery).await {
        error!(entry = %entry.name, error = %e, "ack failed");
    }
}

/// Escalate a failed delivery.
///
/// The attempt counter carried on the message is the single source of
/// truth. Tier selection is `min(attempts, tiers - 1)`: tier 0 serves the
/// first failure and escalation clamps to the last tier. Messages past the
/// entry's maximum, and entries with no tiers at all, park in the static
/// dead queue with a reset counter, so manual replay starts fresh.
async fn escalate(
    channel: &Arc<dyn BrokerChannel>,
    entry: &TopologyEntry,
    delivery: &Delivery,
) -> Result<(), RingbookError> {
    let attempts = delivery.attempts;
    let exhausted = entry.max_attempts.is_some_and(|max| attempts >= max);

    if exhausted || entry.delay_tiers.is_empty() {
        match &entry.static_dead {
            Some(dead) => {
                info!(
                    entry = %entry.name,
                    attempts,
                    parked = %dead.queue,
                    "retries exhausted, parking message"
                );
                channel.publish(&dead.exchange, &dead.routing_key, &delivery.payload, 0).await
            }
            None => {
                warn!(entry = %entry.name, attempts, "retries exhausted, no dead queue, dropping");
                Ok(())
            }
        }
    } else {
        let tier = (attempts as usize).min(entry.delay_tiers.len() - 1);
        debug!(entry = %entry.name, attempts, tier, "scheduling delayed retry");
        channel
            .publish("", &entry.delay_queue_name(tier), &delivery.payload, attempts + 1)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inprocess::InProcessBroker;
    use crate::topology::{DelayTier, StaticDeadQueue};
    use crate::transport::Broker;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Handler scripted with a fixed sequence of outcomes.
    struct ScriptedHandler {
        script: Mutex<Vec<Result<HandlerOutcome, RingbookError>>>,
        invocations: AtomicU32,
        seen_attempts: Mutex<Vec<u32>>,
    }

    impl ScriptedHandler {
        fn new(script: Vec<Result<HandlerOutcome, RingbookError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                invocations: AtomicU32::new(0),
                seen_attempts: Mutex::new(Vec::new()),
            })
        }

        /// Fails every delivery (an exhausted script also fails).
        fn always_failing() -> Arc<Self> {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl QueueHandler for ScriptedHandler {
        async fn handle(&self, delivery: &Delivery) -> Result<HandlerOutcome, RingbookError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            self.seen_attempts.lock().await.push(delivery.attempts);
            let mut script = self.script.lock().await;
            if script.is_empty() {
                Ok(HandlerOutcome::Fail)
            } else {
                script.remove(0)
            }
        }
    }

    fn entry_with_tiers(max_attempts: Option<u32>, tiers: Vec<Duration>) -> TopologyEntry {
        TopologyEntry {
            name: "test".to_string(),
            exchange: "x".to_string(),
            queue: "work".to_string(),
            routing_key: "work".to_string(),
            retry_exchange: "x".to_string(),
            retry_routing_key: "work".to_string(),
            delay_tiers: tiers.into_iter().map(|delay| DelayTier { delay }).collect(),
            max_attempts,
            static_dead: Some(StaticDeadQueue {
                exchange: "x.dead".to_string(),
                queue: "parked".to_string(),
                routing_key: "parked".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn ack_settles_without_retry() {
        let broker = InProcessBroker::new();
        let channel = broker.connect().await.unwrap();
        let binder = ChannelBinder::new(Arc::clone(&channel));

        let handler = ScriptedHandler::new(vec![Ok(HandlerOutcome::Ack)]);
        let entry = entry_with_tiers(Some(2), vec![Duration::from_millis(20)]);
        binder.bind(entry, handler.clone()).await.unwrap();

        channel.publish("x", "work", b"m", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handler.invocations.load(Ordering::SeqCst), 1);
        assert_eq!(broker.acked_count("work"), 1);
        assert_eq!(broker.buffered_count("parked"), 0);
    }

    #[tokio::test]
    async fn fail_retries_with_escalating_attempts_then_parks_once() {
        let broker = InProcessBroker::new();
        let channel = broker.connect().await.unwrap();
        let binder = ChannelBinder::new(Arc::clone(&channel));

        // max_attempts = 2: initial + 2 retries, then parked.
        let handler = ScriptedHandler::always_failing();
        let entry = entry_with_tiers(Some(2), vec![Duration::from_millis(20)]);
        binder.bind(entry, handler.clone()).await.unwrap();

        channel.publish("x", "work", b"m", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Failures at attempts 0, 1, and 2; the third exhausts the maximum.
        assert_eq!(handler.invocations.load(Ordering::SeqCst), 3);
        assert_eq!(*handler.seen_attempts.lock().await, vec![0, 1, 2]);
        // Parked exactly once, with the counter reset for manual replay.
        assert_eq!(broker.buffered_count("parked"), 1);

        let mut parked_rx = channel.consume("parked").await.unwrap();
        let parked = parked_rx.recv().await.unwrap();
        assert_eq!(parked.payload, b"m");
        assert_eq!(parked.attempts, 0);
    }

    #[tokio::test]
    async fn tier_selection_clamps_to_last() {
        let broker = InProcessBroker::new();
        let channel = broker.connect().await.unwrap();
        let binder = ChannelBinder::new(Arc::clone(&channel));

        // Two tiers, four allowed attempts: attempts 2 and 3 reuse tier 1.
        let handler = ScriptedHandler::always_failing();
        let entry = entry_with_tiers(
            Some(4),
            vec![Duration::from_millis(10), Duration::from_millis(20)],
        );
        binder.bind(entry, handler.clone()).await.unwrap();

        channel.publish("x", "work", b"m", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(*handler.seen_attempts.lock().await, vec![0, 1, 2, 3, 4]);
        assert_eq!(broker.buffered_count("parked"), 1);
    }

    #[tokio::test]
    async fn handler_error_takes_fail_path() {
        let broker = InProcessBroker::new();
        let channel = broker.connect().await.unwrap();
        let binder = ChannelBinder::new(Arc::clone(&channel));

        let handler = ScriptedHandler::new(vec![
            Err(RingbookError::Internal("boom".to_string())),
            Ok(HandlerOutcome::Ack),
        ]);
        let entry = entry_with_tiers(Some(3), vec![Duration::from_millis(20)]);
        binder.bind(entry, handler.clone()).await.unwrap();

        channel.publish("x", "work", b"m", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        // Error escalated into a delayed retry, which then acked.
        assert_eq!(handler.invocations.load(Ordering::SeqCst), 2);
        assert_eq!(broker.buffered_count("parked"), 0);
    }

    #[tokio::test]
    async fn requeue_redelivers_immediately() {
        let broker = InProcessBroker::new();
        let channel = broker.connect().await.unwrap();
        let binder = ChannelBinder::new(Arc::clone(&channel));

        let handler = ScriptedHandler::new(vec![
            Ok(HandlerOutcome::Requeue),
            Ok(HandlerOutcome::Ack),
        ]);
        let entry = entry_with_tiers(Some(3), vec![Duration::from_secs(60)]);
        binder.bind(entry, handler.clone()).await.unwrap();

        channel.publish("x", "work", b"m", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // No delay tier involved: the second invocation happened promptly.
        assert_eq!(handler.invocations.load(Ordering::SeqCst), 2);
        // Attempt counter unchanged by requeue.
        assert_eq!(*handler.seen_attempts.lock().await, vec![0, 0]);
    }

    #[tokio::test]
    async fn no_tier_entry_parks_directly() {
        let broker = InProcessBroker::new();
        let channel = broker.connect().await.unwrap();
        let binder = ChannelBinder::new(Arc::clone(&channel));

        let handler = ScriptedHandler::always_failing();
        let entry = entry_with_tiers(None, Vec::new());
        binder.bind(entry, handler.clone()).await.unwrap();

        channel.publish("x", "work", b"m", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handler.invocations.load(Ordering::SeqCst), 1);
        assert_eq!(broker.buffered_count("parked"), 1);
    }

    #[tokio::test]
    async fn registry_lookup() {
        let mut registry = HandlerRegistry::new();
        let handler = ScriptedHandler::new(vec![]);
        registry.register("lead_assign", handler);
        assert!(registry.get("lead_assign").is_some());
        assert!(registry.get("other").is_none());
    }
}
