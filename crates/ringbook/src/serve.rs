// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ringbook serve` command implementation.
//!
//! Wires the full routing service: SQLite storage, the in-process broker
//! with the lead-assignment topology, the HTTP telephony and messaging
//! adapters, the assignment consumers behind the supervised connection
//! manager, and the periodic sweeps. Runs until SIGINT.

use std::sync::Arc;
use std::time::Duration;

use ringbook_broker::{ConnectionManager, HandlerRegistry, InProcessBroker, Topology};
use ringbook_config::model::RingbookConfig;
use ringbook_core::{MessagingAdapter, RingbookError, TelephonyAdapter};
use ringbook_dispatch::{
    AgentSelector, AssignmentHandler, AssignmentQueues, BookingLifecycle, CallPlacer, Sweeper,
};
use ringbook_notify::MessagingClient;
use ringbook_storage::Database;
use ringbook_telephony::TelephonyClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs the `ringbook serve` command.
pub async fn run_serve(config: RingbookConfig) -> Result<(), RingbookError> {
    init_tracing(&config.service.log_level);
    info!(service = %config.service.name, "starting ringbook serve");

    let db = Database::open(&config.storage.database_path).await?;

    let telephony: Arc<dyn TelephonyAdapter> =
        Arc::new(TelephonyClient::new(config.telephony.clone())?);
    let messaging: Arc<dyn MessagingAdapter> =
        Arc::new(MessagingClient::new(config.messaging.clone())?);

    let broker = Arc::new(InProcessBroker::new());
    let topology = Arc::new(Topology::lead_assignment()?);

    // First connection: gives the dispatcher its publishing channel and
    // asserts the queue graph before anything publishes.
    let (bootstrap, _state_rx) = ConnectionManager::new(
        broker.clone(),
        topology.clone(),
        HandlerRegistry::new(),
        Duration::from_secs(config.broker.reconnect_delay_secs),
    );
    let channel = bootstrap.connect_and_bind().await?;

    let queues = AssignmentQueues::from_topology(channel, &topology)?;
    let lifecycle = Arc::new(BookingLifecycle::new(
        db.clone(),
        queues,
        messaging,
        config.assignment.clone(),
    ));

    let handler = Arc::new(AssignmentHandler::new(
        db.clone(),
        AgentSelector::new(db.clone(), config.assignment.selection_buffer_mins),
        CallPlacer::new(db.clone(), telephony),
        lifecycle.clone(),
    ));
    let mut registry = HandlerRegistry::new();
    handler.register_all(&mut registry);

    // Supervised consumer connection.
    let (manager, mut state_rx) = ConnectionManager::new(
        broker,
        topology,
        registry,
        Duration::from_secs(config.broker.reconnect_delay_secs),
    );
    tokio::spawn(manager.run());
    while *state_rx.borrow() != ringbook_broker::ConnectionState::Ready {
        if state_rx.changed().await.is_err() {
            return Err(RingbookError::Broker {
                message: "connection manager stopped before becoming ready".to_string(),
                source: None,
            });
        }
    }
    info!("assignment consumers ready");

    // Periodic sweeps.
    let sweeper = Sweeper::new(
        lifecycle,
        Duration::from_secs(config.assignment.sweep_interval_secs),
    );
    let sweep_handle = sweeper.spawn();

    tokio::signal::ctrl_c().await.map_err(|e| RingbookError::Internal(e.to_string()))?;
    info!("shutdown signal received");
    sweep_handle.abort();

    Ok(())
}

/// Install the global tracing subscriber, honoring `RUST_LOG` over the
/// configured level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
