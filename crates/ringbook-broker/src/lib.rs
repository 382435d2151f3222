// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Work-queue layer for the Ringbook call-routing backend.
//!
//! Provides the typed topology table, the broker transport traits with an
//! in-process implementation, the channel binder implementing the
//! delayed-retry/dead-letter algorithm, and the supervised connection
//! manager.

pub mod binder;
pub mod connection;
pub mod inprocess;
pub mod topology;
pub mod transport;

pub use binder::{ChannelBinder, HandlerOutcome, HandlerRegistry, QueueHandler};
pub use connection::{ConnectionManager, ConnectionState};
pub use inprocess::InProcessBroker;
pub use topology::{DelayTier, StaticDeadQueue, Topology, TopologyEntry};
pub use transport::{Broker, BrokerChannel, Delivery, QueueArgs, QueuePublisher};
