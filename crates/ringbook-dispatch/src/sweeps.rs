// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic sweeps over booking and call state.
//!
//! Each tick runs the lifecycle manager's four sweeps in dependency order:
//! stuck AWAITING_SCHEDULE bookings first, then due SCHEDULED bookings,
//! then stalled calls, then errored placements. Sweep failures are logged
//! and never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::lifecycle::BookingLifecycle;

/// Runs the lifecycle sweeps on a fixed interval.
pub struct Sweeper {
    lifecycle: Arc<BookingLifecycle>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(lifecycle: Arc<BookingLifecycle>, interval: Duration) -> Self {
        Self {
            lifecycle,
            interval,
        }
    }

    /// Run every sweep once.
    pub async fn run_once(&self) {
        if let Err(e) = self.lifecycle.sweep_awaiting_schedule().await {
            warn!(error = %e, "awaiting-schedule sweep failed");
        }
        if let Err(e) = self.lifecycle.sweep_scheduled().await {
            warn!(error = %e, "scheduled sweep failed");
        }
        if let Err(e) = self.lifecycle.sweep_stalled_calls().await {
            warn!(error = %e, "stalled-call sweep failed");
        }
        if let Err(e) = self.lifecycle.sweep_call_errors().await {
            warn!(error = %e, "call-error sweep failed");
        }
    }

    /// Spawn the periodic sweep loop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
