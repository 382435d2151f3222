// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch layer for the Ringbook call-routing backend.
//!
//! Ties the storage and broker layers together: agent availability
//! resolution, the booking lifecycle state machine, outbound call
//! placement, the assignment queue handlers, the call event reconciler,
//! and the periodic sweeps.

pub mod availability;
pub mod consumers;
pub mod lifecycle;
pub mod placement;
pub mod reconciler;
pub mod sweeps;

pub use availability::AgentSelector;
pub use consumers::AssignmentHandler;
pub use lifecycle::{AssignmentQueues, BookingLifecycle, FeedbackOutcome};
pub use placement::{CallPlacer, PlacementResult};
pub use reconciler::CallEventReconciler;
pub use sweeps::Sweeper;
