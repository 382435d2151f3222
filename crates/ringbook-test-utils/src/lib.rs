// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Ringbook workspace: mock collaborator adapters
//! and a database harness with seed helpers.

pub mod harness;
pub mod mock_messaging;
pub mod mock_telephony;

pub use harness::TestHarness;
pub use mock_messaging::{MockMessaging, PromptKind};
pub use mock_telephony::{MockTelephony, PlacedCall};
