// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for Ringbook's external collaborators.
//!
//! All adapters extend the [`CollaboratorAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod messaging;
pub mod telephony;

pub use adapter::CollaboratorAdapter;
pub use messaging::MessagingAdapter;
pub use telephony::TelephonyAdapter;
