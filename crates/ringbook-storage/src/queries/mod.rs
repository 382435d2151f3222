// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per entity family.

pub mod agents;
pub mod bookings;
pub mod calls;
pub mod users;
