// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query operations, grouped by entity.

pub mod blasts;
pub mod devices;
pub mod queue;
pub mod users;
