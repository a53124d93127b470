// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure Layer
//!
//! Event streaming and snapshot persistence adapters.

pub mod event_bus;
pub mod repositories;

pub use event_bus::{DomainEvent, EventBus, EventBusError, EventReceiver};
pub use repositories::{FileSnapshotRepository, InMemorySnapshotRepository};
