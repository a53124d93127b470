// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `swarm-core`: Trading Clone Swarm Coordination
//!
//! Lets many concurrently running trading clones share a finite set of
//! time-sensitive opportunities and one pooled capital balance without
//! colliding, double-spending, or silently losing clones to crashes.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `TradingClone`, `Genome`, `ClaimLock`, `Reservation`, `KnowledgeFragment`, config |
//! | [`application`] | Application | `ClaimRegistry`, `CapitalLedger`, `WaveScheduler`, `ResurrectionManager`, `SwarmCoordinator` |
//! | [`infrastructure`] | Infrastructure | `EventBus`, snapshot repositories |
//!
//! ## Control Flow
//!
//! A clone discovers an opportunity, asks the scheduler *when* it may act,
//! attempts a claim, reserves capital against the claim, and settles (or
//! aborts) the reservation when the trade finishes. Heartbeats and knowledge
//! fragments flow continuously; the resurrection manager watches heartbeats
//! and rebuilds or retires clones that go silent.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
