// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the swarm coordinator CLI

pub mod config;
pub mod run;
pub mod simulate;
pub mod snapshot;

pub use self::config::ConfigCommand;
pub use self::simulate::SimulateArgs;
pub use self::snapshot::SnapshotCommand;
