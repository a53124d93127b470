// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Crash recovery through the file snapshot repository, and YAML config files.

use std::sync::Arc;
use std::time::Duration;
use swarm_core::application::{CoordinationService, LoggingLauncher, SwarmCoordinator};
use swarm_core::domain::clock::{Clock, ManualClock};
use swarm_core::domain::config::CoordinatorConfig;
use swarm_core::domain::heartbeat::PartialStateSnapshot;
use swarm_core::domain::opportunity::Fingerprint;
use swarm_core::domain::repository::SnapshotRepository;
use swarm_core::infrastructure::FileSnapshotRepository;
use tempfile::TempDir;

fn coordinator(clock: Arc<ManualClock>) -> SwarmCoordinator {
    SwarmCoordinator::with_seed(&CoordinatorConfig::default(), clock, Arc::new(LoggingLauncher), 21)
}

#[tokio::test]
async fn test_recover_after_restart() {
    let dir = TempDir::new().unwrap();
    let repository = FileSnapshotRepository::new(dir.path().join("state").join("swarm.json"));
    let clock = Arc::new(ManualClock::default());

    let before = coordinator(clock.clone());
    let root = before.register_root(None).id;
    let child = before.spawn_clone(root).unwrap().id;
    before
        .heartbeat(child, PartialStateSnapshot::at(clock.now()))
        .await
        .unwrap();
    let fp = Fingerprint::from("ETH:arb:7");
    before.try_claim(&fp, child, Duration::from_secs(60)).await;
    let reservation_id = before
        .reserve(child, &fp, 2_000.0)
        .await
        .unwrap()
        .reservation_id()
        .unwrap();
    before.persist(&repository).await.unwrap();

    let after = coordinator(clock.clone());
    assert!(after.recover(&repository).await.unwrap());

    assert_eq!(after.ledger().pool(), before.ledger().pool());
    assert_eq!(after.claims().holder_of(&fp), Some(child));
    assert_eq!(after.clones().all().len(), 2);
    assert!(after.heartbeats().get(child).is_some());

    // Recovered reservations settle normally
    let settlement = after.settle(reservation_id, 120.0).await.unwrap();
    assert_eq!(settlement.pool.total_balance, 10_120.0);
    assert_eq!(settlement.pool.committed, 0.0);
    assert_eq!(after.claims().holder_of(&fp), None);

    // New clones do not reuse recovered ids
    let sibling = after.spawn_clone(root).unwrap().id;
    assert!(sibling.0 > child.0);
}

#[tokio::test]
async fn test_recover_after_downtime_keeps_the_swarm() {
    let dir = TempDir::new().unwrap();
    let repository = FileSnapshotRepository::new(dir.path().join("swarm.json"));
    let clock = Arc::new(ManualClock::default());

    let before = coordinator(clock.clone());
    let root = before.register_root(None).id;
    let mut ids = vec![root];
    for _ in 0..3 {
        ids.push(before.spawn_clone(root).unwrap().id);
    }
    for id in &ids {
        before.heartbeat(*id, PartialStateSnapshot::at(clock.now())).await.unwrap();
    }
    let fp = Fingerprint::from("SOL:arb:3");
    before.try_claim(&fp, ids[1], Duration::from_secs(600)).await;
    before.reserve(ids[1], &fp, 1_000.0).await.unwrap();
    before.persist(&repository).await.unwrap();

    // The replacement process comes up two minutes later.
    let later = Arc::new(ManualClock::new(clock.now()));
    later.advance(Duration::from_secs(120));
    let after = coordinator(later.clone());
    assert!(after.recover(&repository).await.unwrap());

    let report = after.sweep().await.unwrap();
    assert!(report.suspected.is_empty());
    assert!(report.outcomes.is_empty());
    assert_eq!(after.status().clones.get("retired"), None);
    assert_eq!(after.ledger().pool().committed, 1_000.0);
    assert_eq!(after.ledger().committed_by(ids[1]), 1_000.0);

    // The grace period is one fresh window, not a pardon.
    later.advance(Duration::from_secs(91));
    for id in &ids[1..] {
        after.heartbeat(*id, PartialStateSnapshot::at(later.now())).await.unwrap();
    }
    let report = after.sweep().await.unwrap();
    assert_eq!(report.suspected, vec![root]);
    assert_eq!(after.ledger().pool().committed, 1_000.0);
}

#[tokio::test]
async fn test_recover_without_snapshot() {
    let dir = TempDir::new().unwrap();
    let repository = FileSnapshotRepository::new(dir.path().join("missing.json"));
    assert!(repository.load().await.unwrap().is_none());

    let fresh = coordinator(Arc::new(ManualClock::default()));
    assert!(!fresh.recover(&repository).await.unwrap());
    assert_eq!(fresh.ledger().pool().total_balance, 10_000.0);
}

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("coordinator.yaml");

    let mut config = CoordinatorConfig::default();
    config.spec.ledger.discovery_bonus_fraction = 0.15;
    config.spec.scheduler.wave_count = 12;
    config.spec.resurrection.heartbeat_interval = Duration::from_secs(10);
    config.to_yaml_file(&path).unwrap();

    let loaded = CoordinatorConfig::from_yaml_file(&path).unwrap();
    assert_eq!(loaded.spec.ledger.discovery_bonus_fraction, 0.15);
    assert_eq!(loaded.spec.scheduler.wave_count, 12);
    assert_eq!(loaded.spec.resurrection.heartbeat_interval, Duration::from_secs(10));
    assert!(loaded.validate().is_ok());

    let explicit = CoordinatorConfig::load_or_default(Some(path)).unwrap();
    assert_eq!(explicit.spec.scheduler.wave_count, 12);

    assert!(CoordinatorConfig::load_or_default(Some(dir.path().join("absent.yaml"))).is_err());
}
