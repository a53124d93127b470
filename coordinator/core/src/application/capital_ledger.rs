// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capital Pool Ledger
//!
//! Reservation / settlement accounting against one shared pool. The whole
//! ledger state sits behind a single mutex, so every operation is one step
//! of a serial history.
//!
//! Lock order is ledger state, then claim registry. The claim registry never
//! calls back into the ledger.
//!
//! ## Settlement attribution
//!
//! On positive PnL, `discovery_bonus_fraction × pnl` is credited to the
//! clone that discovered the opportunity and the remainder is split across
//! every clone with capital on the fingerprint, proportional to amount.
//! Losses are split the same way without a bonus.

use crate::application::claim_registry::ClaimRegistry;
use crate::application::opportunity_book::OpportunityBook;
use crate::domain::clock::Clock;
use crate::domain::clone::CloneId;
use crate::domain::events::{CapitalEvent, ClaimEvent};
use crate::domain::ledger::{
    LedgerError, Payout, PayoutKind, PoolState, Reservation, ReservationDenial, ReservationId,
    ReservationResult, ReservationState, Settlement, TradingPhase,
};
use crate::domain::opportunity::Fingerprint;
use crate::infrastructure::event_bus::EventBus;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Aggregate trading results since the ledger was created or restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub settled: u64,
    pub winning: u64,
    pub aborted: u64,
    pub realized_pnl: f64,
}

impl LedgerStats {
    pub fn win_rate(&self) -> f64 {
        if self.settled == 0 {
            0.0
        } else {
            self.winning as f64 / self.settled as f64
        }
    }
}

struct LedgerState {
    pool: PoolState,
    reservations: HashMap<ReservationId, Reservation>,
    credits: HashMap<CloneId, f64>,
    stats: LedgerStats,
}

impl LedgerState {
    fn halt(&mut self, violation: &LedgerError, now: DateTime<Utc>) -> CapitalEvent {
        self.pool.halted = true;
        error!(
            committed = self.pool.committed,
            total_balance = self.pool.total_balance,
            "Capital pool invariant violated, halting pool: {}",
            violation
        );
        CapitalEvent::PoolHalted {
            committed: self.pool.committed,
            total_balance: self.pool.total_balance,
            halted_at: now,
        }
    }

    fn held_mut(&mut self, id: ReservationId) -> Result<&mut Reservation, LedgerError> {
        let reservation = self
            .reservations
            .get_mut(&id)
            .ok_or(LedgerError::UnknownReservation(id))?;
        if reservation.state != ReservationState::Held {
            let err = LedgerError::ReservationConflict {
                id,
                expected: ReservationState::Held,
                actual: reservation.state,
            };
            error!(reservation_id = %id, "{}", err);
            return Err(err);
        }
        Ok(reservation)
    }
}

pub struct CapitalLedger {
    state: Mutex<LedgerState>,
    claims: Arc<ClaimRegistry>,
    opportunities: Arc<OpportunityBook>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    discovery_bonus_fraction: f64,
}

impl CapitalLedger {
    pub fn new(
        initial_balance: f64,
        discovery_bonus_fraction: f64,
        claims: Arc<ClaimRegistry>,
        opportunities: Arc<OpportunityBook>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                pool: PoolState::new(initial_balance),
                reservations: HashMap::new(),
                credits: HashMap::new(),
                stats: LedgerStats::default(),
            }),
            claims,
            opportunities,
            clock,
            event_bus,
            discovery_bonus_fraction: discovery_bonus_fraction.clamp(0.0, 1.0),
        }
    }

    /// Hold `amount` against the pool for a fingerprint the caller has a live
    /// claim on. Denials are returned as values and never wait.
    pub fn reserve(
        &self,
        clone_id: CloneId,
        fingerprint: &Fingerprint,
        amount: f64,
    ) -> Result<ReservationResult, LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let discovered_by = self
            .opportunities
            .get(fingerprint)
            .map(|o| o.discovered_by)
            .unwrap_or(clone_id);

        let mut state = self.state.lock();
        if state.pool.halted {
            return Err(LedgerError::PoolHalted);
        }
        let now = self.clock.now();

        let denial = if !self.claims.is_held_by(fingerprint, clone_id) {
            Some(ReservationDenial::NoClaim)
        } else if amount > state.pool.available() {
            Some(ReservationDenial::InsufficientBalance {
                requested: amount,
                available: state.pool.available(),
            })
        } else {
            None
        };

        if let Some(denial) = denial {
            drop(state);
            debug!(%clone_id, %fingerprint, amount, ?denial, "Reservation denied");
            let reason = match &denial {
                ReservationDenial::NoClaim => "no_claim",
                ReservationDenial::InsufficientBalance { .. } => "insufficient_balance",
            };
            metrics::counter!("swarm_reservations_total", "outcome" => reason).increment(1);
            self.event_bus.publish_capital_event(CapitalEvent::ReservationDenied {
                clone_id,
                fingerprint: fingerprint.clone(),
                amount,
                reason: reason.to_string(),
                denied_at: now,
            });
            return Ok(ReservationResult::Denied(denial));
        }

        let reservation = Reservation {
            id: ReservationId::new(),
            clone_id,
            fingerprint: fingerprint.clone(),
            amount,
            state: ReservationState::Held,
            discovered_by,
            created_at: now,
            closed_at: None,
            realized_pnl: None,
        };
        let reservation_id = reservation.id;

        let mut next = state.pool;
        next.committed += amount;
        if let Err(violation) = next.check_invariant() {
            let event = state.halt(&violation, now);
            drop(state);
            self.event_bus.publish_capital_event(event);
            return Err(violation);
        }
        state.pool = next;
        state.reservations.insert(reservation_id, reservation);
        let committed = state.pool.committed;
        drop(state);

        debug!(%clone_id, %fingerprint, %reservation_id, amount, committed, "Capital reserved");
        metrics::counter!("swarm_reservations_total", "outcome" => "reserved").increment(1);
        self.event_bus.publish_capital_event(CapitalEvent::CapitalReserved {
            reservation_id,
            clone_id,
            fingerprint: fingerprint.clone(),
            amount,
            reserved_at: now,
        });
        Ok(ReservationResult::Reserved { reservation_id })
    }

    /// Close a held reservation with its realized PnL: `total_balance +=
    /// pnl`, `committed -= amount` and payouts credited. The claim lock is
    /// released once no reservation on the fingerprint remains held.
    pub fn settle(&self, reservation_id: ReservationId, realized_pnl: f64) -> Result<Settlement, LedgerError> {
        if !realized_pnl.is_finite() {
            return Err(LedgerError::InvalidPnl(realized_pnl));
        }
        let mut state = self.state.lock();
        if state.pool.halted {
            return Err(LedgerError::PoolHalted);
        }
        let now = self.clock.now();

        let (clone_id, fingerprint, amount, discovered_by) = {
            let r = state.held_mut(reservation_id)?;
            (r.clone_id, r.fingerprint.clone(), r.amount, r.discovered_by)
        };

        let before = state.pool;
        let mut next = before;
        next.total_balance += realized_pnl;
        next.committed -= amount;
        if let Err(violation) = next.check_invariant() {
            let event = state.halt(&violation, now);
            drop(state);
            self.event_bus.publish_capital_event(event);
            return Err(violation);
        }

        let mut contributions: BTreeMap<CloneId, f64> = BTreeMap::new();
        for r in state.reservations.values() {
            if r.fingerprint == fingerprint && r.is_held() {
                *contributions.entry(r.clone_id).or_insert(0.0) += r.amount;
            }
        }
        let payouts = self.attribute(realized_pnl, discovered_by, &contributions);

        if let Some(r) = state.reservations.get_mut(&reservation_id) {
            r.state = ReservationState::Committed;
            r.closed_at = Some(now);
            r.realized_pnl = Some(realized_pnl);
        }
        state.pool = next;
        for payout in &payouts {
            *state.credits.entry(payout.clone_id).or_insert(0.0) += payout.amount;
        }
        state.stats.settled += 1;
        if realized_pnl > 0.0 {
            state.stats.winning += 1;
        }
        state.stats.realized_pnl += realized_pnl;
        let fingerprint_open = state
            .reservations
            .values()
            .any(|r| r.fingerprint == fingerprint && r.is_held());
        drop(state);

        // The claim stays held while other reservations on it are open.
        if !fingerprint_open {
            self.release_claim(&fingerprint, clone_id, now);
            self.opportunities.remove(&fingerprint);
        }

        info!(
            %clone_id,
            %reservation_id,
            realized_pnl,
            total_balance = next.total_balance,
            committed = next.committed,
            "Reservation settled"
        );
        metrics::counter!("swarm_settlements_total").increment(1);
        self.event_bus.publish_capital_event(CapitalEvent::ReservationSettled {
            reservation_id,
            clone_id,
            realized_pnl,
            total_balance: next.total_balance,
            settled_at: now,
        });
        if before.phase() != next.phase() {
            self.publish_phase_transition(before.phase(), next.phase(), next.total_balance, now);
        }

        Ok(Settlement {
            reservation_id,
            fingerprint,
            realized_pnl,
            payouts,
            pool: next,
        })
    }

    /// Return the full amount of a held reservation to the pool and release
    /// the claim lock. Returns the amount returned.
    pub fn abort(&self, reservation_id: ReservationId) -> Result<f64, LedgerError> {
        let mut state = self.state.lock();
        if state.pool.halted {
            return Err(LedgerError::PoolHalted);
        }
        let now = self.clock.now();
        let (clone_id, fingerprint, amount) = match Self::abort_locked(&mut state, reservation_id, now) {
            Ok(aborted) => aborted,
            Err(e) => return Err(self.fail(state, e, now)),
        };
        drop(state);

        self.release_claim(&fingerprint, clone_id, now);
        self.record_abort(reservation_id, clone_id, amount, now);
        Ok(amount)
    }

    /// Abort every held reservation of `clone_id` in one step. Returns the
    /// number of reservations aborted and the capital returned.
    pub fn abort_all_for(&self, clone_id: CloneId) -> Result<(usize, f64), LedgerError> {
        let mut state = self.state.lock();
        let held: Vec<ReservationId> = state
            .reservations
            .values()
            .filter(|r| r.clone_id == clone_id && r.is_held())
            .map(|r| r.id)
            .collect();
        // Nothing to return leaves the pool untouched, halted or not.
        if held.is_empty() {
            return Ok((0, 0.0));
        }
        if state.pool.halted {
            return Err(LedgerError::PoolHalted);
        }
        let now = self.clock.now();

        let mut aborted = Vec::with_capacity(held.len());
        for id in held {
            match Self::abort_locked(&mut state, id, now) {
                Ok((_, fingerprint, amount)) => aborted.push((id, fingerprint, amount)),
                Err(e) => return Err(self.fail(state, e, now)),
            }
        }
        drop(state);

        let mut returned = 0.0;
        for (id, fingerprint, amount) in &aborted {
            self.release_claim(fingerprint, clone_id, now);
            self.record_abort(*id, clone_id, *amount, now);
            returned += amount;
        }
        Ok((aborted.len(), returned))
    }

    fn abort_locked(
        state: &mut LedgerState,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<(CloneId, Fingerprint, f64), LedgerError> {
        let (clone_id, fingerprint, amount) = {
            let r = state.held_mut(reservation_id)?;
            (r.clone_id, r.fingerprint.clone(), r.amount)
        };
        let mut next = state.pool;
        next.committed -= amount;
        next.check_invariant()?;

        state.pool = next;
        if let Some(r) = state.reservations.get_mut(&reservation_id) {
            r.state = ReservationState::Released;
            r.closed_at = Some(now);
        }
        state.stats.aborted += 1;
        Ok((clone_id, fingerprint, amount))
    }

    /// Halt the pool if `err` is an invariant violation, then hand it back.
    fn fail(&self, mut state: MutexGuard<'_, LedgerState>, err: LedgerError, now: DateTime<Utc>) -> LedgerError {
        if matches!(err, LedgerError::InvariantViolation { .. }) {
            let event = state.halt(&err, now);
            drop(state);
            self.event_bus.publish_capital_event(event);
        }
        err
    }

    fn release_claim(&self, fingerprint: &Fingerprint, clone_id: CloneId, now: DateTime<Utc>) {
        if self.claims.release(fingerprint, clone_id) {
            self.event_bus.publish_claim_event(ClaimEvent::ClaimReleased {
                fingerprint: fingerprint.clone(),
                clone_id,
                released_at: now,
            });
        }
    }

    fn record_abort(&self, reservation_id: ReservationId, clone_id: CloneId, amount: f64, now: DateTime<Utc>) {
        info!(%clone_id, %reservation_id, returned = amount, "Reservation aborted");
        metrics::counter!("swarm_aborts_total").increment(1);
        self.event_bus.publish_capital_event(CapitalEvent::ReservationAborted {
            reservation_id,
            clone_id,
            returned: amount,
            aborted_at: now,
        });
    }

    fn publish_phase_transition(&self, from: TradingPhase, to: TradingPhase, total_balance: f64, now: DateTime<Utc>) {
        info!(?from, ?to, total_balance, "Trading phase transition");
        self.event_bus.publish_capital_event(CapitalEvent::PhaseTransition {
            from,
            to,
            total_balance,
            transitioned_at: now,
        });
    }

    fn attribute(&self, pnl: f64, discovered_by: CloneId, contributions: &BTreeMap<CloneId, f64>) -> Vec<Payout> {
        let mut payouts = Vec::with_capacity(contributions.len() + 1);
        let mut remainder = pnl;
        if pnl > 0.0 && self.discovery_bonus_fraction > 0.0 {
            let bonus = pnl * self.discovery_bonus_fraction;
            payouts.push(Payout {
                clone_id: discovered_by,
                kind: PayoutKind::DiscoveryBonus,
                amount: bonus,
            });
            remainder -= bonus;
        }
        let total: f64 = contributions.values().sum();
        if total > 0.0 {
            for (clone_id, amount) in contributions {
                payouts.push(Payout {
                    clone_id: *clone_id,
                    kind: PayoutKind::CapitalShare,
                    amount: remainder * amount / total,
                });
            }
        }
        payouts
    }

    pub fn pool(&self) -> PoolState {
        self.state.lock().pool
    }

    pub fn stats(&self) -> LedgerStats {
        self.state.lock().stats
    }

    pub fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.state.lock().reservations.get(&id).cloned()
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        let mut all: Vec<Reservation> = self.state.lock().reservations.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        all
    }

    /// Capital currently held by `clone_id` across live reservations.
    pub fn committed_by(&self, clone_id: CloneId) -> f64 {
        self.state
            .lock()
            .reservations
            .values()
            .filter(|r| r.clone_id == clone_id && r.is_held())
            .map(|r| r.amount)
            .sum()
    }

    /// Drop settled and aborted reservations closed at least `retention`
    /// ago. Held reservations are never touched.
    pub fn prune_closed(&self, retention: Duration) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let before = state.reservations.len();
        state.reservations.retain(|_, r| match (r.is_held(), r.closed_at) {
            (false, Some(closed_at)) => (now - closed_at).to_std().map_or(true, |age| age < retention),
            _ => true,
        });
        before - state.reservations.len()
    }

    /// Cumulative PnL attributed to `clone_id` by settlements.
    pub fn credits_of(&self, clone_id: CloneId) -> f64 {
        self.state.lock().credits.get(&clone_id).copied().unwrap_or(0.0)
    }

    /// Replace the pool and reservation table. Rejects a table whose held
    /// amounts disagree with `pool.committed`.
    pub fn restore(&self, pool: PoolState, reservations: Vec<Reservation>) -> Result<(), LedgerError> {
        let held: f64 = reservations.iter().filter(|r| r.is_held()).map(|r| r.amount).sum();
        pool.check_invariant()?;
        if (held - pool.committed).abs() > 1e-6 {
            return Err(LedgerError::InvariantViolation {
                committed: held,
                total_balance: pool.total_balance,
            });
        }
        let mut state = self.state.lock();
        state.pool = pool;
        state.reservations = reservations.into_iter().map(|r| (r.id, r)).collect();
        state.credits.clear();
        state.stats = LedgerStats::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::domain::opportunity::Opportunity;
    use crate::infrastructure::event_bus::DomainEvent;

    struct Fixture {
        clock: Arc<ManualClock>,
        claims: Arc<ClaimRegistry>,
        book: Arc<OpportunityBook>,
        ledger: CapitalLedger,
    }

    fn fixture(balance: f64) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let claims = Arc::new(ClaimRegistry::new(clock.clone()));
        let book = Arc::new(OpportunityBook::new(clock.clone()));
        let ledger = CapitalLedger::new(balance, 0.10, claims.clone(), book.clone(), clock.clone(), EventBus::new(64));
        Fixture { clock, claims, book, ledger }
    }

    fn claim(f: &Fixture, fp: &str, clone: u64) -> Fingerprint {
        let fp = Fingerprint::from(fp);
        assert!(f.claims.try_claim(&fp, CloneId(clone), Duration::from_secs(5)).is_granted());
        fp
    }

    #[test]
    fn test_reserve_requires_live_claim() {
        let f = fixture(10_000.0);
        let h1 = Fingerprint::from("H1");
        assert_eq!(
            f.ledger.reserve(CloneId(1), &h1, 100.0).unwrap(),
            ReservationResult::Denied(ReservationDenial::NoClaim)
        );

        claim(&f, "H1", 1);
        assert_eq!(
            f.ledger.reserve(CloneId(2), &h1, 100.0).unwrap(),
            ReservationResult::Denied(ReservationDenial::NoClaim)
        );

        f.clock.advance(Duration::from_secs(5));
        assert_eq!(
            f.ledger.reserve(CloneId(1), &h1, 100.0).unwrap(),
            ReservationResult::Denied(ReservationDenial::NoClaim)
        );
    }

    #[test]
    fn test_insufficient_balance() {
        let f = fixture(1_000.0);
        let h1 = claim(&f, "H1", 1);
        assert!(f.ledger.reserve(CloneId(1), &h1, 800.0).unwrap().reservation_id().is_some());
        match f.ledger.reserve(CloneId(1), &h1, 300.0).unwrap() {
            ReservationResult::Denied(ReservationDenial::InsufficientBalance { requested, available }) => {
                assert_eq!(requested, 300.0);
                assert_eq!(available, 200.0);
            }
            other => panic!("expected insufficient balance, got {:?}", other),
        }
        assert_eq!(f.ledger.pool().committed, 800.0);
    }

    #[test]
    fn test_invalid_amount_is_rejected() {
        let f = fixture(1_000.0);
        let h1 = claim(&f, "H1", 1);
        assert_eq!(f.ledger.reserve(CloneId(1), &h1, 0.0), Err(LedgerError::InvalidAmount(0.0)));
        assert!(f.ledger.reserve(CloneId(1), &h1, f64::NAN).is_err());
    }

    #[test]
    fn test_settle_scenario_and_lock_release() {
        let f = fixture(10_000.0);
        let h2 = claim(&f, "H2", 4);
        let id = f.ledger.reserve(CloneId(4), &h2, 3_000.0).unwrap().reservation_id().unwrap();
        assert_eq!(f.ledger.pool().committed, 3_000.0);
        assert_eq!(f.ledger.pool().available(), 7_000.0);

        let settlement = f.ledger.settle(id, 500.0).unwrap();
        assert_eq!(settlement.pool.total_balance, 10_500.0);
        assert_eq!(settlement.pool.committed, 0.0);
        assert_eq!(f.ledger.reservation(id).unwrap().state, ReservationState::Committed);
        assert_eq!(f.claims.holder_of(&h2), None);
    }

    #[test]
    fn test_discovery_bonus_and_capital_split() {
        let f = fixture(10_000.0);
        let now = f.clock.now();
        f.book.submit(Opportunity {
            fingerprint: "H3".into(),
            discovered_by: CloneId(9),
            estimated_profit: 100.0,
            discovery_time: now,
            deadline: now + chrono::TimeDelta::seconds(60),
        });
        let h3 = claim(&f, "H3", 1);
        let a = f.ledger.reserve(CloneId(1), &h3, 300.0).unwrap().reservation_id().unwrap();
        let _b = f.ledger.reserve(CloneId(1), &h3, 100.0).unwrap().reservation_id().unwrap();

        let settlement = f.ledger.settle(a, 1_000.0).unwrap();
        let bonus: f64 = settlement
            .payouts
            .iter()
            .filter(|p| p.kind == PayoutKind::DiscoveryBonus)
            .map(|p| p.amount)
            .sum();
        assert!((bonus - 100.0).abs() < 1e-9);
        assert!((f.ledger.credits_of(CloneId(9)) - 100.0).abs() < 1e-9);
        assert!((f.ledger.credits_of(CloneId(1)) - 900.0).abs() < 1e-9);
        let total: f64 = settlement.payouts.iter().map(|p| p.amount).sum();
        assert!((total - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_losses_carry_no_bonus() {
        let f = fixture(10_000.0);
        let h1 = claim(&f, "H1", 1);
        let id = f.ledger.reserve(CloneId(1), &h1, 500.0).unwrap().reservation_id().unwrap();
        let settlement = f.ledger.settle(id, -200.0).unwrap();
        assert!(settlement.payouts.iter().all(|p| p.kind == PayoutKind::CapitalShare));
        assert_eq!(settlement.pool.total_balance, 9_800.0);
        assert_eq!(f.ledger.stats().winning, 0);
    }

    #[test]
    fn test_double_close_is_conflict() {
        let f = fixture(10_000.0);
        let h1 = claim(&f, "H1", 1);
        let id = f.ledger.reserve(CloneId(1), &h1, 500.0).unwrap().reservation_id().unwrap();
        assert_eq!(f.ledger.abort(id), Ok(500.0));

        assert_eq!(
            f.ledger.settle(id, 10.0).unwrap_err(),
            LedgerError::ReservationConflict {
                id,
                expected: ReservationState::Held,
                actual: ReservationState::Released,
            }
        );
        assert!(matches!(f.ledger.abort(id), Err(LedgerError::ReservationConflict { .. })));
        assert_eq!(f.ledger.pool().committed, 0.0);
        assert_eq!(f.ledger.pool().total_balance, 10_000.0);
    }

    #[test]
    fn test_invariant_violation_halts_pool() {
        let f = fixture(1_000.0);
        let h1 = claim(&f, "H1", 1);
        let h2 = claim(&f, "H2", 2);
        let a = f.ledger.reserve(CloneId(1), &h1, 500.0).unwrap().reservation_id().unwrap();
        let b = f.ledger.reserve(CloneId(2), &h2, 500.0).unwrap().reservation_id().unwrap();

        // Losing more than the pool can cover leaves committed above balance.
        assert!(matches!(f.ledger.settle(a, -900.0), Err(LedgerError::InvariantViolation { .. })));
        assert!(f.ledger.pool().halted);
        assert_eq!(f.ledger.abort(b), Err(LedgerError::PoolHalted));
        assert_eq!(f.ledger.reserve(CloneId(2), &h2, 1.0), Err(LedgerError::PoolHalted));
        assert_eq!(f.ledger.pool().total_balance, 1_000.0);
    }

    #[test]
    fn test_abort_all_for_returns_capital_exactly() {
        let f = fixture(10_000.0);
        let h1 = claim(&f, "H1", 5);
        let h2 = claim(&f, "H2", 5);
        let other = claim(&f, "H3", 6);
        f.ledger.reserve(CloneId(5), &h1, 1_200.0).unwrap();
        f.ledger.reserve(CloneId(5), &h2, 800.0).unwrap();
        f.ledger.reserve(CloneId(6), &other, 50.0).unwrap();

        assert_eq!(f.ledger.committed_by(CloneId(5)), 2_000.0);
        let (count, returned) = f.ledger.abort_all_for(CloneId(5)).unwrap();
        assert_eq!(count, 2);
        assert_eq!(returned, 2_000.0);
        assert_eq!(f.ledger.pool().committed, 50.0);
        assert_eq!(f.ledger.pool().total_balance, 10_000.0);
        assert_eq!(f.claims.holder_of(&h1), None);
        assert_eq!(f.claims.holder_of(&other), Some(CloneId(6)));
    }

    #[test]
    fn test_restore_rejects_inconsistent_tables() {
        let f = fixture(1_000.0);
        let mut pool = PoolState::new(1_000.0);
        pool.committed = 100.0;
        assert!(f.ledger.restore(pool, vec![]).is_err());

        pool.committed = 0.0;
        f.ledger.restore(pool, vec![]).unwrap();
        assert_eq!(f.ledger.pool(), pool);
    }

    #[test]
    fn test_abort_below_zero_halts_instead_of_clamping() {
        let f = fixture(1_000.0);
        let mut pool = PoolState::new(1_000.0);
        pool.committed = 100.0 - 5e-7;
        let reservation = Reservation {
            id: ReservationId::new(),
            clone_id: CloneId(1),
            fingerprint: "H1".into(),
            amount: 100.0,
            state: ReservationState::Held,
            discovered_by: CloneId(1),
            created_at: f.clock.now(),
            closed_at: None,
            realized_pnl: None,
        };
        let id = reservation.id;
        f.ledger.restore(pool, vec![reservation]).unwrap();

        assert!(matches!(f.ledger.abort(id), Err(LedgerError::InvariantViolation { .. })));
        assert!(f.ledger.pool().halted);
        assert_eq!(f.ledger.pool().committed, 100.0 - 5e-7);
        assert!(f.ledger.reservation(id).unwrap().is_held());
    }

    #[test]
    fn test_closing_a_reservation_announces_the_released_claim() {
        let f = fixture(10_000.0);
        let mut events = f.ledger.event_bus.subscribe();
        let h1 = claim(&f, "H1", 1);
        let h2 = claim(&f, "H2", 1);
        let a = f.ledger.reserve(CloneId(1), &h1, 100.0).unwrap().reservation_id().unwrap();
        let b = f.ledger.reserve(CloneId(1), &h2, 100.0).unwrap().reservation_id().unwrap();
        f.ledger.settle(a, 5.0).unwrap();
        f.ledger.abort(b).unwrap();

        let mut released = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::Claim(ClaimEvent::ClaimReleased { fingerprint, clone_id, .. }) = event {
                assert_eq!(clone_id, CloneId(1));
                released.push(fingerprint);
            }
        }
        assert_eq!(released, vec![h1, h2]);
        assert_eq!(f.claims.live_count(), 0);
    }

    #[test]
    fn test_prune_closed_keeps_held_and_recent() {
        let f = fixture(10_000.0);
        let h1 = claim(&f, "H1", 1);
        let h2 = claim(&f, "H2", 2);
        let h3 = claim(&f, "H3", 3);
        let settled = f.ledger.reserve(CloneId(1), &h1, 100.0).unwrap().reservation_id().unwrap();
        let held = f.ledger.reserve(CloneId(2), &h2, 100.0).unwrap().reservation_id().unwrap();
        let aborted = f.ledger.reserve(CloneId(3), &h3, 100.0).unwrap().reservation_id().unwrap();
        f.ledger.settle(settled, 1.0).unwrap();

        f.clock.advance(Duration::from_secs(120));
        f.ledger.abort(aborted).unwrap();

        assert_eq!(f.ledger.prune_closed(Duration::from_secs(60)), 1);
        assert!(f.ledger.reservation(settled).is_none());
        assert!(f.ledger.reservation(held).unwrap().is_held());
        assert!(f.ledger.reservation(aborted).is_some());
        assert_eq!(f.ledger.pool().committed, 100.0);
    }
}
