// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Temporal Wave Scheduler
//!
//! Staggers clone attempts: `wave = clone_id mod wave_count`,
//! `delay = wave × wave_interval + jitter` with `jitter ~ U[0, max_jitter]`.
//! Urgency strictly above the override threshold returns zero. The delay is
//! advisory and never gates `try_claim`.

use crate::domain::clone::CloneId;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveSettings {
    pub wave_count: u64,
    pub wave_interval: Duration,
    pub override_threshold: f64,
    pub max_jitter: Duration,
}

impl Default for WaveSettings {
    fn default() -> Self {
        Self {
            wave_count: 10,
            wave_interval: Duration::from_millis(100),
            override_threshold: 0.95,
            max_jitter: Duration::from_millis(20),
        }
    }
}

pub struct WaveScheduler {
    settings: WaveSettings,
    rng: Mutex<StdRng>,
}

impl WaveScheduler {
    pub fn new(settings: WaveSettings) -> Self {
        Self::with_rng(settings, StdRng::from_os_rng())
    }

    pub fn with_seed(settings: WaveSettings, seed: u64) -> Self {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(settings: WaveSettings, rng: StdRng) -> Self {
        Self {
            settings,
            rng: Mutex::new(rng),
        }
    }

    pub fn settings(&self) -> &WaveSettings {
        &self.settings
    }

    pub fn wave_of(&self, clone_id: CloneId) -> u64 {
        clone_id.0 % self.settings.wave_count.max(1)
    }

    /// Deterministic part of the delay.
    pub fn base_delay(&self, clone_id: CloneId) -> Duration {
        let wave = u32::try_from(self.wave_of(clone_id)).unwrap_or(u32::MAX);
        self.settings.wave_interval.saturating_mul(wave)
    }

    pub fn schedule_delay(&self, clone_id: CloneId, urgency_score: f64) -> Duration {
        // NaN urgency never overrides
        if urgency_score > self.settings.override_threshold {
            trace!(%clone_id, urgency_score, "Urgency override, executing immediately");
            return Duration::ZERO;
        }
        let base = self.base_delay(clone_id);
        let jitter = self.jitter();
        trace!(%clone_id, wave = self.wave_of(clone_id), ?base, ?jitter, "Scheduled attempt");
        base + jitter
    }

    fn jitter(&self) -> Duration {
        let max = self.settings.max_jitter.as_nanos().min(u64::MAX as u128) as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.rng.lock().random_range(0..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_base_delay() {
        let scheduler = WaveScheduler::with_seed(WaveSettings::default(), 1);
        assert_eq!(scheduler.wave_of(CloneId(24)), 4);
        assert_eq!(scheduler.base_delay(CloneId(24)), Duration::from_millis(400));
        assert_eq!(scheduler.base_delay(CloneId(30)), Duration::ZERO);
    }

    #[test]
    fn test_jitter_is_bounded() {
        let scheduler = WaveScheduler::with_seed(WaveSettings::default(), 7);
        for _ in 0..500 {
            let d = scheduler.schedule_delay(CloneId(24), 0.5);
            assert!(d >= Duration::from_millis(400));
            assert!(d <= Duration::from_millis(420));
        }
    }

    #[test]
    fn test_urgency_override() {
        let scheduler = WaveScheduler::with_seed(WaveSettings::default(), 3);
        assert_eq!(scheduler.schedule_delay(CloneId(24), 0.97), Duration::ZERO);
        // Exactly at the threshold does not override
        assert!(scheduler.schedule_delay(CloneId(24), 0.95) >= Duration::from_millis(400));
        assert!(scheduler.schedule_delay(CloneId(24), f64::NAN) >= Duration::from_millis(400));
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let settings = WaveSettings {
            max_jitter: Duration::ZERO,
            ..WaveSettings::default()
        };
        let scheduler = WaveScheduler::new(settings);
        assert_eq!(scheduler.schedule_delay(CloneId(7), 0.1), Duration::from_millis(700));
    }
}
