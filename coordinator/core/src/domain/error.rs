// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::clone::CloneError;
use crate::domain::genome::GenomeError;
use crate::domain::ledger::LedgerError;
use crate::domain::repository::RepositoryError;
use thiserror::Error;

/// Umbrella error of the coordination facade.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error(transparent)]
    Genome(#[from] GenomeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CoordinatorError {
    /// Errors that indicate a logic fault rather than a bad request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Ledger(
                LedgerError::ReservationConflict { .. }
                    | LedgerError::InvariantViolation { .. }
                    | LedgerError::PoolHalted
            )
        )
    }
}
