//! Transactions: ordered effect enrollment with commit/rollback atomicity.

use std::sync::Arc;

use parking_lot::Mutex;
use ulid::Ulid;

use crate::effect::{Effect, EffectError, Reversibility};

/// Transaction lifecycle failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("context already has a transaction")]
    AlreadyHasTransaction,
    #[error("cannot add an irreversible effect to a transaction")]
    CannotAddIrreversibleEffect,
    #[error("transaction is finished")]
    FinishedTransaction,
    #[error("commit failed while applying an effect: {0}")]
    CommitFailed(EffectError),
    #[error("rollback failed while reversing an effect: {0}")]
    RollbackFailed(EffectError),
}

impl TransactionError {
    /// Stable identifier surfaced to user code.
    pub const fn id(&self) -> &'static str {
        match self {
            TransactionError::AlreadyHasTransaction => "AlreadyHasTransaction",
            TransactionError::CannotAddIrreversibleEffect => "CannotAddIrreversibleEffect",
            TransactionError::FinishedTransaction => "FinishedTransaction",
            TransactionError::CommitFailed(_) => "CommitFailed",
            TransactionError::RollbackFailed(_) => "RollbackFailed",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TxState {
    Running,
    Finished,
}

struct TxInner {
    id: Ulid,
    state: Mutex<TxState>,
    effects: Mutex<Vec<Arc<dyn Effect>>>,
}

/// A transaction: an ordered enrollment of effects.
///
/// At most one transaction is current per Context; see
/// [`Context::start_transaction`](crate::Context::start_transaction).
/// Cloning the handle shares the transaction.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxInner>,
}

impl Transaction {
    pub(crate) fn new() -> Self {
        Transaction {
            inner: Arc::new(TxInner {
                id: Ulid::new(),
                state: Mutex::new(TxState::Running),
                effects: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> Ulid {
        self.inner.id
    }

    pub fn is_finished(&self) -> bool {
        *self.inner.state.lock() == TxState::Finished
    }

    /// Number of enrolled effects.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.lock().len()
    }

    /// Enroll an effect.
    ///
    /// Irreversible effects are refused and leave the transaction in its
    /// prior state.
    pub fn add_effect(&self, effect: Arc<dyn Effect>) -> Result<(), TransactionError> {
        if self.is_finished() {
            return Err(TransactionError::FinishedTransaction);
        }
        if effect.reversibility() == Reversibility::Irreversible {
            return Err(TransactionError::CannotAddIrreversibleEffect);
        }
        self.inner.effects.lock().push(effect);
        Ok(())
    }

    /// Apply enrolled effects in enrollment order.
    ///
    /// An apply failure aborts the commit and rolls back already-applied
    /// effects in reverse order; the original failure is reported.
    pub fn commit(&self) -> Result<(), TransactionError> {
        {
            let mut state = self.inner.state.lock();
            if *state == TxState::Finished {
                return Err(TransactionError::FinishedTransaction);
            }
            *state = TxState::Finished;
        }
        let effects = self.inner.effects.lock().clone();
        tracing::debug!(tx = %self.inner.id, effects = effects.len(), "committing transaction");
        for (index, effect) in effects.iter().enumerate() {
            if let Err(apply_error) = effect.apply() {
                // Undo what was applied, newest first.
                for applied in effects[..index].iter().rev() {
                    if applied.is_applied() {
                        let _ = applied.reverse();
                    }
                }
                return Err(TransactionError::CommitFailed(apply_error));
            }
        }
        Ok(())
    }

    /// Reverse applied effects in reverse enrollment order; unapplied
    /// effects are discarded.
    pub fn rollback(&self) -> Result<(), TransactionError> {
        {
            let mut state = self.inner.state.lock();
            if *state == TxState::Finished {
                return Err(TransactionError::FinishedTransaction);
            }
            *state = TxState::Finished;
        }
        let effects = self.inner.effects.lock().clone();
        tracing::debug!(tx = %self.inner.id, effects = effects.len(), "rolling back transaction");
        let mut first_failure: Option<EffectError> = None;
        for effect in effects.iter().rev() {
            if effect.is_applied() {
                if let Err(e) = effect.reverse() {
                    first_failure.get_or_insert(e);
                }
            }
        }
        match first_failure {
            Some(e) => Err(TransactionError::RollbackFailed(e)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
