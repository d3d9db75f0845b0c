//! Resource limits: rate-refilled token buckets and one-shot totals.

use std::time::Instant;

use parking_lot::Mutex;

/// Name of the built-in limit bounding simultaneous LThreads.
pub const LTHREAD_COUNT_LIMIT: &str = "lthread/count";

/// How a limit's tokens behave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LimitKind {
    /// Tokens refill continuously at a rate.
    Rate { per_second: u64 },
    /// Tokens never refill; depletion is final. Tokens can be given back
    /// explicitly (e.g. when an LThread finishes).
    Total,
}

/// Declaration of a limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limit {
    pub name: String,
    pub kind: LimitKind,
    pub capacity: u64,
}

impl Limit {
    pub fn total(name: impl Into<String>, capacity: u64) -> Self {
        Limit {
            name: name.into(),
            kind: LimitKind::Total,
            capacity,
        }
    }

    pub fn rate(name: impl Into<String>, capacity: u64, per_second: u64) -> Self {
        Limit {
            name: name.into(),
            kind: LimitKind::Rate { per_second },
            capacity,
        }
    }
}

/// Limit-accounting failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("limit `{name}` is depleted")]
    Depleted { name: String },
    #[error("cannot take {requested} tokens from limit `{name}` with capacity {capacity}")]
    RequestTooLarge {
        name: String,
        requested: u64,
        capacity: u64,
    },
}

struct BucketState {
    available: u64,
    last_refill: Instant,
}

/// A token bucket backing one limit.
///
/// Buckets are shared down the context tree so that children consume from
/// the same budget as their spawner.
pub struct TokenBucket {
    limit: Limit,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(limit: Limit) -> Self {
        let available = limit.capacity;
        TokenBucket {
            limit,
            state: Mutex::new(BucketState {
                available,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    pub fn available(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.available
    }

    fn refill(&self, state: &mut BucketState) {
        if let LimitKind::Rate { per_second } = self.limit.kind {
            let elapsed = state.last_refill.elapsed();
            let accrued = (elapsed.as_millis() as u64).saturating_mul(per_second) / 1000;
            if accrued > 0 {
                state.available = (state.available + accrued).min(self.limit.capacity);
                state.last_refill = Instant::now();
            }
        }
    }

    /// Take `n` tokens.
    ///
    /// Rate buckets block (in small sleep slices) until enough tokens have
    /// accrued, checking `should_abort` between slices. Total buckets fail
    /// immediately when depleted.
    pub fn take(&self, n: u64, should_abort: &dyn Fn() -> bool) -> Result<(), LimitError> {
        if n > self.limit.capacity {
            return Err(LimitError::RequestTooLarge {
                name: self.limit.name.clone(),
                requested: n,
                capacity: self.limit.capacity,
            });
        }
        loop {
            {
                let mut state = self.state.lock();
                self.refill(&mut state);
                if state.available >= n {
                    state.available -= n;
                    return Ok(());
                }
                if self.limit.kind == LimitKind::Total {
                    return Err(LimitError::Depleted {
                        name: self.limit.name.clone(),
                    });
                }
            }
            if should_abort() {
                return Err(LimitError::Depleted {
                    name: self.limit.name.clone(),
                });
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    /// Give `n` tokens back (total limits only; rate buckets refill on
    /// their own).
    pub fn give_back(&self, n: u64) {
        if self.limit.kind == LimitKind::Total {
            let mut state = self.state.lock();
            state.available = (state.available + n).min(self.limit.capacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_limit_depletes() {
        let bucket = TokenBucket::new(Limit::total("lthread/count", 2));
        let never = || false;
        assert!(bucket.take(1, &never).is_ok());
        assert!(bucket.take(1, &never).is_ok());
        assert_eq!(
            bucket.take(1, &never),
            Err(LimitError::Depleted {
                name: "lthread/count".into()
            })
        );
        bucket.give_back(1);
        assert!(bucket.take(1, &never).is_ok());
    }

    #[test]
    fn oversized_request_fails_fast() {
        let bucket = TokenBucket::new(Limit::rate("fs/read", 10, 100));
        assert!(matches!(
            bucket.take(11, &|| false),
            Err(LimitError::RequestTooLarge { .. })
        ));
    }

    #[test]
    fn rate_bucket_refills() {
        let bucket = TokenBucket::new(Limit::rate("fs/read", 10, 1_000_000));
        assert!(bucket.take(10, &|| false).is_ok());
        // At 1M tokens/s the bucket refills within a few milliseconds.
        assert!(bucket.take(10, &|| false).is_ok());
    }
}
