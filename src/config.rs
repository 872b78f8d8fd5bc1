use thiserror::Error;

use crate::backoff::{Backoff, MAX_STEP};
use crate::deferred::OverflowPolicy;

/// Number of retired nodes a queue keeps before `OverflowPolicy` applies.
pub const DEFAULT_RETIRED_CAPACITY: usize = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backoff spin_limit ({spin_limit}) is larger than yield_limit ({yield_limit})")]
    SpinAboveYield { spin_limit: u32, yield_limit: u32 },
    #[error("backoff yield_limit ({0}) is larger than {max}", max = MAX_STEP)]
    YieldLimitTooLarge(u32),
    #[error("retired_capacity is 0 with OverflowPolicy::Leak, every dequeued node would leak")]
    ZeroCapacityLeaks,
}

/// Settings for a [`LockFreeQueue`](crate::deferred::queue::LockFreeQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub backoff: Backoff,
    pub retired_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            retired_capacity: DEFAULT_RETIRED_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retired_capacity(mut self, capacity: usize) -> Self {
        self.retired_capacity = capacity;
        self
    }

    pub fn overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// A capacity of 0 is only accepted with `OverflowPolicy::Grow`, where
    /// the capacity is ignored.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retired_capacity == 0 && self.overflow == OverflowPolicy::Leak {
            return Err(ConfigError::ZeroCapacityLeaks);
        }
        if let Backoff::Exponential {
            spin_limit,
            yield_limit,
        } = self.backoff
        {
            if yield_limit > MAX_STEP {
                return Err(ConfigError::YieldLimitTooLarge(yield_limit));
            }
            if spin_limit > yield_limit {
                return Err(ConfigError::SpinAboveYield {
                    spin_limit,
                    yield_limit,
                });
            }
        }
        Ok(())
    }
}
