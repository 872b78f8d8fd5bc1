//! Retry policies for the CAS loops in `deferred::queue`.
//!
//! A policy only decides how long a thread waits before it tries again. It
//! never changes which CAS is attempted, so every policy keeps the queue
//! lock-free.
use std::hint;
use std::thread;

use crossbeam::utils;

/// Largest exponent accepted for `Backoff::Exponential`.
pub const MAX_STEP: u32 = 16;

/// How a thread waits between two attempts of the same CAS loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    Spin,
    /// Spin `2^step` times while `step <= spin_limit`, then yield the
    /// thread. `step` stops growing at `yield_limit`.
    Exponential { spin_limit: u32, yield_limit: u32 },
    /// `crossbeam`'s adaptive backoff.
    Adaptive,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Adaptive
    }
}

impl Backoff {
    /// Fresh retry state for one queue operation.
    pub(crate) fn start(&self) -> Retry {
        match *self {
            Backoff::Spin => Retry::Spin,
            Backoff::Exponential {
                spin_limit,
                yield_limit,
            } => Retry::Exponential {
                step: 0,
                spin_limit,
                yield_limit,
            },
            Backoff::Adaptive => Retry::Adaptive(utils::Backoff::new()),
        }
    }
}

/// Per-call state of a [`Backoff`] policy.
pub(crate) enum Retry {
    Spin,
    Exponential {
        step: u32,
        spin_limit: u32,
        yield_limit: u32,
    },
    Adaptive(utils::Backoff),
}

impl Retry {
    /// Wait before the next attempt.
    pub(crate) fn snooze(&mut self) {
        match self {
            Retry::Spin => {}
            Retry::Exponential {
                step,
                spin_limit,
                yield_limit,
            } => {
                if *step <= *spin_limit {
                    for _ in 0..(1u32 << (*step).min(MAX_STEP)) {
                        hint::spin_loop();
                    }
                } else {
                    thread::yield_now();
                }
                if *step < *yield_limit {
                    *step += 1;
                }
            }
            Retry::Adaptive(b) => b.snooze(),
        }
    }

    /// Number of waits done so far, as far as the policy tracks it.
    #[cfg(test)]
    fn step(&self) -> u32 {
        match self {
            Retry::Exponential { step, .. } => *step,
            _ => 0,
        }
    }
}
