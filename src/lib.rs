//! Concurrent FIFO queues for small `Copy` payloads.
//!
//! `deferred::queue::LockFreeQueue` is a Michael-Scott queue whose dequeued
//! nodes are parked in a `deferred::RetiredList` until the owner reclaims
//! them at a quiescent point. `locked::queue::LockedQueue` is the same list
//! behind a mutex, and serves as the baseline it is measured against.
#[macro_use]
extern crate tracing;

pub mod atomic;
pub mod backoff;
pub mod config;
pub mod deferred;
pub mod locked;
pub mod node;

pub use backoff::Backoff;
pub use config::{Config, ConfigError};
pub use deferred::queue::LockFreeQueue;
pub use deferred::{OverflowPolicy, ReclaimState, RetiredList};
pub use locked::queue::LockedQueue;

pub trait Queue<T> {
    fn new() -> Self;
    fn enqueue(&self, value: T);
    fn dequeue(&self) -> Option<T>;
    fn is_empty(&self) -> bool;
    fn approx_size(&self) -> isize;
}

impl<T: Copy + Default> Queue<T> for deferred::queue::LockFreeQueue<T> {
    fn new() -> Self {
        deferred::queue::LockFreeQueue::new()
    }
    fn enqueue(&self, value: T) {
        deferred::queue::LockFreeQueue::enqueue(self, value);
    }
    fn dequeue(&self) -> Option<T> {
        deferred::queue::LockFreeQueue::dequeue(self)
    }
    fn is_empty(&self) -> bool {
        deferred::queue::LockFreeQueue::is_empty(self)
    }
    fn approx_size(&self) -> isize {
        deferred::queue::LockFreeQueue::approx_size(self)
    }
}

impl<T: Copy + Default> Queue<T> for locked::queue::LockedQueue<T> {
    fn new() -> Self {
        locked::queue::LockedQueue::new()
    }
    fn enqueue(&self, value: T) {
        locked::queue::LockedQueue::enqueue(self, value);
    }
    fn dequeue(&self) -> Option<T> {
        locked::queue::LockedQueue::dequeue(self)
    }
    fn is_empty(&self) -> bool {
        locked::queue::LockedQueue::is_empty(self)
    }
    fn approx_size(&self) -> isize {
        locked::queue::LockedQueue::len(self) as isize
    }
}

#[cfg(test)]
#[macro_use]
extern crate lazy_static;
