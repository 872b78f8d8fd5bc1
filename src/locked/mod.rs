//! Mutual exclusion. One lock serializes every operation on the queue, which
//! also makes it safe to free a node the moment it is dequeued.

pub mod queue;
