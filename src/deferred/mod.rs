//! Deferred reclamation. A dequeued node is not freed right away, since other
//! threads may still be reading it; instead it is moved into a `RetiredList`
//! that is emptied once nobody can hold a reference into the queue anymore.
//!
//! This is much weaker than epochs or hazard pointers: memory is only given
//! back at explicit quiescence points, and a bounded list has to decide what
//! to do with nodes that do not fit (see [`OverflowPolicy`]).
use std::mem;

use parking_lot::Mutex;

pub mod queue;

use crate::atomic::Owned;

/// What `RetiredList::add` does with a node when the list is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Forget the node. Its memory is never given back, but it also can
    /// never be freed under a concurrent reader.
    Leak,
    /// Ignore the capacity and keep the node.
    Grow,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Leak
    }
}

/// Where a `RetiredList` is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimState {
    /// Nothing retained. A new list, or one that was just cleaned up.
    Empty,
    /// Some nodes are retained and more fit.
    Populated,
    /// Some nodes are retained, the list is full and the policy is
    /// `OverflowPolicy::Leak`: further nodes are leaked.
    Saturated,
}

#[derive(Debug)]
struct Retired<N> {
    nodes: Vec<Owned<N>>,
    leaked: usize,
}

/// Nodes that have been unlinked from a queue, but may still be read.
#[derive(Debug)]
pub struct RetiredList<N> {
    retired: Mutex<Retired<N>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<N> RetiredList<N> {
    pub fn with_capacity(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            retired: Mutex::new(Retired {
                nodes: Vec::new(),
                leaked: 0,
            }),
            capacity,
            policy,
        }
    }

    /// Take ownership of `node` until the next `cleanup`.
    ///
    /// If the list is full and the policy is `Leak`, the node is forgotten
    /// and the caller is not told.
    pub fn add(&self, node: Owned<N>) {
        let mut retired = self.retired.lock();
        if retired.nodes.len() < self.capacity || self.policy == OverflowPolicy::Grow {
            retired.nodes.push(node);
            return;
        }
        if retired.leaked == 0 {
            warn!(
                capacity = self.capacity,
                "retired list is full, leaking dequeued nodes"
            );
        }
        retired.leaked += 1;
        mem::forget(node);
    }

    /// Free every retained node, returning how many there were.
    ///
    /// Taking `&mut self` is what makes this sound: no other thread can be
    /// inside a queue operation that could still read one of the nodes.
    pub fn cleanup(&mut self) -> usize {
        let retired = self.retired.get_mut();
        let freed = retired.nodes.len();
        retired.nodes.clear();
        debug!(freed, leaked = retired.leaked, "retired list cleaned up");
        freed
    }

    /// Number of retained nodes.
    pub fn len(&self) -> usize {
        self.retired.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Number of nodes forgotten because the list was full.
    pub fn leaked(&self) -> usize {
        self.retired.lock().leaked
    }

    pub fn state(&self) -> ReclaimState {
        let len = self.len();
        if len == 0 {
            ReclaimState::Empty
        } else if len >= self.capacity && self.policy == OverflowPolicy::Leak {
            ReclaimState::Saturated
        } else {
            ReclaimState::Populated
        }
    }
}
