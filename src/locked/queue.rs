//! The same linked list as `deferred::queue`, behind one mutex.
//!
//! Every structural change happens under the lock, so a dequeued node can be
//! freed as soon as the lock is released. Used as a baseline.
use std::mem;
use std::sync::atomic::Ordering::Relaxed;

use parking_lot::Mutex;

use crate::atomic::Owned;
use crate::node::Node;

#[derive(Debug)]
struct Inner<T> {
    head: Owned<Node<T>>,
    /// The last node of the list owned through `head`.
    tail: *const Node<T>,
    size: usize,
}

// `tail` only ever points into the list that `head` owns.
unsafe impl<T: Send> Send for Inner<T> {}

#[derive(Debug)]
pub struct LockedQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Copy + Default> Default for LockedQueue<T> {
    fn default() -> Self {
        let head = Owned::new(Node::sentinel());
        let tail: *const Node<T> = &*head;
        LockedQueue {
            inner: Mutex::new(Inner {
                head,
                tail,
                size: 0,
            }),
        }
    }
}

impl<T: Copy + Default> LockedQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, value: T) {
        let node = Owned::new(Node::new(value)).into_ptr();
        let mut inner = self.inner.lock();
        // `tail` is always a live node of the list we hold the lock for.
        unsafe { &*inner.tail }.next.store(node, Relaxed);
        inner.tail = node.as_raw();
        inner.size += 1;
    }

    pub fn dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let next = inner.head.next.load(Relaxed);
        let node = unsafe { next.as_ref() }?;
        let value = node.value();
        // `next` was owned through the old head's link; it now becomes the
        // sentinel and owns the rest of the list.
        let old = mem::replace(&mut inner.head, unsafe { next.into_owned() });
        inner.size -= 1;
        drop(inner);
        drop(old);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for LockedQueue<T> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let mut freed = 1;
        let mut node = inner.head.next.load(Relaxed);
        while !node.is_null() {
            let owned = unsafe { node.into_owned() };
            node = owned.next.load(Relaxed);
            drop(owned);
            freed += 1;
        }
        // The sentinel goes with `inner.head`.
        debug!(freed, "locked queue dropped");
    }
}
