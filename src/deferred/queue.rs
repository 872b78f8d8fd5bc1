//! A Michael-Scott Queue with deferred reclamation.
//!
//! Michael and Scott. Simple, Fast, and Practical Non-Blocking and Blocking
//! Concurrent Queue Algorithms. PODC 1996.
use std::sync::atomic::AtomicIsize;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crossbeam::utils::CachePadded;

use super::RetiredList;
use crate::atomic::{Atomic, Owned, Ptr};
use crate::backoff::Backoff;
use crate::config::{Config, ConfigError};
use crate::node::Node;

/// Lock-free multi-producer multi-consumer queue.
// The list always starts with a sentinel node, which is the node `head`
// points to. `tail` points to the last node, or to a node behind it while an
// enqueue is between its two CASes. Dequeued-through nodes go to `retired`
// and stay allocated until `reclaim` or drop.
#[derive(Debug)]
pub struct LockFreeQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
    count: CachePadded<AtomicIsize>,
    retired: RetiredList<Node<T>>,
    backoff: Backoff,
}

impl<T: Copy + Default> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::build(Config::default())
    }
}

impl<T: Copy + Default> LockFreeQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        let sentinel = Owned::new(Node::sentinel()).into_ptr();
        let q = LockFreeQueue {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
            count: CachePadded::new(AtomicIsize::new(0)),
            retired: RetiredList::with_capacity(config.retired_capacity, config.overflow),
            backoff: config.backoff,
        };
        q.head.store(sentinel, Relaxed);
        q.tail.store(sentinel, Relaxed);
        trace!(?config, "lock-free queue created");
        q
    }

    pub fn enqueue(&self, value: T) {
        let new_node = Owned::new(Node::new(value)).into_ptr();
        let mut retry = self.backoff.start();
        loop {
            let tail = self.tail.load(Acquire);
            // No node is freed while `&self` is alive, retired ones included.
            let t = unsafe { tail.deref() };
            let next = t.next.load(Acquire);
            if tail != self.tail.load(Acquire) {
                retry.snooze();
                continue;
            }
            if next.is_null() {
                if t.next
                    .compare_and_set(Ptr::null(), new_node, Release)
                    .is_ok()
                {
                    // The node is linked. If moving `tail` fails, someone
                    // else has already helped us.
                    let _ = self.tail.compare_and_set(tail, new_node, Release);
                    self.count.fetch_add(1, Relaxed);
                    return;
                }
                retry.snooze();
            } else {
                // tail wasn't tail after all. Help the enqueue that linked
                // `next` by moving the tail pointer, then start over.
                let _ = self.tail.compare_and_set(tail, next, Release);
            }
        }
    }

    pub fn dequeue(&self) -> Option<T> {
        let mut retry = self.backoff.start();
        loop {
            let head = self.head.load(Acquire);
            let tail = self.tail.load(Acquire);
            let next = unsafe { head.deref() }.next.load(Acquire);
            if head != self.head.load(Acquire) {
                retry.snooze();
                continue;
            }
            if head == tail {
                if next.is_null() {
                    return None;
                }
                // An enqueue is between its two CASes. Finish it for them.
                let _ = self.tail.compare_and_set(tail, next, Release);
                continue;
            }
            let node = match unsafe { next.as_ref() } {
                Some(node) => node,
                None => continue,
            };
            // Read before the CAS: once `head` moves, `node` is the new
            // sentinel and its value belongs to us alone.
            let value = node.value();
            if self.head.compare_and_set(head, next, AcqRel).is_ok() {
                self.count.fetch_sub(1, Relaxed);
                // Only the thread whose CAS unlinked `head` gets here.
                self.retired.add(unsafe { head.into_owned() });
                return Some(value);
            }
            retry.snooze();
        }
    }

    /// The number of enqueues minus the number of dequeues so far.
    ///
    /// Exact when no operation is in flight. While other threads are
    /// running it may be off, and even negative.
    pub fn approx_size(&self) -> isize {
        self.count.load(Relaxed)
    }

    /// Number of elements, found by walking the list from `head`.
    ///
    /// Only meaningful while no other thread is using the queue.
    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut node = unsafe { self.head.load(Acquire).deref() };
        while let Some(next) = unsafe { node.next.load(Acquire).as_ref() } {
            node = next;
            len += 1;
        }
        len
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Acquire);
        let h = unsafe { head.deref() };
        h.next.load(Acquire).is_null()
    }

    pub fn retired(&self) -> &RetiredList<Node<T>> {
        &self.retired
    }

    /// Free all nodes dequeued so far.
    ///
    /// Needs `&mut self`: wrap the queue in an `Arc` for the concurrent
    /// phase, join the workers, and get the queue back with `Arc::get_mut`.
    pub fn reclaim(&mut self) -> usize {
        self.retired.cleanup()
    }
}

impl<T> LockFreeQueue<T> {
    /// Free every node reachable from `head`, the sentinel included, and
    /// return how many there were.
    ///
    /// # Safety
    ///
    /// The queue must not be used again afterwards, other than being
    /// forgotten.
    unsafe fn free_chain(&mut self) -> usize {
        let mut freed = 0;
        let mut node = self.head.load(Relaxed);
        while !node.is_null() {
            let owned = node.into_owned();
            node = owned.next.load(Relaxed);
            drop(owned);
            freed += 1;
        }
        freed
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        let freed = unsafe { self.free_chain() };
        debug!(
            freed,
            retired = self.retired.len(),
            leaked = self.retired.leaked(),
            "lock-free queue dropped"
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::deferred::{OverflowPolicy, ReclaimState};
    use std::mem::ManuallyDrop;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::spawn;

    use crossbeam::thread::scope;

    #[test]
    fn can_construct_queue() {
        let q: LockFreeQueue<u64> = LockFreeQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.approx_size(), 0);
    }

    #[test]
    fn st_queue_push_pop() {
        let q: LockFreeQueue<u32> = LockFreeQueue::new();
        q.enqueue(1);
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn st_queue_push_pop_many() {
        let q: LockFreeQueue<u32> = LockFreeQueue::new();
        for i in 0..100 {
            q.enqueue(i);
        }
        for i in 0..100 {
            assert_eq!(q.dequeue(), Some(i));
        }
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn st_queue_len() {
        let q: LockFreeQueue<i32> = LockFreeQueue::new();
        for i in 0..10 {
            q.enqueue(i);
        }
        assert_eq!(q.len(), 10);
        assert_eq!(q.approx_size(), 10);
        q.dequeue();
        assert_eq!(q.len(), 9);
        assert_eq!(q.approx_size(), 9);
    }

    #[test]
    fn empty_dequeue_has_no_side_effects() {
        let q: LockFreeQueue<i32> = LockFreeQueue::new();
        for _ in 0..10 {
            assert_eq!(q.dequeue(), None);
        }
        assert_eq!(q.approx_size(), 0);
        assert!(q.retired().is_empty());
        assert_eq!(q.retired().state(), ReclaimState::Empty);
    }

    #[test]
    fn dequeue_retires_and_reclaim_frees() {
        let mut q: LockFreeQueue<i32> = LockFreeQueue::new();
        for i in 0..50 {
            q.enqueue(i);
        }
        for _ in 0..20 {
            assert!(q.dequeue().is_some());
        }
        assert_eq!(q.retired().len(), 20);
        assert_eq!(q.reclaim(), 20);
        assert!(q.retired().is_empty());
        // Reclaiming must not touch the live part of the queue.
        for i in 20..50 {
            assert_eq!(q.dequeue(), Some(i));
        }
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn retired_overflow_is_leaked() {
        let config = Config::new().retired_capacity(8);
        let mut q: LockFreeQueue<u64> = LockFreeQueue::with_config(config).unwrap();
        for i in 0..20 {
            q.enqueue(i);
        }
        for i in 0..20 {
            assert_eq!(q.dequeue(), Some(i));
        }
        assert_eq!(q.retired().len(), 8);
        assert_eq!(q.retired().leaked(), 12);
        assert_eq!(q.retired().state(), ReclaimState::Saturated);
        assert_eq!(q.reclaim(), 8);
    }

    #[test]
    fn retired_overflow_can_grow() {
        let config = Config::new()
            .retired_capacity(8)
            .overflow(OverflowPolicy::Grow);
        let q: LockFreeQueue<u64> = LockFreeQueue::with_config(config).unwrap();
        for i in 0..20 {
            q.enqueue(i);
            q.dequeue();
        }
        assert_eq!(q.retired().len(), 20);
        assert_eq!(q.retired().leaked(), 0);
    }

    #[test]
    fn drop_frees_live_chain() {
        let mut q: LockFreeQueue<u32> = LockFreeQueue::new();
        for i in 0..10 {
            q.enqueue(i);
        }
        for _ in 0..3 {
            q.dequeue();
        }
        assert_eq!(q.reclaim(), 3);
        let mut q = ManuallyDrop::new(q);
        // Seven elements left, plus the sentinel.
        assert_eq!(unsafe { q.free_chain() }, 8);
    }

    #[test]
    fn empty_queue_frees_sentinel() {
        let q: LockFreeQueue<u32> = LockFreeQueue::new();
        let mut q = ManuallyDrop::new(q);
        assert_eq!(unsafe { q.free_chain() }, 1);
    }

    #[test]
    fn config_reaches_retired_list() {
        let config = Config::new()
            .retired_capacity(32)
            .overflow(OverflowPolicy::Grow);
        let q: LockFreeQueue<u32> = LockFreeQueue::with_config(config).unwrap();
        assert_eq!(q.retired().capacity(), 32);
        assert_eq!(q.retired().policy(), OverflowPolicy::Grow);

        let config = Config::new().retired_capacity(0);
        assert_eq!(
            LockFreeQueue::<u32>::with_config(config).err(),
            Some(ConfigError::ZeroCapacityLeaks)
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config::new().backoff(Backoff::Exponential {
            spin_limit: 10,
            yield_limit: 2,
        });
        assert!(LockFreeQueue::<u32>::with_config(config).is_err());
    }

    #[test]
    fn enqueue_helps_lagging_tail() {
        let q: LockFreeQueue<u32> = LockFreeQueue::new();
        q.enqueue(1);
        // Link a node behind the tail without moving `tail`, as an enqueue
        // that stalled between its two CASes would.
        let stalled = Owned::new(Node::new(2)).into_ptr();
        let tail = q.tail.load(Acquire);
        unsafe { tail.deref() }
            .next
            .compare_and_set(Ptr::null(), stalled, Release)
            .unwrap();
        q.count.fetch_add(1, Relaxed);

        q.enqueue(3);
        let last = q.tail.load(Acquire);
        assert_eq!(unsafe { last.deref() }.value(), 3);
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(3));
        assert_eq!(q.dequeue(), None);
        assert_eq!(q.approx_size(), 0);
    }

    #[test]
    fn dequeue_helps_lagging_tail() {
        let q: LockFreeQueue<u32> = LockFreeQueue::new();
        let stalled = Owned::new(Node::new(7)).into_ptr();
        let sentinel = q.tail.load(Acquire);
        unsafe { sentinel.deref() }
            .next
            .compare_and_set(Ptr::null(), stalled, Release)
            .unwrap();
        q.count.fetch_add(1, Relaxed);

        assert!(q.head.load(Acquire) == q.tail.load(Acquire));
        assert_eq!(q.dequeue(), Some(7));
        assert!(q.tail.load(Acquire) == stalled);
        assert!(q.head.load(Acquire) == stalled);
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn is_unique_receiver() {
        const N_THREADS: usize = 16;
        const ELEMS: usize = 64 * 1024;

        let config = Config::new().overflow(OverflowPolicy::Grow);
        let q = Arc::new(LockFreeQueue::with_config(config).unwrap());
        // Markers to check.
        let markers = Arc::new(
            (0..ELEMS)
                .map(|_| AtomicBool::new(false))
                .collect::<Vec<_>>(),
        );
        for i in 0..ELEMS {
            q.enqueue(i);
        }

        // Each thread pops until the queue is empty and flips the marker of
        // what it got. Flipping a marker twice means an element was handed
        // out twice.
        let threads = (0..N_THREADS)
            .map(|_| {
                let markers = markers.clone();
                let q = q.clone();
                spawn(move || {
                    while let Some(i) = q.dequeue() {
                        let was = markers[i].swap(true, Ordering::SeqCst);
                        assert!(!was);
                    }
                })
            })
            .collect::<Vec<_>>();

        for t in threads.into_iter() {
            assert!(t.join().is_ok());
        }

        for m in markers.iter() {
            assert!(m.load(Ordering::SeqCst));
        }
        let mut q = Arc::try_unwrap(q).expect("all threads joined");
        assert_eq!(q.approx_size(), 0);
        assert_eq!(q.reclaim(), ELEMS);
    }

    #[test]
    fn stress_test() {
        const N_THREADS: usize = 16;
        const N: usize = 64 * 1024;

        let source = LockFreeQueue::new();
        let sink = LockFreeQueue::new();

        for n in 0..N {
            source.enqueue(n);
        }

        scope(|s| {
            for _ in 0..N_THREADS {
                s.spawn(|_| {
                    // Move stuff from source to sink
                    while let Some(i) = source.dequeue() {
                        sink.enqueue(i);
                    }
                });
            }
        })
        .unwrap();

        assert_eq!(source.approx_size(), 0);
        assert_eq!(sink.approx_size(), N as isize);
        let mut v = Vec::with_capacity(N);
        while let Some(i) = sink.dequeue() {
            v.push(i);
        }
        v.sort();
        for (i, n) in v.into_iter().enumerate() {
            assert_eq!(i, n);
        }
    }

    #[test]
    fn per_producer_order_is_kept() {
        const PRODUCERS: usize = 4;
        const PER: usize = 20_000;

        let q = LockFreeQueue::new();
        scope(|s| {
            for p in 0..PRODUCERS {
                let q = &q;
                s.spawn(move |_| {
                    for i in 0..PER {
                        q.enqueue((p, i));
                    }
                });
            }
        })
        .unwrap();

        let mut last = vec![None; PRODUCERS];
        while let Some((p, i)) = q.dequeue() {
            if let Some(prev) = last[p] {
                assert!(i > prev);
            }
            last[p] = Some(i);
        }
        assert!(last.iter().all(|l| *l == Some(PER - 1)));
    }

    #[test]
    fn every_backoff_policy_conserves() {
        const THREADS: usize = 4;
        const PER: usize = 5_000;

        let policies = [
            Backoff::Spin,
            Backoff::Adaptive,
            Backoff::Exponential {
                spin_limit: 4,
                yield_limit: 8,
            },
        ];
        for &backoff in policies.iter() {
            let config = Config::new().backoff(backoff);
            let q: LockFreeQueue<usize> = LockFreeQueue::with_config(config).unwrap();
            let total = scope(|s| {
                for t in 0..THREADS {
                    let q = &q;
                    s.spawn(move |_| {
                        for i in 0..PER {
                            q.enqueue(t * PER + i);
                        }
                    });
                }
                let consumers = (0..THREADS)
                    .map(|_| {
                        let q = &q;
                        s.spawn(move |_| {
                            let mut got = 0;
                            for _ in 0..PER {
                                if q.dequeue().is_some() {
                                    got += 1;
                                }
                            }
                            got
                        })
                    })
                    .collect::<Vec<_>>();
                consumers
                    .into_iter()
                    .map(|c| c.join().unwrap())
                    .sum::<usize>()
            })
            .unwrap();

            let mut rest = 0;
            while q.dequeue().is_some() {
                rest += 1;
            }
            assert_eq!(total + rest, THREADS * PER, "{:?}", backoff);
        }
    }
}
