use std::sync::atomic::{AtomicUsize, Ordering};

use bench::{black_box, BenchStats, ThreadBencher};
use casq::{Config, LockFreeQueue, LockedQueue, OverflowPolicy, Queue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Params;

lazy_static! {
    static ref THREAD_COUNTER: AtomicUsize = AtomicUsize::new(0);
}

thread_local! {
    static THREAD_ID: usize = THREAD_COUNTER.fetch_add(1, Ordering::SeqCst);
}

/// A generator seeded with the id of the calling thread, so every run of a
/// workload sees the same operation sequence per thread.
fn thread_rng() -> StdRng {
    StdRng::seed_from_u64(THREAD_ID.with(|id| *id) as u64)
}

/// A queue the runner can benchmark.
pub trait Bench: Queue<u32> + Sized + Sync + Send + 'static {
    fn create() -> Self {
        Self::new()
    }

    /// Called with exclusive access, outside the timed region.
    fn quiesce(&mut self) {}
}

impl Bench for LockedQueue<u32> {}

impl Bench for LockFreeQueue<u32> {
    /// Every round frees what it retired, so nothing has to be leaked.
    fn create() -> Self {
        let config = Config::new().overflow(OverflowPolicy::Grow);
        LockFreeQueue::with_config(config).unwrap_or_default()
    }

    fn quiesce(&mut self) {
        let freed = self.reclaim();
        trace!(freed, "reclaimed between rounds");
    }
}

struct State<Q> {
    queue: Q,
    sink: Q,
    threads: usize,
    ops: usize,
    prefill: usize,
}

impl<Q: Bench> State<Q> {
    fn reset(&mut self) {
        while self.queue.dequeue().is_some() {}
        while self.sink.dequeue().is_some() {}
        self.queue.quiesce();
        self.sink.quiesce();
        THREAD_COUNTER.store(0, Ordering::SeqCst);
    }

    fn fill(&mut self, n: usize) {
        for i in 0..n {
            self.queue.enqueue(i as u32);
        }
    }
}

fn mixed<Q: Bench>(state: &State<Q>) {
    let mut rng = thread_rng();
    for i in 0..state.ops {
        if rng.gen_bool(0.5) {
            state.queue.enqueue(i as u32);
        } else {
            black_box(state.queue.dequeue());
        }
    }
}

fn push<Q: Bench>(state: &State<Q>) {
    for i in 0..state.ops {
        state.queue.enqueue(i as u32);
    }
}

fn pop<Q: Bench>(state: &State<Q>) {
    while let Some(i) = state.queue.dequeue() {
        black_box(i);
    }
}

fn transfer<Q: Bench>(state: &State<Q>) {
    while let Some(i) = state.queue.dequeue() {
        state.sink.enqueue(i);
    }
}

fn run<Q: Bench>(
    variant: &str,
    workload: &str,
    f: fn(&State<Q>),
    before: fn(&mut State<Q>),
    p: &Params,
) -> BenchStats {
    let state = State {
        queue: Q::create(),
        sink: Q::create(),
        threads: p.threads,
        ops: p.ops,
        prefill: p.prefill,
    };
    let mut b = ThreadBencher::new(state, p.threads);
    b.rounds(p.rounds);
    b.before(before);
    b.after(|state: &mut State<Q>| state.reset());
    b.thread_bench(f);
    b.into_stats(format!("{}::queue::{}::{}", variant, workload, p.threads))
}

fn generic_mixed<Q: Bench>(variant: &str, p: &Params) -> BenchStats {
    run::<Q>(
        variant,
        "mixed",
        mixed::<Q>,
        |state| {
            state.reset();
            let n = state.prefill;
            state.fill(n);
        },
        p,
    )
}

fn generic_push<Q: Bench>(variant: &str, p: &Params) -> BenchStats {
    run::<Q>(variant, "push", push::<Q>, |state| state.reset(), p)
}

fn generic_pop<Q: Bench>(variant: &str, p: &Params) -> BenchStats {
    run::<Q>(
        variant,
        "pop",
        pop::<Q>,
        |state| {
            state.reset();
            let n = state.ops * state.threads;
            state.fill(n);
        },
        p,
    )
}

fn generic_transfer<Q: Bench>(variant: &str, p: &Params) -> BenchStats {
    run::<Q>(
        variant,
        "transfer",
        transfer::<Q>,
        |state| {
            state.reset();
            let n = state.ops * state.threads;
            state.fill(n);
        },
        p,
    )
}

macro_rules! variant {
    ($name:ident, $Q:ty) => {
        pub mod $name {
            use super::*;

            const NAME: &str = stringify!($name);

            pub fn mixed(p: &Params) -> BenchStats {
                generic_mixed::<$Q>(NAME, p)
            }

            pub fn push(p: &Params) -> BenchStats {
                generic_push::<$Q>(NAME, p)
            }

            pub fn pop(p: &Params) -> BenchStats {
                generic_pop::<$Q>(NAME, p)
            }

            pub fn transfer(p: &Params) -> BenchStats {
                generic_transfer::<$Q>(NAME, p)
            }
        }
    };
}

variant!(locked, LockedQueue<u32>);
variant!(lockfree, LockFreeQueue<u32>);
