/// A Benchmark runner.
///
/// We use this instead of `rustc-test` or `bencher` in order to make it exactly as we want it to
/// behave: every sample runs the benchmarked function on `n` fresh threads at once, and the state
/// is reset between samples, outside of the timed region.
extern crate crossbeam;
extern crate time;

use std::fmt;

pub fn black_box<T>(dummy: T) -> T {
    std::hint::black_box(dummy)
}

/// Runs a function on `num_threads` threads against a shared state, and
/// times each round.
pub struct ThreadBencher<S> {
    state: S,
    num_threads: usize,
    rounds: usize,
    samples: Vec<u64>,
    before: Box<dyn Fn(&mut S)>,
    after: Box<dyn Fn(&mut S)>,
}

impl<S: Sync> ThreadBencher<S> {
    pub fn new(state: S, num_threads: usize) -> Self {
        ThreadBencher {
            state,
            num_threads,
            rounds: 10,
            samples: vec![],
            before: Box::new(|_| {}),
            after: Box::new(|_| {}),
        }
    }

    /// Number of timed rounds.
    pub fn rounds(&mut self, rounds: usize) {
        self.rounds = rounds;
    }

    /// Called before each round, with exclusive access to the state.
    pub fn before<F: 'static + Fn(&mut S)>(&mut self, f: F) {
        self.before = Box::new(f);
    }

    /// Called after each round, once all threads are joined.
    pub fn after<F: 'static + Fn(&mut S)>(&mut self, f: F) {
        self.after = Box::new(f);
    }

    pub fn thread_bench(&mut self, f: fn(&S)) {
        for _ in 0..self.rounds {
            (self.before)(&mut self.state);
            let state = &self.state;
            let num_threads = self.num_threads;
            let t0 = time::precise_time_ns();
            crossbeam::scope(|s| {
                for _ in 0..num_threads {
                    s.spawn(move |_| black_box(f(state)));
                }
            })
            .expect("benchmark thread panicked");
            let t1 = time::precise_time_ns();
            self.samples.push((t1 - t0) / 1000);
            (self.after)(&mut self.state);
        }
    }

    /// The name should be `variant::benchmark::threads`.
    pub fn into_stats(self, name: String) -> BenchStats {
        BenchStats {
            name,
            threads: self.num_threads,
            samples: self.samples,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

/// Samples, in microseconds, of one benchmark.
#[derive(Debug, Clone)]
pub struct BenchStats {
    name: String,
    threads: usize,
    samples: Vec<u64>,
}

impl BenchStats {
    /// The first part of the name, eg. `lockfree`.
    pub fn variant(&self) -> &str {
        self.name.split("::").next().unwrap_or("")
    }

    /// The name between the variant and the thread count, eg. `mixed`.
    pub fn name(&self) -> &str {
        let start = self.variant().len();
        let rest = self.name[start..].trim_start_matches("::");
        match rest.rfind("::") {
            Some(i) => &rest[..i],
            None => rest,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    pub fn mean(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        self.samples.iter().sum::<u64>() / self.samples.len() as u64
    }

    pub fn variance(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let avg = self.mean();
        self.samples
            .iter()
            .map(|&s| (if s < avg { avg - s } else { s - avg }).pow(2))
            .sum::<u64>()
            / self.samples.len() as u64
    }
}

impl fmt::Display for BenchStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:.<32}  {} us/iter (+/- {})",
            self.name,
            fmt_thousands_sep(self.mean()),
            fmt_thousands_sep(self.variance())
        )
    }
}

pub fn fmt_thousands_sep(mut n: u64) -> String {
    let sep = ',';
    use std::fmt::Write;
    let mut output = String::new();
    let mut trailing = false;
    for &pow in &[18, 15, 12, 9, 6, 3, 0] {
        let base = 10u64.pow(pow);
        if pow == 0 || trailing || n / base != 0 {
            if !trailing {
                let _ = write!(output, "{}", n / base);
            } else {
                let _ = write!(output, "{:03}", n / base);
            }
            if pow != 0 {
                output.push(sep);
            }
            trailing = true;
        }
        n %= base;
    }

    output
}
