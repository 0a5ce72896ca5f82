//! Runs one contender against one fixture: warmup, then measured iterations.

use std::fmt;

use crate::clock;
use crate::error::{BenchError, ContenderFailure, Phase, Result};
use crate::harness::{RunnerConfig, MAX_ITERATIONS};
use crate::memory::{clamp_delta, MemorySampler};
use crate::schema::{BenchResult, Sample, SampleMemory};
use crate::stats;

type PureOp<T> = Box<dyn Fn(&T) -> std::result::Result<T, ContenderFailure>>;
type MutatingOp<T> = Box<dyn Fn(T) -> std::result::Result<T, ContenderFailure>>;

enum Operation<T> {
    /// Reads its input and builds a new value.
    Pure(PureOp<T>),
    /// Consumes its input and may rewrite it in place; needs a fresh clone per call.
    Mutating(MutatingOp<T>),
}

/// A named implementation under comparison.
pub struct Contender<T> {
    name: String,
    operation: Operation<T>,
}

impl<T> Contender<T> {
    pub fn pure(
        name: impl Into<String>,
        op: impl Fn(&T) -> std::result::Result<T, ContenderFailure> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            operation: Operation::Pure(Box::new(op)),
        }
    }

    pub fn mutating(
        name: impl Into<String>,
        op: impl Fn(T) -> std::result::Result<T, ContenderFailure> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            operation: Operation::Mutating(Box::new(op)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mutates_input(&self) -> bool {
        matches!(self.operation, Operation::Mutating(_))
    }

    /// Call the operation once outside any measurement.
    pub fn apply(&self, input: &T) -> std::result::Result<T, ContenderFailure>
    where
        T: Clone,
    {
        match &self.operation {
            Operation::Pure(op) => op(input),
            Operation::Mutating(op) => op(input.clone()),
        }
    }
}

impl<T> fmt::Debug for Contender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contender")
            .field("name", &self.name)
            .field("mutates_input", &self.mutates_input())
            .finish()
    }
}

/// Input bound to its operation, prepared outside the timed region.
enum Prepared<'a, T> {
    Pure(&'a PureOp<T>, &'a T),
    Mutating(&'a MutatingOp<T>, T),
}

impl<T> Prepared<'_, T> {
    fn call(self) -> std::result::Result<T, ContenderFailure> {
        match self {
            Prepared::Pure(op, v) => op(v),
            Prepared::Mutating(op, v) => op(v),
        }
    }
}

fn prepare<'a, T: Clone>(contender: &'a Contender<T>, input: &'a T) -> Prepared<'a, T> {
    match &contender.operation {
        Operation::Pure(op) => Prepared::Pure(op, input),
        Operation::Mutating(op) => Prepared::Mutating(op, input.clone()),
    }
}

const PREALLOC_SAMPLES: u64 = 4096;

/// Executes contenders with an injected memory sampler.
pub struct BenchRunner<'s, S: MemorySampler + ?Sized> {
    sampler: &'s mut S,
    cfg: RunnerConfig,
    position: (Phase, u64),
}

impl<'s, S: MemorySampler + ?Sized> BenchRunner<'s, S> {
    pub fn new(sampler: &'s mut S, cfg: RunnerConfig) -> Result<Self> {
        if cfg.iters == 0 {
            return Err(BenchError::config("measured iterations must be at least 1"));
        }
        if cfg.iters > MAX_ITERATIONS {
            return Err(BenchError::config(format!(
                "measured iterations must be at most {MAX_ITERATIONS}"
            )));
        }
        Ok(Self {
            sampler,
            cfg,
            position: (Phase::Warmup, 0),
        })
    }

    /// Phase and iteration most recently entered; locates a contender panic.
    pub fn position(&self) -> (Phase, u64) {
        self.position
    }

    /// Measure `contender` on `input`.
    ///
    /// Mutating contenders get a fresh clone every iteration; the clone is made
    /// before the "before" snapshot and outside the timed region. Contender
    /// failures are returned, not retried.
    pub fn run<T: Clone>(
        &mut self,
        contender: &Contender<T>,
        fixture_id: &str,
        input: &T,
    ) -> Result<BenchResult> {
        let fail = |phase: Phase, iteration: u64, source: ContenderFailure| BenchError::Contender {
            contender: contender.name().to_string(),
            fixture: fixture_id.to_string(),
            phase,
            iteration,
            source,
        };

        for i in 0..self.cfg.warmup_iters {
            self.position = (Phase::Warmup, i);
            let prepared = prepare(contender, input);
            let out = prepared.call().map_err(|e| fail(Phase::Warmup, i, e))?;
            drop(std::hint::black_box(out));
        }

        if self.cfg.reclaim {
            self.sampler.force_reclaim();
        }

        let mut samples = Vec::with_capacity(self.cfg.iters.min(PREALLOC_SAMPLES) as usize);
        for i in 0..self.cfg.iters {
            self.position = (Phase::Measured, i);
            if self.cfg.reclaim && i > 0 && i % self.cfg.reclaim_cadence == 0 {
                self.sampler.force_reclaim();
            }

            let prepared = prepare(contender, input);
            let before = self.cfg.track_memory.then(|| self.sampler.snapshot());

            let (out, duration_ms) = clock::measure_fallible(|| prepared.call())
                .map_err(|e| fail(Phase::Measured, i, e))?;

            let memory = before.map(|before| {
                let after = self.sampler.snapshot();
                SampleMemory {
                    heap_delta_bytes: clamp_delta(&before, &after),
                    peak_heap_bytes: after.heap_used_bytes,
                    peak_rss_bytes: after.resident_set_bytes,
                }
            });
            drop(out);

            samples.push(Sample {
                duration_ms,
                memory,
            });
        }

        let clone_mean_ms = if self.cfg.baseline_clone && contender.mutates_input() {
            self.position = (Phase::Baseline, 0);
            Some(self.clone_baseline(input))
        } else {
            None
        };

        let result = BenchResult::from_samples(contender.name(), fixture_id, samples, clone_mean_ms)
            .ok_or_else(|| BenchError::config("measured iterations must be at least 1"))?;

        tracing::debug!(
            contender = contender.name(),
            fixture = fixture_id,
            mean_ms = result.mean(),
            median_ms = result.median(),
            "measured"
        );
        Ok(result)
    }

    /// Mean time of cloning `input` alone, over the same iteration count.
    fn clone_baseline<T: Clone>(&self, input: &T) -> f64 {
        let durations: Vec<f64> = (0..self.cfg.iters)
            .map(|_| clock::measure(|| input.clone()).1)
            .collect();
        stats::mean(durations).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ReclaimSupport, ScriptedSampler};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    fn cfg(warmup: u64, iters: u64) -> RunnerConfig {
        RunnerConfig {
            warmup_iters: warmup,
            iters,
            reclaim: true,
            reclaim_cadence: 3,
            track_memory: true,
            baseline_clone: false,
        }
    }

    fn identity() -> Contender<Vec<u8>> {
        Contender::pure("identity", |v: &Vec<u8>| Ok(v.clone()))
    }

    #[test]
    fn test_sample_count_matches_iters() {
        for warmup in [0, 4] {
            let mut sampler = ScriptedSampler::flat(ReclaimSupport::Available);
            let mut runner = BenchRunner::new(&mut sampler, cfg(warmup, 5)).unwrap();
            let r = runner.run(&identity(), "f", &vec![1, 2, 3]).unwrap();
            assert_eq!(r.samples().len(), 5);
            assert!(r.min() <= r.median() && r.median() <= r.max());
        }
    }

    #[test]
    fn test_zero_iters_is_config_error() {
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Available);
        assert!(matches!(
            BenchRunner::new(&mut sampler, cfg(1, 0)),
            Err(BenchError::Config(_))
        ));
    }

    #[test]
    fn test_oversized_iters_is_config_error() {
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Available);
        assert!(matches!(
            BenchRunner::new(&mut sampler, cfg(0, u64::MAX)),
            Err(BenchError::Config(_))
        ));
        assert!(BenchRunner::new(&mut sampler, cfg(0, MAX_ITERATIONS)).is_ok());
    }

    #[test]
    fn test_warmup_calls_not_sampled() {
        let calls = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&calls);
        let c = Contender::pure("counting", move |v: &u32| {
            seen.set(seen.get() + 1);
            Ok(*v)
        });
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Unsupported);
        let mut runner = BenchRunner::new(&mut sampler, cfg(3, 4)).unwrap();
        let r = runner.run(&c, "f", &1).unwrap();
        assert_eq!(calls.get(), 7);
        assert_eq!(r.samples().len(), 4);
    }

    #[test]
    fn test_fixed_delay_throughput() {
        let c = Contender::pure("sleepy", |v: &u8| {
            std::thread::sleep(Duration::from_millis(10));
            Ok(*v)
        });
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Unsupported);
        let mut runner = BenchRunner::new(&mut sampler, cfg(0, 5)).unwrap();
        let r = runner.run(&c, "f", &0).unwrap();
        // Sleep never undershoots; allow generous scheduler overshoot.
        assert!(r.ops_per_second() <= 100.5, "ops/s {}", r.ops_per_second());
        assert!(r.ops_per_second() >= 25.0, "ops/s {}", r.ops_per_second());
    }

    #[test]
    fn test_reclaim_cadence() {
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Available);
        {
            let mut runner = BenchRunner::new(&mut sampler, cfg(2, 9)).unwrap();
            runner.run(&identity(), "f", &vec![0]).unwrap();
        }
        // Once before the measured phase, then at iterations 3 and 6.
        assert_eq!(sampler.reclaim_calls, 3);
        assert_eq!(sampler.snapshot_calls, 18);
    }

    #[test]
    fn test_reclaim_disabled() {
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Available);
        let mut c = cfg(0, 9);
        c.reclaim = false;
        BenchRunner::new(&mut sampler, c)
            .unwrap()
            .run(&identity(), "f", &vec![0])
            .unwrap();
        assert_eq!(sampler.reclaim_calls, 0);
    }

    #[test]
    fn test_memory_delta_clamped_and_peaks() {
        // (before, after) pairs; the second pair shrinks as if a reclaim ran mid-iteration.
        let mut sampler = ScriptedSampler::from_pairs(
            &[(100, 1_000), (160, 1_200), (500, 1_500), (300, 1_100)],
            ReclaimSupport::Unsupported,
        );
        let mut runner = BenchRunner::new(&mut sampler, cfg(0, 2)).unwrap();
        let r = runner.run(&identity(), "f", &vec![0]).unwrap();

        let deltas: Vec<u64> = r
            .samples()
            .iter()
            .map(|s| s.memory.unwrap().heap_delta_bytes)
            .collect();
        assert_eq!(deltas, vec![60, 0]);
        assert_eq!(r.avg_heap_delta_bytes(), Some(30.0));
        assert_eq!(r.peak_heap_bytes(), Some(300));
        assert_eq!(r.peak_rss_bytes(), Some(1_200));
    }

    #[test]
    fn test_no_memory_tracking() {
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Available);
        let mut c = cfg(0, 3);
        c.track_memory = false;
        let r = BenchRunner::new(&mut sampler, c)
            .unwrap()
            .run(&identity(), "f", &vec![0])
            .unwrap();
        assert!(r.samples().iter().all(|s| s.memory.is_none()));
        assert_eq!(r.peak_heap_bytes(), None);
        assert_eq!(sampler.snapshot_calls, 0);
    }

    #[test]
    fn test_mutating_contender_gets_fresh_copy() {
        let c = Contender::mutating("push", |mut v: Vec<u8>| {
            if v.len() != 1 {
                return Err(ContenderFailure::new("input was not fresh"));
            }
            v.push(9);
            Ok(v)
        });
        assert!(c.mutates_input());
        let input = vec![1u8];
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Unsupported);
        let r = BenchRunner::new(&mut sampler, cfg(2, 5))
            .unwrap()
            .run(&c, "f", &input)
            .unwrap();
        assert_eq!(r.samples().len(), 5);
        assert_eq!(input, vec![1u8]);
    }

    #[test]
    fn test_clone_baseline_only_for_mutating() {
        let mut c = cfg(0, 3);
        c.baseline_clone = true;
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Unsupported);
        let mut runner = BenchRunner::new(&mut sampler, c).unwrap();

        let pure = runner.run(&identity(), "f", &vec![0; 64]).unwrap();
        assert_eq!(pure.clone_mean_ms(), None);

        let m = Contender::mutating("m", |v: Vec<u8>| Ok(v));
        let r = runner.run(&m, "f", &vec![0; 64]).unwrap();
        assert!(r.clone_mean_ms().unwrap() >= 0.0);
    }

    #[test]
    fn test_failure_reports_context() {
        let c = Contender::pure("flaky", |v: &u32| {
            if *v == 0 {
                Err(ContenderFailure::new("zero"))
            } else {
                Ok(*v)
            }
        });
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Unsupported);
        let err = BenchRunner::new(&mut sampler, cfg(2, 3))
            .unwrap()
            .run(&c, "empty-doc", &0)
            .unwrap_err();
        match err {
            BenchError::Contender {
                contender,
                fixture,
                phase,
                iteration,
                ..
            } => {
                assert_eq!(contender, "flaky");
                assert_eq!(fixture, "empty-doc");
                assert_eq!(phase, Phase::Warmup);
                assert_eq!(iteration, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_failure_in_measured_phase() {
        let calls = Rc::new(Cell::new(0u64));
        let seen = Rc::clone(&calls);
        let c = Contender::pure("late", move |v: &u32| {
            seen.set(seen.get() + 1);
            if seen.get() > 3 {
                Err(ContenderFailure::new("tired"))
            } else {
                Ok(*v)
            }
        });
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Unsupported);
        let err = BenchRunner::new(&mut sampler, cfg(1, 5))
            .unwrap()
            .run(&c, "f", &1)
            .unwrap_err();
        assert!(matches!(
            err,
            BenchError::Contender {
                phase: Phase::Measured,
                iteration: 2,
                ..
            }
        ));
    }
}
