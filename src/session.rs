//! The fixture loop: fixtures × contenders in shuffled order, with per-contender
//! failure isolation, aggregation, and delivery to a report sink.
//!
//! A contender that fails on a fixture (an `Err` or a panic, in warmup or
//! measurement) is recorded as a [`ContenderError`] for that fixture and the
//! remaining contenders are still measured. The failed contender gets no
//! result there and drops out of that fixture's ranking and its own
//! mean-of-means.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use crate::aggregate;
use crate::error::{BenchError, Result};
use crate::harness::{HarnessConfig, RunnerConfig};
use crate::memory::MemorySampler;
use crate::order::Shuffler;
use crate::runner::{BenchRunner, Contender};
use crate::schema::{BenchResult, ContenderError, FixtureReport, OverallReport, RunMeta};

/// A named benchmark input.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture<T> {
    pub id: String,
    pub value: T,
}

impl<T> Fixture<T> {
    pub fn new(id: impl Into<String>, value: T) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }
}

/// Provider of fixtures for a session.
pub trait FixtureSource<T> {
    fn fixtures(&self) -> Result<Vec<Fixture<T>>>;
}

impl<T: Clone> FixtureSource<T> for [Fixture<T>] {
    fn fixtures(&self) -> Result<Vec<Fixture<T>>> {
        Ok(self.to_vec())
    }
}

impl<T: Clone> FixtureSource<T> for Vec<Fixture<T>> {
    fn fixtures(&self) -> Result<Vec<Fixture<T>>> {
        Ok(self.clone())
    }
}

/// Provider of contenders for a session.
pub trait ContenderRegistry<T> {
    fn contenders(&self) -> Vec<Contender<T>>;
}

impl<T, F> ContenderRegistry<T> for F
where
    F: Fn() -> Vec<Contender<T>>,
{
    fn contenders(&self) -> Vec<Contender<T>> {
        self()
    }
}

/// Receiver of structured records. Rendering is entirely up to the sink.
pub trait ReportSink {
    fn on_start(&mut self, _meta: &RunMeta) {}
    fn on_result(&mut self, _result: &BenchResult) {}
    fn on_error(&mut self, _error: &ContenderError) {}
    fn on_fixture(&mut self, report: &FixtureReport);
    fn on_overall(&mut self, report: &OverallReport);
}

/// One benchmark session over a fixed configuration.
#[derive(Debug, Clone)]
pub struct Session {
    cfg: HarnessConfig,
    shuffler: Shuffler,
}

impl Session {
    /// Validates `cfg`; fails before anything is measured.
    pub fn new(cfg: HarnessConfig) -> Result<Self> {
        cfg.validate()?;
        let shuffler = Shuffler::seeded(cfg.session_seed());
        Ok(Self { cfg, shuffler })
    }

    pub fn seed(&self) -> u64 {
        self.shuffler.seed()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.cfg
    }

    pub fn runner_config<S: MemorySampler + ?Sized>(&self, sampler: &S) -> RunnerConfig {
        self.cfg.resolve(sampler.reclaim_support())
    }

    pub fn run<T, S>(
        &self,
        source: &(impl FixtureSource<T> + ?Sized),
        registry: &(impl ContenderRegistry<T> + ?Sized),
        sampler: &mut S,
        sink: &mut dyn ReportSink,
    ) -> Result<OverallReport>
    where
        T: Clone,
        S: MemorySampler + ?Sized,
    {
        let contenders = registry.contenders();
        if contenders.is_empty() {
            return Err(BenchError::config("no contenders registered"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = contenders.iter().find(|c| !seen.insert(c.name())) {
            return Err(BenchError::config(format!("duplicate contender name '{}'", dup.name())));
        }

        let fixtures = source.fixtures()?;
        if fixtures.is_empty() {
            return Err(BenchError::config("no fixtures available"));
        }

        let rcfg = self.runner_config(&*sampler);
        tracing::info!(
            fixtures = fixtures.len(),
            contenders = contenders.len(),
            warmup = rcfg.warmup_iters,
            iters = rcfg.iters,
            reclaim = rcfg.reclaim,
            seed = self.seed(),
            "starting session"
        );

        let mut reports = Vec::with_capacity(fixtures.len());
        for (index, fixture) in fixtures.iter().enumerate() {
            let order = self.shuffler.order(index, contenders.len());
            tracing::debug!(
                fixture = %fixture.id,
                order = ?order.iter().map(|&i| contenders[i].name()).collect::<Vec<_>>(),
                "contender order"
            );

            let mut results = Vec::with_capacity(contenders.len());
            let mut errors = Vec::new();
            for &ci in &order {
                match measure_one(&contenders[ci], fixture, sampler, &rcfg)? {
                    Ok(result) => {
                        sink.on_result(&result);
                        results.push(result);
                    }
                    Err(error) => {
                        tracing::warn!(
                            contender = %error.contender,
                            fixture = %error.fixture,
                            phase = %error.phase,
                            iteration = error.iteration,
                            "contender failed: {}",
                            error.message
                        );
                        sink.on_error(&error);
                        errors.push(error);
                    }
                }
            }

            let report = aggregate::rank_fixture(fixture.id.clone(), results, errors);
            match &report.winner {
                Some(w) => tracing::info!(fixture = %fixture.id, winner = %w, "fixture done"),
                None => tracing::warn!(fixture = %fixture.id, "every contender failed"),
            }
            sink.on_fixture(&report);
            reports.push(report);
        }

        let names: Vec<String> = contenders.iter().map(|c| c.name().to_string()).collect();
        let overall = aggregate::overall(&reports, &names);
        sink.on_overall(&overall);
        Ok(overall)
    }
}

/// Run one contender on one fixture, converting its failure into a record.
///
/// The outer `Result` carries harness errors that must abort the session.
fn measure_one<T, S>(
    contender: &Contender<T>,
    fixture: &Fixture<T>,
    sampler: &mut S,
    rcfg: &RunnerConfig,
) -> Result<std::result::Result<BenchResult, ContenderError>>
where
    T: Clone,
    S: MemorySampler + ?Sized,
{
    let mut runner = BenchRunner::new(sampler, rcfg.clone())?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        runner.run(contender, &fixture.id, &fixture.value)
    }));

    match outcome {
        Ok(Ok(result)) => Ok(Ok(result)),
        Ok(Err(BenchError::Contender {
            contender,
            fixture,
            phase,
            iteration,
            source,
        })) => Ok(Err(ContenderError {
            contender,
            fixture,
            phase,
            iteration,
            message: source.to_string(),
        })),
        Ok(Err(other)) => Err(other),
        Err(payload) => {
            let (phase, iteration) = runner.position();
            Ok(Err(ContenderError {
                contender: contender.name().to_string(),
                fixture: fixture.id.clone(),
                phase,
                iteration,
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            }))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
