//! Structured records handed to report sinks.
//!
//! Non-finite floats (an infinite `ops_per_second`) serialize as JSON `null`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Phase;
use crate::memory::ReclaimSupport;
use crate::stats::{ops_per_second, summarize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub profile: String,
    pub seed: u64,
    pub warmup_iters: u64,
    pub iters: u64,
    pub reclaim_support: ReclaimSupport,
    pub reclaim_enabled: bool,
    pub heap_tracking: bool,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

/// Memory figures for one measured iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMemory {
    pub heap_delta_bytes: u64,
    pub peak_heap_bytes: u64,
    pub peak_rss_bytes: u64,
}

/// One measured iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub duration_ms: f64,
    pub memory: Option<SampleMemory>,
}

/// Statistics for one contender on one fixture, derived from its samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchResult {
    contender: String,
    fixture: String,
    samples: Vec<Sample>,
    min: f64,
    median: f64,
    mean: f64,
    max: f64,
    stddev: f64,
    ops_per_second: f64,
    peak_heap_bytes: Option<u64>,
    avg_heap_delta_bytes: Option<f64>,
    peak_rss_bytes: Option<u64>,
    clone_mean_ms: Option<f64>,
}

impl BenchResult {
    /// Build a result from its samples; `None` if there are none.
    ///
    /// Memory aggregates are present only when every sample carries memory.
    pub fn from_samples(
        contender: impl Into<String>,
        fixture: impl Into<String>,
        samples: Vec<Sample>,
        clone_mean_ms: Option<f64>,
    ) -> Option<Self> {
        let durations: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
        let summary = summarize(&durations)?;

        let mem: Option<Vec<SampleMemory>> = samples.iter().map(|s| s.memory).collect();
        let (peak_heap_bytes, avg_heap_delta_bytes, peak_rss_bytes) = match mem {
            Some(m) => (
                m.iter().map(|x| x.peak_heap_bytes).max(),
                Some(m.iter().map(|x| x.heap_delta_bytes as f64).sum::<f64>() / m.len() as f64),
                m.iter().map(|x| x.peak_rss_bytes).max(),
            ),
            None => (None, None, None),
        };

        Some(Self {
            contender: contender.into(),
            fixture: fixture.into(),
            samples,
            min: summary.min,
            median: summary.median,
            mean: summary.mean,
            max: summary.max,
            stddev: summary.stddev,
            ops_per_second: ops_per_second(summary.mean),
            peak_heap_bytes,
            avg_heap_delta_bytes,
            peak_rss_bytes,
            clone_mean_ms,
        })
    }

    pub fn contender(&self) -> &str {
        &self.contender
    }
    pub fn fixture(&self) -> &str {
        &self.fixture
    }
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
    pub fn min(&self) -> f64 {
        self.min
    }
    pub fn median(&self) -> f64 {
        self.median
    }
    pub fn mean(&self) -> f64 {
        self.mean
    }
    pub fn max(&self) -> f64 {
        self.max
    }
    pub fn stddev(&self) -> f64 {
        self.stddev
    }
    pub fn ops_per_second(&self) -> f64 {
        self.ops_per_second
    }
    pub fn peak_heap_bytes(&self) -> Option<u64> {
        self.peak_heap_bytes
    }
    pub fn avg_heap_delta_bytes(&self) -> Option<f64> {
        self.avg_heap_delta_bytes
    }
    pub fn peak_rss_bytes(&self) -> Option<u64> {
        self.peak_rss_bytes
    }
    pub fn clone_mean_ms(&self) -> Option<f64> {
        self.clone_mean_ms
    }
}

/// A contender that failed on a fixture. It has no result for that fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContenderError {
    pub contender: String,
    pub fixture: String,
    pub phase: Phase,
    pub iteration: u64,
    pub message: String,
}

/// Ranking of the contenders on one fixture.
///
/// Every contender appears exactly once, either in `results` or in `errors`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureReport {
    pub fixture: String,
    /// Sorted by mean ascending.
    pub results: Vec<BenchResult>,
    pub errors: Vec<ContenderError>,
    pub winner: Option<String>,
    pub runner_up: Option<String>,
    pub speedup_percent: Option<f64>,
}

/// Per-contender totals across fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContenderStanding {
    pub mean_of_means: Option<f64>,
    pub win_count: u64,
    pub max_peak_heap: Option<u64>,
    pub max_peak_rss: Option<u64>,
    pub avg_heap_delta: Option<f64>,
    pub fixtures_measured: u64,
    pub fixtures_errored: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallReport {
    pub per_contender: BTreeMap<String, ContenderStanding>,
    /// Contender names ordered by mean-of-means ascending.
    pub ranking: Vec<String>,
    pub winner: Option<String>,
    pub runner_up: Option<String>,
    pub speedup_percent: Option<f64>,
    pub fixtures_processed: u64,
}

/// Everything a session produced, as written by the JSON sink.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub run: Option<RunMeta>,
    pub fixtures: Vec<FixtureInfo>,
    pub per_fixture: Vec<FixtureReport>,
    pub overall: Option<OverallReport>,
}

/// Identity of a fixture as recorded in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureInfo {
    pub id: String,
    pub sha256: String,
    pub bytes: u64,
}
