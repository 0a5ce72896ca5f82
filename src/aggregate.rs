//! Per-fixture and overall rankings.
//!
//! Both rankings order by mean duration ascending, ties broken by contender
//! name. The overall winner is decided by mean-of-means; win counts are
//! reported alongside but never override it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::schema::{BenchResult, ContenderError, ContenderStanding, FixtureReport, OverallReport};
use crate::stats;

fn by_score(a: (&str, f64), b: (&str, f64)) -> Ordering {
    a.1.partial_cmp(&b.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(b.0))
}

/// `(runner_up - winner) / runner_up * 100`, 0 when both are zero.
pub fn speedup_percent(winner_mean: f64, runner_up_mean: f64) -> f64 {
    if runner_up_mean <= 0.0 {
        0.0
    } else {
        ((runner_up_mean - winner_mean) / runner_up_mean * 100.0).max(0.0)
    }
}

/// Rank the surviving results for one fixture.
pub fn rank_fixture(
    fixture: impl Into<String>,
    mut results: Vec<BenchResult>,
    errors: Vec<ContenderError>,
) -> FixtureReport {
    results.sort_by(|a, b| by_score((a.contender(), a.mean()), (b.contender(), b.mean())));

    let winner = results.first();
    let runner_up = results.get(1);
    let speedup = match (winner, runner_up) {
        (Some(w), Some(r)) => Some(speedup_percent(w.mean(), r.mean())),
        _ => None,
    };

    FixtureReport {
        fixture: fixture.into(),
        winner: winner.map(|r| r.contender().to_string()),
        runner_up: runner_up.map(|r| r.contender().to_string()),
        speedup_percent: speedup,
        results,
        errors,
    }
}

/// Combine fixture reports into per-contender standings.
///
/// `contenders` lists every registered name, so a contender that failed
/// everywhere still gets a (score-less) standing.
pub fn overall(reports: &[FixtureReport], contenders: &[String]) -> OverallReport {
    let mut per_contender = BTreeMap::new();

    for name in contenders {
        let results: Vec<&BenchResult> = reports
            .iter()
            .flat_map(|r| r.results.iter())
            .filter(|r| r.contender() == name)
            .collect();

        let win_count = reports
            .iter()
            .filter(|r| r.winner.as_deref() == Some(name.as_str()))
            .count() as u64;
        let fixtures_errored = reports
            .iter()
            .flat_map(|r| r.errors.iter())
            .filter(|e| &e.contender == name)
            .count() as u64;

        per_contender.insert(
            name.clone(),
            ContenderStanding {
                mean_of_means: stats::mean(results.iter().map(|r| r.mean())),
                win_count,
                max_peak_heap: results.iter().filter_map(|r| r.peak_heap_bytes()).max(),
                max_peak_rss: results.iter().filter_map(|r| r.peak_rss_bytes()).max(),
                avg_heap_delta: stats::mean(results.iter().filter_map(|r| r.avg_heap_delta_bytes())),
                fixtures_measured: results.len() as u64,
                fixtures_errored,
            },
        );
    }

    let mut scored: Vec<(String, f64)> = per_contender
        .iter()
        .filter_map(|(name, s)| s.mean_of_means.map(|m| (name.clone(), m)))
        .collect();
    scored.sort_by(|a, b| by_score((&a.0, a.1), (&b.0, b.1)));

    let speedup = match (scored.first(), scored.get(1)) {
        (Some(w), Some(r)) => Some(speedup_percent(w.1, r.1)),
        _ => None,
    };
    let ranking: Vec<String> = scored.into_iter().map(|(n, _)| n).collect();

    OverallReport {
        winner: ranking.first().cloned(),
        runner_up: ranking.get(1).cloned(),
        ranking,
        speedup_percent: speedup,
        fixtures_processed: reports.iter().filter(|r| r.winner.is_some()).count() as u64,
        per_contender,
    }
}
