//! Report sinks used by the binary.

use std::io::{self, Write};

use crate::schema::{BenchReport, FixtureInfo, FixtureReport, OverallReport, RunMeta};
use crate::session::ReportSink;

/// Collects every record into a [`BenchReport`] for JSON output.
#[derive(Debug)]
pub struct JsonReportSink {
    report: BenchReport,
}

impl JsonReportSink {
    pub fn new(fixtures: Vec<FixtureInfo>) -> Self {
        Self {
            report: BenchReport {
                run: None,
                fixtures,
                per_fixture: Vec::new(),
                overall: None,
            },
        }
    }

    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string_pretty(&self.report).map_err(io::Error::other)
    }
}

impl ReportSink for JsonReportSink {
    fn on_start(&mut self, meta: &RunMeta) {
        self.report.run = Some(meta.clone());
    }

    fn on_fixture(&mut self, report: &FixtureReport) {
        self.report.per_fixture.push(report.clone());
    }

    fn on_overall(&mut self, report: &OverallReport) {
        self.report.overall = Some(report.clone());
    }
}

fn fmt_bytes(b: Option<u64>) -> String {
    match b {
        Some(b) if b >= 1 << 20 => format!("{:.2} MB", b as f64 / 1_048_576.0),
        Some(b) if b >= 1 << 10 => format!("{:.1} KB", b as f64 / 1024.0),
        Some(b) => format!("{b} B"),
        None => "-".to_string(),
    }
}

fn fmt_ops(ops: f64) -> String {
    if ops.is_finite() {
        format!("{ops:.0}")
    } else {
        "inf".to_string()
    }
}

/// Human-readable lines, one table per fixture plus a summary.
pub struct TableSink<W: Write> {
    out: W,
}

impl<W: Write> TableSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_fixture(&mut self, report: &FixtureReport) -> io::Result<()> {
        writeln!(self.out, "\n== {}", report.fixture)?;
        writeln!(
            self.out,
            "  {:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>12} {:>12}",
            "contender", "min ms", "median ms", "mean ms", "max ms", "ops/s", "avg delta", "peak heap"
        )?;
        for r in &report.results {
            writeln!(
                self.out,
                "  {:<12} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10} {:>12} {:>12}",
                r.contender(),
                r.min(),
                r.median(),
                r.mean(),
                r.max(),
                fmt_ops(r.ops_per_second()),
                fmt_bytes(r.avg_heap_delta_bytes().map(|d| d.round() as u64)),
                fmt_bytes(r.peak_heap_bytes()),
            )?;
        }
        for e in &report.errors {
            writeln!(
                self.out,
                "  {:<12} ERROR ({} iteration {}): {}",
                e.contender, e.phase, e.iteration, e.message
            )?;
        }
        match (&report.winner, &report.runner_up, report.speedup_percent) {
            (Some(w), Some(r), Some(s)) => {
                writeln!(self.out, "  winner: {w} ({s:.1}% faster than {r})")
            }
            (Some(w), _, _) => writeln!(self.out, "  winner: {w}"),
            _ => writeln!(self.out, "  no winner: every contender failed"),
        }
    }

    fn write_overall(&mut self, report: &OverallReport) -> io::Result<()> {
        writeln!(self.out, "\n== overall ({} fixtures)", report.fixtures_processed)?;
        writeln!(
            self.out,
            "  {:<12} {:>14} {:>6} {:>8} {:>12} {:>12} {:>12}",
            "contender", "mean of means", "wins", "errors", "avg delta", "peak heap", "peak rss"
        )?;
        for name in report
            .ranking
            .iter()
            .chain(report.per_contender.keys().filter(|k| !report.ranking.contains(*k)))
        {
            let Some(s) = report.per_contender.get(name) else {
                continue;
            };
            let mom = s
                .mean_of_means
                .map_or_else(|| "-".to_string(), |m| format!("{m:.4} ms"));
            writeln!(
                self.out,
                "  {:<12} {:>14} {:>6} {:>8} {:>12} {:>12} {:>12}",
                name,
                mom,
                s.win_count,
                s.fixtures_errored,
                fmt_bytes(s.avg_heap_delta.map(|d| d.round() as u64)),
                fmt_bytes(s.max_peak_heap),
                fmt_bytes(s.max_peak_rss),
            )?;
        }
        match (&report.winner, &report.runner_up, report.speedup_percent) {
            (Some(w), Some(r), Some(s)) => {
                writeln!(self.out, "  overall winner: {w} ({s:.1}% faster than {r})")
            }
            (Some(w), _, _) => writeln!(self.out, "  overall winner: {w}"),
            _ => writeln!(self.out, "  no overall winner"),
        }
    }
}

impl<W: Write> ReportSink for TableSink<W> {
    fn on_start(&mut self, meta: &RunMeta) {
        let line = writeln!(
            self.out,
            "profile={} warmup={} iters={} seed={} reclaim={}",
            meta.profile, meta.warmup_iters, meta.iters, meta.seed, meta.reclaim_enabled
        );
        if let Err(e) = line {
            tracing::warn!("failed to write table output: {e}");
        }
    }

    fn on_fixture(&mut self, report: &FixtureReport) {
        if let Err(e) = self.write_fixture(report) {
            tracing::warn!("failed to write table output: {e}");
        }
    }

    fn on_overall(&mut self, report: &OverallReport) {
        if let Err(e) = self.write_overall(report) {
            tracing::warn!("failed to write table output: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{overall, rank_fixture};
    use crate::schema::{BenchResult, Sample};

    fn result(c: &str, ms: f64) -> BenchResult {
        let samples = vec![Sample {
            duration_ms: ms,
            memory: None,
        }];
        BenchResult::from_samples(c, "f", samples, None).unwrap()
    }

    fn reports() -> (FixtureReport, OverallReport) {
        let f = rank_fixture("f", vec![result("a", 1.0), result("b", 2.0)], vec![]);
        let o = overall(std::slice::from_ref(&f), &["a".to_string(), "b".to_string()]);
        (f, o)
    }

    #[test]
    fn test_json_sink_collects() {
        let (f, o) = reports();
        let mut sink = JsonReportSink::new(Vec::new());
        sink.on_fixture(&f);
        sink.on_overall(&o);
        let v: serde_json::Value = serde_json::from_str(&sink.to_json().unwrap()).unwrap();
        assert_eq!(v["per_fixture"][0]["winner"], "a");
        assert_eq!(v["overall"]["winner"], "a");
        assert_eq!(v["overall"]["per_contender"]["b"]["win_count"], 0);
    }

    #[test]
    fn test_table_sink_renders() {
        let (f, o) = reports();
        let mut sink = TableSink::new(Vec::new());
        sink.on_fixture(&f);
        sink.on_overall(&o);
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.contains("== f"));
        assert!(text.contains("winner: a (50.0% faster than b)"));
        assert!(text.contains("overall winner: a"));
    }

    #[test]
    fn test_table_sink_to_file() {
        let (f, o) = reports();
        let file = tempfile::NamedTempFile::new().unwrap();
        let out: Box<dyn Write> = Box::new(file.reopen().unwrap());
        let mut sink = TableSink::new(out);
        sink.on_fixture(&f);
        sink.on_overall(&o);
        sink.into_inner().flush().unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.contains("== overall (1 fixtures)"));
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(None), "-");
        assert_eq!(fmt_bytes(Some(12)), "12 B");
        assert_eq!(fmt_bytes(Some(2048)), "2.0 KB");
        assert_eq!(fmt_bytes(Some(3 * 1_048_576)), "3.00 MB");
    }
}
