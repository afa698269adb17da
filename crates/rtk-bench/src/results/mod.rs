//! Result aggregation and the summary document.
//!
//! Raw per-tool timings become two named metrics per test case: the
//! candidate's speedup over the reference, and a noise-aware verdict against
//! the baseline.

use crate::bench::CaseTiming;
use crate::context::ToolId;
use crate::error::{BenchError, Result};
use crate::timing::Stats;
use serde::Serialize;
use std::path::Path;

/// Summary of one test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSummary {
    pub name: String,
    /// `reference mean / candidate mean`, two decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vs_reference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_stddev: Option<f64>,
    /// `equal`, `<ratio>x faster` or `<ratio>x slower`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vs_baseline: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl TestSummary {
    /// A case that was not run (no recorded state).
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vs_reference: None,
            candidate_mean: None,
            candidate_stddev: None,
            vs_baseline: None,
            skipped: true,
        }
    }
}

/// The whole-suite summary document.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteSummary {
    pub benchmark_name: String,
    pub benchmark_id: String,
    /// RFC 3339 timestamp.
    pub generated_at: String,
    pub harness_version: String,
    pub tests: Vec<TestSummary>,
}

impl SuiteSummary {
    pub fn new(name: &str, id: &str, tests: Vec<TestSummary>) -> Self {
        Self {
            benchmark_name: name.to_string(),
            benchmark_id: id.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            tests,
        }
    }
}

/// Round to two decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Render a ratio the way it appears in verdicts: `1.2`, `1.25`, `2.0`.
pub fn format_ratio(ratio: f64) -> String {
    let r = round2(ratio);
    if r.fract() == 0.0 {
        format!("{r:.1}")
    } else {
        format!("{r}")
    }
}

/// Compare the candidate against the baseline.
///
/// Means within one combined standard deviation of each other are `equal`.
pub fn compare_baseline(candidate: Stats, baseline: Stats) -> String {
    let combined = candidate.stddev.hypot(baseline.stddev);
    let diff = (candidate.mean - baseline.mean).abs();
    if diff <= combined {
        "equal".to_string()
    } else if candidate.mean < baseline.mean {
        format!("{}x faster", format_ratio(baseline.mean / candidate.mean))
    } else {
        format!("{}x slower", format_ratio(candidate.mean / baseline.mean))
    }
}

/// Build the summary for one timed test case.
pub fn summarize(name: &str, timing: &CaseTiming) -> TestSummary {
    let reference = timing.get(ToolId::Reference);
    let candidate = timing.get(ToolId::Candidate);
    let baseline = timing.get(ToolId::Baseline);

    let mut summary = TestSummary {
        name: name.to_string(),
        vs_reference: None,
        candidate_mean: None,
        candidate_stddev: None,
        vs_baseline: None,
        skipped: false,
    };

    if let (Some(r), Some(c)) = (reference, candidate) {
        summary.vs_reference = Some(round2(r.mean / c.mean));
        summary.candidate_mean = Some(c.mean);
        summary.candidate_stddev = Some(c.stddev);
    }
    if let (Some(c), Some(b)) = (candidate, baseline) {
        summary.vs_baseline = Some(compare_baseline(c, b));
    }
    summary
}

/// Write `summary` as pretty JSON.
pub fn write_summary(summary: &SuiteSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| BenchError::io("Failed to serialize summary", e.into()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BenchError::io_at("create", parent, e))?;
    }
    std::fs::write(path, json + "\n").map_err(|e| BenchError::io_at("write", path, e))
}
