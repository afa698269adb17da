//! Timing-tool protocol.
//!
//! Measurement is delegated to hyperfine. One invocation times every tool
//! for a test case and exports a markdown table plus a JSON document with a
//! mean and standard deviation per labelled command.

use crate::error::{BenchError, Result};
use crate::process::shell_quote;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// A shell script timed under a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledCommand {
    pub label: String,
    pub script: String,
}

impl LabeledCommand {
    pub fn new(label: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            script: script.into(),
        }
    }
}

/// Everything one timing invocation needs.
#[derive(Debug, Clone)]
pub struct TimingRequest {
    pub commands: Vec<LabeledCommand>,
    /// Shell scripts run before each timed repetition, one per command, in command order.
    pub prepares: Vec<String>,
    pub warmup: Option<u32>,
    pub markdown_path: PathBuf,
    pub json_path: PathBuf,
}

/// Statistics for one labelled command, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub mean: f64,
    pub stddev: f64,
}

/// Timing for one labelled command.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingResult {
    pub label: String,
    pub stats: Stats,
}

/// Output of one timing invocation.
#[derive(Debug, Clone, Default)]
pub struct TimingReport {
    /// Human-readable table.
    pub markdown: String,
    pub results: Vec<TimingResult>,
}

impl TimingReport {
    pub fn get(&self, label: &str) -> Option<Stats> {
        self.results.iter().find(|r| r.label == label).map(|r| r.stats)
    }
}

/// Something that can time a set of labelled commands.
pub trait TimingTool {
    fn measure(&self, request: &TimingRequest) -> Result<TimingReport>;
}

/// [`TimingTool`] backed by the `hyperfine` binary.
#[derive(Debug, Clone)]
pub struct Hyperfine {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl Default for Hyperfine {
    fn default() -> Self {
        Self::new("hyperfine", Vec::new())
    }
}

impl Hyperfine {
    /// `extra_args` are forwarded verbatim, before the harness's own flags.
    pub fn new(program: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }

    /// Argument vector for `request` (without the program name).
    pub fn args(&self, request: &TimingRequest) -> Vec<String> {
        // -N: no intermediate shell; each command is already `sh -c '...'`.
        let mut args = vec!["-N".to_string()];
        args.extend(self.extra_args.iter().cloned());
        for prepare in &request.prepares {
            args.push("--prepare".into());
            args.push(sh_c(prepare));
        }
        args.push("--export-markdown".into());
        args.push(request.markdown_path.display().to_string());
        args.push("--export-json".into());
        args.push(request.json_path.display().to_string());
        if let Some(warmup) = request.warmup {
            args.push("--warmup".into());
            args.push(warmup.to_string());
        }
        for command in &request.commands {
            args.push("-n".into());
            args.push(command.label.clone());
            args.push(sh_c(&command.script));
        }
        args
    }
}

fn sh_c(script: &str) -> String {
    format!("sh -c {}", shell_quote(script))
}

impl TimingTool for Hyperfine {
    fn measure(&self, request: &TimingRequest) -> Result<TimingReport> {
        let args = self.args(request);
        tracing::debug!(?args, "hyperfine");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                BenchError::Execution(format!("cannot run {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BenchError::Execution(format!(
                "hyperfine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let markdown = std::fs::read_to_string(&request.markdown_path)
            .map_err(|e| BenchError::io_at("read", &request.markdown_path, e))?;
        let json = std::fs::read_to_string(&request.json_path)
            .map_err(|e| BenchError::io_at("read", &request.json_path, e))?;

        Ok(TimingReport {
            markdown,
            results: parse_export(&json)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Export {
    results: Vec<ExportResult>,
}

#[derive(Debug, Deserialize)]
struct ExportResult {
    command: String,
    mean: f64,
    stddev: Option<f64>,
}

/// Parse hyperfine's `--export-json` document.
///
/// A single run has no standard deviation; it reads as zero.
pub fn parse_export(json: &str) -> Result<Vec<TimingResult>> {
    let export: Export = serde_json::from_str(json)
        .map_err(|e| BenchError::Execution(format!("unreadable hyperfine export: {e}")))?;
    Ok(export
        .results
        .into_iter()
        .map(|r| TimingResult {
            label: r.command,
            stats: Stats {
                mean: r.mean,
                stddev: r.stddev.unwrap_or(0.0),
            },
        })
        .collect())
}
