//! Benchmark execution.
//!
//! Builds the labelled commands for a validated test case, decides whether
//! the baseline takes part, and runs the timing tool behind a spinner.

use crate::config::TestCase;
use crate::context::{RunContext, ToolBinding, ToolId};
use crate::error::{BenchError, Result};
use crate::placeholder::PathVars;
use crate::process::{run_shell_with_timeout, shell_quote, tool_line};
use crate::provision::RecordedCase;
use crate::timing::{LabeledCommand, Stats, TimingRequest, TimingTool};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on a baseline support check.
pub const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(30);

/// Case-insensitive marker of a command the baseline lacks.
const UNIMPLEMENTED_MARKER: &str = "not implemented";

/// Outcome of probing the baseline with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preflight {
    Supported,
    Unimplemented,
    TimedOut,
}

/// Run `script` once and classify whether the tool supports it.
///
/// Only a failing run that mentions the marker counts as unsupported; any
/// other failure still gets timed.
pub fn preflight(script: &str, cwd: &Path, timeout: Duration) -> Result<Preflight> {
    let Some(out) = run_shell_with_timeout(script, Some(cwd), timeout)
        .map_err(|e| BenchError::io("Failed to run baseline preflight", e))?
    else {
        return Ok(Preflight::TimedOut);
    };
    if out.success() {
        return Ok(Preflight::Supported);
    }
    let mentions_marker = |bytes: &[u8]| {
        String::from_utf8_lossy(bytes)
            .to_lowercase()
            .contains(UNIMPLEMENTED_MARKER)
    };
    if mentions_marker(&out.stdout) || mentions_marker(&out.stderr) {
        Ok(Preflight::Unimplemented)
    } else {
        Ok(Preflight::Supported)
    }
}

/// Timing of one test case, keyed by tool role.
#[derive(Debug, Clone, Default)]
pub struct CaseTiming {
    pub markdown: String,
    pub stats: Vec<(ToolId, Stats)>,
}

impl CaseTiming {
    pub fn get(&self, id: ToolId) -> Option<Stats> {
        self.stats.iter().find(|(tool, _)| *tool == id).map(|(_, s)| *s)
    }
}

/// Runs the timing tool for each test case.
pub struct Executor<'a> {
    timing: &'a dyn TimingTool,
    color: bool,
    preflight_timeout: Duration,
}

impl<'a> Executor<'a> {
    pub fn new(timing: &'a dyn TimingTool, color: bool) -> Self {
        Self {
            timing,
            color,
            preflight_timeout: PREFLIGHT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_preflight_timeout(mut self, timeout: Duration) -> Self {
        self.preflight_timeout = timeout;
        self
    }

    /// Time a generated-fixture test case across all tools.
    pub fn run_generated(
        &self,
        ctx: &RunContext,
        vars: &PathVars,
        test: &TestCase,
        prepare: Option<&str>,
        warmup: u32,
        index: usize,
    ) -> Result<CaseTiming> {
        let root = ctx.fixture_root()?;
        let invocation = |tool: &ToolBinding| {
            let command = vars.expand(&test.command, tool.export_dir.as_deref());
            format!(
                "cd {} && {}",
                shell_quote(&root.display().to_string()),
                tool_line(&tool.executable, &command)
            )
        };

        let tools = self.participants(ctx, root, &invocation)?;
        let commands = tools
            .iter()
            .map(|tool| LabeledCommand::new(&tool.label, format!("{} >/dev/null", invocation(tool))))
            .collect();
        let prepares = prepare
            .map(|p| {
                tools
                    .iter()
                    .map(|tool| vars.expand(p, tool.export_dir.as_deref()))
                    .collect()
            })
            .unwrap_or_default();

        let (markdown_path, json_path) = artifact_paths(ctx.scratch(), index);
        let request = TimingRequest {
            commands,
            prepares,
            warmup: Some(warmup),
            markdown_path,
            json_path,
        };
        self.measure(&test.name, &tools, &request)
    }

    /// Time a recorded-fixture test case (`diff` against the backing service).
    pub fn run_recorded(
        &self,
        ctx: &RunContext,
        case: &RecordedCase,
        kubeconfig: &Path,
        name: &str,
        index: usize,
    ) -> Result<CaseTiming> {
        let diff = |tool: &ToolBinding| {
            format!(
                "cd {} && KUBECONFIG={} {} diff . </dev/null",
                shell_quote(&case.env_dir.display().to_string()),
                shell_quote(&kubeconfig.display().to_string()),
                shell_quote(&tool.executable.display().to_string()),
            )
        };

        let tools = self.participants(ctx, &case.env_dir, &diff)?;
        let commands = tools
            .iter()
            .map(|tool| {
                LabeledCommand::new(
                    format!("{} diff", tool.label),
                    format!("{} 2>/dev/null || true", diff(tool)),
                )
            })
            .collect();
        let labelled: Vec<ToolBinding> = tools
            .into_iter()
            .map(|tool| ToolBinding {
                label: format!("{} diff", tool.label),
                ..tool
            })
            .collect();

        let (markdown_path, json_path) = artifact_paths(ctx.scratch(), index);
        let request = TimingRequest {
            commands,
            prepares: Vec::new(),
            warmup: None,
            markdown_path,
            json_path,
        };
        self.measure(name, &labelled, &request)
    }

    /// Tools taking part: all of them, minus a baseline that lacks the command.
    fn participants(
        &self,
        ctx: &RunContext,
        cwd: &Path,
        script: impl Fn(&ToolBinding) -> String,
    ) -> Result<Vec<ToolBinding>> {
        let mut tools = Vec::with_capacity(ctx.tools().len());
        for tool in ctx.tools() {
            if tool.id == ToolId::Baseline {
                match preflight(&script(tool), cwd, self.preflight_timeout)? {
                    Preflight::Supported => {}
                    Preflight::Unimplemented => {
                        eprintln!("  ({} does not support this command, skipping)", tool.label);
                        continue;
                    }
                    Preflight::TimedOut => {
                        tracing::warn!(
                            "{} did not finish within {}s, leaving it out",
                            tool.label,
                            self.preflight_timeout.as_secs()
                        );
                        continue;
                    }
                }
            }
            tools.push(tool.clone());
        }
        Ok(tools)
    }

    fn measure(
        &self,
        name: &str,
        tools: &[ToolBinding],
        request: &TimingRequest,
    ) -> Result<CaseTiming> {
        if crate::signal::shutdown_requested() {
            return Err(BenchError::Interrupted);
        }

        let spinner = self.spinner(name);
        let report = self.timing.measure(request);
        spinner.finish_and_clear();
        // Ctrl-C reaches the timing tool too; its failure is the interrupt.
        let report = match report {
            Err(_) if crate::signal::shutdown_requested() => return Err(BenchError::Interrupted),
            other => other?,
        };

        let stats = tools
            .iter()
            .map(|tool| {
                report.get(&tool.label).map(|s| (tool.id, s)).ok_or_else(|| {
                    BenchError::Execution(format!("no timing reported for `{}`", tool.label))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CaseTiming {
            markdown: report.markdown,
            stats,
        })
    }

    fn spinner(&self, name: &str) -> ProgressBar {
        let progress = ProgressBar::new_spinner();
        let template = if self.color {
            "  {spinner:.cyan} Timing {msg}"
        } else {
            "  {spinner} Timing {msg}"
        };
        progress.set_style(
            ProgressStyle::default_spinner()
                .template(template)
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "]),
        );
        progress.set_message(name.to_string());
        progress.enable_steady_tick(Duration::from_millis(100));
        progress
    }
}

/// Per-case markdown and JSON export paths.
pub fn artifact_paths(scratch: &Path, index: usize) -> (PathBuf, PathBuf) {
    (
        scratch.join(format!("timing-{index}.md")),
        scratch.join(format!("timing-{index}.json")),
    )
}
