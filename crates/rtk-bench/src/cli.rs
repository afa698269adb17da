//! Command-line interface for the benchmark harness.

use crate::runner::RunOptions;
use crate::toolchain::ToolchainRequest;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

/// Differential benchmark harness for rtk.
///
/// Validates that rtk and tk produce the same output for every test case in
/// a suite, then times both (and optionally a baseline build of rtk) with
/// hyperfine.
#[derive(Parser, Debug)]
#[command(name = "rtk-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the suite definition (YAML, or TOML with a `.toml` extension).
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Pre-built candidate binary (skips building from the workspace).
    #[arg(long, visible_alias = "rtk-binary-path", value_name = "PATH")]
    pub candidate_binary_path: Option<PathBuf>,

    /// Pre-built baseline binary to compare against.
    #[arg(long, visible_alias = "rtk-base-binary-path", value_name = "PATH")]
    pub baseline_binary_path: Option<PathBuf>,

    /// Build the baseline from `origin/<REF>` in a temporary worktree.
    #[arg(long, env = "BENCHMARK_BASE_REF", value_name = "REF")]
    pub base_ref: Option<String>,

    /// Reference implementation (command name or path).
    #[arg(long, default_value = "tk")]
    pub reference: String,

    /// Cargo package of the candidate.
    #[arg(long, default_value = "rtk")]
    pub candidate_package: String,

    /// Cargo package of the mock Kubernetes server used with recorded fixtures.
    #[arg(long, default_value = "mock-k8s-server")]
    pub service_package: String,

    /// Repository root; builds run here and `fixtures_dir` resolves against it.
    #[arg(long, default_value = ".")]
    pub repo_root: PathBuf,

    /// Bash library defining `generate_fixtures`.
    ///
    /// Defaults to `<repo-root>/rtk-benchmarks/lib/generate-fixtures.sh`.
    #[arg(long, value_name = "PATH")]
    pub generator_script: Option<PathBuf>,

    /// Also write the markdown report to this file.
    #[arg(long, env = "BENCHMARK_MARKDOWN_OUTPUT", value_name = "PATH")]
    pub markdown_output: Option<PathBuf>,

    /// Where to write the JSON summary.
    #[arg(
        long,
        env = "BENCHMARK_SUMMARY_OUTPUT",
        default_value = "benchmark-summary.json",
        value_name = "PATH"
    )]
    pub summary_output: PathBuf,

    /// Warmup runs per command with generated fixtures.
    #[arg(long, default_value = "1")]
    pub warmup: u32,

    /// Fail on `{placeholders}` that are not recognised instead of leaving them as-is.
    #[arg(long)]
    pub strict_placeholders: bool,

    /// Force colored output.
    #[arg(long, conflicts_with = "no_color")]
    pub color: bool,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Verbose output.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Extra arguments passed to hyperfine (after `--`).
    #[arg(last = true, value_name = "HYPERFINE_ARGS")]
    pub hyperfine_args: Vec<String>,
}

impl Cli {
    /// Whether progress output should be colored.
    pub fn color_enabled(&self) -> bool {
        if self.color {
            return true;
        }
        if self.no_color || std::env::var_os("NO_COLOR").is_some() {
            return false;
        }
        std::io::stderr().is_terminal()
    }

    pub fn generator_script(&self) -> PathBuf {
        self.generator_script.clone().unwrap_or_else(|| {
            self.repo_root
                .join("rtk-benchmarks")
                .join("lib")
                .join("generate-fixtures.sh")
        })
    }

    pub fn toolchain_request(&self, needs_service: bool, needs_generator: bool) -> ToolchainRequest {
        ToolchainRequest {
            repo_root: self.repo_root.clone(),
            reference: self.reference.clone(),
            candidate_path: self.candidate_binary_path.clone(),
            candidate_package: self.candidate_package.clone(),
            baseline_path: self.baseline_binary_path.clone(),
            base_ref: self.base_ref.clone().filter(|r| !r.is_empty()),
            service_package: self.service_package.clone(),
            needs_service,
            needs_generator,
            color: self.color_enabled(),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            warmup: self.warmup,
            color: self.color_enabled(),
            summary_output: self.summary_output.clone(),
        }
    }
}
