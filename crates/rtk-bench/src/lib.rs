//! Differential benchmark harness for rtk.
//!
//! Compares a reference tool (`tk`), a candidate reimplementation (`rtk`)
//! and optionally a baseline build of the candidate over fixture trees:
//!
//! - **Generated fixtures**: a bash generator builds a tree from four counts;
//!   each test case is a command template with `{placeholders}` for fixture
//!   paths. Outputs are validated for equivalence before anything is timed.
//! - **Recorded fixtures**: each test case owns an environment and a cluster
//!   state; tools run `diff` against a mock Kubernetes server.
//!
//! Timing is delegated to hyperfine. Results end up in a markdown report and
//! a JSON summary with speedups over the reference and a noise-aware verdict
//! against the baseline.
//!
//! # Usage
//!
//! ```text
//! rtk-bench [OPTIONS] <CONFIG> [-- <HYPERFINE_ARGS>...]
//!
//! Options:
//!       --candidate-binary-path <PATH>  Pre-built candidate
//!       --baseline-binary-path <PATH>   Pre-built baseline
//!       --base-ref <REF>                Build the baseline from origin/<REF>
//!       --markdown-output <PATH>        Also write the report here
//!       --summary-output <PATH>         JSON summary (default: benchmark-summary.json)
//!       --strict-placeholders           Reject unknown {placeholders}
//!   -v, --verbose                       Verbose output
//! ```

pub mod bench;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod placeholder;
pub mod process;
pub mod provision;
pub mod report;
pub mod results;
pub mod runner;
pub mod signal;
pub mod timing;
pub mod toolchain;
pub mod validate;

pub use bench::{CaseTiming, Executor, Preflight};
pub use cli::Cli;
pub use config::{FixtureParams, FixtureSource, OutputKind, SuiteConfig, SuiteMode, TestCase};
pub use context::{RunContext, ToolBinding, ToolId};
pub use error::{BenchError, Result};
pub use placeholder::{PathVars, Placeholder};
pub use provision::{FixtureGenerator, ScriptGenerator, ServiceGuard};
pub use report::Reporter;
pub use results::{SuiteSummary, TestSummary};
pub use runner::{check_placeholders, RunOptions, SuiteRunner};
pub use timing::{Hyperfine, TimingReport, TimingRequest, TimingResult, TimingTool};
pub use toolchain::{Toolchain, ToolchainRequest};
