//! Suite orchestration.
//!
//! Generated suites run in three strictly ordered phases: provision (fixtures,
//! export directories, setup), validate every test case, then time every
//! test case. Recorded suites skip validation and time each case against its
//! own backing service.

use crate::bench::Executor;
use crate::config::{FixtureSource, SuiteConfig, TestCase};
use crate::context::RunContext;
use crate::error::{BenchError, Result};
use crate::placeholder::PathVars;
use crate::process::{run_shell, tool_line};
use crate::provision::{reset_dir, FixtureGenerator, RecordedCase, ServiceGuard, READY_TIMEOUT};
use crate::report::Reporter;
use crate::results::{summarize, write_summary, SuiteSummary, TestSummary};
use crate::signal::shutdown_requested;
use crate::timing::TimingTool;
use crate::validate::Validator;
use owo_colors::OwoColorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Knobs that do not come from the suite definition.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Warmup runs per command (generated suites).
    pub warmup: u32,
    pub color: bool,
    pub summary_output: PathBuf,
}

/// Reject or report placeholder tokens outside the closed key set.
///
/// Call before provisioning so a typo never costs a fixture build.
pub fn check_placeholders(suite: &SuiteConfig, strict: bool) -> Result<()> {
    let unknown = suite.unknown_placeholders();
    if unknown.is_empty() {
        return Ok(());
    }
    if strict {
        let listed = unknown
            .iter()
            .map(|(origin, token)| format!("{token} in {origin}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(BenchError::Config(format!("unknown placeholders: {listed}")));
    }
    for (origin, token) in &unknown {
        tracing::warn!("{}: unknown placeholder {} is left as-is", origin, token);
    }
    Ok(())
}

/// Drives one suite from provisioning to the summary document.
pub struct SuiteRunner<'a> {
    suite: &'a SuiteConfig,
    options: RunOptions,
    timing: &'a dyn TimingTool,
    generator: &'a dyn FixtureGenerator,
    reporter: Reporter,
    service_timeout: Duration,
    preflight_timeout: Option<Duration>,
}

impl<'a> SuiteRunner<'a> {
    pub fn new(
        suite: &'a SuiteConfig,
        options: RunOptions,
        timing: &'a dyn TimingTool,
        generator: &'a dyn FixtureGenerator,
        reporter: Reporter,
    ) -> Self {
        Self {
            suite,
            options,
            timing,
            generator,
            reporter,
            service_timeout: READY_TIMEOUT,
            preflight_timeout: None,
        }
    }

    #[must_use]
    pub fn with_service_timeout(mut self, timeout: Duration) -> Self {
        self.service_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_preflight_timeout(mut self, timeout: Duration) -> Self {
        self.preflight_timeout = Some(timeout);
        self
    }

    fn executor(&self) -> Executor<'a> {
        let executor = Executor::new(self.timing, self.options.color);
        match self.preflight_timeout {
            Some(timeout) => executor.with_preflight_timeout(timeout),
            None => executor,
        }
    }

    /// Run the suite. The summary is written only if every case completed.
    pub fn run(mut self, ctx: RunContext, versions: &[(String, String)]) -> Result<SuiteSummary> {
        let suite = self.suite;
        self.reporter.header(suite, versions)?;

        let tests = self.run_cases(ctx).map_err(|e| {
            // A child killed by the same Ctrl-C reports its own failure.
            if shutdown_requested() {
                BenchError::Interrupted
            } else {
                e
            }
        })?;

        let summary = SuiteSummary::new(&suite.name, &suite.id, tests);
        write_summary(&summary, &self.options.summary_output)?;
        Ok(summary)
    }

    fn run_cases(&mut self, ctx: RunContext) -> Result<Vec<TestSummary>> {
        let suite = self.suite;
        match &suite.fixtures {
            FixtureSource::Generated(params) => {
                let fixtures = ctx.scratch().join("fixtures");
                self.generator.generate(params, &fixtures)?;
                let vars = PathVars::new(&fixtures, *params);
                let ctx = ctx.with_fixture_root(&fixtures).with_export_dirs();
                self.run_generated(&ctx, &vars)
            }
            FixtureSource::Preexisting(dir) => {
                let ctx = ctx.with_fixture_root(dir);
                self.run_recorded(&ctx, dir)
            }
        }
    }

    fn run_generated(&mut self, ctx: &RunContext, vars: &PathVars) -> Result<Vec<TestSummary>> {
        let suite = self.suite;
        for tool in ctx.tools() {
            if let Some(dir) = &tool.export_dir {
                reset_dir(dir)?;
            }
        }
        self.run_setup(ctx, vars)?;

        eprintln!("Validating outputs match before benchmarking...");
        let validator = Validator::new(ctx, vars, suite.prepare.as_deref());
        for test in &suite.tests {
            interrupted()?;
            eprint!("Validating {}... ", test.name);
            let _ = std::io::stderr().flush();
            match validator.validate(test) {
                Ok(()) => self.status_ok(),
                Err(_) if shutdown_requested() => {
                    self.status_failed();
                    return Err(BenchError::Interrupted);
                }
                Err(e) => {
                    self.status_failed();
                    if e.is_validation() {
                        self.reporter.validation_failed(&e.to_string())?;
                    }
                    return Err(e);
                }
            }
        }
        eprintln!();

        self.reporter.benchmarks_heading()?;
        let executor = self.executor();
        let mut summaries = Vec::with_capacity(suite.tests.len());
        for (i, test) in suite.tests.iter().enumerate() {
            interrupted()?;
            self.reporter
                .case_heading(&test.name, &vars.expand(&test.description, None))?;
            let timing = executor.run_generated(
                ctx,
                vars,
                test,
                suite.prepare.as_deref(),
                self.options.warmup,
                i + 1,
            )?;
            self.reporter.table(&timing.markdown)?;
            summaries.push(summarize(&test.name, &timing));
        }
        Ok(summaries)
    }

    /// Run the one-shot setup template once per tool, in its export directory.
    fn run_setup(&self, ctx: &RunContext, vars: &PathVars) -> Result<()> {
        let Some(setup) = &self.suite.setup else {
            return Ok(());
        };
        let cwd = ctx.fixture_root()?;
        for tool in ctx.tools() {
            let command = vars.expand(setup, tool.export_dir.as_deref());
            eprintln!("Running setup: {} {}...", tool.label, command);
            let out = run_shell(&tool_line(&tool.executable, &command), Some(cwd))
                .map_err(|e| BenchError::io(format!("Failed to run setup for {}", tool.label), e))?;
            if !out.success() {
                return Err(BenchError::Provision(format!(
                    "{} setup failed with {}\n  stderr: {}",
                    tool.label,
                    out.describe_status(),
                    out.stderr_lossy().trim()
                )));
            }
        }
        eprintln!("Setup complete.");
        Ok(())
    }

    fn run_recorded(&mut self, ctx: &RunContext, root: &Path) -> Result<Vec<TestSummary>> {
        let suite = self.suite;
        self.reporter.benchmarks_heading()?;
        let vars = PathVars::root_only(root);
        let executor = self.executor();
        let mut summaries = Vec::with_capacity(suite.tests.len());

        for (i, test) in suite.tests.iter().enumerate() {
            interrupted()?;
            self.reporter
                .case_heading(&test.name, &vars.expand(&test.description, None))?;
            let case = RecordedCase::new(root, &test.name);
            if !case.has_state() {
                self.reporter.skipped()?;
                summaries.push(TestSummary::skipped(&test.name));
                continue;
            }
            summaries.push(self.time_recorded(ctx, &executor, &case, test, i + 1)?);
        }
        Ok(summaries)
    }

    fn time_recorded(
        &mut self,
        ctx: &RunContext,
        executor: &Executor<'_>,
        case: &RecordedCase,
        test: &TestCase,
        index: usize,
    ) -> Result<TestSummary> {
        let service = ctx.service_binary().ok_or_else(|| {
            BenchError::Provision("no backing service binary for recorded fixtures".into())
        })?;
        let kubeconfig = ctx.scratch().join(format!("kubeconfig-{}.yaml", test.name));
        let pid_file = ctx.scratch().join(format!("mock-{}.pid", test.name));

        // Released on every path out of this function.
        let _guard = ServiceGuard::start(
            service,
            &case.cluster_dir,
            &kubeconfig,
            &pid_file,
            self.service_timeout,
        )?;
        interrupted()?;

        let timing = executor.run_recorded(ctx, case, &kubeconfig, &test.name, index)?;
        self.reporter.table(&timing.markdown)?;
        Ok(summarize(&test.name, &timing))
    }

    fn status_ok(&self) {
        if self.options.color {
            eprintln!("{}", "OK".green());
        } else {
            eprintln!("OK");
        }
    }

    fn status_failed(&self) {
        if self.options.color {
            eprintln!("{}", "FAILED".red().bold());
        } else {
            eprintln!("FAILED");
        }
    }
}

fn interrupted() -> Result<()> {
    if shutdown_requested() {
        Err(BenchError::Interrupted)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(yaml: &str) -> SuiteConfig {
        SuiteConfig::from_yaml(yaml, Path::new("/repo")).unwrap()
    }

    #[test]
    fn test_known_placeholders_pass_strict_check() {
        let suite = suite(
            "name: n\nid: i\ndescription: d\nfixtures: {static_envs: 1, inline_files: 0, envs_per_inline_file: 0, resources_per_env: 1}\ntests:\n  - name: t\n    command: eval {single_static_main_file}\n",
        );
        check_placeholders(&suite, true).unwrap();
    }

    #[test]
    fn test_unknown_placeholder_strict_is_config_error() {
        let suite = suite(
            "name: n\nid: i\ndescription: d\nfixtures: {static_envs: 1, inline_files: 0, envs_per_inline_file: 0, resources_per_env: 1}\ntests:\n  - name: t\n    command: eval {single_static_mainfile}\n",
        );
        let err = check_placeholders(&suite, true).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
        assert!(err.to_string().contains("{single_static_mainfile} in t (command)"));

        // Lenient mode only warns.
        check_placeholders(&suite, false).unwrap();
    }
}
