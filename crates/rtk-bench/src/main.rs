//! rtk-bench - Differential benchmark harness for rtk.

use anyhow::{Context, Result};
use clap::Parser;
use rtk_bench::{
    check_placeholders,
    signal::install_signal_handler,
    toolchain::check_dependencies,
    BenchError, Cli, Hyperfine, Reporter, RunContext, ScriptGenerator, SuiteConfig, SuiteMode,
    SuiteRunner, Toolchain,
};
use std::process::ExitCode;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Log lines go through indicatif so they never clobber the timing spinner.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .with(filter)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<BenchError>()
                .map_or(1, BenchError::exit_code);
            eprintln!("Error: {e:#}");
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Everything that can be rejected without side effects is checked first.
    let suite = SuiteConfig::from_file(&cli.config, &cli.repo_root)?;
    check_placeholders(&suite, cli.strict_placeholders)?;

    let mode = suite.mode();
    tracing::info!(suite = %suite.id, %mode, tests = suite.tests.len(), "Loaded suite");

    let request = cli.toolchain_request(mode == SuiteMode::Preexisting, mode == SuiteMode::Generated);
    check_dependencies(&request)?;
    let generator = ScriptGenerator::new(cli.generator_script());
    if mode == SuiteMode::Generated && !generator.script().exists() {
        return Err(BenchError::Dependency(format!(
            "fixture generator not found: {}",
            generator.script().display()
        ))
        .into());
    }

    install_signal_handler();

    let toolchain = Toolchain::bootstrap(&request)?;
    let versions = toolchain.versions();

    let scratch = tempfile::Builder::new()
        .prefix("rtk-bench-")
        .tempdir()
        .context("Failed to create scratch directory")?;
    let ctx = RunContext::new(toolchain.bindings(), scratch.path())?
        .with_service_binary(toolchain.service.clone());

    let reporter = Reporter::stdout(cli.markdown_output.as_deref())?;
    let timing = Hyperfine::new("hyperfine", cli.hyperfine_args.clone());

    let summary = SuiteRunner::new(&suite, cli.run_options(), &timing, &generator, reporter)
        .run(ctx, &versions)?;
    tracing::info!(tests = summary.tests.len(), "Suite complete");

    if let Some(path) = &cli.markdown_output {
        eprintln!("Markdown output written to: {}", path.display());
    }
    eprintln!("Summary JSON written to: {}", cli.summary_output.display());
    Ok(())
}
