//! Markdown narrative.
//!
//! The report is written to stdout and, optionally, tee'd to a file so CI can
//! post it as a comment.

use crate::config::{SuiteConfig, SuiteMode};
use crate::error::{BenchError, Result};
use std::io::Write;
use std::path::Path;

/// Writes the markdown report to every configured sink.
pub struct Reporter {
    sinks: Vec<Box<dyn Write>>,
}

impl Reporter {
    pub fn new(sinks: Vec<Box<dyn Write>>) -> Self {
        Self { sinks }
    }

    /// Report to stdout, plus `markdown_output` when given.
    pub fn stdout(markdown_output: Option<&Path>) -> Result<Self> {
        let mut sinks: Vec<Box<dyn Write>> = vec![Box::new(std::io::stdout())];
        if let Some(path) = markdown_output {
            let file =
                std::fs::File::create(path).map_err(|e| BenchError::io_at("create", path, e))?;
            sinks.push(Box::new(std::io::BufWriter::new(file)));
        }
        Ok(Self::new(sinks))
    }

    fn emit(&mut self, text: &str) -> Result<()> {
        for sink in &mut self.sinks {
            sink.write_all(text.as_bytes())
                .and_then(|()| sink.flush())
                .map_err(|e| BenchError::io("Failed to write report", e))?;
        }
        Ok(())
    }

    fn line(&mut self, text: &str) -> Result<()> {
        self.emit(&format!("{text}\n"))
    }

    /// Collapsible header with the suite configuration and tool versions.
    pub fn header(&mut self, suite: &SuiteConfig, versions: &[(String, String)]) -> Result<()> {
        self.line("<details>")?;
        self.line("<summary>Test Configuration & Versions</summary>")?;
        self.line("")?;
        self.line(&format!("**{}**: {}", suite.name, suite.description))?;
        self.line("")?;
        self.line("### Test Configuration")?;
        self.line("")?;
        match (suite.mode(), suite.params(), suite.fixtures_dir()) {
            (SuiteMode::Generated, Some(p), _) => {
                self.line(&format!("- Static environments: {}", p.static_envs))?;
                self.line(&format!(
                    "- Inline environment files: {} ({} envs each = {} total)",
                    p.inline_files,
                    p.envs_per_inline_file,
                    u64::from(p.inline_files) * u64::from(p.envs_per_inline_file)
                ))?;
                self.line(&format!("- Resources per environment: {}", p.resources_per_env))?;
                self.line(&format!(
                    "- Lib files: {} (1 global + {} env-specific)",
                    p.total_lib_files(),
                    p.total_env_libs()
                ))?;
                self.line(&format!("- Total environments: {}", p.total_envs()))?;
            }
            (_, _, dir) => {
                if let Some(dir) = dir {
                    self.line(&format!("- Fixtures directory: `{}`", dir.display()))?;
                }
                self.line(&format!("- Test cases: {}", suite.tests.len()))?;
            }
        }
        self.line("")?;
        self.line("### Versions")?;
        self.line("")?;
        for (label, version) in versions {
            self.line(&format!("- {label}: {version}"))?;
        }
        self.line("")?;
        self.line("</details>")?;
        self.line("")
    }

    pub fn benchmarks_heading(&mut self) -> Result<()> {
        self.line("## Benchmarks")?;
        self.line("")
    }

    /// `### name`, followed by the description when there is one.
    pub fn case_heading(&mut self, name: &str, description: &str) -> Result<()> {
        self.line(&format!("### {name}"))?;
        self.line("")?;
        if !description.trim().is_empty() {
            self.line(description.trim())?;
            self.line("")?;
        }
        Ok(())
    }

    /// The timing tool's markdown table.
    pub fn table(&mut self, markdown: &str) -> Result<()> {
        self.line(markdown.trim_end())?;
        self.line("")
    }

    pub fn skipped(&mut self) -> Result<()> {
        self.line("_Skipped (no cluster state)_")?;
        self.line("")
    }

    pub fn validation_failed(&mut self, message: &str) -> Result<()> {
        self.line("")?;
        self.line("## Validation Failed")?;
        self.line("")?;
        self.line(message)?;
        self.line("")
    }
}
