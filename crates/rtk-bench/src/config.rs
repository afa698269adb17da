//! Suite definitions.
//!
//! A suite is loaded once from a YAML (or `.toml`) document and is immutable
//! afterwards. The fixture source decides the run mode: a `fixtures_dir`
//! reference selects pre-existing fixtures, a `fixtures` block selects
//! generated ones. Exactly one of the two must be present.

use crate::error::{BenchError, Result};
use crate::placeholder;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Parameters handed to the fixture generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureParams {
    /// Number of standalone environments (`static-NNNN/`).
    pub static_envs: u32,
    /// Number of files declaring inline environments (`inline-NN/`).
    pub inline_files: u32,
    /// Environments declared by each inline file.
    pub envs_per_inline_file: u32,
    /// Kubernetes resources rendered per environment.
    pub resources_per_env: u32,
}

impl FixtureParams {
    /// Total environments across static and inline fixtures.
    pub fn total_envs(&self) -> u64 {
        u64::from(self.static_envs) + u64::from(self.inline_files) * u64::from(self.envs_per_inline_file)
    }

    /// Environment-specific library files (one per static env, one per inline file).
    pub fn total_env_libs(&self) -> u64 {
        u64::from(self.static_envs) + u64::from(self.inline_files)
    }

    /// All library files, including the single global one.
    pub fn total_lib_files(&self) -> u64 {
        1 + self.total_env_libs()
    }
}

/// Where the fixture tree comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureSource {
    /// Generate a tree from parameters.
    Generated(FixtureParams),
    /// Bind to a recorded tree; one subdirectory per test case.
    Preexisting(PathBuf),
}

/// Run mode, derived from the fixture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteMode {
    Generated,
    Preexisting,
}

impl std::fmt::Display for SuiteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generated => write!(f, "generated"),
            Self::Preexisting => write!(f, "preexisting"),
        }
    }
}

/// How tool outputs are compared during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// The command writes files; stdout is not compared.
    FileExport,
    /// Stdout is JSON; compared structurally, falling back to exact bytes.
    Structured,
    /// Stdout is compared byte for byte.
    PlainText,
}

impl OutputKind {
    /// Classify a command template.
    pub fn infer(command: &str) -> Self {
        if command.starts_with("export ") {
            Self::FileExport
        } else if command.contains("--json") || command.starts_with("eval ") {
            Self::Structured
        } else {
            Self::PlainText
        }
    }
}

/// A single benchmark test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Unique within the suite. In pre-existing mode, also the fixture subdirectory.
    pub name: String,
    /// Description template (may contain placeholders).
    pub description: String,
    /// Command template; empty in pre-existing mode.
    pub command: String,
    /// Comparison policy, inferred from the command.
    pub output: OutputKind,
}

impl TestCase {
    fn new(name: String, description: String, command: String) -> Self {
        let output = OutputKind::infer(&command);
        Self {
            name,
            description,
            command,
            output,
        }
    }

    /// Whether the command is implicit (pre-existing fixture mode).
    pub fn is_implicit(&self) -> bool {
        self.command.is_empty()
    }
}

/// A loaded, validated suite definition.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub name: String,
    pub id: String,
    pub description: String,
    pub tests: Vec<TestCase>,
    pub fixtures: FixtureSource,
    /// One-shot setup template, run once per tool before validation.
    pub setup: Option<String>,
    /// Prepare template, run before each timed repetition.
    pub prepare: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSuite {
    name: String,
    id: String,
    description: String,
    #[serde(default)]
    fixtures: Option<FixtureParams>,
    #[serde(default)]
    fixtures_dir: Option<PathBuf>,
    tests: Vec<RawTest>,
    #[serde(default)]
    setup: Option<String>,
    #[serde(default)]
    prepare: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    command: String,
}

impl SuiteConfig {
    /// Load a suite from disk. Relative `fixtures_dir` paths resolve against `repo_root`.
    pub fn from_file(path: &Path, repo_root: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BenchError::Config(format!("cannot read {}: {e}", path.display())))?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let raw: RawSuite = if is_toml {
            toml::from_str(&contents)
                .map_err(|e| BenchError::Config(format!("{}: {e}", path.display())))?
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|e| BenchError::Config(format!("{}: {e}", path.display())))?
        };

        Self::from_raw(raw, repo_root)
    }

    /// Parse a suite from a YAML string.
    pub fn from_yaml(yaml: &str, repo_root: &Path) -> Result<Self> {
        let raw: RawSuite =
            serde_yaml::from_str(yaml).map_err(|e| BenchError::Config(e.to_string()))?;
        Self::from_raw(raw, repo_root)
    }

    fn from_raw(raw: RawSuite, repo_root: &Path) -> Result<Self> {
        let fixtures = match (raw.fixtures, raw.fixtures_dir) {
            (Some(_), Some(_)) => {
                return Err(BenchError::Config(
                    "`fixtures` and `fixtures_dir` are mutually exclusive".into(),
                ));
            }
            (None, None) => {
                return Err(BenchError::Config(
                    "one of `fixtures` or `fixtures_dir` is required".into(),
                ));
            }
            (Some(params), None) => FixtureSource::Generated(params),
            (None, Some(dir)) => FixtureSource::Preexisting(repo_root.join(dir)),
        };

        let mut seen = HashSet::new();
        let mut tests = Vec::with_capacity(raw.tests.len());
        for test in raw.tests {
            if test.name.trim().is_empty() {
                return Err(BenchError::Config("test with empty name".into()));
            }
            if !seen.insert(test.name.clone()) {
                return Err(BenchError::Config(format!("duplicate test name `{}`", test.name)));
            }
            match fixtures {
                FixtureSource::Generated(_) => {
                    if test.command.trim().is_empty() {
                        return Err(BenchError::Config(format!(
                            "test `{}` has no command (required with generated fixtures)",
                            test.name
                        )));
                    }
                    tests.push(TestCase::new(test.name, test.description, test.command));
                }
                // Commands are implicit against recorded fixtures.
                FixtureSource::Preexisting(_) => {
                    tests.push(TestCase::new(test.name, test.description, String::new()));
                }
            }
        }

        Ok(Self {
            name: raw.name,
            id: raw.id,
            description: raw.description,
            tests,
            fixtures,
            setup: raw.setup,
            prepare: raw.prepare,
        })
    }

    pub fn mode(&self) -> SuiteMode {
        match self.fixtures {
            FixtureSource::Generated(_) => SuiteMode::Generated,
            FixtureSource::Preexisting(_) => SuiteMode::Preexisting,
        }
    }

    /// Fixture parameters, when generating.
    pub fn params(&self) -> Option<&FixtureParams> {
        match &self.fixtures {
            FixtureSource::Generated(params) => Some(params),
            FixtureSource::Preexisting(_) => None,
        }
    }

    /// Recorded fixture directory, when binding to one.
    pub fn fixtures_dir(&self) -> Option<&Path> {
        match &self.fixtures {
            FixtureSource::Generated(_) => None,
            FixtureSource::Preexisting(dir) => Some(dir),
        }
    }

    /// Every template in the suite, labelled by where it came from.
    pub fn templates(&self) -> Vec<(String, &str)> {
        let mut templates = Vec::new();
        if let Some(setup) = &self.setup {
            templates.push(("setup".to_string(), setup.as_str()));
        }
        if let Some(prepare) = &self.prepare {
            templates.push(("prepare".to_string(), prepare.as_str()));
        }
        for test in &self.tests {
            templates.push((format!("{} (command)", test.name), test.command.as_str()));
            templates.push((format!("{} (description)", test.name), test.description.as_str()));
        }
        templates
    }

    /// Placeholder tokens that no key in the closed table resolves.
    ///
    /// Returns `(template origin, token)` pairs.
    pub fn unknown_placeholders(&self) -> Vec<(String, String)> {
        self.templates()
            .into_iter()
            .flat_map(|(origin, template)| {
                placeholder::unknown_tokens(template)
                    .into_iter()
                    .map(move |token| (origin.clone(), token))
            })
            .collect()
    }
}
