//! Fixture provisioning.
//!
//! Generated suites hand their parameters to an external generator that
//! populates a directory. Pre-existing suites bind to a recorded tree where
//! each test case owns `<name>/environment` and, optionally, `<name>/cluster`.

pub mod service;

use crate::config::FixtureParams;
use crate::error::{BenchError, Result};
use crate::process::shell_quote;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub use service::{ServiceGuard, READY_TIMEOUT};

/// Produces a fixture tree from parameters.
pub trait FixtureGenerator {
    /// Populate `target` according to `params`. Must block until done.
    fn generate(&self, params: &FixtureParams, target: &Path) -> Result<()>;
}

/// Sources a bash library and calls its `generate_fixtures` function.
#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    script: PathBuf,
}

impl ScriptGenerator {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    fn render(&self, params: &FixtureParams, target: &Path) -> String {
        format!(
            "set -euo pipefail\n\
             NUM_STATIC_ENVS={}\n\
             NUM_INLINE_FILES={}\n\
             ENVS_PER_INLINE_FILE={}\n\
             NUM_RESOURCES_PER_ENV={}\n\
             source {}\n\
             generate_fixtures {}\n",
            params.static_envs,
            params.inline_files,
            params.envs_per_inline_file,
            params.resources_per_env,
            shell_quote(&self.script.display().to_string()),
            shell_quote(&target.display().to_string()),
        )
    }
}

impl FixtureGenerator for ScriptGenerator {
    fn generate(&self, params: &FixtureParams, target: &Path) -> Result<()> {
        tracing::info!(
            static_envs = params.static_envs,
            inline_files = params.inline_files,
            target = %target.display(),
            "Generating fixtures"
        );
        std::fs::create_dir_all(target).map_err(|e| BenchError::io_at("create", target, e))?;

        let status = Command::new("bash")
            .arg("-c")
            .arg(self.render(params, target))
            .stdin(Stdio::null())
            .status()
            .map_err(|e| BenchError::Provision(format!("cannot run fixture generator: {e}")))?;

        if !status.success() {
            return Err(BenchError::Provision(format!(
                "fixture generator {} exited with {status}",
                self.script.display()
            )));
        }
        Ok(())
    }
}

/// Remove and recreate `dir`, leaving it empty.
pub fn reset_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(BenchError::io_at("clear", dir, e)),
    }
    std::fs::create_dir_all(dir).map_err(|e| BenchError::io_at("create", dir, e))
}

/// Layout of one test case in a recorded fixture tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCase {
    /// Tanka environment the tools diff.
    pub env_dir: PathBuf,
    /// Cluster state served by the backing service.
    pub cluster_dir: PathBuf,
}

impl RecordedCase {
    pub fn new(fixtures_dir: &Path, test_name: &str) -> Self {
        let test_dir = fixtures_dir.join(test_name);
        Self {
            env_dir: test_dir.join("environment"),
            cluster_dir: test_dir.join("cluster"),
        }
    }

    /// Whether cluster state was recorded for this case.
    pub fn has_state(&self) -> bool {
        self.cluster_dir.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn params() -> FixtureParams {
        FixtureParams {
            static_envs: 2,
            inline_files: 1,
            envs_per_inline_file: 3,
            resources_per_env: 4,
        }
    }

    #[test]
    fn test_script_generator_passes_all_parameters() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("gen.sh");
        std::fs::write(
            &script,
            "generate_fixtures() {\n  mkdir -p \"$1\"\n  echo \"$NUM_STATIC_ENVS $NUM_INLINE_FILES $ENVS_PER_INLINE_FILE $NUM_RESOURCES_PER_ENV\" > \"$1/params\"\n}\n",
        )
        .unwrap();

        let target = dir.path().join("fixtures");
        ScriptGenerator::new(&script).generate(&params(), &target).unwrap();

        let written = std::fs::read_to_string(target.join("params")).unwrap();
        assert_eq!(written.trim(), "2 1 3 4");
    }

    #[test]
    fn test_script_generator_failure_is_provision_error() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("gen.sh");
        std::fs::write(&script, "generate_fixtures() { return 7; }\n").unwrap();

        let err = ScriptGenerator::new(&script)
            .generate(&params(), &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, BenchError::Provision(_)));
    }

    #[test]
    fn test_script_generator_quotes_paths() {
        let rendered = ScriptGenerator::new("/repo dir/gen.sh").render(&params(), Path::new("/tmp/a b"));
        assert!(rendered.contains("source '/repo dir/gen.sh'"));
        assert!(rendered.contains("generate_fixtures '/tmp/a b'"));
        assert!(rendered.starts_with("set -euo pipefail"));
    }

    #[test]
    fn test_reset_dir_clears_contents() {
        let dir = TempDir::new().unwrap();
        let export = dir.path().join("export-output-tk");
        std::fs::create_dir_all(export.join("nested")).unwrap();
        std::fs::write(export.join("stale.yaml"), "x").unwrap();

        reset_dir(&export).unwrap();
        assert!(export.is_dir());
        assert_eq!(std::fs::read_dir(&export).unwrap().count(), 0);

        let fresh = dir.path().join("never-existed");
        reset_dir(&fresh).unwrap();
        assert!(fresh.is_dir());
    }

    #[test]
    fn test_recorded_case_layout() {
        let dir = TempDir::new().unwrap();
        let case = RecordedCase::new(dir.path(), "deployment-change");
        assert_eq!(case.env_dir, dir.path().join("deployment-change/environment"));
        assert!(!case.has_state());

        std::fs::create_dir_all(&case.cluster_dir).unwrap();
        assert!(case.has_state());
    }
}
