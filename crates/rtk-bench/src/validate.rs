//! Output equivalence checks.
//!
//! Before a test case is timed, every validated tool runs the expanded
//! command once and its stdout is compared against the reference tool's
//! under the policy given by the case's [`OutputKind`].

use crate::config::{OutputKind, TestCase};
use crate::context::{RunContext, ToolBinding, ToolId};
use crate::error::{BenchError, Result};
use crate::placeholder::PathVars;
use crate::process::{run_shell, tool_line, ShellOutput};
use std::fmt;

/// Longest line excerpt shown in a mismatch diagnostic.
const EXCERPT_LEN: usize = 200;

/// Where two outputs first diverge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub expected_lines: usize,
    pub expected_bytes: usize,
    pub actual_lines: usize,
    pub actual_bytes: usize,
    /// 1-based index of the first differing line.
    pub line: usize,
    /// `None` when the expected output ended before `line`.
    pub expected: Option<String>,
    pub actual: Option<String>,
    /// First differing byte, set when the lines agree but the bytes do not
    /// (line endings, a trailing newline).
    pub byte_offset: Option<usize>,
    pub structured: bool,
}

impl Mismatch {
    fn between(expected: &[u8], actual: &[u8], structured: bool) -> Self {
        let exp = String::from_utf8_lossy(expected);
        let act = String::from_utf8_lossy(actual);
        let mut exp_lines = exp.lines();
        let mut act_lines = act.lines();

        let mut line = 1;
        let (expected_line, actual_line) = loop {
            match (exp_lines.next(), act_lines.next()) {
                (Some(a), Some(b)) if a == b => line += 1,
                (a, b) => break (a.map(excerpt), b.map(excerpt)),
            }
        };

        let byte_offset = (expected_line.is_none() && actual_line.is_none()).then(|| {
            expected
                .iter()
                .zip(actual)
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| expected.len().min(actual.len()))
        });

        Self {
            expected_lines: exp.lines().count(),
            expected_bytes: expected.len(),
            actual_lines: act.lines().count(),
            actual_bytes: actual.len(),
            line,
            expected: expected_line,
            actual: actual_line,
            byte_offset,
            structured,
        }
    }
}

fn excerpt(line: &str) -> String {
    if line.chars().count() <= EXCERPT_LEN {
        line.to_string()
    } else {
        let cut: String = line.chars().take(EXCERPT_LEN).collect();
        format!("{cut}...")
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = "<end of output>";
        writeln!(
            f,
            "{} output differs",
            if self.structured { "JSON" } else { "Command" }
        )?;
        writeln!(
            f,
            "  expected: {} lines, {} bytes",
            self.expected_lines, self.expected_bytes
        )?;
        writeln!(
            f,
            "  actual:   {} lines, {} bytes",
            self.actual_lines, self.actual_bytes
        )?;
        if let Some(offset) = self.byte_offset {
            return write!(
                f,
                "  lines match; first difference at byte {offset} (line endings or trailing newline)"
            );
        }
        writeln!(f, "  first difference at line {}:", self.line)?;
        writeln!(f, "    - {}", self.expected.as_deref().unwrap_or(end))?;
        write!(f, "    + {}", self.actual.as_deref().unwrap_or(end))
    }
}

/// Compare two stdouts under `kind`.
pub fn compare_outputs(
    kind: OutputKind,
    expected: &[u8],
    actual: &[u8],
) -> std::result::Result<(), Box<Mismatch>> {
    match kind {
        OutputKind::FileExport => Ok(()),
        OutputKind::Structured => {
            let parsed = (
                serde_json::from_slice::<serde_json::Value>(expected),
                serde_json::from_slice::<serde_json::Value>(actual),
            );
            match parsed {
                (Ok(a), Ok(b)) if a == b => Ok(()),
                (Ok(_), Ok(_)) => Err(Box::new(Mismatch::between(expected, actual, true))),
                // Unparseable on either side: exact comparison.
                _ => exact(expected, actual),
            }
        }
        OutputKind::PlainText => exact(expected, actual),
    }
}

fn exact(expected: &[u8], actual: &[u8]) -> std::result::Result<(), Box<Mismatch>> {
    if expected == actual {
        Ok(())
    } else {
        Err(Box::new(Mismatch::between(expected, actual, false)))
    }
}

/// Runs validation for each test case of a generated suite.
pub struct Validator<'a> {
    ctx: &'a RunContext,
    vars: &'a PathVars,
    prepare: Option<&'a str>,
}

impl<'a> Validator<'a> {
    pub fn new(ctx: &'a RunContext, vars: &'a PathVars, prepare: Option<&'a str>) -> Self {
        Self { ctx, vars, prepare }
    }

    /// Run `test` once per validated tool and check the outputs agree.
    ///
    /// A non-zero exit or any mismatch is fatal for the whole run.
    pub fn validate(&self, test: &TestCase) -> Result<()> {
        let cwd = self.ctx.fixture_root()?;

        if let Some(prepare) = self.prepare {
            for tool in self.ctx.validated_tools() {
                let script = self.vars.expand(prepare, tool.export_dir.as_deref());
                let out = run_shell(&script, Some(cwd))
                    .map_err(|e| BenchError::io(format!("Failed to run prepare for {}", tool.label), e))?;
                if !out.success() {
                    return Err(failure(tool, &script, "prepare", &out));
                }
            }
        }

        let mut runs = Vec::new();
        for tool in self.ctx.validated_tools() {
            let command = self.vars.expand(&test.command, tool.export_dir.as_deref());
            let out = run_shell(&tool_line(&tool.executable, &command), Some(cwd))
                .map_err(|e| BenchError::io(format!("Failed to run {}", tool.label), e))?;
            runs.push((tool, command, out));
        }

        for (tool, command, out) in &runs {
            if !out.success() {
                return Err(failure(tool, command, "command", out));
            }
        }

        let Some((_, _, reference)) = runs.iter().find(|(t, _, _)| t.id == ToolId::Reference)
        else {
            return Err(BenchError::Config("no reference tool to validate against".into()));
        };
        for (tool, command, out) in runs.iter().filter(|(t, _, _)| t.id != ToolId::Reference) {
            if let Err(mismatch) = compare_outputs(test.output, &reference.stdout, &out.stdout) {
                return Err(BenchError::Validation {
                    tool: tool.label.clone(),
                    command: command.clone(),
                    message: mismatch.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn failure(tool: &ToolBinding, command: &str, what: &str, out: &ShellOutput) -> BenchError {
    let stderr = out.stderr_lossy();
    let mut message = format!("{} {what} failed with {}", tool.label, out.describe_status());
    if !stderr.trim().is_empty() {
        message.push_str("\n  stderr: ");
        message.push_str(stderr.trim());
    }
    BenchError::Validation {
        tool: tool.label.clone(),
        command: command.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixtureParams;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    #[test]
    fn test_plain_identical_passes() {
        assert!(compare_outputs(OutputKind::PlainText, b"a\nb\n", b"a\nb\n").is_ok());
    }

    #[test]
    fn test_plain_one_byte_differs_reports_line() {
        let err = compare_outputs(OutputKind::PlainText, b"a\nb\nc\n", b"a\nx\nc\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.expected.as_deref(), Some("b"));
        assert_eq!(err.actual.as_deref(), Some("x"));
        assert_eq!(err.expected_lines, 3);
        assert_eq!(err.actual_bytes, 6);
    }

    #[test]
    fn test_plain_truncated_output() {
        let err = compare_outputs(OutputKind::PlainText, b"a\nb\n", b"a\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.actual, None);
        assert!(err.to_string().contains("<end of output>"));
    }

    #[test]
    fn test_line_ending_difference_points_at_byte() {
        let err = compare_outputs(OutputKind::PlainText, b"a\nb\n", b"a\r\nb\r\n").unwrap_err();
        assert_eq!(err.expected, None);
        assert_eq!(err.actual, None);
        assert_eq!(err.byte_offset, Some(1));
        let text = err.to_string();
        assert!(text.contains("first difference at byte 1"));
        assert!(!text.contains("<end of output>"));

        let err = compare_outputs(OutputKind::PlainText, b"a\n", b"a").unwrap_err();
        assert_eq!(err.byte_offset, Some(1));
        assert!(compare_outputs(OutputKind::PlainText, b"a\nb", b"a\nx")
            .unwrap_err()
            .byte_offset
            .is_none());
    }

    #[test]
    fn test_structured_ignores_key_order() {
        assert!(compare_outputs(OutputKind::Structured, br#"{"a":1,"b":2}"#, br#"{"b":2,"a":1}"#).is_ok());
        assert!(
            compare_outputs(OutputKind::Structured, b"{\n  \"a\": [1, 2]\n}\n", br#"{"a":[1,2]}"#).is_ok()
        );
    }

    #[test]
    fn test_structured_value_difference() {
        let err =
            compare_outputs(OutputKind::Structured, br#"{"a":1}"#, br#"{"a":2}"#).unwrap_err();
        assert!(err.structured);
        assert!(err.to_string().starts_with("JSON output differs"));
    }

    #[test]
    fn test_structured_malformed_falls_back_to_exact() {
        assert!(compare_outputs(OutputKind::Structured, b"not json", b"not json").is_ok());
        let err = compare_outputs(OutputKind::Structured, br#"{"a":1}"#, b"{\"a\":1").unwrap_err();
        assert!(!err.structured);
    }

    #[test]
    fn test_file_export_skips_comparison() {
        assert!(compare_outputs(OutputKind::FileExport, b"one", b"two").is_ok());
    }

    #[test]
    fn test_long_lines_are_shortened() {
        let long = "x".repeat(500);
        assert!(excerpt(&long).ends_with("..."));
        assert_eq!(excerpt("short"), "short");
    }

    fn tool_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn setup(reference: &str, candidate: &str) -> (TempDir, RunContext, PathVars) {
        let dir = TempDir::new().unwrap();
        let fixtures = dir.path().join("fixtures");
        std::fs::create_dir_all(&fixtures).unwrap();
        let tk = tool_script(dir.path(), "tk", reference);
        let rtk = tool_script(dir.path(), "rtk", candidate);
        let ctx = RunContext::new(
            vec![
                ToolBinding::new(ToolId::Reference, "tk", tk),
                ToolBinding::new(ToolId::Candidate, "rtk", rtk),
            ],
            dir.path(),
        )
        .unwrap()
        .with_export_dirs()
        .with_fixture_root(&fixtures);
        let params = FixtureParams {
            static_envs: 1,
            inline_files: 0,
            envs_per_inline_file: 0,
            resources_per_env: 1,
        };
        let vars = PathVars::new(&fixtures, params);
        (dir, ctx, vars)
    }

    fn case(command: &str) -> TestCase {
        crate::config::SuiteConfig::from_yaml(
            &format!(
                "name: n\nid: i\ndescription: d\nfixtures: {{static_envs: 1, inline_files: 0, envs_per_inline_file: 0, resources_per_env: 1}}\ntests:\n  - name: t\n    command: \"{command}\"\n"
            ),
            Path::new("/"),
        )
        .unwrap()
        .tests
        .remove(0)
    }

    #[test]
    fn test_validator_accepts_reordered_json() {
        let (_dir, ctx, vars) = setup(r#"echo '{"a":1,"b":2}'"#, r#"echo '{"b":2,"a":1}'"#);
        Validator::new(&ctx, &vars, None)
            .validate(&case("eval {single_static_main_file}"))
            .unwrap();
    }

    #[test]
    fn test_validator_nonzero_exit_names_tool() {
        let (_dir, ctx, vars) = setup("echo ok", "echo boom >&2; exit 4");
        let err = Validator::new(&ctx, &vars, None).validate(&case("fmt --test .")).unwrap_err();
        match err {
            BenchError::Validation { tool, message, .. } => {
                assert_eq!(tool, "rtk");
                assert!(message.contains("exit code 4"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validator_mismatch_names_command() {
        let (_dir, ctx, vars) = setup("echo one", "echo two");
        let err = Validator::new(&ctx, &vars, None).validate(&case("show {fixtures_dir}")).unwrap_err();
        match err {
            BenchError::Validation { tool, command, .. } => {
                assert_eq!(tool, "rtk");
                assert!(command.starts_with("show /"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validator_runs_prepare_per_tool() {
        let (dir, ctx, vars) = setup("echo same", "echo same");
        let prepare = format!("touch {}/prepared-$(basename {{export_dir}})", dir.path().display());
        Validator::new(&ctx, &vars, Some(&prepare)).validate(&case("fmt .")).unwrap();
        assert!(dir.path().join("prepared-export-output-tk").exists());
        assert!(dir.path().join("prepared-export-output-rtk").exists());
    }

    #[test]
    fn test_validator_failing_prepare_is_validation_error() {
        let (_dir, ctx, vars) = setup("echo same", "echo same");
        let err = Validator::new(&ctx, &vars, Some("exit 9")).validate(&case("fmt .")).unwrap_err();
        assert!(err.is_validation());
    }
}
