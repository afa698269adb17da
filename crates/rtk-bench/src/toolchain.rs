//! Locating and building the tools under comparison.
//!
//! The candidate and the backing service come from the workspace the harness
//! runs in (or pre-built paths). The baseline is either pre-built or compiled
//! from a remote branch in a throwaway git worktree.

use crate::context::{ToolBinding, ToolId};
use crate::error::{missing_binary, BenchError, Result};
use crate::process::{command_exists, version_of};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const WORKTREE_DIR: &str = "target-base-src";
const BASE_TARGET_DIR: &str = "target-base";

/// What the run needs from the environment.
#[derive(Debug, Clone)]
pub struct ToolchainRequest {
    pub repo_root: PathBuf,
    /// Reference command name or path.
    pub reference: String,
    pub candidate_path: Option<PathBuf>,
    pub candidate_package: String,
    pub baseline_path: Option<PathBuf>,
    /// Remote branch to build the baseline from.
    pub base_ref: Option<String>,
    pub service_package: String,
    /// Pre-existing fixtures are diffed against a backing service.
    pub needs_service: bool,
    /// Generated fixtures need the bash generator and `jq`.
    pub needs_generator: bool,
    pub color: bool,
}

impl ToolchainRequest {
    fn builds_candidate(&self) -> bool {
        self.candidate_path.is_none()
    }

    fn builds_baseline(&self) -> bool {
        self.baseline_path.is_none() && self.base_ref.is_some()
    }

    /// External commands that must be on `PATH` before anything runs.
    pub fn required_commands(&self) -> Vec<&str> {
        let mut required = vec![self.reference.as_str(), "hyperfine"];
        if self.builds_candidate() || self.builds_baseline() {
            required.push("cargo");
        }
        if self.builds_baseline() {
            required.push("git");
        }
        if self.needs_generator {
            required.extend(["bash", "jq"]);
        }
        required
    }
}

/// Fail with a dependency error for the first missing command.
pub fn check_dependencies(request: &ToolchainRequest) -> Result<()> {
    for cmd in request.required_commands() {
        if !command_exists(cmd) {
            return Err(BenchError::Dependency(format!(
                "{cmd} is required but not found in PATH"
            )));
        }
    }
    Ok(())
}

/// Resolved executables for a run.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub reference: PathBuf,
    pub candidate: PathBuf,
    pub baseline: Option<PathBuf>,
    pub service: Option<PathBuf>,
    candidate_label: String,
}

impl Toolchain {
    /// Locate or build every tool `request` asks for.
    pub fn bootstrap(request: &ToolchainRequest) -> Result<Self> {
        let candidate = match &request.candidate_path {
            Some(path) => {
                let path = existing("--candidate-binary-path", path)?;
                note(
                    request.color,
                    &format!(
                        "Using pre-built {}: {} ({})",
                        request.candidate_package,
                        path.display(),
                        version_of(&path)
                    ),
                );
                path
            }
            None => build_package(request, &request.candidate_package)?,
        };

        let service = if request.needs_service {
            let beside = candidate.with_file_name(&request.service_package);
            if request.candidate_path.is_some() && beside.exists() {
                note(
                    request.color,
                    &format!("Using pre-built {}: {}", request.service_package, beside.display()),
                );
                Some(beside)
            } else {
                if !command_exists("cargo") {
                    return Err(BenchError::Dependency(format!(
                        "cargo is required to build {}",
                        request.service_package
                    )));
                }
                Some(build_package(request, &request.service_package)?)
            }
        } else {
            None
        };

        let baseline = match (&request.baseline_path, &request.base_ref) {
            (Some(path), _) => {
                let path = existing("--baseline-binary-path", path)?;
                note(
                    request.color,
                    &format!(
                        "Using pre-built baseline: {} ({})",
                        path.display(),
                        version_of(&path)
                    ),
                );
                Some(path)
            }
            (None, Some(base_ref)) => Some(build_baseline(request, base_ref)?),
            (None, None) => None,
        };

        Ok(Self {
            reference: PathBuf::from(&request.reference),
            candidate,
            baseline,
            service,
            candidate_label: request.candidate_package.clone(),
        })
    }

    /// Tool bindings in reference, candidate, baseline order.
    pub fn bindings(&self) -> Vec<ToolBinding> {
        let (reference, candidate, baseline) = self.labels();
        let mut tools = vec![
            ToolBinding::new(ToolId::Reference, reference, &self.reference),
            ToolBinding::new(ToolId::Candidate, candidate, &self.candidate),
        ];
        if let Some(path) = &self.baseline {
            tools.push(ToolBinding::new(ToolId::Baseline, baseline, path));
        }
        tools
    }

    /// Display labels; distinct even if the reference and candidate share a name.
    fn labels(&self) -> (String, String, String) {
        let reference = self.reference.file_name().map_or_else(
            || self.reference.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        let mut candidate = self.candidate_label.clone();
        if candidate == reference {
            candidate = format!("{candidate}-candidate");
        }
        let baseline = format!("{candidate}-base");
        (reference, candidate, baseline)
    }

    /// `(label, version)` for every bound tool.
    pub fn versions(&self) -> Vec<(String, String)> {
        self.bindings()
            .into_iter()
            .map(|tool| {
                let version = version_of(&tool.executable);
                (tool.label, version)
            })
            .collect()
    }
}

fn existing(flag: &str, path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(missing_binary(flag, path.to_path_buf()));
    }
    path.canonicalize()
        .map_err(|e| BenchError::io_at("resolve", path, e))
}

fn note(color: bool, message: &str) {
    if color {
        eprintln!("{}", message.dimmed());
    } else {
        eprintln!("{message}");
    }
}

fn step(color: bool, message: &str) {
    if color {
        eprintln!("{} {}", "==>".cyan().bold(), message);
    } else {
        eprintln!("==> {message}");
    }
}

fn run_build_step(mut cmd: Command, what: &str) -> Result<()> {
    tracing::debug!(?cmd, "build step");
    let status = cmd
        .stdin(Stdio::null())
        .status()
        .map_err(|e| BenchError::Build(format!("{what}: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(BenchError::Build(format!("{what} exited with {status}")))
    }
}

fn build_package(request: &ToolchainRequest, package: &str) -> Result<PathBuf> {
    step(request.color, &format!("Building {package} in release mode..."));
    let mut cmd = Command::new("cargo");
    cmd.args(["build", "--release", &format!("-p={package}")])
        .current_dir(&request.repo_root);
    run_build_step(cmd, &format!("cargo build -p={package}"))?;
    Ok(request.repo_root.join("target").join("release").join(package))
}

fn remove_worktree(repo_root: &Path, worktree: &Path) {
    let _ = Command::new("git")
        .args(["worktree", "remove", "--force"])
        .arg(worktree)
        .current_dir(repo_root)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if worktree.exists() {
        let _ = std::fs::remove_dir_all(worktree);
    }
}

fn build_baseline(request: &ToolchainRequest, base_ref: &str) -> Result<PathBuf> {
    step(
        request.color,
        &format!("Building {} from base branch ({base_ref})...", request.candidate_package),
    );
    let root = &request.repo_root;
    let worktree = root.join(WORKTREE_DIR);
    remove_worktree(root, &worktree);

    let mut add = Command::new("git");
    add.args(["worktree", "add", "--quiet", "--detach"])
        .arg(&worktree)
        .arg(format!("origin/{base_ref}"))
        .current_dir(root);
    run_build_step(add, "git worktree add")?;

    let mut build = Command::new("cargo");
    build
        .args(["build", "--release", "-p", &request.candidate_package])
        .env("CARGO_TARGET_DIR", root.join(BASE_TARGET_DIR))
        .current_dir(&worktree);
    let built = run_build_step(build, "cargo build (baseline)");
    remove_worktree(root, &worktree);
    built?;

    let binary = root
        .join(BASE_TARGET_DIR)
        .join("release")
        .join(&request.candidate_package);
    note(request.color, &format!("Built baseline: {}", version_of(&binary)));
    Ok(binary)
}
