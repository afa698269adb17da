//! Tool bindings and the run context threaded through each phase.

use crate::error::{BenchError, Result};
use std::path::{Path, PathBuf};

/// Role of a tool in the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolId {
    /// Trusted implementation whose output is ground truth.
    Reference,
    /// Implementation under evaluation.
    Candidate,
    /// Prior version of the candidate, for regression tracking.
    Baseline,
}

impl ToolId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Candidate => "candidate",
            Self::Baseline => "baseline",
        }
    }

    /// Whether outputs of this tool are validated against the others.
    ///
    /// The baseline may legitimately lack commands, so it is only timed.
    pub fn is_validated(self) -> bool {
        !matches!(self, Self::Baseline)
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A concrete tool taking part in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBinding {
    pub id: ToolId,
    /// Short display label (`tk`, `rtk`, `rtk-base`); also the timing-tool command name.
    pub label: String,
    pub executable: PathBuf,
    /// Scratch directory substituted for `{export_dir}`.
    pub export_dir: Option<PathBuf>,
}

impl ToolBinding {
    pub fn new(id: ToolId, label: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            id,
            label: label.into(),
            executable: executable.into(),
            export_dir: None,
        }
    }
}

/// State accumulated across the phases of a run.
///
/// Each phase takes the context by value and hands back an extended one, so
/// what a phase depends on is visible in its signature.
#[derive(Debug, Clone)]
pub struct RunContext {
    tools: Vec<ToolBinding>,
    scratch: PathBuf,
    fixture_root: Option<PathBuf>,
    service_binary: Option<PathBuf>,
}

impl RunContext {
    /// Start a context. Tools are kept in reference, candidate, baseline order.
    pub fn new(mut tools: Vec<ToolBinding>, scratch: impl Into<PathBuf>) -> Result<Self> {
        tools.sort_by_key(|t| t.id);
        for id in [ToolId::Reference, ToolId::Candidate] {
            if tools.iter().filter(|t| t.id == id).count() != 1 {
                return Err(BenchError::Config(format!("exactly one {id} tool is required")));
            }
        }
        if tools.iter().filter(|t| t.id == ToolId::Baseline).count() > 1 {
            return Err(BenchError::Config("at most one baseline tool is allowed".into()));
        }
        let mut labels: Vec<_> = tools.iter().map(|t| t.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        if labels.len() != tools.len() {
            return Err(BenchError::Config("tool labels must be distinct".into()));
        }

        Ok(Self {
            tools,
            scratch: scratch.into(),
            fixture_root: None,
            service_binary: None,
        })
    }

    #[must_use]
    pub fn with_fixture_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.fixture_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn with_service_binary(mut self, binary: Option<PathBuf>) -> Self {
        self.service_binary = binary;
        self
    }

    /// Assign each tool an export directory under the scratch root.
    #[must_use]
    pub fn with_export_dirs(mut self) -> Self {
        for tool in &mut self.tools {
            tool.export_dir = Some(self.scratch.join(format!("export-output-{}", tool.label)));
        }
        self
    }

    pub fn tools(&self) -> &[ToolBinding] {
        &self.tools
    }

    /// Tools whose outputs are validated (reference and candidate).
    pub fn validated_tools(&self) -> impl Iterator<Item = &ToolBinding> {
        self.tools.iter().filter(|t| t.id.is_validated())
    }

    pub fn tool(&self, id: ToolId) -> Option<&ToolBinding> {
        self.tools.iter().find(|t| t.id == id)
    }

    pub fn has_baseline(&self) -> bool {
        self.tool(ToolId::Baseline).is_some()
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    pub fn fixture_root(&self) -> Result<&Path> {
        self.fixture_root
            .as_deref()
            .ok_or_else(|| BenchError::Provision("fixtures have not been provisioned".into()))
    }

    pub fn service_binary(&self) -> Option<&Path> {
        self.service_binary.as_deref()
    }
}
