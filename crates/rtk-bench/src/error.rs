//! Error taxonomy for a benchmark run.
//!
//! Every variant aborts the whole suite. The only non-fatal condition in a
//! run (a baseline that does not implement a command) never surfaces as an
//! error; the executor drops the baseline column instead.

use std::path::PathBuf;

/// Errors that abort a benchmark run.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Malformed or contradictory suite definition.
    #[error("Invalid suite definition: {0}")]
    Config(String),

    /// A required external command or pre-built binary is missing.
    #[error("{0}")]
    Dependency(String),

    /// Building the candidate, baseline or backing service failed.
    #[error("Build failed: {0}")]
    Build(String),

    /// Fixture generation, setup or backing-service startup failed.
    #[error("Provisioning failed: {0}")]
    Provision(String),

    /// Tool outputs disagree, or a compared tool exited non-zero.
    #[error("Validation failed for {tool}: {message}\n  command: {command}")]
    Validation {
        /// Label of the offending tool.
        tool: String,
        /// The expanded command that was run.
        command: String,
        /// Diagnostic (exit status, or output mismatch details).
        message: String,
    },

    /// The timing tool itself failed.
    #[error("Timing tool failed: {0}")]
    Execution(String),

    /// Shutdown was requested via signal.
    #[error("Interrupted")]
    Interrupted,

    /// Filesystem or process I/O failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BenchError {
    /// Wrap an I/O error with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O error on a path.
    pub fn io_at(action: &str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::io(format!("Failed to {action} {}", path.display()), source)
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            // 128 + SIGINT
            Self::Interrupted => 130,
            _ => 1,
        }
    }

    /// Whether this error should be rendered as a validation failure section.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// A pre-built binary path that does not exist.
pub fn missing_binary(flag: &str, path: PathBuf) -> BenchError {
    BenchError::Dependency(format!("{flag} does not exist: {}", path.display()))
}

pub type Result<T> = std::result::Result<T, BenchError>;
