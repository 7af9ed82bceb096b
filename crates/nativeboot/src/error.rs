//! Failure taxonomy for the bootstrap pipeline.
//!
//! Every variant is fatal at first occurrence. Completed artifacts stay on
//! disk, so a re-run resumes at the step that failed.

use crate::process::Exit;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed {
        url: String,
        reason: String,
        status: Option<Exit>,
    },

    #[error("extraction failed for {}: {reason}", archive.display())]
    ExtractionFailed {
        archive: PathBuf,
        reason: String,
        status: Option<Exit>,
    },

    #[error("git clone of {url} failed: {reason}")]
    CloneFailed {
        url: String,
        reason: String,
        status: Option<Exit>,
    },

    #[error("dependency sync failed in {}: {reason}", repo.display())]
    DependencySyncFailed {
        repo: PathBuf,
        reason: String,
        status: Option<Exit>,
    },

    #[error("build file generator failed: {reason}")]
    ConfigureFailed { reason: String, status: Option<Exit> },

    #[error("build executor failed: {reason}")]
    BuildFailed { reason: String, status: Option<Exit> },

    #[error("required tool `{name}` not found locally or on PATH")]
    ToolNotFound { name: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BootstrapError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Exit status of the external tool behind this failure, if one ran.
    pub fn tool_status(&self) -> Option<Exit> {
        match self {
            Self::FetchFailed { status, .. }
            | Self::ExtractionFailed { status, .. }
            | Self::CloneFailed { status, .. }
            | Self::DependencySyncFailed { status, .. }
            | Self::ConfigureFailed { status, .. }
            | Self::BuildFailed { status, .. } => *status,
            Self::ToolNotFound { .. } | Self::Io { .. } => None,
        }
    }

    /// Process exit code to terminate with. Propagates the tool's own code
    /// when it has a non-zero one.
    pub fn exit_code(&self) -> i32 {
        match self.tool_status().and_then(|s| s.code) {
            Some(code) if code != 0 => code,
            _ => 1,
        }
    }
}

/// An external tool call that did not end in a clean exit.
#[derive(Debug)]
pub enum ToolFailure {
    /// The executable could not be found when spawning.
    Missing { name: String },
    Failed {
        reason: String,
        status: Option<Exit>,
    },
}

impl ToolFailure {
    /// Converts into the step's own error. A missing executable always
    /// becomes [`BootstrapError::ToolNotFound`].
    pub fn into_error(
        self,
        failed: impl FnOnce(String, Option<Exit>) -> BootstrapError,
    ) -> BootstrapError {
        match self {
            Self::Missing { name } => BootstrapError::ToolNotFound { name },
            Self::Failed { reason, status } => failed(reason, status),
        }
    }
}

impl From<String> for ToolFailure {
    fn from(reason: String) -> Self {
        Self::Failed {
            reason,
            status: None,
        }
    }
}

/// The first step that failed, with its cause.
#[derive(Debug, thiserror::Error)]
#[error("step `{step}` failed")]
pub struct StepFailed {
    pub step: String,
    #[source]
    pub source: BootstrapError,
}

impl StepFailed {
    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_propagates_tool_code() {
        let err = BootstrapError::BuildFailed {
            reason: "ninja exited with exit code 7".into(),
            status: Some(Exit { code: Some(7) }),
        };
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_exit_code_defaults_to_one() {
        let err = BootstrapError::ToolNotFound { name: "gn".into() };
        assert_eq!(err.exit_code(), 1);

        let signalled = BootstrapError::ConfigureFailed {
            reason: "gn exited with terminated by signal".into(),
            status: Some(Exit { code: None }),
        };
        assert_eq!(signalled.exit_code(), 1);
    }

    #[test]
    fn test_step_failed_names_step_and_status() {
        let failed = StepFailed {
            step: "clone skia".into(),
            source: BootstrapError::CloneFailed {
                url: "https://example.invalid/skia.git".into(),
                reason: "git exited with exit code 128".into(),
                status: Some(Exit { code: Some(128) }),
            },
        };
        assert_eq!(failed.to_string(), "step `clone skia` failed");
        assert_eq!(failed.exit_code(), 128);
        let chain = format!("{:#}", anyhow::Error::from(failed));
        assert!(chain.contains("exit code 128"));
    }

    #[test]
    fn test_clone_failure_reports_tool_status() {
        let err = BootstrapError::CloneFailed {
            url: "https://example.invalid/depot_tools.git".into(),
            reason: "git exited with exit code 128".into(),
            status: Some(Exit { code: Some(128) }),
        };
        assert_eq!(err.tool_status(), Some(Exit { code: Some(128) }));
    }

    #[test]
    fn test_fetch_and_extraction_carry_tool_code() {
        let fetch = BootstrapError::FetchFailed {
            url: "https://example.invalid/llvm.tar.xz".into(),
            reason: "aria2c exited with exit code 7".into(),
            status: Some(Exit { code: Some(7) }),
        };
        assert_eq!(fetch.exit_code(), 7);

        let extract = BootstrapError::ExtractionFailed {
            archive: PathBuf::from("downloads/aria2.zip"),
            reason: "7zr exited with exit code 9".into(),
            status: Some(Exit { code: Some(9) }),
        };
        assert_eq!(extract.exit_code(), 9);
    }

    #[test]
    fn test_missing_tool_becomes_tool_not_found() {
        let failure = ToolFailure::Missing { name: "gn".into() };
        let err = failure.into_error(|reason, status| BootstrapError::ConfigureFailed { reason, status });
        assert!(matches!(err, BootstrapError::ToolNotFound { ref name } if name == "gn"));
        assert_eq!(err.exit_code(), 1);
    }
}
