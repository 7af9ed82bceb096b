//! External source trees: clone-if-absent and dependency sync.

use crate::env::Environment;
use crate::error::BootstrapError;
use crate::process::{self, Invocation, Runner};
use crate::tools::{self, ToolLocation};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct RepoRef {
    pub url: String,
    pub path: PathBuf,
}

impl RepoRef {
    /// A present checkout is trusted as-is.
    pub fn is_cloned(&self) -> bool {
        self.path.exists()
    }
}

/// Clones `repo` unless its directory already exists.
pub fn ensure_cloned(
    runner: &dyn Runner,
    env: &Environment,
    git: &ToolLocation,
    repo: &RepoRef,
) -> Result<(), BootstrapError> {
    if repo.is_cloned() {
        log::info!("  {} already cloned", repo.path.display());
        return Ok(());
    }

    log::info!("  cloning {} into {}", repo.url, repo.path.display());
    let invocation = Invocation::new(&git.path, env)
        .arg("clone")
        .arg(&repo.url)
        .arg(&repo.path);

    process::run_checked(runner, &invocation).map_err(|f| {
        f.into_error(|reason, status| BootstrapError::CloneFailed {
            url: repo.url.clone(),
            reason,
            status,
        })
    })
}

/// Dependency-sync entry point inside a checkout.
#[derive(Clone, Debug)]
pub struct SyncSpec {
    /// Script path relative to the checkout.
    pub script: PathBuf,
    /// Interpreter names in priority order.
    pub interpreters: Vec<String>,
}

/// Runs the sync script with the first interpreter found on the composed
/// path, or executes it directly when none is.
pub fn sync_dependencies(
    runner: &dyn Runner,
    env: &Environment,
    repo: &Path,
    spec: &SyncSpec,
) -> Result<(), BootstrapError> {
    let script = repo.join(&spec.script);
    let failed = |reason: String, status| BootstrapError::DependencySyncFailed {
        repo: repo.to_path_buf(),
        reason,
        status,
    };

    let interpreter = spec
        .interpreters
        .iter()
        .find_map(|name| tools::on_search_path(name, Some(env.path.as_os_str()), repo));

    let invocation = match &interpreter {
        Some(path) => {
            log::info!("  {} {}", path.display(), spec.script.display());
            Invocation::new(path, env).arg(&script)
        }
        None => {
            log::info!("  no interpreter on PATH, executing {} directly", script.display());
            Invocation::new(&script, env)
        }
    }
    .current_dir(repo);

    let status = runner.run(&invocation).map_err(|e| match &interpreter {
        Some(path) => failed(format!("could not run {}: {e}", path.display()), None),
        None => failed(
            format!(
                "no usable interpreter (tried {}) and direct execution failed: {e}",
                spec.interpreters.join(", ")
            ),
            None,
        ),
    })?;

    if !status.success() {
        return Err(failed(
            format!("{} exited with {status}", invocation.tool_name()),
            Some(status),
        ));
    }
    Ok(())
}
