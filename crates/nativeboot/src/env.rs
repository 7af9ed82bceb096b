//! Composed child-process environment.
//!
//! The overlay is computed once per run and copied into every
//! [`Invocation`](crate::process::Invocation). The parent's own environment is
//! never mutated.

use crate::tools;
use std::collections::BTreeMap;
use std::env::{self, JoinPathsError};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Search path plus variables handed to a child process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    pub path: OsString,
    pub vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn apply(&self, cmd: &mut Command) {
        cmd.env("PATH", &self.path);
        cmd.envs(&self.vars);
    }

    pub fn path_entries(&self) -> Vec<PathBuf> {
        env::split_paths(&self.path).collect()
    }

    /// Shell snippet reproducing this environment, suitable for `eval`.
    pub fn exports(&self, shell: Shell) -> String {
        let mut out = String::new();
        match shell {
            Shell::Bash => {
                out.push_str(&format!("export PATH=\"{}\"\n", self.path.to_string_lossy()));
                for (k, v) in &self.vars {
                    out.push_str(&format!("export {k}=\"{v}\"\n"));
                }
            }
            Shell::Powershell => {
                out.push_str(&format!("$env:PATH = \"{}\"\n", self.path.to_string_lossy()));
                for (k, v) in &self.vars {
                    out.push_str(&format!("$env:{k} = \"{v}\"\n"));
                }
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Shell {
    Bash,
    Powershell,
}

/// Ordered path prepends and variable assignments.
///
/// Each prepend goes in front of everything before it, so the last prepend
/// has the highest precedence.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentOverlay {
    prepends: Vec<PathBuf>,
    vars: BTreeMap<String, String>,
}

impl EnvironmentOverlay {
    pub fn prepend(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.prepends.push(dir.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn apply(&self, inherited_path: Option<&OsStr>) -> Result<Environment, JoinPathsError> {
        let mut entries: Vec<PathBuf> = self.prepends.iter().rev().cloned().collect();
        if let Some(existing) = inherited_path {
            entries.extend(env::split_paths(existing));
        }
        Ok(Environment {
            path: env::join_paths(entries)?,
            vars: self.vars.clone(),
        })
    }
}

/// Directories and variables that make up the composed environment.
pub struct Composition<'a> {
    /// Extraction utilities and the bootstrapped compiler toolchain.
    pub toolchain_dirs: &'a [PathBuf],
    /// Directory of the bootstrapped version-control client.
    pub vcs_dir: &'a Path,
    /// Executable name looked up on the inherited path for the client.
    pub vcs_executable: &'a str,
    /// Dependency tooling, prepended last.
    pub dependency_dir: &'a Path,
    pub vars: &'a BTreeMap<String, String>,
}

/// Composes the environment in fixed order: toolchain, then version control
/// (only when the inherited path lacks it), then dependency tooling.
pub fn compose(
    spec: &Composition<'_>,
    inherited_path: Option<&OsStr>,
    cwd: &Path,
) -> Result<Environment, JoinPathsError> {
    let mut overlay = EnvironmentOverlay::default();

    for dir in spec.toolchain_dirs {
        overlay.prepend(dir);
    }

    if tools::on_search_path(spec.vcs_executable, inherited_path, cwd).is_none() {
        overlay.prepend(spec.vcs_dir);
    }

    overlay.prepend(spec.dependency_dir);

    for (k, v) in spec.vars {
        overlay.set(k, v);
    }

    overlay.apply(inherited_path)
}
