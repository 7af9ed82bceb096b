//! Multi-stage archive extraction.
//!
//! Every archive shape is reduced to "produce this directory": a chain of
//! stages, each feeding its output to the next, followed by discovery of the
//! top-level directory the archive actually produced and a rename to a stable
//! path.
//!
//! Each stage writes into a `.tmp` staging path and is renamed into place on
//! success. An existing stage output is therefore complete, and a rerun after
//! an interruption picks up at the first missing stage.

use crate::env::Environment;
use crate::error::{BootstrapError, ToolFailure};
use crate::process::{self, Invocation, Runner};
use crate::tools::ToolLocation;
use regex::Regex;
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Zip archive, extracted in one pass.
    Zip,
    /// Outer compression layer of a tarball (`.tar.xz` to `.tar`).
    Compressed,
    /// Plain tar archive.
    Tar,
    /// Self-extracting 7z executable.
    #[serde(rename = "sfx")]
    SelfExtracting,
}

impl ArchiveFormat {
    /// Whether the stage yields a directory rather than a single file.
    pub fn produces_directory(self) -> bool {
        !matches!(self, ArchiveFormat::Compressed)
    }
}

#[derive(Clone, Debug)]
pub struct Stage {
    pub format: ArchiveFormat,
    pub output: PathBuf,
}

impl Stage {
    fn is_done(&self) -> bool {
        if self.format.produces_directory() {
            self.output.is_dir()
        } else {
            fs::metadata(&self.output).is_ok_and(|m| m.is_file() && m.len() > 0)
        }
    }

    fn staging(&self) -> PathBuf {
        let mut name = self.output.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.output.with_file_name(name)
    }
}

#[derive(Clone, Debug)]
pub struct ArchiveSpec {
    pub source: PathBuf,
    pub stages: Vec<Stage>,
    /// Matches the produced top-level directory. `None` means the last stage
    /// output is itself the result.
    pub pattern: Option<Regex>,
    pub final_dir: PathBuf,
}

impl ArchiveSpec {
    pub fn is_resolved(&self) -> bool {
        self.final_dir.is_dir()
    }
}

/// First entry of `listing` matched by `pattern`.
pub fn discover<'a>(listing: &'a [String], pattern: &Regex) -> Option<&'a str> {
    listing
        .iter()
        .map(String::as_str)
        .find(|name| pattern.is_match(name))
}

pub struct ArchiveChain<'a> {
    runner: &'a dyn Runner,
    env: &'a Environment,
    tool: &'a ToolLocation,
}

impl<'a> ArchiveChain<'a> {
    pub fn new(runner: &'a dyn Runner, env: &'a Environment, tool: &'a ToolLocation) -> Self {
        Self { runner, env, tool }
    }

    /// Runs the missing stages and places the result at `spec.final_dir`.
    pub fn resolve(&self, spec: &ArchiveSpec) -> Result<PathBuf, BootstrapError> {
        if spec.is_resolved() {
            return Ok(spec.final_dir.clone());
        }

        let failed = |reason: String, status| BootstrapError::ExtractionFailed {
            archive: spec.source.clone(),
            reason,
            status,
        };

        let mut input = spec.source.clone();
        for stage in &spec.stages {
            if stage.is_done() {
                log::info!("  stage {} already present", stage.output.display());
            } else {
                self.run_stage(&input, stage).map_err(|f| f.into_error(failed))?;
            }
            input = stage.output.clone();
        }

        let last = spec
            .stages
            .last()
            .ok_or_else(|| failed("no extraction stages".into(), None))?;
        if !last.format.produces_directory() {
            return Err(failed("last stage does not produce a directory".into(), None));
        }

        place(&last.output, spec.pattern.as_ref(), &spec.final_dir).map_err(|reason| failed(reason, None))?;
        Ok(spec.final_dir.clone())
    }

    fn run_stage(&self, input: &Path, stage: &Stage) -> Result<(), ToolFailure> {
        log::info!("  extracting {} -> {}", input.display(), stage.output.display());

        let staging = stage.staging();
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .map_err(|e| format!("clearing stale {}: {e}", staging.display()))?;
        }

        let mut out_flag = OsString::from("-o");
        out_flag.push(&staging);
        let invocation = Invocation::new(&self.tool.path, self.env)
            .arg("x")
            .arg(input)
            .arg(out_flag)
            .arg("-y");

        process::run_checked(self.runner, &invocation)?;

        if stage.format.produces_directory() {
            rename(&staging, &stage.output)?;
        } else {
            let file = single_file(&staging)?;
            rename(&file, &stage.output)?;
            fs::remove_dir_all(&staging).map_err(|e| format!("removing {}: {e}", staging.display()))?;
        }
        Ok(())
    }
}

/// Moves the extracted tree to `final_dir`, locating the top-level directory
/// by pattern when one is given.
fn place(extracted: &Path, pattern: Option<&Regex>, final_dir: &Path) -> Result<(), String> {
    if let Some(parent) = final_dir.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("creating {}: {e}", parent.display()))?;
    }

    let Some(pattern) = pattern else {
        return rename(extracted, final_dir);
    };

    let listing = list_dirs(extracted)?;
    let found = discover(&listing, pattern).ok_or_else(|| {
        format!(
            "no directory matching `{pattern}` in {} (found: {})",
            extracted.display(),
            listing.join(", ")
        )
    })?;

    rename(&extracted.join(found), final_dir)?;
    // Only succeeds when the archive had a single top-level entry.
    if let Err(e) = fs::remove_dir(extracted) {
        log::debug!("leaving {} in place: {e}", extracted.display());
    }
    Ok(())
}

fn list_dirs(dir: &Path) -> Result<Vec<String>, String> {
    let entries = fs::read_dir(dir).map_err(|e| format!("listing {}: {e}", dir.display()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| format!("listing {}: {e}", dir.display()))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn single_file(dir: &Path) -> Result<PathBuf, String> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| format!("listing {}: {e}", dir.display()))? {
        let path = entry.map_err(|e| format!("listing {}: {e}", dir.display()))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    match files.as_slice() {
        [one] => Ok(one.clone()),
        [] => Err(format!("decompression produced no file in {}", dir.display())),
        _ => Err(format!("decompression produced {} files in {}", files.len(), dir.display())),
    }
}

fn rename(from: &Path, to: &Path) -> Result<(), String> {
    fs::rename(from, to)
        .map_err(|e| format!("moving {} to {}: {e}", from.display(), to.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_discover_matches_versioned_name() {
        let pattern = Regex::new(r"^clang\+llvm-.*").unwrap();
        let names = listing(&["README", "clang+llvm-18.1.8-x86_64-pc-windows-msvc"]);
        assert_eq!(
            discover(&names, &pattern),
            Some("clang+llvm-18.1.8-x86_64-pc-windows-msvc")
        );
    }

    #[test]
    fn test_discover_no_match() {
        let pattern = Regex::new("^aria2-.*").unwrap();
        assert_eq!(discover(&listing(&["docs", "bin"]), &pattern), None);
        assert_eq!(discover(&[], &pattern), None);
    }

    #[test]
    fn test_discover_takes_first_in_listing_order() {
        let pattern = Regex::new("^aria2-").unwrap();
        let names = listing(&["aria2-1.36.0", "aria2-1.37.0"]);
        assert_eq!(discover(&names, &pattern), Some("aria2-1.36.0"));
    }

    #[test]
    fn test_only_compressed_stage_yields_file() {
        assert!(!ArchiveFormat::Compressed.produces_directory());
        assert!(ArchiveFormat::Tar.produces_directory());
        assert!(ArchiveFormat::Zip.produces_directory());
        assert!(ArchiveFormat::SelfExtracting.produces_directory());
    }

    #[test]
    fn test_place_without_match_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let extracted = tmp.path().join("extract");
        fs::create_dir_all(extracted.join("unrelated")).unwrap();

        let pattern = Regex::new("^clang").unwrap();
        let err = place(&extracted, Some(&pattern), &tmp.path().join("out/llvm")).unwrap_err();
        assert!(err.contains("no directory matching"));
        assert!(err.contains("unrelated"));
    }

    #[test]
    fn test_place_renames_discovered_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let extracted = tmp.path().join("extract");
        fs::create_dir_all(extracted.join("aria2-1.37.0-win-64bit-build1")).unwrap();
        fs::write(extracted.join("aria2-1.37.0-win-64bit-build1/aria2c.exe"), "x").unwrap();

        let pattern = Regex::new("^aria2-").unwrap();
        let final_dir = tmp.path().join("tools/aria2");
        place(&extracted, Some(&pattern), &final_dir).unwrap();

        assert!(final_dir.join("aria2c.exe").is_file());
        assert!(!extracted.exists());
    }
}
