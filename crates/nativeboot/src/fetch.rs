//! Remote retrieval into the download and tools areas.
//!
//! Transfers land in `<file>.part` and are renamed into place only once the
//! transfer succeeded and produced a non-empty file. A cached file therefore
//! always means a complete download.

use crate::env::Environment;
use crate::error::{BootstrapError, ToolFailure};
use crate::process::{self, Invocation, Runner, Transport};
use crate::tools::ToolLocation;
use std::fs;
use std::path::{Path, PathBuf};

/// One artifact to retrieve. The resulting file is kept as a cache.
#[derive(Clone, Debug)]
pub struct DownloadSpec {
    pub url: String,
    pub dest_dir: PathBuf,
    pub file: String,
}

impl DownloadSpec {
    pub fn new(url: impl Into<String>, dest_dir: impl Into<PathBuf>, file: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest_dir: dest_dir.into(),
            file: file.into(),
        }
    }

    pub fn dest(&self) -> PathBuf {
        self.dest_dir.join(&self.file)
    }

    fn partial(&self) -> PathBuf {
        self.dest_dir.join(format!("{}.part", self.file))
    }

    /// An absent or zero-byte file counts as not fetched.
    pub fn is_fetched(&self) -> bool {
        is_non_empty(&self.dest())
    }
}

fn is_non_empty(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// Multi-connection downloader settings.
#[derive(Clone, Debug)]
pub struct Accelerator {
    pub tool: ToolLocation,
    pub connections: u32,
    pub segments: u32,
}

pub struct Fetcher<'a> {
    runner: &'a dyn Runner,
    transport: &'a dyn Transport,
    env: &'a Environment,
    accelerator: Option<Accelerator>,
}

impl<'a> Fetcher<'a> {
    pub fn new(runner: &'a dyn Runner, transport: &'a dyn Transport, env: &'a Environment) -> Self {
        Self {
            runner,
            transport,
            env,
            accelerator: None,
        }
    }

    pub fn with_accelerator(mut self, accelerator: Option<Accelerator>) -> Self {
        self.accelerator = accelerator;
        self
    }

    /// Fetches through the accelerator when one is available, otherwise
    /// through the built-in transport.
    pub fn fetch(&self, spec: &DownloadSpec) -> Result<PathBuf, BootstrapError> {
        match &self.accelerator {
            Some(acc) => self.finish(spec, self.accelerated(acc, spec)),
            None => self.fetch_direct(spec),
        }
    }

    /// Built-in single-stream retrieval. Used for tools needed before the
    /// accelerator itself exists.
    pub fn fetch_direct(&self, spec: &DownloadSpec) -> Result<PathBuf, BootstrapError> {
        log::info!("  downloading {} (direct)", spec.url);
        let result = self
            .transport
            .get(&spec.url, &spec.partial())
            .map_err(|e| ToolFailure::from(format!("{e:#}")));
        self.finish(spec, result)
    }

    fn accelerated(&self, acc: &Accelerator, spec: &DownloadSpec) -> Result<(), ToolFailure> {
        log::info!(
            "  downloading {} ({} x{})",
            spec.url,
            acc.tool.name,
            acc.connections
        );
        let partial = format!("{}.part", spec.file);
        let invocation = Invocation::new(&acc.tool.path, self.env)
            .arg(format!("-x{}", acc.connections))
            .arg(format!("-s{}", acc.segments))
            .arg("-c")
            .arg("-d")
            .arg(&spec.dest_dir)
            .arg("-o")
            .arg(&partial)
            .arg(&spec.url);

        process::run_checked(self.runner, &invocation)
    }

    fn finish(&self, spec: &DownloadSpec, result: Result<(), ToolFailure>) -> Result<PathBuf, BootstrapError> {
        let failed = |reason: String, status| BootstrapError::FetchFailed {
            url: spec.url.clone(),
            reason,
            status,
        };

        result.map_err(|f| f.into_error(failed))?;

        let partial = spec.partial();
        if !is_non_empty(&partial) {
            return Err(failed(format!("{} is missing or empty", partial.display()), None));
        }

        let dest = spec.dest();
        fs::rename(&partial, &dest)
            .map_err(|e| failed(format!("moving into {}: {e}", dest.display()), None))?;
        Ok(dest)
    }
}
