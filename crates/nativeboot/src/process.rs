//! External process and network seams.
//!
//! Components never spawn processes or open sockets themselves. They build an
//! [`Invocation`] and hand it to a [`Runner`], or ask a [`Transport`] for a
//! URL, so tests can swap in fakes.

use crate::env::Environment;
use crate::error::ToolFailure;
use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Exit status of a finished child process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Exit {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
}

impl Exit {
    pub const SUCCESS: Exit = Exit { code: Some(0) };

    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

impl From<std::process::ExitStatus> for Exit {
    fn from(status: std::process::ExitStatus) -> Self {
        Exit {
            code: status.code(),
        }
    }
}

/// One external tool call, fully resolved.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: Environment,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, env: &Environment) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: env.clone(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// File name of the program without extension, e.g. `git` for `git.exe`.
    pub fn tool_name(&self) -> String {
        self.program
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned())
    }

    /// Arguments as lossy UTF-8, for logging and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

/// Runs an invocation to completion, blocking until the child exits.
pub trait Runner {
    fn run(&self, invocation: &Invocation) -> io::Result<Exit>;
}

/// Runs `invocation` and turns anything but a clean exit into a
/// [`ToolFailure`].
pub fn run_checked(runner: &dyn Runner, invocation: &Invocation) -> Result<(), ToolFailure> {
    match runner.run(invocation) {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(ToolFailure::Failed {
            reason: format!("{} exited with {status}", invocation.tool_name()),
            status: Some(status),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ToolFailure::Missing {
            name: invocation.tool_name(),
        }),
        Err(e) => Err(ToolFailure::Failed {
            reason: format!("could not run {}: {e}", invocation.program.display()),
            status: None,
        }),
    }
}

/// Spawns real child processes with the composed environment applied.
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<Exit> {
        log::debug!(
            "exec {} {}",
            invocation.program.display(),
            invocation.args_lossy().join(" ")
        );

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }
        invocation.env.apply(&mut cmd);

        cmd.status().map(Exit::from)
    }
}

/// Single-stream retrieval used when no accelerated downloader is present.
pub trait Transport {
    fn get(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Plain HTTP(S) GET streamed to disk.
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn get(&self, url: &str, dest: &Path) -> Result<()> {
        let response = ureq::get(url)
            .call()
            .with_context(|| format!("GET {url}"))?;

        let mut reader = response.into_reader();
        let mut file =
            File::create(dest).with_context(|| format!("Creating {}", dest.display()))?;
        io::copy(&mut reader, &mut file)
            .with_context(|| format!("Writing {}", dest.display()))?;
        Ok(())
    }
}
