//! Build-file generation and build execution.
//!
//! Arguments are handed to the generator as one `key=value`-per-line block.
//! String values are quoted, and `\`, `"` and `$` inside them are
//! backslash-escaped, which is what keeps Windows paths intact.

use crate::env::Environment;
use crate::error::BootstrapError;
use crate::process::{self, Invocation, Runner};
use crate::tools::ToolLocation;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Str(String),
}

impl ArgValue {
    /// Whether the value fits on one line of the argument block. Control
    /// characters have no escape in the generator's string syntax.
    pub fn is_representable(&self) -> bool {
        match self {
            ArgValue::Bool(_) => true,
            ArgValue::Str(s) => !s.chars().any(char::is_control),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(b) => write!(f, "{b}"),
            ArgValue::Str(s) => write!(f, "\"{}\"", escape(s)),
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Reads a quoted string value. A quote inside must be escaped, and the
/// closing one must not be.
fn unquote(value: &str) -> Option<String> {
    let mut chars = value.strip_prefix('"')?.chars();
    let mut out = String::with_capacity(value.len());
    while let Some(c) = chars.next() {
        match c {
            '"' => return chars.as_str().is_empty().then_some(out),
            '\\' => match chars.clone().next() {
                Some(next @ ('\\' | '"' | '$')) => {
                    out.push(next);
                    chars.next();
                }
                _ => out.push('\\'),
            },
            _ => out.push(c),
        }
    }
    None
}

#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ArgsParseError {
    pub line: usize,
    pub message: String,
}

/// Flat generator argument set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildArgs(BTreeMap<String, ArgValue>);

impl BuildArgs {
    pub fn new(args: BTreeMap<String, ArgValue>) -> Self {
        Self(args)
    }

    pub fn set(&mut self, key: impl Into<String>, value: ArgValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.get(key)
    }

    /// First argument that cannot be written to the block.
    pub fn unrepresentable(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, v)| !v.is_representable())
            .map(|(k, _)| k.as_str())
    }

    pub fn serialize(&self) -> String {
        self.0.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
    }

    /// Reads a block in the generator's argument format. Blank lines and `#`
    /// comments are skipped.
    pub fn parse(text: &str) -> Result<Self, ArgsParseError> {
        let mut args = BTreeMap::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let err = |message: &str| ArgsParseError {
                line: idx + 1,
                message: message.to_string(),
            };

            let (key, value) = line.split_once('=').ok_or_else(|| err("expected key=value"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(err("empty key"));
            }

            let value = value.trim();
            let value = match value {
                "true" => ArgValue::Bool(true),
                "false" => ArgValue::Bool(false),
                _ => ArgValue::Str(
                    unquote(value).ok_or_else(|| err("value must be true, false or a quoted string"))?,
                ),
            };
            args.insert(key.to_string(), value);
        }
        Ok(Self(args))
    }
}

pub struct BuildInvoker<'a> {
    runner: &'a dyn Runner,
    env: &'a Environment,
    source: &'a Path,
    generator: ToolLocation,
    executor: ToolLocation,
}

impl<'a> BuildInvoker<'a> {
    pub fn new(
        runner: &'a dyn Runner,
        env: &'a Environment,
        source: &'a Path,
        generator: ToolLocation,
        executor: ToolLocation,
    ) -> Self {
        Self {
            runner,
            env,
            source,
            generator,
            executor,
        }
    }

    /// Generates build files into `out_dir` (relative to the source tree).
    pub fn configure(&self, out_dir: &Path, args: &BuildArgs) -> Result<(), BootstrapError> {
        if let Some(key) = args.unrepresentable() {
            return Err(BootstrapError::ConfigureFailed {
                reason: format!("argument `{key}` contains a control character"),
                status: None,
            });
        }
        let block = args.serialize();
        log::debug!("generator arguments:\n{block}");

        let invocation = Invocation::new(&self.generator.path, self.env)
            .arg("gen")
            .arg(out_dir)
            .arg(format!("--args={block}"))
            .current_dir(self.source);

        process::run_checked(self.runner, &invocation)
            .map_err(|f| f.into_error(|reason, status| BootstrapError::ConfigureFailed { reason, status }))
    }

    pub fn build(&self, out_dir: &Path) -> Result<(), BootstrapError> {
        let invocation = Invocation::new(&self.executor.path, self.env)
            .arg("-C")
            .arg(out_dir)
            .current_dir(self.source);

        process::run_checked(self.runner, &invocation)
            .map_err(|f| f.into_error(|reason, status| BootstrapError::BuildFailed { reason, status }))
    }
}

/// True when `out_dir` holds generated build files for exactly `args`.
pub fn is_configured(out_dir: &Path, args: &BuildArgs) -> bool {
    if !out_dir.join("build.ninja").is_file() {
        return false;
    }
    std::fs::read_to_string(out_dir.join("args.gn"))
        .ok()
        .and_then(|text| BuildArgs::parse(&text).ok())
        .is_some_and(|existing| existing == *args)
}
