//! `bootstrap.toml` configuration.
//!
//! Every section falls back to the pinned reference setup: a Windows x64 host
//! bootstrapping `depot_tools` and `skia` with 7-Zip, aria2, LLVM and
//! PortableGit.

use crate::archive::ArchiveFormat;
use crate::build::ArgValue;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const CONFIG_FILE: &str = "bootstrap.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout: LayoutConfig,
    pub archiver: ArchiverConfig,
    pub downloader: DownloaderConfig,
    pub toolchain: ToolchainConfig,
    pub vcs: VcsConfig,
    pub repos: ReposConfig,
    pub sync: SyncConfig,
    pub build: BuildConfig,
    pub environment: EnvironmentConfig,
}

impl Config {
    /// Loads `explicit` if given (must exist), else `<root>/bootstrap.toml`
    /// if present, else the defaults.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => {
                if !p.is_file() {
                    bail!("config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let p = root.join(CONFIG_FILE);
                if !p.is_file() {
                    log::debug!("no {CONFIG_FILE}, using built-in configuration");
                    return Ok(Self::default());
                }
                p
            }
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Reading {}", path.display()))?;
        let config = Self::parse(&text).with_context(|| format!("Parsing {}", path.display()))?;
        log::info!("using configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (section, pattern) in [
            ("downloader", Some(&self.downloader.pattern)),
            ("toolchain", Some(&self.toolchain.pattern)),
            ("vcs", self.vcs.pattern.as_ref()),
        ] {
            if let Some(p) = pattern {
                regex::Regex::new(p)
                    .with_context(|| format!("[{section}] pattern `{p}` is not a valid regex"))?;
            }
        }
        if self.toolchain.stages.is_empty() || self.vcs.stages.is_empty() {
            bail!("archive stages must not be empty");
        }
        if self.sync.script.is_empty() {
            bail!("[sync] needs a script");
        }
        if let Some((key, _)) = self.build.args.iter().find(|(_, v)| !v.is_representable()) {
            bail!("[build.args] `{key}` contains a control character");
        }
        Ok(())
    }
}

/// Directory names under the invocation root.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub downloads: String,
    pub tools: String,
    pub toolchain: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            downloads: "downloads".into(),
            tools: "tools".into(),
            toolchain: "toolchain".into(),
        }
    }
}

/// Minimal archive tool, fetched directly into the tools area.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    pub url: String,
    pub file: String,
    /// Names accepted on the search path, in preference order.
    pub executables: Vec<String>,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            url: "https://www.7-zip.org/a/7zr.exe".into(),
            file: "7zr.exe".into(),
            executables: vec!["7zr".into(), "7za".into(), "7z".into(), "7zz".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    pub enabled: bool,
    pub url: String,
    pub file: String,
    /// Matches the top-level directory inside the release zip.
    pub pattern: String,
    /// Stable directory under the tools area.
    pub dir: String,
    pub executable: String,
    pub connections: u32,
    pub segments: u32,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://github.com/aria2/aria2/releases/download/release-1.37.0/aria2-1.37.0-win-64bit-build1.zip".into(),
            file: "aria2.zip".into(),
            pattern: "^aria2-.*".into(),
            dir: "aria2".into(),
            executable: "aria2c".into(),
            connections: 16,
            segments: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub format: ArchiveFormat,
    /// File or directory name under the download area.
    pub output: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub url: String,
    pub file: String,
    pub stages: Vec<StageConfig>,
    pub pattern: String,
    /// Stable directory under the toolchain area.
    pub dir: String,
    pub bin: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            url: "https://github.com/llvm/llvm-project/releases/download/llvmorg-18.1.8/clang+llvm-18.1.8-x86_64-pc-windows-msvc.tar.xz".into(),
            file: "llvm.tar.xz".into(),
            stages: vec![
                StageConfig {
                    format: ArchiveFormat::Compressed,
                    output: "llvm.tar".into(),
                },
                StageConfig {
                    format: ArchiveFormat::Tar,
                    output: "llvm-extract".into(),
                },
            ],
            pattern: r"^clang\+llvm-.*".into(),
            dir: "llvm".into(),
            bin: "bin".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VcsConfig {
    pub url: String,
    pub file: String,
    pub stages: Vec<StageConfig>,
    /// `None` when the archive has no top-level directory of its own.
    pub pattern: Option<String>,
    pub dir: String,
    pub bin: String,
    pub executable: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            url: "https://github.com/git-for-windows/git/releases/download/v2.45.2.windows.1/PortableGit-2.45.2-64-bit.7z.exe".into(),
            file: "PortableGit.7z.exe".into(),
            stages: vec![StageConfig {
                format: ArchiveFormat::SelfExtracting,
                output: "git-extract".into(),
            }],
            pattern: None,
            dir: "git".into(),
            bin: "cmd".into(),
            executable: "git".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub url: String,
    /// Directory under the invocation root.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReposConfig {
    /// Dependency tooling checkout, prepended last to the search path.
    pub tooling: RepoConfig,
    /// Source tree that gets configured and built.
    pub source: RepoConfig,
}

impl Default for ReposConfig {
    fn default() -> Self {
        Self {
            tooling: RepoConfig {
                url: "https://chromium.googlesource.com/chromium/tools/depot_tools.git".into(),
                path: "depot_tools".into(),
            },
            source: RepoConfig {
                url: "https://skia.googlesource.com/skia.git".into(),
                path: "skia".into(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Entry point relative to the source tree.
    pub script: String,
    pub interpreters: Vec<String>,
    /// Path inside the source tree that exists once a sync has completed.
    pub marker: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            script: "tools/git-sync-deps".into(),
            interpreters: vec!["python3".into(), "python".into()],
            marker: "third_party/externals".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub generator: String,
    /// Generator location relative to the source tree, checked first.
    pub generator_local: String,
    pub executor: String,
    /// Output directory relative to the source tree.
    pub out_dir: String,
    /// Argument that receives the toolchain directory, if any.
    pub toolchain_arg: Option<String>,
    pub args: BTreeMap<String, ArgValue>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            generator: "gn".into(),
            generator_local: "bin/gn".into(),
            executor: "ninja".into(),
            out_dir: "out/Release".into(),
            toolchain_arg: Some("clang_win".into()),
            args: BTreeMap::from([
                ("is_official_build".into(), ArgValue::Bool(false)),
                ("is_debug".into(), ArgValue::Bool(false)),
                ("target_cpu".into(), ArgValue::Str("x64".into())),
            ]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub vars: BTreeMap<String, String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            // Passed through untouched; the generator decides what it means.
            vars: BTreeMap::from([("DEPOT_TOOLS_WIN_TOOLCHAIN".into(), "0".into())]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pin_reference_setup() {
        let config = Config::default();
        assert_eq!(config.downloader.connections, 16);
        assert_eq!(config.downloader.segments, 16);
        assert_eq!(config.toolchain.stages.len(), 2);
        assert_eq!(config.repos.source.path, "skia");
        assert_eq!(
            config.build.args.get("is_official_build"),
            Some(&ArgValue::Bool(false))
        );
        assert_eq!(
            config.environment.vars.get("DEPOT_TOOLS_WIN_TOOLCHAIN").map(String::as_str),
            Some("0")
        );
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [build]
            out_dir = "out/Debug"

            [build.args]
            is_debug = true
            skia_use_gl = false

            [sync]
            interpreters = ["py"]
            "#,
        )
        .unwrap();

        assert_eq!(config.build.out_dir, "out/Debug");
        assert_eq!(config.build.args.get("is_debug"), Some(&ArgValue::Bool(true)));
        assert_eq!(config.build.executor, "ninja");
        assert_eq!(config.sync.interpreters, vec!["py"]);
        assert_eq!(config.sync.script, "tools/git-sync-deps");
        assert_eq!(config.layout.downloads, "downloads");
    }

    #[test]
    fn test_stage_formats_parse() {
        let config = Config::parse(
            r#"
            [toolchain]
            stages = [
                { format = "compressed", output = "t.tar" },
                { format = "tar", output = "t" },
            ]
            [vcs]
            stages = [{ format = "sfx", output = "g" }]
            "#,
        )
        .unwrap();
        assert_eq!(config.toolchain.stages[1].format, ArchiveFormat::Tar);
        assert_eq!(config.vcs.stages[0].format, ArchiveFormat::SelfExtracting);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = Config::parse("[toolchain]\npattern = \"(\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("not a valid regex"));
    }

    #[test]
    fn test_multiline_build_arg_rejected() {
        let err = Config::parse("[build.args]\nextra = \"a\\nb\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("`extra` contains a control character"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(Config::load(tmp.path(), Some(&missing)).is_err());
        assert!(Config::load(tmp.path(), None).is_ok());
    }
}
