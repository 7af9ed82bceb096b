//! The bootstrap pipeline: every setup step, in order, each gated by a check
//! of what is already on disk.

use crate::archive::{ArchiveChain, ArchiveFormat, ArchiveSpec, Stage};
use crate::build::{self, ArgValue, BuildArgs, BuildInvoker};
use crate::config::{Config, StageConfig};
use crate::env::{self, Composition, Environment};
use crate::error::{BootstrapError, StepFailed};
use crate::fetch::{Accelerator, DownloadSpec, Fetcher};
use crate::layout::Layout;
use crate::plan::{Plan, Report, Step};
use crate::process::{Runner, Transport};
use crate::repo::{self, RepoRef, SyncSpec};
use crate::tools::{self, ToolLocation};
use anyhow::{Context, Result};
use regex::Regex;
use std::cell::OnceCell;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Everything the pipeline needs from the outside world.
pub struct Host<'a> {
    pub runner: &'a dyn Runner,
    pub transport: &'a dyn Transport,
    /// Search path inherited from the parent process.
    pub inherited_path: Option<OsString>,
}

/// Tool locations, each decided on first successful resolution and reused
/// for the rest of the run.
#[derive(Default)]
struct ResolvedTools {
    archiver: OnceCell<ToolLocation>,
    accelerator: OnceCell<ToolLocation>,
    git: OnceCell<ToolLocation>,
    generator: OnceCell<ToolLocation>,
    executor: OnceCell<ToolLocation>,
}

pub struct Bootstrap<'a> {
    config: &'a Config,
    layout: Layout,
    host: Host<'a>,
    env: Environment,
    vcs_inherited: bool,
    tooling: RepoRef,
    source: RepoRef,
    resolved: ResolvedTools,
}

impl<'a> Bootstrap<'a> {
    pub fn new(config: &'a Config, root: &Path, host: Host<'a>) -> Result<Self> {
        let layout = Layout::new(root, config);
        let inherited = host.inherited_path.as_deref();

        let vcs_inherited = tools::on_search_path(&config.vcs.executable, inherited, root).is_some();

        let tooling = RepoRef {
            url: config.repos.tooling.url.clone(),
            path: root.join(&config.repos.tooling.path),
        };
        let source = RepoRef {
            url: config.repos.source.url.clone(),
            path: root.join(&config.repos.source.path),
        };

        let toolchain_dirs = [
            layout.tools.clone(),
            layout.tools.join(&config.downloader.dir),
            toolchain_dir(&layout, config).join(&config.toolchain.bin),
        ];
        let vcs_dir = layout.toolchain.join(&config.vcs.dir).join(&config.vcs.bin);
        let env = env::compose(
            &Composition {
                toolchain_dirs: &toolchain_dirs,
                vcs_dir: &vcs_dir,
                vcs_executable: &config.vcs.executable,
                dependency_dir: &tooling.path,
                vars: &config.environment.vars,
            },
            inherited,
            root,
        )
        .context("Composing the child process environment")?;

        Ok(Self {
            config,
            layout,
            host,
            env,
            vcs_inherited,
            tooling,
            source,
            resolved: ResolvedTools::default(),
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn run(&self) -> Result<Report, StepFailed> {
        self.plan().execute()
    }

    /// Each step name with whether its precondition already holds.
    pub fn status(&self) -> Vec<(String, bool)> {
        self.plan()
            .steps()
            .iter()
            .map(|s| (s.name().to_string(), s.is_satisfied()))
            .collect()
    }

    pub fn plan(&self) -> Plan<'_> {
        let mut plan = Plan::default();

        plan.push(Step::new(
            "prepare layout",
            move || self.layout.is_prepared(),
            move || self.layout.prepare(),
        ));

        plan.push(Step::new(
            "fetch archive tool",
            move || self.archiver().is_some(),
            move || self.fetch_archiver(),
        ));

        if self.config.downloader.enabled {
            plan.push(Step::new(
                "bootstrap downloader",
                move || self.accelerator().is_some(),
                move || self.bootstrap_downloader(),
            ));
        }

        plan.push(Step::new(
            "bootstrap toolchain",
            move || self.toolchain_archive().is_ok_and(|a| a.is_resolved()),
            move || self.bootstrap_archive(&self.toolchain_download(), &self.toolchain_archive()?),
        ));

        plan.push(Step::new(
            "bootstrap version control",
            move || self.vcs_inherited || self.vcs_archive().is_ok_and(|a| a.is_resolved()),
            move || self.bootstrap_archive(&self.vcs_download(), &self.vcs_archive()?),
        ));

        for checkout in [&self.tooling, &self.source] {
            plan.push(Step::new(
                format!("clone {}", self.display_name(checkout)),
                move || checkout.is_cloned(),
                move || repo::ensure_cloned(self.host.runner, &self.env, &self.git()?, checkout),
            ));
        }

        plan.push(Step::new(
            "sync dependencies",
            move || self.source.path.join(&self.config.sync.marker).exists(),
            move || {
                let spec = SyncSpec {
                    script: PathBuf::from(&self.config.sync.script),
                    interpreters: self.config.sync.interpreters.clone(),
                };
                repo::sync_dependencies(self.host.runner, &self.env, &self.source.path, &spec)
            },
        ));

        plan.push(Step::new(
            "configure",
            move || build::is_configured(&self.out_dir(), &self.build_args()),
            move || {
                self.invoker()?
                    .configure(Path::new(&self.config.build.out_dir), &self.build_args())
            },
        ));

        plan.push(Step::always("build", move || {
            self.invoker()?.build(Path::new(&self.config.build.out_dir))
        }));

        plan
    }

    fn display_name(&self, repo: &RepoRef) -> String {
        repo.path
            .strip_prefix(&self.layout.root)
            .unwrap_or(&repo.path)
            .display()
            .to_string()
    }

    fn inherited(&self) -> Option<&OsStr> {
        self.host.inherited_path.as_deref()
    }

    fn composed(&self) -> Option<&OsStr> {
        Some(self.env.path.as_os_str())
    }

    fn fetcher(&self) -> Fetcher<'_> {
        Fetcher::new(self.host.runner, self.host.transport, &self.env)
    }

    fn archiver(&self) -> Option<ToolLocation> {
        cached(&self.resolved.archiver, || {
            let cfg = &self.config.archiver;
            let local = self.layout.tools.join(&cfg.file);
            if local.is_file() {
                return Some(ToolLocation {
                    name: cfg.file.clone(),
                    path: local,
                    on_system_path: false,
                });
            }
            tools::resolve_any(&cfg.executables, &self.layout.tools, self.inherited(), &self.layout.root)
        })
    }

    fn require_archiver(&self) -> Result<ToolLocation, BootstrapError> {
        self.archiver().ok_or_else(|| BootstrapError::ToolNotFound {
            name: self.config.archiver.file.clone(),
        })
    }

    fn fetch_archiver(&self) -> Result<(), BootstrapError> {
        let cfg = &self.config.archiver;
        let spec = DownloadSpec::new(&cfg.url, &self.layout.tools, &cfg.file);
        let path = self.fetcher().fetch_direct(&spec)?;
        mark_executable(&path)
    }

    fn accelerator(&self) -> Option<ToolLocation> {
        let cfg = &self.config.downloader;
        if !cfg.enabled {
            return None;
        }
        cached(&self.resolved.accelerator, || {
            let local = self
                .layout
                .tools
                .join(&cfg.dir)
                .join(tools::executable(&cfg.executable));
            tools::resolve(&cfg.executable, &[local], self.inherited(), &self.layout.root)
        })
    }

    fn bootstrap_downloader(&self) -> Result<(), BootstrapError> {
        let cfg = &self.config.downloader;
        let download = DownloadSpec::new(&cfg.url, &self.layout.downloads, &cfg.file);
        let archive = ArchiveSpec {
            source: download.dest(),
            stages: vec![Stage {
                format: ArchiveFormat::Zip,
                output: self.layout.downloads.join(format!("{}-extract", cfg.dir)),
            }],
            pattern: Some(compile(&cfg.pattern, &download)?),
            final_dir: self.layout.tools.join(&cfg.dir),
        };

        if !download.is_fetched() {
            // The accelerator is what is being bootstrapped here.
            self.fetcher().fetch_direct(&download)?;
        }
        let archiver = self.require_archiver()?;
        let dir = ArchiveChain::new(self.host.runner, &self.env, &archiver).resolve(&archive)?;
        mark_executable(&dir.join(tools::executable(&cfg.executable)))
    }

    fn toolchain_download(&self) -> DownloadSpec {
        let cfg = &self.config.toolchain;
        DownloadSpec::new(&cfg.url, &self.layout.downloads, &cfg.file)
    }

    fn toolchain_archive(&self) -> Result<ArchiveSpec, BootstrapError> {
        let cfg = &self.config.toolchain;
        let download = self.toolchain_download();
        Ok(ArchiveSpec {
            source: download.dest(),
            stages: self.stages(&cfg.stages),
            pattern: Some(compile(&cfg.pattern, &download)?),
            final_dir: toolchain_dir(&self.layout, self.config),
        })
    }

    fn vcs_download(&self) -> DownloadSpec {
        let cfg = &self.config.vcs;
        DownloadSpec::new(&cfg.url, &self.layout.downloads, &cfg.file)
    }

    fn vcs_archive(&self) -> Result<ArchiveSpec, BootstrapError> {
        let cfg = &self.config.vcs;
        let download = self.vcs_download();
        Ok(ArchiveSpec {
            source: download.dest(),
            stages: self.stages(&cfg.stages),
            pattern: cfg
                .pattern
                .as_deref()
                .map(|p| compile(p, &download))
                .transpose()?,
            final_dir: self.layout.toolchain.join(&cfg.dir),
        })
    }

    fn stages(&self, stages: &[StageConfig]) -> Vec<Stage> {
        stages
            .iter()
            .map(|s| Stage {
                format: s.format,
                output: self.layout.downloads.join(&s.output),
            })
            .collect()
    }

    /// Fetch (unless cached) then extract.
    fn bootstrap_archive(&self, download: &DownloadSpec, archive: &ArchiveSpec) -> Result<(), BootstrapError> {
        if download.is_fetched() {
            log::info!("  using cached {}", download.dest().display());
        } else {
            let accelerator = self.accelerator().map(|tool| Accelerator {
                tool,
                connections: self.config.downloader.connections,
                segments: self.config.downloader.segments,
            });
            self.fetcher().with_accelerator(accelerator).fetch(download)?;
        }

        let archiver = self.require_archiver()?;
        ArchiveChain::new(self.host.runner, &self.env, &archiver).resolve(archive)?;
        Ok(())
    }

    fn git(&self) -> Result<ToolLocation, BootstrapError> {
        let name = &self.config.vcs.executable;
        cached(&self.resolved.git, || {
            tools::resolve(name, &[], self.composed(), &self.layout.root)
        })
        .ok_or_else(|| BootstrapError::ToolNotFound { name: name.clone() })
    }

    fn out_dir(&self) -> PathBuf {
        self.source.path.join(&self.config.build.out_dir)
    }

    fn build_args(&self) -> BuildArgs {
        let mut args = BuildArgs::new(self.config.build.args.clone());
        if let Some(key) = &self.config.build.toolchain_arg {
            let dir = toolchain_dir(&self.layout, self.config);
            args.set(key.clone(), ArgValue::Str(dir.to_string_lossy().into_owned()));
        }
        args
    }

    fn invoker(&self) -> Result<BuildInvoker<'_>, BootstrapError> {
        let cfg = &self.config.build;
        let local_generator = self
            .source
            .path
            .join(format!("{}{}", cfg.generator_local, std::env::consts::EXE_SUFFIX));
        let generator = cached(&self.resolved.generator, || {
            tools::resolve(&cfg.generator, &[local_generator], self.composed(), &self.source.path)
        })
        .ok_or_else(|| BootstrapError::ToolNotFound {
            name: cfg.generator.clone(),
        })?;
        let executor = cached(&self.resolved.executor, || {
            tools::resolve(&cfg.executor, &[], self.composed(), &self.source.path)
        })
        .ok_or_else(|| BootstrapError::ToolNotFound {
            name: cfg.executor.clone(),
        })?;
        Ok(BuildInvoker::new(
            self.host.runner,
            &self.env,
            &self.source.path,
            generator,
            executor,
        ))
    }
}

fn toolchain_dir(layout: &Layout, config: &Config) -> PathBuf {
    layout.toolchain.join(&config.toolchain.dir)
}

/// A miss is not remembered, so a tool bootstrapped later in the run is
/// still picked up.
fn cached(cell: &OnceCell<ToolLocation>, resolve: impl FnOnce() -> Option<ToolLocation>) -> Option<ToolLocation> {
    if let Some(tool) = cell.get() {
        return Some(tool.clone());
    }
    let tool = resolve()?;
    log::debug!("using {} at {}", tool.name, tool.path.display());
    Some(cell.get_or_init(|| tool).clone())
}

fn compile(pattern: &str, download: &DownloadSpec) -> Result<Regex, BootstrapError> {
    Regex::new(pattern).map_err(|e| BootstrapError::ExtractionFailed {
        archive: download.dest(),
        reason: format!("bad directory pattern `{pattern}`: {e}"),
        status: None,
    })
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), BootstrapError> {
    use std::os::unix::fs::PermissionsExt;

    if !path.is_file() {
        return Ok(());
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| BootstrapError::io(format!("chmod {}", path.display()), e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), BootstrapError> {
    Ok(())
}
