//! Fake host for pipeline tests.
//!
//! Records every invocation and download, and reproduces on disk what the
//! real tools would leave behind so that the pipeline's own checks pass.

#![allow(dead_code)]

use nativeboot::process::{Exit, Invocation, Runner, Transport};
use nativeboot::tools::executable;
use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Default)]
pub struct FakeHost {
    pub calls: RefCell<Vec<Invocation>>,
    pub direct_downloads: RefCell<Vec<String>>,
    fail: Option<(String, i32)>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `tool` exits with `code` and leaves nothing behind.
    pub fn failing(tool: &str, code: i32) -> Self {
        Self {
            fail: Some((tool.to_string(), code)),
            ..Self::default()
        }
    }

    pub fn count(&self, tool: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.tool_name() == tool)
            .count()
    }

    pub fn tools_called(&self) -> Vec<String> {
        self.calls.borrow().iter().map(Invocation::tool_name).collect()
    }

    pub fn calls_to(&self, tool: &str) -> Vec<Invocation> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.tool_name() == tool)
            .cloned()
            .collect()
    }

    /// URLs fetched by any means.
    pub fn fetched_urls(&self) -> Vec<String> {
        let mut urls = self.direct_downloads.borrow().clone();
        for call in self.calls_to("aria2c") {
            urls.push(call.args_lossy().last().cloned().unwrap_or_default());
        }
        urls
    }

    pub fn reset(&self) {
        self.calls.borrow_mut().clear();
        self.direct_downloads.borrow_mut().clear();
    }
}

impl Runner for FakeHost {
    fn run(&self, inv: &Invocation) -> io::Result<Exit> {
        self.calls.borrow_mut().push(inv.clone());

        let tool = inv.tool_name();
        if let Some((failing, code)) = &self.fail {
            if *failing == tool {
                return Ok(Exit { code: Some(*code) });
            }
        }

        let args = inv.args_lossy();
        match tool.as_str() {
            "aria2c" => {
                // -x16 -s16 -c -d <dir> -o <file> <url>
                fs::write(Path::new(&args[4]).join(&args[6]), "payload")?;
            }
            "7zr" => {
                // x <input> -o<dir> -y
                let input = PathBuf::from(&args[1]);
                let out = PathBuf::from(args[2].trim_start_matches("-o"));
                extract(&input, &out)?;
            }
            "git" => {
                // clone <url> <path>
                let url = &args[1];
                let path = PathBuf::from(&args[2]);
                fs::create_dir_all(&path)?;
                if url.ends_with("depot_tools.git") {
                    make_executable(&path.join(executable("ninja")))?;
                } else {
                    make_executable(&path.join("bin").join(executable("gn")))?;
                    make_executable(&path.join("tools/git-sync-deps"))?;
                }
            }
            "git-sync-deps" => {
                let cwd = inv.cwd.clone().unwrap_or_default();
                fs::create_dir_all(cwd.join("third_party/externals"))?;
            }
            "gn" => {
                // gen <out> --args=<block>
                let out = inv.cwd.clone().unwrap_or_default().join(&args[1]);
                fs::create_dir_all(&out)?;
                fs::write(out.join("build.ninja"), "")?;
                fs::write(out.join("args.gn"), args[2].trim_start_matches("--args="))?;
            }
            _ => {}
        }
        Ok(Exit::SUCCESS)
    }
}

impl Transport for FakeHost {
    fn get(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        self.direct_downloads.borrow_mut().push(url.to_string());
        fs::write(dest, "payload")?;
        Ok(())
    }
}

/// What the archive tool would produce for each reference archive.
fn extract(input: &Path, out: &Path) -> io::Result<()> {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    fs::create_dir_all(out)?;
    match name.as_str() {
        "aria2.zip" => make_executable(
            &out.join("aria2-1.37.0-win-64bit-build1")
                .join(executable("aria2c")),
        ),
        "llvm.tar.xz" => fs::write(out.join("llvm.tar"), "tar"),
        "llvm.tar" => make_executable(
            &out.join("clang+llvm-18.1.8-x86_64-pc-windows-msvc/bin")
                .join(executable("clang")),
        ),
        "PortableGit.7z.exe" => make_executable(&out.join("cmd").join(executable("git"))),
        _ => Ok(()),
    }
}

pub fn make_executable(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, "#!/bin/sh\n")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
