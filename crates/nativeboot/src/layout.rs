//! Filesystem layout under the invocation root.

use crate::config::Config;
use crate::error::BootstrapError;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct Layout {
    pub root: PathBuf,
    pub downloads: PathBuf,
    pub tools: PathBuf,
    pub toolchain: PathBuf,
}

impl Layout {
    pub fn new(root: &Path, config: &Config) -> Self {
        Self {
            root: root.to_path_buf(),
            downloads: root.join(&config.layout.downloads),
            tools: root.join(&config.layout.tools),
            toolchain: root.join(&config.layout.toolchain),
        }
    }

    fn dirs(&self) -> [&Path; 3] {
        [&self.downloads, &self.tools, &self.toolchain]
    }

    pub fn is_prepared(&self) -> bool {
        self.dirs().iter().all(|d| d.is_dir())
    }

    pub fn prepare(&self) -> Result<(), BootstrapError> {
        for dir in self.dirs() {
            std::fs::create_dir_all(dir)
                .map_err(|e| BootstrapError::io(format!("creating {}", dir.display()), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_creates_sibling_areas() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path(), &Config::default());
        assert!(!layout.is_prepared());

        layout.prepare().unwrap();
        assert!(layout.is_prepared());
        assert!(tmp.path().join("downloads").is_dir());
        assert!(tmp.path().join("tools").is_dir());
        assert!(tmp.path().join("toolchain").is_dir());
    }
}
