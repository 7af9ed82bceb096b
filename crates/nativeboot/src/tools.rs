//! Tool resolution: local copy first, then the search path.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Where a tool was found for this run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolLocation {
    pub name: String,
    pub path: PathBuf,
    pub on_system_path: bool,
}

/// `name` with the platform executable suffix (`.exe` on Windows).
pub fn executable(name: &str) -> String {
    format!("{name}{}", std::env::consts::EXE_SUFFIX)
}

/// Looks `name` up on an explicit search path.
pub fn on_search_path(name: &str, search_path: Option<&OsStr>, cwd: &Path) -> Option<PathBuf> {
    let search_path = search_path?;
    which::which_in(name, Some(search_path), cwd).ok()
}

/// Resolves a tool, preferring the first existing local candidate over
/// anything on the search path.
pub fn resolve(
    name: &str,
    local_candidates: &[PathBuf],
    search_path: Option<&OsStr>,
    cwd: &Path,
) -> Option<ToolLocation> {
    if let Some(path) = local_candidates.iter().find(|p| p.is_file()) {
        return Some(ToolLocation {
            name: name.to_string(),
            path: path.clone(),
            on_system_path: false,
        });
    }

    on_search_path(name, search_path, cwd).map(|path| ToolLocation {
        name: name.to_string(),
        path,
        on_system_path: true,
    })
}

/// First of several alternative names that resolves.
pub fn resolve_any(
    names: &[String],
    local_dir: &Path,
    search_path: Option<&OsStr>,
    cwd: &Path,
) -> Option<ToolLocation> {
    names.iter().find_map(|name| {
        resolve(
            name,
            &[local_dir.join(executable(name))],
            search_path,
            cwd,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_executable(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[test]
    fn test_local_candidate_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("skia/bin").join(executable("gn"));
        let system = tmp.path().join("path-bin").join(executable("gn"));
        make_executable(&local);
        make_executable(&system);

        let search = std::env::join_paths([system.parent().unwrap()]).unwrap();
        let found = resolve("gn", &[local.clone()], Some(search.as_os_str()), tmp.path()).unwrap();
        assert_eq!(found.path, local);
        assert!(!found.on_system_path);
    }

    #[test]
    fn test_falls_back_to_search_path() {
        let tmp = tempfile::tempdir().unwrap();
        let system = tmp.path().join("path-bin").join(executable("ninja"));
        make_executable(&system);

        let search = std::env::join_paths([system.parent().unwrap()]).unwrap();
        let missing_local = tmp.path().join("nowhere").join(executable("ninja"));
        let found = resolve("ninja", &[missing_local], Some(search.as_os_str()), tmp.path()).unwrap();
        assert!(found.on_system_path);
        assert_eq!(found.path.file_name(), system.file_name());
    }

    #[test]
    fn test_resolve_any_takes_first_available_name() {
        let tmp = tempfile::tempdir().unwrap();
        make_executable(&tmp.path().join("tools").join(executable("7za")));

        let names = vec!["7zr".to_string(), "7za".to_string()];
        let found = resolve_any(&names, &tmp.path().join("tools"), None, tmp.path()).unwrap();
        assert_eq!(found.name, "7za");
    }
}
