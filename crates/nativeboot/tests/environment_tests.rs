//! Search-path precedence of the composed environment.

mod common;

use common::make_executable;
use nativeboot::env::{compose, Composition};
use nativeboot::tools::executable;
use std::collections::BTreeMap;

#[test]
fn test_dependency_tooling_shadows_toolchain_and_vcs() {
    let tmp = tempfile::tempdir().unwrap();
    let toolchain = tmp.path().join("a-toolchain");
    let vcs = tmp.path().join("b-vcs");
    let tooling = tmp.path().join("c-tooling");
    for dir in [&toolchain, &vcs, &tooling] {
        make_executable(&dir.join(executable("python3"))).unwrap();
    }

    let vars = BTreeMap::new();
    let env = compose(
        &Composition {
            toolchain_dirs: &[toolchain.clone()],
            vcs_dir: &vcs,
            vcs_executable: "vcs-not-installed-anywhere",
            dependency_dir: &tooling,
            vars: &vars,
        },
        None,
        tmp.path(),
    )
    .unwrap();

    assert_eq!(env.path_entries(), vec![tooling.clone(), vcs, toolchain]);

    let found = which::which_in("python3", Some(&env.path), tmp.path()).unwrap();
    assert_eq!(found, tooling.join(executable("python3")));
}

#[test]
fn test_composition_keeps_inherited_path_last() {
    let tmp = tempfile::tempdir().unwrap();
    let system = tmp.path().join("system");
    make_executable(&system.join(executable("python3"))).unwrap();
    let tooling = tmp.path().join("tooling");
    std::fs::create_dir_all(&tooling).unwrap();

    let vars = BTreeMap::from([("DEPOT_TOOLS_WIN_TOOLCHAIN".to_string(), "0".to_string())]);
    let inherited = std::env::join_paths([&system]).unwrap();
    let env = compose(
        &Composition {
            toolchain_dirs: &[],
            vcs_dir: &tmp.path().join("git/cmd"),
            vcs_executable: "vcs-not-installed-anywhere",
            dependency_dir: &tooling,
            vars: &vars,
        },
        Some(inherited.as_os_str()),
        tmp.path(),
    )
    .unwrap();

    assert_eq!(env.path_entries().last(), Some(&system));
    let found = which::which_in("python3", Some(&env.path), tmp.path()).unwrap();
    assert_eq!(found, system.join(executable("python3")));
    assert_eq!(env.vars["DEPOT_TOOLS_WIN_TOOLCHAIN"], "0");
}
