//! # nativeboot
//!
//! Idempotent bootstrap of a native build environment: fetch the archive
//! tool, downloader, compiler toolchain and version-control client, clone the
//! dependency tooling and source trees, sync dependencies, then generate and
//! run the build.
//!
//! Every step checks the filesystem first and is skipped when its result is
//! already there, so re-running after a failure resumes where it stopped.
//!
//! ## Modules
//!
//! - `plan` - ordered, precondition-gated steps (fail-fast)
//! - `pipeline` - the concrete step list
//! - `fetch` - accelerated or direct downloads
//! - `archive` - multi-stage extraction and directory discovery
//! - `repo` - clone-if-absent and dependency sync
//! - `env` - composed child-process environment
//! - `build` - generator argument block, configure and build
//! - `tools` - local-first tool resolution
//! - `process` - runner/transport seams over real processes and HTTP

pub mod archive;
pub mod build;
pub mod config;
pub mod env;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod pipeline;
pub mod plan;
pub mod process;
pub mod repo;
pub mod tools;

pub use config::Config;
pub use error::{BootstrapError, StepFailed};
pub use pipeline::{Bootstrap, Host};
pub use plan::Report;
