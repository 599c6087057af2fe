//! Core library for provisioning IDE end-to-end test environments
//!
//! This crate contains the shared logic for environment settings, child-process
//! execution, cloud CLI wrappers, workspace and scratch org provisioning, UI
//! polling primitives, the suite lifecycle, logging, and error handling.

pub mod errors;
pub mod extensions;
pub mod git;
pub mod ide;
pub mod lifecycle;
pub mod logging;
pub mod org_auth;
pub mod polling;
pub mod process;
pub mod project_files;
pub mod redaction;
pub mod scratch_org;
pub mod settings;
pub mod sf;
pub mod workspace;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
