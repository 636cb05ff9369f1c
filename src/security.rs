#![forbid(unsafe_code)]

//! Startup and path hygiene helpers shared by the coursecast binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;
use std::path::{Component, Path};

/// Fails fast when a binary is started as root. The catalog and www roots
/// live in user-owned directories; running unprivileged keeps a misconfigured
/// root from scattering files into system paths.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// True when `value` is usable as a single path component under a base
/// directory. Rejects empty strings, separators, `..`, and anything else
/// that could escape the folder it is joined onto. Used for route segments
/// in the backend and for record ids in the importer.
pub fn is_safe_path_segment(value: &str) -> bool {
    !value.is_empty()
        && Path::new(value)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        && Path::new(value).components().count() == 1
}
