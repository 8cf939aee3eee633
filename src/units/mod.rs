pub mod canonicalize;
pub mod list_dir;
pub mod read_file;
pub mod stat;

use crate::{
    channel::types::{WorkOutput, WorkUnit},
    errors::{AppError, AppResult},
};
use std::path::{Component, Path, PathBuf};

/// Run an already-authorized unit against the local filesystem.
pub fn execute(unit: &WorkUnit) -> AppResult<WorkOutput> {
    match unit {
        WorkUnit::Canonicalize { path } => {
            canonicalize::resolve(require_absolute(path)?).map(WorkOutput::Canonical)
        }
        WorkUnit::ListDir { path } => {
            list_dir::list(require_absolute(path)?).map(|entries| WorkOutput::Entries { entries })
        }
        WorkUnit::Stat { path } => stat::stat(require_absolute(path)?).map(WorkOutput::Stat),
        WorkUnit::ReadFile { path } => read_file::read(require_absolute(path)?)
            .map(|content_b64| WorkOutput::Content { content_b64 }),
    }
}

fn require_absolute(path: &Path) -> AppResult<&Path> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(AppError::BadRequest(format!("path must be absolute: {}", path.display())))
    }
}

/// Remove `.` and resolve `..` against earlier components without touching the
/// filesystem. `..` never climbs above the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
        }
    }
    out
}
