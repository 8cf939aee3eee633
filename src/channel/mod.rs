//! Dispatch of work units to the node that hosts a filesystem.
//!
//! Every unit is authorized by the hosting side before it runs. The local channel
//! does this in-process; the remote channel ships the unit to an agent, which runs
//! the same authorization against its own policy.

pub mod authority;
pub mod local;
pub mod remote;
pub mod types;

use crate::{
    errors::{AppError, AppResult},
    syntax::Platform,
};
use async_trait::async_trait;
use std::path::Path;
use types::{DirEntryInfo, Resolution, StatInfo, WorkOutput, WorkUnit};

pub use local::LocalChannel;
pub use remote::RemoteChannel;

#[async_trait]
pub trait ExecutionChannel: Send + Sync {
    /// Name of the hosting node, for logs.
    fn node(&self) -> &str;

    /// Path convention of the hosting node's filesystem.
    async fn platform(&self) -> AppResult<Platform>;

    /// Send one unit and wait for its result. Not retried.
    async fn dispatch(&self, unit: WorkUnit) -> AppResult<WorkOutput>;

    async fn canonicalize(&self, path: &Path) -> AppResult<Resolution> {
        match self.dispatch(WorkUnit::Canonicalize { path: path.to_path_buf() }).await? {
            WorkOutput::Canonical(r) => Ok(r),
            other => Err(unexpected("canonicalize", &other)),
        }
    }

    async fn list_dir(&self, path: &Path) -> AppResult<Vec<DirEntryInfo>> {
        match self.dispatch(WorkUnit::ListDir { path: path.to_path_buf() }).await? {
            WorkOutput::Entries { entries } => Ok(entries),
            other => Err(unexpected("list_dir", &other)),
        }
    }

    async fn stat(&self, path: &Path) -> AppResult<StatInfo> {
        match self.dispatch(WorkUnit::Stat { path: path.to_path_buf() }).await? {
            WorkOutput::Stat(s) => Ok(s),
            other => Err(unexpected("stat", &other)),
        }
    }

    async fn read_file(&self, path: &Path) -> AppResult<Vec<u8>> {
        match self.dispatch(WorkUnit::ReadFile { path: path.to_path_buf() }).await? {
            WorkOutput::Content { content_b64 } => crate::units::read_file::decode(&content_b64),
            other => Err(unexpected("read_file", &other)),
        }
    }
}

fn unexpected(unit: &str, output: &WorkOutput) -> AppError {
    AppError::Transport(format!("unit '{unit}' answered with '{}' output", output.kind()))
}
