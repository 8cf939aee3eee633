//! Copy configured folders from under the allowed root into a build workspace.
//!
//! Per fragment: syntax, existence, containment, then copy. Nothing is read from
//! a source before its containment verdict comes back clean, and the first
//! failing fragment aborts the rest. Fragments copied before the failure stay in
//! place.
//!
//! A cancelled build never reaches its build step, so whatever it copied is
//! removed before `begin` returns, whether or not deletion after the build was
//! requested.
//!
//! The verdict and the copy are separate round trips, so a link planted between
//! the two is not caught by the verdict. The copy re-checks every link it follows
//! against the canonical root, which narrows that window without closing it.

use crate::{
    channel::ExecutionChannel,
    containment::{is_within, ContainmentChecker},
    errors::{AppError, AppResult},
    syntax::{self, split_fragments, Platform},
};
use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub make_files_executable: bool,
    pub delete_files_after_build: bool,
    pub delimiter: String,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            make_files_executable: false,
            delete_files_after_build: false,
            delimiter: ",".to_string(),
        }
    }
}

/// Names of the top-level entries placed in the destination, in copy order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    names: Vec<String>,
}

impl Manifest {
    fn record(&mut self, name: &str) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub removed: usize,
    /// Entries already gone.
    pub missing: usize,
    pub failed: usize,
    /// Deletion was not requested.
    pub skipped: bool,
}

/// What `begin` hands back; `end` undoes the copy when deletion was requested.
#[derive(Debug)]
pub struct BuildHandle {
    destination: PathBuf,
    manifest: Manifest,
    delete_files_after_build: bool,
}

impl BuildHandle {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Remove every manifest entry from the destination. Never fails: entries that
    /// are already gone count as missing, other failures are logged and counted.
    pub fn end(&self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if !self.delete_files_after_build {
            report.skipped = true;
            return report;
        }
        for name in self.manifest.names() {
            let child = self.destination.join(name);
            let removed = match fs::symlink_metadata(&child) {
                Ok(meta) if meta.is_dir() => {
                    debug!(entry = %name, "deleting directory");
                    fs::remove_dir_all(&child)
                }
                Ok(_) => {
                    debug!(entry = %name, "deleting file");
                    fs::remove_file(&child)
                }
                Err(e) => Err(e),
            };
            match removed {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.missing += 1,
                Err(e) => {
                    warn!(entry = %name, error = %e, "could not delete copied entry");
                    report.failed += 1;
                }
            }
        }
        info!(removed = report.removed, missing = report.missing, failed = report.failed, "teardown finished");
        report
    }
}

pub struct CopyEngine {
    channel: Arc<dyn ExecutionChannel>,
    checker: ContainmentChecker,
    platform: Platform,
    options: CopyOptions,
    cancel: Option<watch::Receiver<bool>>,
}

impl CopyEngine {
    pub fn new(
        channel: Arc<dyn ExecutionChannel>,
        allowed_root: PathBuf,
        platform: Platform,
        options: CopyOptions,
    ) -> Self {
        let checker = ContainmentChecker::new(channel.clone(), allowed_root, platform);
        Self { channel, checker, platform, options, cancel: None }
    }

    /// Like [`CopyEngine::new`], judging paths by the hosting node's own convention.
    pub async fn connect(
        channel: Arc<dyn ExecutionChannel>,
        allowed_root: PathBuf,
        options: CopyOptions,
    ) -> AppResult<Self> {
        let platform = channel.platform().await?;
        debug!(node = channel.node(), platform = ?platform, "hosting node platform");
        Ok(Self::new(channel, allowed_root, platform, options))
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Abort at the next channel round trip or filesystem call once `cancel` reads true.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn ensure_not_cancelled(&self) -> AppResult<()> {
        match &self.cancel {
            Some(rx) if *rx.borrow() => Err(AppError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Syntax of every fragment, then existence of each under the allowed root.
    pub async fn check_folder_path(&self, raw: &str) -> AppResult<()> {
        syntax::validate_folder_path(raw, &self.options.delimiter, self.platform)?;
        for fragment in split_fragments(raw, &self.options.delimiter) {
            if !self.channel.stat(&self.checker.allowed_root().join(&fragment)).await?.exists {
                return Err(AppError::NotFound(fragment));
            }
        }
        Ok(())
    }

    /// Copy every configured fragment into `destination` and return the handle
    /// whose `end` performs the optional cleanup.
    pub async fn begin(&self, folder_path: &str, destination: &Path) -> AppResult<BuildHandle> {
        syntax::validate_folder_path(folder_path, &self.options.delimiter, self.platform)?;
        let mut handle = BuildHandle {
            destination: destination.to_path_buf(),
            manifest: Manifest::default(),
            delete_files_after_build: self.options.delete_files_after_build,
        };

        for fragment in split_fragments(folder_path, &self.options.delimiter) {
            match self.copy_fragment(&fragment, destination, &mut handle.manifest).await {
                Ok(()) => {}
                Err(AppError::Cancelled) => {
                    warn!(fragment = %fragment, entries = handle.manifest.len(), "build cancelled, tearing down partial copy");
                    handle.delete_files_after_build = true;
                    handle.end();
                    return Err(AppError::Cancelled);
                }
                Err(e) => {
                    warn!(fragment = %fragment, class = ?e.class(), code = e.code(), error = %e, "fragment rejected");
                    return Err(e);
                }
            }
        }
        info!(entries = handle.manifest.len(), destination = %destination.display(), "copy finished");
        Ok(handle)
    }

    async fn copy_fragment(&self, fragment: &str, destination: &Path, manifest: &mut Manifest) -> AppResult<()> {
        syntax::validate(Some(fragment), self.platform)?;
        let source = self.checker.allowed_root().join(fragment);

        self.ensure_not_cancelled()?;
        if !self.channel.stat(&source).await?.exists {
            return Err(AppError::NotFound(fragment.to_string()));
        }

        self.ensure_not_cancelled()?;
        let verdict = self.checker.check(&source).await?;
        if !verdict.is_contained() {
            warn!(fragment = %fragment, reason = %verdict.reason(), "containment rejected");
        }
        verdict.into_result()?;

        self.ensure_not_cancelled()?;
        let root = self.checker.canonical_root().await?;
        let resolved = self.channel.canonicalize(&source).await?;
        if !is_within(&root, &resolved.path, self.platform) {
            return Err(AppError::PathOutsideRoot);
        }

        info!(fragment = %fragment, node = self.channel.node(), "copying data to workspace");
        fs::create_dir_all(destination)?;
        let source = PathBuf::from(resolved.path);
        let copied = if self.channel.stat(&source).await?.is_dir {
            self.copy_tree(&source, destination, &root, manifest).await?
        } else {
            let name = entry_name(&source)?;
            manifest.record(&name);
            let data = self.channel.read_file(&source).await?;
            let target = destination.join(&name);
            fs::write(&target, data)?;
            vec![target]
        };

        if self.options.make_files_executable {
            debug!(files = copied.len(), "making executable");
            for file in &copied {
                self.ensure_not_cancelled()?;
                make_executable(file)?;
            }
        }
        Ok(())
    }

    /// Copy the contents of `source` (canonical) into `destination`, following
    /// links that stay inside `root`. Returns the files written.
    async fn copy_tree(
        &self,
        source: &Path,
        destination: &Path,
        root: &str,
        manifest: &mut Manifest,
    ) -> AppResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        let mut visited: HashSet<PathBuf> = HashSet::from([source.to_path_buf()]);
        let mut pending = vec![(source.to_path_buf(), destination.to_path_buf(), true)];

        while let Some((dir, target_dir, top_level)) = pending.pop() {
            self.ensure_not_cancelled()?;
            for entry in self.channel.list_dir(&dir).await? {
                check_entry_name(&entry.name)?;
                if top_level {
                    debug!(entry = %entry.name, "storing entry name");
                    manifest.record(&entry.name);
                }
                self.ensure_not_cancelled()?;

                let mut from = dir.join(&entry.name);
                if entry.is_symlink {
                    let resolved = self.channel.canonicalize(&from).await?;
                    if !is_within(root, &resolved.path, self.platform) {
                        return Err(AppError::SymlinkEscape);
                    }
                    from = PathBuf::from(resolved.path);
                }
                let to = target_dir.join(&entry.name);

                if entry.is_dir {
                    if !visited.insert(from.clone()) {
                        warn!(entry = %entry.name, "directory already copied, skipping link cycle");
                        continue;
                    }
                    fs::create_dir_all(&to)?;
                    pending.push((from, to, false));
                } else {
                    let data = self.channel.read_file(&from).await?;
                    fs::write(&to, data)?;
                    written.push(to);
                }
            }
        }
        Ok(written)
    }
}

fn entry_name(path: &Path) -> AppResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::Io(format!("no usable file name in {}", path.display())))
}

/// Entry names come from the hosting node; refuse anything that is not a plain name.
fn check_entry_name(name: &str) -> AppResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AppError::Transport(format!("hosting node returned invalid entry name '{name}'")));
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> AppResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> AppResult<()> {
    Ok(())
}
