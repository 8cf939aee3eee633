//! Decide whether a candidate path, and everything reachable beneath it, resolves
//! inside the allowed root.
//!
//! Both sides are canonicalized by the same unit on the candidate's hosting node,
//! then compared as strings. The descendant walk uses an explicit worklist.

use crate::{
    channel::ExecutionChannel,
    errors::{AppError, AppResult},
    syntax::Platform,
    units::normalize_lexically,
};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Contained,
    /// The candidate lies outside the root.
    OutsideRoot,
    /// The candidate's own path is inside the root but it is a link leading out.
    SourceSymlinkEscape,
    /// The candidate is clean but something beneath it leads out.
    DescendantEscape { entry: String },
}

impl Verdict {
    pub fn is_contained(&self) -> bool {
        matches!(self, Verdict::Contained)
    }

    pub fn reason(&self) -> String {
        match self.clone().into_result() {
            Ok(()) => "source path is within the allowed directory".to_string(),
            Err(e) => e.to_string(),
        }
    }

    pub fn into_result(self) -> AppResult<()> {
        match self {
            Verdict::Contained => Ok(()),
            Verdict::OutsideRoot => Err(AppError::PathOutsideRoot),
            Verdict::SourceSymlinkEscape => Err(AppError::SourceSymlinkEscape),
            Verdict::DescendantEscape { .. } => Err(AppError::SymlinkEscape),
        }
    }
}

/// True iff `candidate` equals `root` or sits below it, compared component-wise
/// by separator so that `/data/app-evil` is not inside `/data/app`.
pub fn is_within(root: &str, candidate: &str, platform: Platform) -> bool {
    let sep = platform.separator();
    let fold = |s: &str| {
        let s = if platform == Platform::Windows { s.replace('/', "\\") } else { s.to_string() };
        if platform.is_case_insensitive() {
            s.to_lowercase()
        } else {
            s
        }
    };
    let root = fold(root);
    let candidate = fold(candidate);
    let root = trim_trailing(&root, sep);
    let candidate = trim_trailing(&candidate, sep);

    if candidate == root {
        return true;
    }
    if root.ends_with(sep) {
        // filesystem root such as "/"
        return candidate.starts_with(root);
    }
    candidate
        .strip_prefix(root)
        .map_or(false, |rest| rest.starts_with(sep))
}

fn trim_trailing(s: &str, sep: char) -> &str {
    let mut end = s.len();
    while end > 1 && s[..end].ends_with(sep) {
        let shorter = &s[..end - sep.len_utf8()];
        if shorter.ends_with(':') {
            // keep "c:\" intact
            break;
        }
        end -= sep.len_utf8();
    }
    &s[..end]
}

pub struct ContainmentChecker {
    channel: Arc<dyn ExecutionChannel>,
    allowed_root: PathBuf,
    platform: Platform,
}

impl ContainmentChecker {
    pub fn new(channel: Arc<dyn ExecutionChannel>, allowed_root: PathBuf, platform: Platform) -> Self {
        Self { channel, allowed_root, platform }
    }

    pub fn allowed_root(&self) -> &Path {
        &self.allowed_root
    }

    /// Canonical form of the allowed root, computed fresh each call.
    pub async fn canonical_root(&self) -> AppResult<String> {
        Ok(self.channel.canonicalize(&self.allowed_root).await?.path)
    }

    /// Judge `candidate` and every entry reachable beneath it. Stops at the first
    /// entry that escapes.
    pub async fn check(&self, candidate: &Path) -> AppResult<Verdict> {
        let root = self.canonical_root().await?;
        let top = self.channel.canonicalize(candidate).await?;

        if !is_within(&root, &top.path, self.platform) {
            let lexical_root = normalize_lexically(&self.allowed_root);
            let lexical = normalize_lexically(candidate);
            let verdict = if is_within(&lexical_root.to_string_lossy(), &lexical.to_string_lossy(), self.platform) {
                Verdict::SourceSymlinkEscape
            } else {
                Verdict::OutsideRoot
            };
            warn!(node = self.channel.node(), verdict = ?verdict, "candidate escapes allowed root");
            return Ok(verdict);
        }
        if !top.exists {
            debug!("candidate does not exist yet, lexical form is inside root");
            return Ok(Verdict::Contained);
        }

        let top_dir = PathBuf::from(&top.path);
        let mut visited: HashSet<String> = HashSet::from([top.path.clone()]);
        let mut pending: Vec<(PathBuf, String)> = Vec::new();
        if self.channel.stat(&top_dir).await?.is_dir {
            pending.push((top_dir, String::new()));
        }

        while let Some((dir, relative)) = pending.pop() {
            for entry in self.channel.list_dir(&dir).await? {
                let entry_relative = if relative.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{relative}/{}", entry.name)
                };
                let resolved = self.channel.canonicalize(&dir.join(&entry.name)).await?;
                if !is_within(&root, &resolved.path, self.platform) {
                    warn!(node = self.channel.node(), entry = %entry_relative, "entry escapes allowed root");
                    return Ok(Verdict::DescendantEscape { entry: entry_relative });
                }
                if entry.is_dir && visited.insert(resolved.path.clone()) {
                    pending.push((PathBuf::from(resolved.path), entry_relative));
                }
            }
        }
        Ok(Verdict::Contained)
    }
}
