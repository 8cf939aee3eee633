use crate::{channel::types::StatInfo, errors::AppResult};
use std::{fs, io, path::Path};

/// Existence is decided without following the final link, so a dangling link
/// exists and is left to the containment check.
pub fn stat(path: &Path) -> AppResult<StatInfo> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(StatInfo {
            exists: true,
            is_dir: fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false),
            is_symlink: meta.file_type().is_symlink(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StatInfo {
            exists: false,
            is_dir: false,
            is_symlink: false,
        }),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_present() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!stat(&tmp.path().join("nope")).unwrap().exists);
        let s = stat(tmp.path()).unwrap();
        assert!(s.exists && s.is_dir && !s.is_symlink);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_link_exists() {
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/definitely/not/here", tmp.path().join("l")).unwrap();
        let s = stat(&tmp.path().join("l")).unwrap();
        assert!(s.exists && s.is_symlink && !s.is_dir);
    }
}
