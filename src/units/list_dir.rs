use crate::{
    channel::types::DirEntryInfo,
    errors::{AppError, AppResult},
};
use std::{fs, path::Path};

/// Entries of a directory sorted by name. `is_dir` follows symlinks and is false
/// for a dangling one.
pub fn list(path: &Path) -> AppResult<Vec<DirEntryInfo>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|raw| AppError::Io(format!("non-utf8 file name: {}", raw.to_string_lossy())))?;
        let is_symlink = entry.file_type()?.is_symlink();
        let is_dir = fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false);
        entries.push(DirEntryInfo { name, is_dir, is_symlink });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn lists_sorted_with_kinds() {
        let tmp = assert_fs::TempDir::new().unwrap();
        tmp.child("b.txt").write_str("b").unwrap();
        tmp.child("a").create_dir_all().unwrap();
        #[cfg(unix)]
        tmp.child("c").symlink_to_dir(tmp.child("a").path()).unwrap();

        let entries = list(tmp.path()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        #[cfg(unix)]
        {
            assert_eq!(names, ["a", "b.txt", "c"]);
            assert!(entries[2].is_dir && entries[2].is_symlink);
        }
        assert!(entries[0].is_dir && !entries[0].is_symlink);
        assert!(!entries[1].is_dir);
    }

    #[test]
    fn missing_directory_is_io_error() {
        let tmp = assert_fs::TempDir::new().unwrap();
        assert!(matches!(list(&tmp.path().join("nope")), Err(AppError::Io(_))));
    }
}
