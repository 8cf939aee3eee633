use crate::{
    channel::types::Resolution,
    errors::{AppError, AppResult},
};
use std::{
    collections::VecDeque,
    ffi::OsString,
    fs, io,
    path::{Component, Path, PathBuf},
};
use tracing::debug;

/// Same bound the Linux kernel puts on symlink chains.
pub const MAX_LINK_HOPS: usize = 40;

/// Real, absolute path of `path` on this node.
///
/// Existing paths go through the OS resolver. A path that does not exist yet is
/// walked one component at a time against the filesystem: links are followed
/// (dangling ones included) and `..` pops a prefix that is already physical, so a
/// `..` after a link climbs out of the link's target, not out of its name. Only
/// the part below the first missing component is handled lexically.
pub fn resolve(path: &Path) -> AppResult<Resolution> {
    match dunce::canonicalize(path) {
        Ok(real) => Ok(Resolution { path: display(&real), exists: true }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => walk(path),
        Err(e) => Err(e.into()),
    }
}

enum Part {
    /// Prefix or root; pushing it resets the walk.
    Anchor(OsString),
    Parent,
    Name(OsString),
}

fn parts(path: &Path) -> impl Iterator<Item = Part> + '_ {
    path.components().filter_map(|c| match c {
        Component::Prefix(_) | Component::RootDir => Some(Part::Anchor(c.as_os_str().to_os_string())),
        Component::CurDir => None,
        Component::ParentDir => Some(Part::Parent),
        Component::Normal(name) => Some(Part::Name(name.to_os_string())),
    })
}

fn walk(path: &Path) -> AppResult<Resolution> {
    let mut pending: VecDeque<Part> = parts(path).collect();
    let mut current = PathBuf::new();
    // components appended below the first missing one
    let mut missing = 0usize;
    let mut hops = 0usize;

    while let Some(part) = pending.pop_front() {
        match part {
            Part::Anchor(anchor) => {
                current.push(anchor);
                missing = 0;
            }
            Part::Parent => {
                current.pop();
                missing = missing.saturating_sub(1);
            }
            Part::Name(name) if missing > 0 => {
                current.push(name);
                missing += 1;
            }
            Part::Name(name) => {
                let next = current.join(&name);
                match fs::symlink_metadata(&next) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_LINK_HOPS {
                            return Err(AppError::Io("too many levels of symbolic links".into()));
                        }
                        let target = fs::read_link(&next)?;
                        debug!(hops, "following link");
                        for part in parts(&target).collect::<Vec<_>>().into_iter().rev() {
                            pending.push_front(part);
                        }
                    }
                    Ok(_) => current = next,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        current = next;
                        missing = 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    let path = match dunce::canonicalize(&current) {
        Ok(real) => real,
        Err(_) => current,
    };
    Ok(Resolution { path: display(&path), exists: false })
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn real(p: &Path) -> String {
        dunce::canonicalize(p).unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn existing_path_resolves_through_links() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("target");
        fs::create_dir(&target).unwrap();
        symlink(&target, tmp.path().join("link")).unwrap();

        let r = resolve(&tmp.path().join("link")).unwrap();
        assert!(r.exists);
        assert_eq!(r.path, real(&target));
    }

    #[test]
    fn missing_path_falls_back_to_lexical_form() {
        let tmp = tempfile::tempdir().unwrap();
        let r = resolve(&tmp.path().join("not/yet/./there")).unwrap();
        assert!(!r.exists);
        assert_eq!(r.path, format!("{}/not/yet/there", real(tmp.path())));
    }

    #[test]
    fn missing_path_below_link_uses_link_target() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        symlink(outside.path(), tmp.path().join("link")).unwrap();

        let r = resolve(&tmp.path().join("link/new")).unwrap();
        assert!(!r.exists);
        assert_eq!(r.path, format!("{}/new", real(outside.path())));
    }

    #[test]
    fn dangling_link_is_judged_by_its_target() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        symlink(outside.path().join("later"), tmp.path().join("dangling")).unwrap();

        let r = resolve(&tmp.path().join("dangling")).unwrap();
        assert!(!r.exists);
        assert_eq!(r.path, format!("{}/later", real(outside.path())));
    }

    #[test]
    fn dotdot_in_dangling_target_climbs_out_of_the_linked_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::create_dir_all(outside.path().join("a/b")).unwrap();
        fs::create_dir_all(tmp.path().join("safeDir")).unwrap();
        fs::create_dir_all(tmp.path().join("other")).unwrap();
        symlink(outside.path().join("a/b"), tmp.path().join("other/evil")).unwrap();
        symlink("../other/evil/../x", tmp.path().join("safeDir/later")).unwrap();

        let r = resolve(&tmp.path().join("safeDir/later")).unwrap();
        assert!(!r.exists);
        assert_eq!(r.path, format!("{}/a/x", real(outside.path())));
    }

    #[test]
    fn missing_tail_is_lexical_below_the_first_gap() {
        let tmp = tempfile::tempdir().unwrap();
        let r = resolve(&tmp.path().join("gone/deeper/../file")).unwrap();
        assert_eq!(r.path, format!("{}/gone/file", real(tmp.path())));
    }

    #[test]
    fn link_loops_are_bounded() {
        let tmp = tempfile::tempdir().unwrap();
        symlink(tmp.path().join("b"), tmp.path().join("a")).unwrap();
        symlink(tmp.path().join("a"), tmp.path().join("b")).unwrap();
        // the OS reports ELOOP, which is not NotFound
        assert!(matches!(resolve(&tmp.path().join("a")), Err(AppError::Io(_))));
    }
}
