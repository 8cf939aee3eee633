//! String-level checks on configured folder paths.
//!
//! Nothing in here touches the filesystem, so it can run where the target
//! filesystem is unreachable (form validation, config loading). The same checks
//! run again at execution time before any `stat` or canonicalization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters the Windows filename grammar refuses, on top of control characters.
const WINDOWS_RESERVED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("path cannot be empty")]
    Empty,
    #[error("path traversal is not allowed")]
    Traversal,
    #[error("leading home-directory reference is not allowed")]
    HomeReference,
    #[error("absolute paths are not allowed")]
    Absolute,
    #[error("path contains characters that are not allowed")]
    InvalidCharacters,
}

/// Path convention a string is judged by. Chosen by the machine that will resolve
/// the path, never by the shape of the string itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Posix,
    Windows,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    pub fn separator(self) -> char {
        match self {
            Platform::Posix => '/',
            Platform::Windows => '\\',
        }
    }

    pub fn is_case_insensitive(self) -> bool {
        matches!(self, Platform::Windows)
    }
}

/// Validate one configured path fragment.
///
/// Rules apply in a fixed order and the first match wins: empty, traversal,
/// leading `~`, then the platform's absolute forms and character grammar.
pub fn validate(raw: Option<&str>, platform: Platform) -> Result<(), SyntaxError> {
    let path = raw.map(str::trim).unwrap_or_default();
    if path.is_empty() {
        return Err(SyntaxError::Empty);
    }

    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(SyntaxError::Traversal);
    }

    if path == "~" || path.starts_with("~/") || path.starts_with("~\\") {
        return Err(SyntaxError::HomeReference);
    }

    match platform {
        Platform::Windows => {
            let bytes = path.as_bytes();
            let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
            if drive || path.starts_with('\\') || path.starts_with('/') {
                return Err(SyntaxError::Absolute);
            }
            if path
                .chars()
                .any(|c| WINDOWS_RESERVED.contains(&c) || (c as u32) < 0x20)
            {
                return Err(SyntaxError::InvalidCharacters);
            }
        }
        Platform::Posix => {
            if path.starts_with('/') {
                return Err(SyntaxError::Absolute);
            }
            if path.chars().any(|c| (c as u32) < 0x20) {
                return Err(SyntaxError::InvalidCharacters);
            }
        }
    }
    Ok(())
}

/// Split a configured list on `delimiter`, trimming whitespace around each fragment.
///
/// `"jobs/foo/workspace/, jobs/bar/workspace/"` yields two fragments; empty
/// fragments are kept so the validator can reject them.
pub fn split_fragments(raw: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return vec![raw.trim().to_string()];
    }
    raw.split(delimiter).map(|f| f.trim().to_string()).collect()
}

/// Offline check of a whole configured list: the list itself must be non-empty and
/// every fragment must pass [`validate`].
pub fn validate_folder_path(raw: &str, delimiter: &str, platform: Platform) -> Result<(), SyntaxError> {
    if raw.trim().is_empty() {
        return Err(SyntaxError::Empty);
    }
    split_fragments(raw, delimiter)
        .iter()
        .try_for_each(|fragment| validate(Some(fragment), platform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn posix(s: &str) -> Result<(), SyntaxError> {
        validate(Some(s), Platform::Posix)
    }

    fn windows(s: &str) -> Result<(), SyntaxError> {
        validate(Some(s), Platform::Windows)
    }

    #[test]
    fn empty_and_missing_rejected() {
        assert_eq!(validate(None, Platform::Posix), Err(SyntaxError::Empty));
        assert_eq!(posix(""), Err(SyntaxError::Empty));
        assert_eq!(posix("   \t"), Err(SyntaxError::Empty));
        assert_eq!(SyntaxError::Empty.to_string(), "path cannot be empty");
    }

    #[test]
    fn traversal_rejected_under_any_separator() {
        for p in ["..", "../test", "a/../../b", "a\\..\\b", "a/..\\b", "x/..", " ../outside "] {
            assert_eq!(posix(p), Err(SyntaxError::Traversal), "{p}");
            assert_eq!(windows(p), Err(SyntaxError::Traversal), "{p}");
        }
        assert_eq!(SyntaxError::Traversal.to_string(), "path traversal is not allowed");
    }

    #[test]
    fn dots_inside_names_are_fine() {
        assert!(posix("a..b/c").is_ok());
        assert!(posix("...").is_ok());
        assert!(posix("./safeDir").is_ok());
    }

    #[test]
    fn traversal_beats_absolute() {
        assert_eq!(posix("/etc/../x"), Err(SyntaxError::Traversal));
        assert_eq!(windows("C:\\..\\x"), Err(SyntaxError::Traversal));
    }

    #[test]
    fn leading_tilde_rejected_but_inner_tilde_allowed() {
        assert_eq!(posix("~"), Err(SyntaxError::HomeReference));
        assert_eq!(posix("~/test"), Err(SyntaxError::HomeReference));
        assert_eq!(windows("~\\test"), Err(SyntaxError::HomeReference));
        assert!(posix("test~").is_ok());
        assert!(posix("test~folder").is_ok());
        assert!(posix("a/~/b").is_ok());
    }

    #[test]
    fn posix_absolute_and_control_chars() {
        assert_eq!(posix("/etc/passwd"), Err(SyntaxError::Absolute));
        assert_eq!(posix("a\nb"), Err(SyntaxError::InvalidCharacters));
        assert_eq!(posix("a\0b"), Err(SyntaxError::InvalidCharacters));
        // drive letters and backslashes are ordinary name characters here
        assert!(posix("C:\\test").is_ok());
        assert!(posix("dir:with:colons").is_ok());
    }

    #[test]
    fn windows_absolute_forms() {
        assert_eq!(windows("C:\\test"), Err(SyntaxError::Absolute));
        assert_eq!(windows("c:relative"), Err(SyntaxError::Absolute));
        assert_eq!(windows("\\\\server\\share"), Err(SyntaxError::Absolute));
        assert_eq!(windows("//server/share"), Err(SyntaxError::Absolute));
        assert_eq!(windows("\\rooted"), Err(SyntaxError::Absolute));
    }

    #[test]
    fn windows_reserved_characters() {
        for p in ["a<b", "a>b", "dir:x", "a\"b", "a|b", "what?", "*.txt", "a\tb"] {
            assert_eq!(windows(p), Err(SyntaxError::InvalidCharacters), "{p}");
        }
        assert!(windows("userContent\\safeDir").is_ok());
    }

    #[test]
    fn folder_list_checks_every_fragment() {
        assert!(validate_folder_path("a, b/c ,d", ",", Platform::Posix).is_ok());
        assert_eq!(validate_folder_path("a, ../b", ",", Platform::Posix), Err(SyntaxError::Traversal));
        assert_eq!(validate_folder_path("a,,b", ",", Platform::Posix), Err(SyntaxError::Empty));
        assert_eq!(validate_folder_path("  ", ",", Platform::Posix), Err(SyntaxError::Empty));
    }

    #[test]
    fn split_trims_fragments() {
        assert_eq!(
            split_fragments("jobs/foo/workspace/, jobs/bar/workspace/", ","),
            vec!["jobs/foo/workspace/", "jobs/bar/workspace/"]
        );
        assert_eq!(split_fragments(" one ", ","), vec!["one"]);
        assert_eq!(split_fragments("a;b", ""), vec!["a;b"]);
    }

    fn cases() -> ProptestConfig {
        if cfg!(feature = "proptests") {
            ProptestConfig::with_cases(4096)
        } else {
            ProptestConfig::with_cases(256)
        }
    }

    proptest! {
        #![proptest_config(cases())]

        #[test]
        fn any_dotdot_segment_is_traversal(
            head in proptest::collection::vec("[a-zA-Z0-9_~.-]{1,6}", 0..3),
            tail in proptest::collection::vec("[a-zA-Z0-9_~.-]{1,6}", 0..3),
            seps in proptest::collection::vec(prop_oneof![Just('/'), Just('\\')], 6),
        ) {
            let mut parts = head.clone();
            parts.push("..".to_string());
            parts.extend(tail.clone());
            let mut s = String::new();
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    s.push(seps[i % seps.len()]);
                }
                s.push_str(p);
            }
            prop_assert_eq!(posix(&s), Err(SyntaxError::Traversal));
            prop_assert_eq!(windows(&s), Err(SyntaxError::Traversal));
        }

        #[test]
        fn leading_home_is_rejected(rest in "[a-z0-9_]{0,10}") {
            let s = format!("~/{rest}");
            prop_assert_eq!(posix(&s), Err(SyntaxError::HomeReference));
        }

        #[test]
        fn inner_tilde_is_accepted(a in "[a-z0-9_]{1,8}", b in "[a-z0-9_]{0,8}") {
            let s = format!("{a}~{b}");
            prop_assert!(posix(&s).is_ok());
            prop_assert!(windows(&s).is_ok());
        }

        #[test]
        fn relative_paths_accepted(parts in proptest::collection::vec("[a-zA-Z0-9_ -]{0,6}[a-zA-Z0-9_]", 1..5)) {
            let s = parts.join("/");
            prop_assert!(posix(&s).is_ok());
            prop_assert!(windows(&s).is_ok());
        }

        #[test]
        fn absolute_posix_rejected(rest in "[a-z0-9_/]{0,12}") {
            let s = format!("/{rest}");
            prop_assert_eq!(posix(&s), Err(SyntaxError::Absolute));
        }

        #[test]
        fn absolute_windows_rejected(drive in "[a-zA-Z]", rest in "[a-z0-9_]{0,12}") {
            let s = format!("{drive}:\\{rest}");
            prop_assert_eq!(windows(&s), Err(SyntaxError::Absolute));
            let unc = format!("\\\\{rest}x\\share");
            prop_assert_eq!(windows(&unc), Err(SyntaxError::Absolute));
        }
    }
}
