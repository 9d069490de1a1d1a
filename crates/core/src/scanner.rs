//! Ordered discovery of script files under a root directory.
//!
//! Within every directory (the root included) the listing is:
//! 1. the directory-main-file `<dir>/<dir>.js`, if present
//! 2. the other files whose name matches the pattern
//! 3. each subdirectory, recursively, depth-first
//!
//! Siblings of the same kind are ordered by file name.

use crate::config::MAIN_FILE_EXTENSION;
use crate::error::Result;
use globset::{Glob, GlobMatcher};
use std::cmp::Ordering;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A file-name glob such as `*.js`.
#[derive(Debug, Clone)]
pub struct FilePattern {
    matcher: GlobMatcher,
}

impl FilePattern {
    pub fn new(glob: &str) -> Result<Self> {
        Ok(Self {
            matcher: Glob::new(glob)?.compile_matcher(),
        })
    }

    pub fn as_str(&self) -> &str {
        self.matcher.glob().glob()
    }

    pub fn matches_name(&self, name: &OsStr) -> bool {
        self.matcher.is_match(Path::new(name))
    }

    /// Whether a file at `path` would be listed, going by its name alone.
    pub fn is_candidate(&self, path: &Path) -> bool {
        is_main_file(path) || path.file_name().is_some_and(|name| self.matches_name(name))
    }
}

/// `<name>.js` for a directory called `<name>`; `None` for `/`.
pub fn main_file_name(dir: &Path) -> Option<OsString> {
    let mut name = dir.file_name()?.to_os_string();
    name.push(".");
    name.push(MAIN_FILE_EXTENSION);
    Some(name)
}

pub fn is_main_file(path: &Path) -> bool {
    match (path.parent().and_then(main_file_name), path.file_name()) {
        (Some(expected), Some(actual)) => expected.as_os_str() == actual,
        _ => false,
    }
}

pub struct Scanner;

impl Scanner {
    /// List the files under `root` in directory-main-file order.
    ///
    /// Symlinks are followed; loops and unreadable directories abort the scan.
    pub fn scan(root: &Path, pattern: &FilePattern) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by(listing_order)
        {
            let entry = entry?;
            if entry.depth() == 0 || !entry.file_type().is_file() {
                continue;
            }
            if is_main_file(entry.path()) || pattern.matches_name(entry.file_name()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// Links are compared by their target: walkdir sorts raw entries before it
/// follows them.
fn is_dir(entry: &DirEntry) -> bool {
    if entry.path_is_symlink() {
        entry.path().is_dir()
    } else {
        entry.file_type().is_dir()
    }
}

fn rank(entry: &DirEntry) -> u8 {
    if is_dir(entry) {
        2
    } else if is_main_file(entry.path()) {
        0
    } else {
        1
    }
}

fn listing_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.file_name().cmp(b.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, path.to_string_lossy().as_bytes()).unwrap();
    }

    fn relative(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| {
                f.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_main_file_name() {
        assert_eq!(
            main_file_name(Path::new("/srv/widget")),
            Some(OsString::from("widget.js"))
        );
        assert_eq!(main_file_name(Path::new("/")), None);
        assert!(is_main_file(Path::new("/srv/widget/widget.js")));
        assert!(!is_main_file(Path::new("/srv/widget/other.js")));
        assert!(!is_main_file(Path::new("/srv/widget/widget.js.map")));
    }

    #[test]
    fn test_documented_layout() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("scripts");
        touch(&root.join("a.js"));
        touch(&root.join("scripts.js"));
        touch(&root.join("widget/widget.js"));
        touch(&root.join("widget/widget.txt"));

        let pattern = FilePattern::new("*.js").unwrap();
        let files = Scanner::scan(&root, &pattern).unwrap();

        assert_eq!(
            relative(&root, &files),
            vec!["scripts.js", "a.js", "widget/widget.js"]
        );
    }

    #[test]
    fn test_main_file_first_and_not_duplicated() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("app");
        touch(&root.join("aaa.js"));
        touch(&root.join("app.js"));
        touch(&root.join("zzz.js"));
        touch(&root.join("lib/a.js"));
        touch(&root.join("lib/lib.js"));
        touch(&root.join("lib/deep/deep.js"));
        touch(&root.join("lib/deep/b.js"));

        let pattern = FilePattern::new("*.js").unwrap();
        let files = Scanner::scan(&root, &pattern).unwrap();

        assert_eq!(
            relative(&root, &files),
            vec![
                "app.js",
                "aaa.js",
                "zzz.js",
                "lib/lib.js",
                "lib/a.js",
                "lib/deep/deep.js",
                "lib/deep/b.js",
            ]
        );
    }

    #[test]
    fn test_files_listed_before_subdirectories() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        touch(&root.join("a/x.js"));
        touch(&root.join("z.js"));
        touch(&root.join("b/y.js"));

        let pattern = FilePattern::new("*.js").unwrap();
        let files = Scanner::scan(&root, &pattern).unwrap();

        assert_eq!(relative(&root, &files), vec!["z.js", "a/x.js", "b/y.js"]);
    }

    #[test]
    fn test_main_file_included_outside_pattern() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("site");
        touch(&root.join("site.js"));
        touch(&root.join("boot.mjs"));
        touch(&root.join("legacy.js"));
        touch(&root.join("empty/nested/nested.js"));

        let pattern = FilePattern::new("*.mjs").unwrap();
        let files = Scanner::scan(&root, &pattern).unwrap();

        assert_eq!(
            relative(&root, &files),
            vec!["site.js", "boot.mjs", "empty/nested/nested.js"]
        );
    }

    #[test]
    fn test_directory_named_like_script_is_not_a_file() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("fake.js")).unwrap();
        touch(&root.join("fake.js/inner.js"));

        let pattern = FilePattern::new("*.js").unwrap();
        let files = Scanner::scan(&root, &pattern).unwrap();

        assert_eq!(relative(&root, &files), vec!["fake.js/inner.js"]);
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempdir().unwrap();
        let pattern = FilePattern::new("*.js").unwrap();
        let err = Scanner::scan(&dir.path().join("nope"), &pattern).unwrap_err();
        assert!(matches!(err, crate::ScriptSourceError::Scan(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_fails() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        touch(&root.join("a.js"));
        std::os::unix::fs::symlink(&root, root.join("again")).unwrap();

        let pattern = FilePattern::new("*.js").unwrap();
        assert!(Scanner::scan(&root, &pattern).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_listed_after_files() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        touch(&root.join("z.js"));
        touch(&root.join("real/r.js"));
        touch(&dir.path().join("outside/x.js"));
        std::os::unix::fs::symlink("../outside", root.join("linked")).unwrap();

        let pattern = FilePattern::new("*.js").unwrap();
        let files = Scanner::scan(&root, &pattern).unwrap();

        assert_eq!(
            relative(&root, &files),
            vec!["z.js", "linked/x.js", "real/r.js"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_ranked_as_file() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        touch(&root.join("b.js"));
        touch(&root.join("sub/s.js"));
        touch(&dir.path().join("shared.js"));
        std::os::unix::fs::symlink("../shared.js", root.join("a.js")).unwrap();

        let pattern = FilePattern::new("*.js").unwrap();
        let files = Scanner::scan(&root, &pattern).unwrap();

        assert_eq!(relative(&root, &files), vec!["a.js", "b.js", "sub/s.js"]);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = FilePattern::new("*.{js").unwrap_err();
        assert!(matches!(err, crate::ScriptSourceError::Pattern(_)));
    }

    #[test]
    fn test_candidate_names() {
        let pattern = FilePattern::new("*.js").unwrap();
        assert_eq!(pattern.as_str(), "*.js");
        assert!(pattern.is_candidate(Path::new("/x/app.js")));
        assert!(!pattern.is_candidate(Path::new("/x/app.js.map")));
        assert!(!pattern.is_candidate(Path::new("/x/readme.md")));

        let ts = FilePattern::new("*.ts").unwrap();
        assert!(ts.is_candidate(Path::new("/x/widget/widget.js")));
        assert!(!ts.is_candidate(Path::new("/x/widget/other.js")));
    }
}
