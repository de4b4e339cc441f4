//! External file inclusion for code blocks.
//!
//! A code block whose content is a single `<<< path/to/file` line (optionally
//! behind a comment opener such as `//` or `<!--`) is replaced by the contents
//! of that file, looked up in the configured snippet directories. Anything
//! else, including heredoc-style `<<<EOT` literals spanning several lines, is
//! returned untouched. A missing file leaves the marker text visible.

use std::{
    borrow::Cow,
    fs,
    num::NonZeroUsize,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex},
};

use lru::LruCache;
use metrics::counter;
use tracing::{debug, warn};

use crate::util::lock::mutex_lock;

pub const SNIPPET_MARKER: &str = "<<<";

const SOURCE: &str = "application::snippets";
const METRIC_SNIPPET_MISS: &str = "fenceline_snippet_miss_total";

/// Comment openers allowed in front of the marker, e.g. `<!-- <<< file.html -->`.
const COMMENT_OPENERS: [&str; 8] = ["//", "#", "--", ";", "%", "<!--", "/*", "{{--"];

/// Resolves `<<< path` references against a list of snippet directories.
#[derive(Debug)]
pub struct SnippetLoader {
    directories: Vec<PathBuf>,
    cache: Mutex<LruCache<PathBuf, Arc<str>>>,
}

impl SnippetLoader {
    pub fn new(directories: Vec<PathBuf>, cache_capacity: NonZeroUsize) -> Self {
        Self {
            directories,
            cache: Mutex::new(LruCache::new(cache_capacity)),
        }
    }

    /// A loader without directories; every reference is a miss.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), NonZeroUsize::MIN)
    }

    /// Replace a file reference with the file contents, or return `content`
    /// unchanged.
    pub fn resolve<'a>(&self, content: &'a str) -> Cow<'a, str> {
        let Some(reference) = snippet_reference(content) else {
            return Cow::Borrowed(content);
        };

        match self.load(reference) {
            Some(contents) => Cow::Owned(contents.to_string()),
            None => {
                debug!(
                    target = "application::snippets",
                    reference,
                    directories = self.directories.len(),
                    "Snippet not found; keeping literal reference"
                );
                counter!(METRIC_SNIPPET_MISS).increment(1);
                Cow::Borrowed(content)
            }
        }
    }

    fn load(&self, reference: &str) -> Option<Arc<str>> {
        let relative = Path::new(reference.trim_start_matches('/'));
        if relative.as_os_str().is_empty() || !stays_inside(relative) {
            return None;
        }

        for directory in &self.directories {
            let path = directory.join(relative);

            if let Some(cached) = mutex_lock(&self.cache, SOURCE, "load.get").get(&path) {
                return Some(Arc::clone(cached));
            }

            if !path.is_file() {
                continue;
            }

            match fs::read_to_string(&path) {
                Ok(contents) => {
                    let contents: Arc<str> = Arc::from(contents);
                    mutex_lock(&self.cache, SOURCE, "load.put").put(path, Arc::clone(&contents));
                    return Some(contents);
                }
                Err(err) => {
                    warn!(
                        target = "application::snippets",
                        path = %path.display(),
                        error = %err,
                        "Failed to read snippet file"
                    );
                }
            }
        }

        None
    }
}

/// Only plain path segments are accepted, so a reference cannot leave the
/// snippet directory it is joined onto.
fn stays_inside(relative: &Path) -> bool {
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

impl Default for SnippetLoader {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Extract the file reference from `content`, if it follows the convention.
pub(crate) fn snippet_reference(content: &str) -> Option<&str> {
    let position = content.find(SNIPPET_MARKER)?;

    let leader = &content[..position];
    if leader.contains('\n') {
        return None;
    }
    let leader = leader.trim();
    if !leader.is_empty() && !COMMENT_OPENERS.contains(&leader) {
        return None;
    }

    // More than one line after the marker means an inline heredoc, not a file.
    let rest = content[position + SNIPPET_MARKER.len()..].trim();
    if rest.is_empty() || rest.contains('\n') {
        return None;
    }

    // Only the first token names the file; the rest may close a comment.
    rest.split_whitespace().next()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn loader_with_file(name: &str, contents: &str) -> (TempDir, SnippetLoader) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, contents).expect("write snippet");
        let loader = SnippetLoader::new(
            vec![dir.path().to_path_buf()],
            NonZeroUsize::new(8).expect("non-zero"),
        );
        (dir, loader)
    }

    #[test]
    fn extracts_references() {
        assert_eq!(snippet_reference("<<< a/b.php"), Some("a/b.php"));
        assert_eq!(snippet_reference("<<< a/b.php\n"), Some("a/b.php"));
        assert_eq!(snippet_reference("// <<< a/b.php"), Some("a/b.php"));
        assert_eq!(snippet_reference("<!-- <<< a/b.html -->"), Some("a/b.html"));
        assert_eq!(snippet_reference("<<<SQL\nselect 1;\nSQL;"), None);
        assert_eq!(snippet_reference("echo <<< a/b.php"), None);
        assert_eq!(snippet_reference("first\n<<< a/b.php"), None);
        assert_eq!(snippet_reference("plain code"), None);
        assert_eq!(snippet_reference("<<<"), None);
    }

    #[test]
    fn loads_file_contents() {
        let (_dir, loader) = loader_with_file("Support/file1.php", "// this is file 1\n");
        assert_eq!(loader.resolve("<<< Support/file1.php"), "// this is file 1\n");
        assert_eq!(
            loader.resolve("<!-- <<< Support/file1.php -->"),
            "// this is file 1\n"
        );
    }

    #[test]
    fn missing_file_keeps_the_literal() {
        let (_dir, loader) = loader_with_file("Support/file1.php", "x");
        let content = "<<< missing/file.ext";
        assert!(matches!(loader.resolve(content), Cow::Borrowed(_)));
        assert_eq!(loader.resolve(content), content);
    }

    #[test]
    fn heredoc_is_not_a_reference() {
        let (_dir, loader) = loader_with_file("SQL", "should not load");
        let content = "<<<SQL\nselect 1;\nSQL;";
        assert_eq!(loader.resolve(content), content);
    }

    #[test]
    fn searches_directories_in_order() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        fs::write(second.path().join("only-second.txt"), "second").expect("write");
        fs::write(first.path().join("both.txt"), "first").expect("write");
        fs::write(second.path().join("both.txt"), "second").expect("write");

        let loader = SnippetLoader::new(
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            NonZeroUsize::new(4).expect("non-zero"),
        );

        assert_eq!(loader.resolve("<<< both.txt"), "first");
        assert_eq!(loader.resolve("<<< only-second.txt"), "second");
    }

    #[test]
    fn repeated_loads_are_served_from_cache() {
        let (dir, loader) = loader_with_file("cached.rs", "fn main() {}");
        assert_eq!(loader.resolve("<<< cached.rs"), "fn main() {}");

        fs::remove_file(dir.path().join("cached.rs")).expect("remove");
        assert_eq!(loader.resolve("<<< cached.rs"), "fn main() {}");
    }

    #[test]
    fn references_cannot_leave_the_snippet_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let snippets = root.path().join("snippets");
        fs::create_dir_all(snippets.join("nested")).expect("mkdir");
        fs::write(root.path().join("secret.txt"), "outside").expect("write");
        fs::write(snippets.join("inside.txt"), "inside").expect("write");

        let loader = SnippetLoader::new(vec![snippets], NonZeroUsize::new(4).expect("non-zero"));

        assert_eq!(loader.resolve("<<< ../secret.txt"), "<<< ../secret.txt");
        assert_eq!(
            loader.resolve("<<< nested/../../secret.txt"),
            "<<< nested/../../secret.txt"
        );
        assert_eq!(loader.resolve("<<< ./inside.txt"), "inside");
        assert_eq!(loader.resolve("<<< /inside.txt"), "inside");
    }

    #[test]
    fn disabled_loader_never_resolves() {
        let loader = SnippetLoader::disabled();
        assert_eq!(loader.resolve("<<< anything.txt"), "<<< anything.txt");
    }
}
