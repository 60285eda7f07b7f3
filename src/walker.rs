//! # Directory Walker
//!
//! Depth-first walk of an installer tree. Within a directory every
//! allow-listed file is visited (in name order) before any subdirectory is
//! entered, and siblings are finished before descendants of later siblings.
//! The walk keeps its own stack of pending directories and stops for good as
//! soon as the visitor reports that it is satisfied or cancelled.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;

/// Which files are looked at and which directories are skipped.
#[derive(Debug, Clone)]
pub struct WalkFilter {
    extensions: Vec<String>,
    excluded_suffixes: Vec<String>,
}

impl WalkFilter {
    /// `extensions` are matched case-insensitively without the dot;
    /// `excluded_suffixes` against the end of directory names.
    pub fn new(extensions: Vec<String>, excluded_suffixes: Vec<String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            excluded_suffixes,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.scan_extensions.clone(), cfg.excluded_dir_suffixes.clone())
    }

    pub fn accepts_file(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }

    pub fn prunes_dir(&self, name: &str) -> bool {
        self.excluded_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// The visitor reported satisfaction; the rest of the tree was skipped.
    Satisfied,
    /// Every reachable directory was visited.
    Exhausted,
    Cancelled,
}

pub trait WalkVisitor {
    fn cancelled(&self) -> bool;

    /// Checked after every visited file.
    fn satisfied(&self) -> bool;

    fn enter_dir(&mut self, _dir: &Path) {}

    fn visit_file(&mut self, path: &Path, name: &str);
}

struct Listing {
    files: Vec<(PathBuf, String)>,
    subdirs: Vec<PathBuf>,
}

/// Symlinked files are candidates; symlinked directories are not.
fn links_to_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file())
}

fn list_dir(dir: &Path, filter: &WalkFilter) -> Listing {
    let mut listing = Listing {
        files: Vec::new(),
        subdirs: Vec::new(),
    };
    for item in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                warn!("cannot list {}: {err}", dir.display());
                continue;
            }
        };
        let name = item.file_name().to_string_lossy();
        let file_type = item.file_type();
        if file_type.is_dir() {
            if filter.prunes_dir(&name) {
                debug!("pruning {}", item.path().display());
            } else {
                listing.subdirs.push(item.path().to_path_buf());
            }
        } else if filter.accepts_file(&name) && (file_type.is_file() || links_to_file(item.path()))
        {
            listing
                .files
                .push((item.path().to_path_buf(), name.into_owned()));
        }
    }
    listing
}

/// Walk `root`, handing every allow-listed regular file to `visitor`.
/// Symlinked directories are not followed.
pub fn walk(root: &Path, filter: &WalkFilter, visitor: &mut dyn WalkVisitor) -> WalkOutcome {
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        if visitor.cancelled() {
            return WalkOutcome::Cancelled;
        }
        visitor.enter_dir(&dir);
        let listing = list_dir(&dir, filter);
        for (path, name) in &listing.files {
            if visitor.cancelled() {
                return WalkOutcome::Cancelled;
            }
            visitor.visit_file(path, name);
            if visitor.satisfied() {
                return WalkOutcome::Satisfied;
            }
        }
        pending.extend(listing.subdirs.into_iter().rev());
    }
    if visitor.cancelled() {
        WalkOutcome::Cancelled
    } else {
        WalkOutcome::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[derive(Default)]
    struct Recorder {
        visited: Vec<String>,
        stop_after: Option<usize>,
        cancel_after: Option<usize>,
    }

    impl WalkVisitor for Recorder {
        fn cancelled(&self) -> bool {
            self.cancel_after.is_some_and(|n| self.visited.len() >= n)
        }

        fn satisfied(&self) -> bool {
            self.stop_after.is_some_and(|n| self.visited.len() >= n)
        }

        fn visit_file(&mut self, _path: &Path, name: &str) {
            self.visited.push(name.to_string());
        }
    }

    fn filter() -> WalkFilter {
        WalkFilter::new(
            vec!["dll".into(), "exe".into(), "dat".into()],
            vec!["windows".into()],
        )
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, b"x").expect("write");
    }

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("b.dll"));
        touch(&root.join("a.exe"));
        touch(&root.join("notes.txt"));
        touch(&root.join("x").join("x1.dat"));
        touch(&root.join("x").join("deep").join("x2.dll"));
        touch(&root.join("y").join("y1.DLL"));
        touch(&root.join("drive_windows").join("skip.dll"));
        dir
    }

    #[test]
    fn files_before_subdirs_depth_first() {
        let tree = sample_tree();
        let mut rec = Recorder::default();
        let outcome = walk(tree.path(), &filter(), &mut rec);
        assert_eq!(outcome, WalkOutcome::Exhausted);
        assert_eq!(rec.visited, vec!["a.exe", "b.dll", "x1.dat", "x2.dll", "y1.DLL"]);
    }

    #[test]
    fn satisfaction_stops_the_whole_walk() {
        let tree = sample_tree();
        let mut rec = Recorder {
            stop_after: Some(3),
            ..Recorder::default()
        };
        let outcome = walk(tree.path(), &filter(), &mut rec);
        assert_eq!(outcome, WalkOutcome::Satisfied);
        assert_eq!(rec.visited, vec!["a.exe", "b.dll", "x1.dat"]);
    }

    #[test]
    fn cancellation_stops_without_error() {
        let tree = sample_tree();
        let mut rec = Recorder {
            cancel_after: Some(1),
            ..Recorder::default()
        };
        assert_eq!(walk(tree.path(), &filter(), &mut rec), WalkOutcome::Cancelled);
        assert_eq!(rec.visited, vec!["a.exe"]);
    }

    #[test]
    fn missing_root_is_an_empty_walk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut rec = Recorder::default();
        let outcome = walk(&dir.path().join("absent"), &filter(), &mut rec);
        assert_eq!(outcome, WalkOutcome::Exhausted);
        assert!(rec.visited.is_empty());
    }

    #[test]
    fn filter_matches_extension_and_suffix() {
        let f = filter();
        assert!(f.accepts_file("TIRViews.dll"));
        assert!(f.accepts_file("SETUP.EXE"));
        assert!(!f.accepts_file("readme.txt"));
        assert!(!f.accepts_file(".dll"));
        assert!(!f.accepts_file("dll"));
        assert!(f.prunes_dir("windows"));
        assert!(f.prunes_dir("c_windows"));
        assert!(!f.prunes_dir("windows_old"));
    }
}
