//! Set-based snapshot differences and changelog rendering
//!
//! Two file lists are compared by path and content hash only; no line-level
//! diffing is performed.
//!
//! ## Significance
//!
//! `significance_score = total_changes / max(files on either side, 1)`.
//! The score ranks how much changed; it is not a probability and exceeds
//! 1.0 when, for example, every file was renamed.
//!
//! ## Examples
//!
//! ```rust
//! use snapvault::diff::compute_diff;
//! use snapvault::types::FileEntry;
//!
//! let left = vec![FileEntry::new("a.txt", "11", 1, 0o644)];
//! let right = vec![
//!     FileEntry::new("a.txt", "22", 1, 0o644),
//!     FileEntry::new("b.txt", "33", 1, 0o644),
//! ];
//!
//! let diff = compute_diff(1, &left, 2, &right);
//! assert_eq!(diff.files_added, vec!["b.txt"]);
//! assert_eq!(diff.files_modified[0].path, "a.txt");
//! assert_eq!(diff.total_changes, 2);
//! assert_eq!(diff.significance_score, 1.0);
//! ```

use crate::filter::PathFilter;
use crate::types::{FileEntry, ModifiedFile, SnapshotDiff};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Compare two file lists
///
/// Output lists are sorted by path regardless of input order.
pub fn compute_diff(
    from_id: i64,
    from_files: &[FileEntry],
    to_id: i64,
    to_files: &[FileEntry],
) -> SnapshotDiff {
    let from: BTreeMap<&str, &str> = from_files
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();
    let to: BTreeMap<&str, &str> = to_files
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();

    let files_added: Vec<String> = to
        .keys()
        .filter(|path| !from.contains_key(*path))
        .map(|path| path.to_string())
        .collect();

    let files_removed: Vec<String> = from
        .keys()
        .filter(|path| !to.contains_key(*path))
        .map(|path| path.to_string())
        .collect();

    let files_modified: Vec<ModifiedFile> = from
        .iter()
        .filter_map(|(path, old_hash)| {
            to.get(path)
                .filter(|new_hash| *new_hash != old_hash)
                .map(|new_hash| ModifiedFile {
                    path: path.to_string(),
                    old_hash: old_hash.to_string(),
                    new_hash: new_hash.to_string(),
                })
        })
        .collect();

    let total_changes = files_added.len() + files_removed.len() + files_modified.len();
    let universe = from.len().max(to.len()).max(1);

    SnapshotDiff {
        from_snapshot: from_id,
        to_snapshot: to_id,
        files_added,
        files_removed,
        files_modified,
        total_changes,
        significance_score: total_changes as f64 / universe as f64,
    }
}

impl SnapshotDiff {
    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.total_changes == 0
    }

    /// Keep only changes whose path matches `filter`
    ///
    /// `total_changes` is recounted. The score becomes
    /// `filtered_total / max(original_total, 1)`, i.e. the share of the
    /// original changes that survived the filter.
    pub fn filter_by_paths(&self, filter: &PathFilter) -> SnapshotDiff {
        let files_added: Vec<String> = self
            .files_added
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        let files_removed: Vec<String> = self
            .files_removed
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        let files_modified: Vec<ModifiedFile> = self
            .files_modified
            .iter()
            .filter(|m| filter.matches(&m.path))
            .cloned()
            .collect();

        let total_changes = files_added.len() + files_removed.len() + files_modified.len();
        let original_total = self.total_changes.max(1);

        SnapshotDiff {
            from_snapshot: self.from_snapshot,
            to_snapshot: self.to_snapshot,
            files_added,
            files_removed,
            files_modified,
            total_changes,
            significance_score: total_changes as f64 / original_total as f64,
        }
    }
}

/// Render a diff as a markdown changelog
///
/// Sections with no entries are omitted. The last line summarises the counts
/// and the significance as a percentage.
pub fn render_changelog(from_label: &str, to_label: &str, diff: &SnapshotDiff) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "# Changelog: {} -> {}", from_label, to_label);

    if !diff.files_added.is_empty() {
        let _ = writeln!(out, "\n## Added\n");
        for path in &diff.files_added {
            let _ = writeln!(out, "- `{}`", path);
        }
    }

    if !diff.files_modified.is_empty() {
        let _ = writeln!(out, "\n## Changed\n");
        for modified in &diff.files_modified {
            let _ = writeln!(
                out,
                "- `{}` ({} -> {})",
                modified.path,
                short_hash(&modified.old_hash),
                short_hash(&modified.new_hash)
            );
        }
    }

    if !diff.files_removed.is_empty() {
        let _ = writeln!(out, "\n## Removed\n");
        for path in &diff.files_removed {
            let _ = writeln!(out, "- `{}`", path);
        }
    }

    if diff.is_empty() {
        let _ = writeln!(out, "\nNo changes.");
    }

    let _ = writeln!(
        out,
        "\n**Summary:** {} added, {} changed, {} removed ({} total, significance {:.1}%)",
        diff.files_added.len(),
        diff.files_modified.len(),
        diff.files_removed.len(),
        diff.total_changes,
        diff.significance_score * 100.0
    );

    out
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}
