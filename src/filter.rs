//! Path filters for restore, export, diff and listing
//!
//! A filter pattern selects a path if any of the following holds:
//!
//! - the pattern is a glob matching the whole path (`*` also crosses `/`)
//! - the path starts with the pattern (directory prefix such as `src/`)
//! - the path equals the pattern
//!
//! An empty filter list selects everything.

use globset::{Glob, GlobMatcher};
use tracing::debug;

/// One compiled filter pattern
#[derive(Debug, Clone)]
struct PathPattern {
    raw: String,
    glob: Option<GlobMatcher>,
}

impl PathPattern {
    fn new(raw: &str) -> Self {
        let glob = match Glob::new(raw) {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(e) => {
                debug!("Pattern {:?} is not a valid glob, using prefix match: {}", raw, e);
                None
            }
        };
        Self {
            raw: raw.to_string(),
            glob,
        }
    }

    fn matches(&self, path: &str) -> bool {
        self.glob.as_ref().is_some_and(|g| g.is_match(path))
            || path.starts_with(&self.raw)
            || path == self.raw
    }
}

/// Set of patterns combined with logical OR
///
/// # Examples
///
/// ```rust
/// use snapvault::filter::PathFilter;
///
/// let filter = PathFilter::new(["*.rs", "docs/"]);
/// assert!(filter.matches("src/lib.rs"));
/// assert!(filter.matches("docs/guide.md"));
/// assert!(!filter.matches("README.md"));
///
/// assert!(PathFilter::all().matches("anything"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<PathPattern>,
}

impl PathFilter {
    /// Compile a filter from patterns
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| PathPattern::new(p.as_ref()))
                .collect(),
        }
    }

    /// Filter that selects every path
    pub fn all() -> Self {
        Self::default()
    }

    /// Build from optional caller-supplied patterns
    pub fn from_option(patterns: Option<&[String]>) -> Self {
        patterns.map_or_else(Self::all, Self::new)
    }

    /// Whether no patterns were given
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `path` is selected
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(path))
    }
}
