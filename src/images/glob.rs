//! Hostname and pathname matchers built on `globset`.
//!
//! Hostname labels are mapped onto `/`-separated segments so that `*` stays
//! within one label and `**` spans any number of them, the same way both
//! behave for path segments.

use globset::{GlobBuilder, GlobMatcher};

/// Matcher for a `/`-separated pathname glob.
pub fn pathname(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    let glob = GlobBuilder::new(pattern).literal_separator(true).build()?;
    Ok(glob.compile_matcher())
}

/// Matcher for a `.`-separated hostname glob, case-insensitive.
pub fn hostname(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    let glob = GlobBuilder::new(&labels_as_segments(pattern))
        .literal_separator(true)
        .case_insensitive(true)
        .build()?;
    Ok(glob.compile_matcher())
}

/// Rewrite `a.b.c` as `a/b/c`, the form both hostname globs and hosts are matched in.
pub fn labels_as_segments(host: &str) -> String {
    host.replace('.', "/")
}
