//! Release tag ordering
//!
//! Tags are compared by concatenating their digit groups into a single
//! integer: "1.2.0" becomes 120. This orders tags correctly only when their
//! digit groups have matching widths, so "1.10.0" (1100) sorts above
//! "1.9.20" (1920) incorrectly. Tags that do not parse map to ordinal 0.

/// Ordinal of a dotted release tag ("1.2.0" -> 120)
pub fn tag_ordinal(tag: &str) -> u64 {
    parse_ordinal(tag, '.')
}

/// Ordinal of a cache directory name ("1_2_0" -> 120)
pub fn dir_ordinal(name: &str) -> u64 {
    parse_ordinal(name, '_')
}

/// Whether `tag` is strictly newer than `than`
///
/// An empty `than` is infinitely old.
pub fn is_newer(tag: &str, than: &str) -> bool {
    if than.is_empty() {
        return true;
    }
    tag_ordinal(tag) > tag_ordinal(than)
}

fn parse_ordinal(value: &str, separator: char) -> u64 {
    value.replace(separator, "").parse().unwrap_or(0)
}
