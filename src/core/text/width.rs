//! Column width of codepoints and grapheme clusters.

use unicode_width::UnicodeWidthChar;

/// Columns occupied by a single codepoint (0 for combining marks).
pub fn codepoint_width(codepoint: char) -> usize {
    UnicodeWidthChar::width(codepoint).unwrap_or(0)
}

/// Columns occupied by one grapheme cluster, clamped to the cell model's
/// maximum of 2.
pub fn grapheme_width(grapheme: &str) -> usize {
    let width: usize = grapheme.chars().map(codepoint_width).sum();
    width.min(2)
}
