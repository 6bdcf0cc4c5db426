//! Source location tracking.
//!
//! The lexer works in byte ranges; everything the parser hands out uses
//! [`CodeLocation`], a 1-based line and 1-based character column pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// A span in the source code, represented as a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Get the source text for this span.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// A position in a source file.
///
/// Both fields are 1-based. The empty location `(0, 0)` marks errors that
/// have no position, such as a parser crash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct CodeLocation {
    /// Line number, starting at 1.
    pub line: u32,
    /// Character column, starting at 1.
    pub column: u32,
}

impl CodeLocation {
    /// The location used when no position is known.
    pub const EMPTY: Self = Self { line: 0, column: 0 };

    /// Create a new location.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Returns true if `self` lies in the half-open range `start..end`.
    #[must_use]
    pub fn within(&self, start: Self, end: Self) -> bool {
        start <= *self && *self < end
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A line index for offset-to-location conversion.
///
/// Building the index is O(n); lookups binary-search the line table.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the start of each line.
    line_starts: Vec<usize>,
    /// Total length of the source in bytes.
    len: usize,
}

impl LineIndex {
    /// Build a line index from source text.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// Convert a byte offset into a 1-based location.
    ///
    /// Columns count characters, not bytes.
    pub fn location(&self, source: &str, offset: usize) -> CodeLocation {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let line_start = self.line_starts[line];
        let column = source
            .get(line_start..offset)
            .map_or(offset - line_start, |text| text.chars().count());
        CodeLocation::new(line as u32 + 1, column as u32 + 1)
    }

    /// Convert a 1-based location back into a byte offset.
    ///
    /// Returns `None` when the line does not exist; columns past the end of
    /// the line clamp to the line end.
    pub fn offset(&self, source: &str, location: CodeLocation) -> Option<usize> {
        let line = (location.line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .map_or(self.len, |next| next - 1);
        let text = source.get(start..end)?;
        let column = (location.column as usize).saturating_sub(1);
        Some(
            text.char_indices()
                .nth(column)
                .map_or(end, |(i, _)| start + i),
        )
    }

    /// Get the number of lines in the source.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_is_one_based() {
        let source = "ab\ncd";
        let index = LineIndex::new(source);
        assert_eq!(index.location(source, 0), CodeLocation::new(1, 1));
        assert_eq!(index.location(source, 4), CodeLocation::new(2, 2));
        assert_eq!(index.line_count(), 2);
    }

    #[test]
    fn test_columns_count_characters() {
        let source = "é x";
        let index = LineIndex::new(source);
        assert_eq!(index.location(source, 3), CodeLocation::new(1, 3));
    }

    #[test]
    fn test_offset_roundtrip() {
        let source = "void f()\n{\n  g();\n}";
        let index = LineIndex::new(source);
        let offset = source.find("g()").unwrap();
        let loc = index.location(source, offset);
        assert_eq!(loc, CodeLocation::new(3, 3));
        assert_eq!(index.offset(source, loc), Some(offset));
        assert_eq!(index.offset(source, CodeLocation::new(9, 1)), None);
    }

    #[test]
    fn test_within() {
        let loc = CodeLocation::new(2, 5);
        assert!(loc.within(CodeLocation::new(2, 5), CodeLocation::new(2, 6)));
        assert!(!loc.within(CodeLocation::new(2, 6), CodeLocation::new(3, 1)));
    }
}
