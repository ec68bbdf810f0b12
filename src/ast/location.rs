//! Byte offset to line/column conversion
//!
//! rustpython-parser hands out byte offsets through the `Ranged` trait; the
//! query surface speaks 1-based lines and 0-based columns. `LineIndex` keeps
//! the line boundaries of one source snapshot and converts between the two.

use crate::ast::tree::TextSpan;
use crate::errors::SourceLocation;

/// Line index for fast byte offset to line/column conversion
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offsets where each line starts
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
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

    /// Convert byte offset to (line, column), lines 1-indexed
    pub fn offset_to_position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };

        let line_start = self.line_starts[line];
        (line + 1, offset.saturating_sub(line_start))
    }

    /// Inverse of [`offset_to_position`](Self::offset_to_position); `None` past the last line
    pub fn position_to_offset(&self, line: usize, column: usize) -> Option<usize> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.len + 1);
        let offset = start + column;
        (offset < end).then_some(offset.min(self.len))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn span_location(&self, span: TextSpan) -> SourceLocation {
        let start = self.offset_to_position(span.start as usize);
        let end = self.offset_to_position(span.end as usize);
        SourceLocation::from_range(start, end)
    }
}
