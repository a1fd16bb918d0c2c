//! Position utilities for rendering diagnostics.
//!
//! The semantic core tracks byte offsets; human-facing diagnostics want
//! line/column pairs. This module provides the conversion.

use serde::{Deserialize, Serialize};

/// A position in a source file (0-indexed line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 0-indexed line number
    pub line: u32,
    /// 0-indexed column in bytes
    pub character: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Line map for efficient offset -> position conversion.
/// Stores the starting offset of each line.
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Starting offset of each line (`line_starts[0]` is always 0)
    line_starts: Vec<u32>,
}

impl LineMap {
    /// Build a line map from source text.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        LineMap { line_starts }
    }

    /// Convert a byte offset to a 0-indexed position.
    ///
    /// Offsets past the last line start land on the last line.
    #[must_use]
    pub fn position(&self, offset: u32) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        Position {
            line: line as u32,
            character: offset - self.line_starts[line],
        }
    }

    /// Number of lines in the mapped text.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
