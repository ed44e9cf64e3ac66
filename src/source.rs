//! # Source text, positions, and spans
//!
//! `spec.md` §3.1, §4.B. A `SourceMap` owns every file's full text for the
//! duration of one compilation and precomputes a line-start table so that any
//! byte offset can be converted to a `(line, column)` pair in `O(log n)`
//! without rescanning the file.

use std::fmt;

/// Identifies a source file within one compilation. Stable for the lifetime
/// of the `SourceMap` that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// A 1-indexed line/column, 0-indexed byte offset position (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub byte_offset: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open `[start, end)` source range, always within one file (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Position,
    pub end: Position,
    pub file: FileId,
}

impl Span {
    pub fn new(start: Position, end: Position, file: FileId) -> Self {
        Self { start, end, file }
    }

    /// A zero-width span at `pos`, useful for synthetic diagnostics.
    pub fn point(pos: Position, file: FileId) -> Self {
        Self {
            start: pos,
            end: pos,
            file,
        }
    }

    /// Merge two spans in the same file into their enclosing range.
    ///
    /// # Panics
    /// Panics if the spans belong to different files — merging across files
    /// is always a bug in the caller, never a legitimate diagnostic.
    pub fn merge(self, other: Span) -> Span {
        assert_eq!(self.file, other.file, "cannot merge spans from different files");
        let start = if self.start.byte_offset <= other.start.byte_offset {
            self.start
        } else {
            other.start
        };
        let end = if self.end.byte_offset >= other.end.byte_offset {
            self.end
        } else {
            other.end
        };
        Span::new(start, end, self.file)
    }
}

/// One loaded source file: its text and a line-start index for fast position
/// lookup.
pub struct SourceFile {
    pub path: String,
    pub text: String,
    /// Byte offset of the first character of each line; `line_starts[0] == 0`.
    line_starts: Vec<u32>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            path: path.into(),
            text,
            line_starts,
        }
    }

    /// Resolve a byte offset to a `Position`. Offsets past the end of the
    /// file clamp to the file's final position.
    pub fn position_at(&self, byte_offset: u32, file: FileId) -> Position {
        let offset = byte_offset.min(self.text.len() as u32);
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[line_idx];
        let column = self.text[line_start as usize..offset as usize].chars().count() as u32 + 1;
        let _ = file;
        Position {
            line: (line_idx + 1) as u32,
            column,
            byte_offset: offset,
        }
    }

    pub fn line_text(&self, line: u32) -> &str {
        let idx = (line - 1) as usize;
        let start = self.line_starts.get(idx).copied().unwrap_or(0) as usize;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&e| e as usize)
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches(['\n', '\r'])
    }
}

/// Owns every source file touched by one compilation.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    pub fn add_file(&mut self, path: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(path, text));
        id
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn position_at(&self, file: FileId, byte_offset: u32) -> Position {
        self.file(file).position_at(byte_offset, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_at_start_is_line_one_col_one() {
        let f = SourceFile::new("a.mfs", "abc\ndef");
        let pos = f.position_at(0, FileId(0));
        assert_eq!((pos.line, pos.column), (1, 1));
    }

    #[test]
    fn position_after_newline_is_next_line() {
        let f = SourceFile::new("a.mfs", "abc\ndef");
        let pos = f.position_at(4, FileId(0));
        assert_eq!((pos.line, pos.column), (2, 1));
    }

    #[test]
    fn span_merge_takes_enclosing_range() {
        let f = FileId(0);
        let a = Span::new(
            Position { line: 1, column: 1, byte_offset: 0 },
            Position { line: 1, column: 3, byte_offset: 2 },
            f,
        );
        let b = Span::new(
            Position { line: 1, column: 5, byte_offset: 4 },
            Position { line: 1, column: 8, byte_offset: 7 },
            f,
        );
        let merged = a.merge(b);
        assert_eq!(merged.start.byte_offset, 0);
        assert_eq!(merged.end.byte_offset, 7);
    }

    #[test]
    fn line_text_strips_trailing_newline() {
        let f = SourceFile::new("a.mfs", "first\nsecond\n");
        assert_eq!(f.line_text(1), "first");
        assert_eq!(f.line_text(2), "second");
    }
}
