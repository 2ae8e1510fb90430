//! Source positions and the file set.
//!
//! Positions are byte offsets into a virtual concatenation of all loaded
//! files, in the style of a compiler file set: each file claims a base
//! offset, and a [`Pos`] maps back to file/line/column for error messages.

use std::fmt;

/// A byte offset into the file set. [`Pos::NONE`] marks synthetic
/// positions that do not originate from the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pos(pub u32);

impl Pos {
    pub const NONE: Pos = Pos(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Pos::NONE
    }
}

#[derive(Debug)]
struct SourceFile {
    name: String,
    base: u32,
    len: u32,
    line_starts: Vec<u32>,
}

/// Set of loaded source files, mapping positions to locations.
#[derive(Debug, Default)]
pub struct FileSet {
    files: Vec<SourceFile>,
}

/// A resolved source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl FileSet {
    pub fn new() -> FileSet {
        FileSet { files: Vec::new() }
    }

    /// Registers a file and returns its base offset. Positions inside the
    /// file are `base + local_offset`.
    pub fn add_file(&mut self, name: impl Into<String>, src: &str) -> u32 {
        let base = self.files.last().map(|f| f.base + f.len + 1).unwrap_or(0);
        let mut line_starts = vec![0u32];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        self.files.push(SourceFile {
            name: name.into(),
            base,
            len: src.len() as u32,
            line_starts,
        });
        base
    }

    /// Resolves a position to a file/line/column location.
    pub fn position(&self, pos: Pos) -> Option<Position> {
        if pos.is_none() {
            return None;
        }
        let file = self
            .files
            .iter()
            .take_while(|f| f.base <= pos.0)
            .last()
            .filter(|f| pos.0 <= f.base + f.len)?;
        let local = pos.0 - file.base;
        let line = match file.line_starts.binary_search(&local) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Some(Position {
            file: file.name.clone(),
            line: line + 1,
            column: (local - file.line_starts[line]) as usize + 1,
        })
    }

    /// Renders a position, falling back to `"-"` for synthetic positions.
    pub fn describe(&self, pos: Pos) -> String {
        match self.position(pos) {
            Some(p) => p.to_string(),
            None => "-".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_resolve_across_files() {
        let mut fset = FileSet::new();
        let a = fset.add_file("a.ssa", "one\ntwo\n");
        let b = fset.add_file("b.ssa", "three\n");
        let p = fset.position(Pos(a + 4)).unwrap();
        assert_eq!(("a.ssa", 2, 1), (p.file.as_str(), p.line, p.column));
        let p = fset.position(Pos(b + 2)).unwrap();
        assert_eq!(("b.ssa", 1, 3), (p.file.as_str(), p.line, p.column));
    }

    #[test]
    fn synthetic_position_is_dash() {
        let fset = FileSet::new();
        assert_eq!("-", fset.describe(Pos::NONE));
    }
}
