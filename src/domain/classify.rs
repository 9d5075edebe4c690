//! File and line classification.
//!
//! Comment detection here is a textual heuristic, not a grammar. It looks at
//! the first non-whitespace token of a line and tracks whether a block comment
//! is open. Nested comments, comment markers inside string literals and
//! language-specific syntax beyond `//`, `/* */` and `#` are not handled.

use std::path::Path;

pub const DOC_EXTS: &[&str] = &[
    "md", "markdown", "mdown", "mkdn", "mdwn", "mdtxt", "txt", "text", "doc", "htm", "html",
];

/// Which bucket a line is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineTarget {
    Code,
    Docs,
    Tests,
    Resources,
}

/// File-level classification, computed once per file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileKind {
    pub is_doc: bool,
    pub is_test: bool,
    pub is_binary: bool,
}

impl FileKind {
    /// Classify a repository-relative path. Binary detection happens
    /// upstream, see [`FileKind::binary`].
    pub fn of_path(path: &str) -> Self {
        let is_doc = match extension(path) {
            // README, LICENSE, Makefile and friends
            None => true,
            Some(ext) => DOC_EXTS.contains(&ext.as_str()),
        };
        let is_test = !is_doc && path.to_ascii_lowercase().contains("test");
        FileKind {
            is_doc,
            is_test,
            is_binary: false,
        }
    }

    pub fn binary(mut self) -> Self {
        self.is_binary = true;
        self
    }
}

/// Lowercased extension without the dot, if any.
pub fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

/// Same heuristic git uses: a NUL byte in the first 8000 bytes.
pub fn looks_binary(head: &[u8]) -> bool {
    head.iter().take(8000).any(|&b| b == 0)
}

/// Comment markers of one syntax family.
pub trait CommentSyntax: Send + Sync {
    fn line_markers(&self) -> &[&'static str];
    fn block_markers(&self) -> Option<(&'static str, &'static str)>;
}

/// `//`, `#` and `/* */`, applied to every non-documentation file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Heuristic;

impl CommentSyntax for Heuristic {
    fn line_markers(&self) -> &[&'static str] {
        &["//", "#"]
    }

    fn block_markers(&self) -> Option<(&'static str, &'static str)> {
        Some(("/*", "*/"))
    }
}

/// Per-file line classifier. Holds the "inside block comment" state, so a
/// fresh one is needed for every file and lines must be fed in order.
pub struct LineClassifier<'a, S: CommentSyntax = Heuristic> {
    kind: FileKind,
    syntax: &'a S,
    in_block: bool,
}

impl<'a> LineClassifier<'a, Heuristic> {
    pub fn new(kind: FileKind) -> Self {
        LineClassifier::with_syntax(kind, &Heuristic)
    }
}

impl<'a, S: CommentSyntax> LineClassifier<'a, S> {
    pub fn with_syntax(kind: FileKind, syntax: &'a S) -> Self {
        LineClassifier {
            kind,
            syntax,
            in_block: false,
        }
    }

    /// Decide the bucket for the next line of the file.
    pub fn classify(&mut self, line: &str) -> LineTarget {
        if self.kind.is_binary {
            return LineTarget::Resources;
        }
        if self.kind.is_doc || self.is_comment(line) {
            return LineTarget::Docs;
        }
        if self.kind.is_test {
            LineTarget::Tests
        } else {
            LineTarget::Code
        }
    }

    fn is_comment(&mut self, line: &str) -> bool {
        let block = self.syntax.block_markers();

        if self.in_block {
            if let Some((_, close)) = block {
                if line.contains(close) {
                    self.in_block = false;
                }
            }
            return true;
        }

        let trimmed = line.trim_start();
        if self.syntax.line_markers().iter().any(|m| trimmed.starts_with(m)) {
            return true;
        }
        if let Some((open, close)) = block {
            if let Some(rest) = trimmed.strip_prefix(open) {
                self.in_block = !rest.contains(close);
                return true;
            }
        }
        false
    }
}
