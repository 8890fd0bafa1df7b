//! Source buffers and structured diagnostics.
//!
//! Every parsed file is wrapped in a [`FileInfo`] that owns the raw text plus
//! a byte-range index of its lines. Compiler phases append [`Report`]s to a
//! shared [`Diagnostics`] sink; rendering is deferred until the CLI decides to
//! print them.

use std::fmt;
use std::sync::Arc;

use colored::Colorize;

/// A 1-based line/column position inside a source file.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Location { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source file contents plus a line index for location rendering.
#[derive(Debug)]
pub struct FileInfo {
    file_name: String,
    contents: String,
    /// Byte range of every line, newline excluded.
    lines: Vec<std::ops::Range<usize>>,
}

impl FileInfo {
    pub fn new(file_name: impl Into<String>, contents: impl Into<String>) -> Arc<Self> {
        let contents = contents.into();
        let mut lines = Vec::new();
        let mut start = 0usize;
        for (i, b) in contents.bytes().enumerate() {
            if b == b'\n' {
                lines.push(start..i);
                start = i + 1;
            }
        }
        lines.push(start..contents.len());
        Arc::new(FileInfo {
            file_name: file_name.into(),
            contents,
            lines,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Text of a 1-based line, or `None` past the end of the file.
    pub fn line(&self, line: usize) -> Option<&str> {
        self.lines
            .get(line.checked_sub(1)?)
            .map(|r| &self.contents[r.clone()])
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Severity of a [`Report`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Level {
    Error,
    Warning,
    Note,
}

impl Level {
    fn name(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
        }
    }
}

/// A single diagnostic: optional severity and location, a message, and the
/// file it refers to.
#[derive(Debug)]
pub struct Report {
    pub level: Option<Level>,
    pub location: Option<Location>,
    pub message: String,
    pub file: Arc<FileInfo>,
}

impl Report {
    /// Render as `file:line:column: level: message` followed by the offending
    /// source line and a caret, matching the C-compiler convention.
    pub fn render(&self, colorize: bool) -> String {
        let mut out = String::new();
        out.push_str(self.file.file_name());
        if let Some(loc) = self.location {
            out.push_str(&format!(":{loc}"));
        }
        out.push_str(": ");
        if let Some(level) = self.level {
            if colorize {
                let painted = match level {
                    Level::Error => level.name().red().bold(),
                    Level::Warning => level.name().magenta(),
                    Level::Note => level.name().white(),
                };
                out.push_str(&painted.to_string());
            } else {
                out.push_str(level.name());
            }
            out.push_str(": ");
        }
        out.push_str(&self.message);
        out.push('\n');
        if let Some(loc) = self.location
            && let Some(line) = self.file.line(loc.line)
        {
            out.push_str(line);
            out.push('\n');
            let mut arrow = " ".repeat(loc.column.saturating_sub(1));
            arrow.push('^');
            if colorize {
                out.push_str(&arrow.green().bold().to_string());
            } else {
                out.push_str(&arrow);
            }
            out.push('\n');
        }
        out
    }
}

/// Append-only diagnostic sink shared by every compiler phase.
#[derive(Default, Debug)]
pub struct Diagnostics {
    reports: Vec<Report>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn report(
        &mut self,
        file: &Arc<FileInfo>,
        level: Level,
        location: Option<Location>,
        message: impl Into<String>,
    ) {
        self.reports.push(Report {
            level: Some(level),
            location,
            message: message.into(),
            file: Arc::clone(file),
        });
    }

    pub fn error(
        &mut self,
        file: &Arc<FileInfo>,
        location: Option<Location>,
        message: impl Into<String>,
    ) {
        self.report(file, Level::Error, location, message);
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn has_errors(&self) -> bool {
        self.reports
            .iter()
            .any(|r| r.level == Some(Level::Error))
    }

    /// Print every report to stderr.
    pub fn print_reports(&self, colorize: bool) {
        for report in &self.reports {
            eprintln!("{}", report.render(colorize));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_splits_on_newlines() {
        let finfo = FileInfo::new("a.decode", "module a\nstruct B {\n}\n");
        assert_eq!(finfo.line(1), Some("module a"));
        assert_eq!(finfo.line(2), Some("struct B {"));
        assert_eq!(finfo.line(3), Some("}"));
        assert_eq!(finfo.line(99), None);
    }

    #[test]
    fn report_renders_caret_under_column() {
        let finfo = FileInfo::new("a.decode", "module !\n");
        let mut diag = Diagnostics::new();
        diag.error(&finfo, Some(Location::new(1, 8)), "invalid token");
        let rendered = diag.reports()[0].render(false);
        assert!(rendered.starts_with("a.decode:1:8: error: invalid token"));
        assert!(rendered.contains("\nmodule !\n"));
        assert!(rendered.ends_with("       ^\n"));
        assert!(diag.has_errors());
    }
}
