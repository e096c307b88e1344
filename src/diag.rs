/*! Diagnostics produced while evaluating constants.

A [`List`] is an append-only sink: evaluators push errors, warnings and notes
into it and never inspect or render what is already there. Rendering is a
separate step, done with [`codespan_reporting`] by [`List::emit_to_string`].
*/

use crate::Span;

use codespan_reporting::diagnostic::{Diagnostic as CodespanDiagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term;
use termcolor::NoColor;

use std::fmt;

/// How serious a [`Diagnostic`] is.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

impl Diagnostic {
    fn to_codespan(&self) -> CodespanDiagnostic<()> {
        let diagnostic = match self.severity {
            Severity::Note => CodespanDiagnostic::note(),
            Severity::Warning => CodespanDiagnostic::warning(),
            Severity::Error => CodespanDiagnostic::error(),
        };
        let labels = match self.span.to_range() {
            Some(range) => vec![Label::primary((), range)],
            None => Vec::new(),
        };
        diagnostic
            .with_message(self.message.clone())
            .with_labels(labels)
    }
}

/// An ordered list of diagnostics.
#[derive(Clone, Debug, Default)]
pub struct List {
    entries: Vec<Diagnostic>,
    error_count: usize,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.error_count += 1;
        }
        self.entries.push(diagnostic);
    }

    pub fn add_error(&mut self, message: impl Into<String>, span: Span) {
        self.add(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span,
        })
    }

    pub fn add_warning(&mut self, message: impl Into<String>, span: Span) {
        self.add(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span,
        })
    }

    pub fn add_note(&mut self, message: impl Into<String>, span: Span) {
        self.add(Diagnostic {
            severity: Severity::Note,
            message: message.into(),
            span,
        })
    }

    pub fn contains_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// Emits every diagnostic to a string.
    pub fn emit_to_string(&self, source: &str) -> String {
        self.emit_to_string_with_path(source, "wgsl")
    }

    /// Emits every diagnostic to a string, labelling the source with `path`.
    pub fn emit_to_string_with_path(&self, source: &str, path: &str) -> String {
        let files = SimpleFile::new(path, source);
        let config = term::Config::default();
        let mut writer = NoColor::new(Vec::new());
        for diagnostic in self.entries.iter() {
            term::emit(&mut writer, &config, &files, &diagnostic.to_codespan())
                .expect("cannot write error");
        }
        String::from_utf8(writer.into_inner()).expect("diagnostics are not valid UTF-8")
    }
}

impl<'a> IntoIterator for &'a List {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_errors_only() {
        let mut list = List::new();
        list.add_warning("careful", Span::default());
        list.add_note("see here", Span::default());
        assert!(!list.contains_errors());
        list.add_error("broken", Span::new(0, 1));
        assert_eq!(list.error_count(), 1);
        assert_eq!(list.len(), 3);
        assert_eq!(
            list.iter().map(|d| d.severity).collect::<Vec<_>>(),
            [Severity::Warning, Severity::Note, Severity::Error]
        );
    }

    #[test]
    fn emit() {
        let source = "const x = 1 / 0;";
        let mut list = List::new();
        list.add_error("integer division by zero is invalid", Span::new(10, 15));
        let output = list.emit_to_string(source);
        assert!(output.starts_with("error: integer division by zero is invalid"));
        assert!(output.contains("wgsl:1:11"));
    }
}
