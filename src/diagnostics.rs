//! # Diagnostic reporter
//!
//! `spec.md` §4.I, §7. Every problem the lexer, parser, validator, module
//! loader, evaluator, and normalizer find is appended to one shared
//! `Vec<Diagnostic>` rather than raised as a early-return `Result::Err` — this
//! is what lets `check`/`compile` (§6.1) return every diagnostic found instead
//! of stopping at the first.

use crate::source::{FileId, SourceMap, Span};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Hint => "hint",
        };
        write!(f, "{s}")
    }
}

/// Machine-readable diagnostic codes, grouped exactly as the taxonomy in
/// `spec.md` §7 groups them. The `Display` impl produces the `E00NN`-style
/// code string `spec.md` §4.I expects (`code: e.g. "E0050"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    // Lexical
    UnexpectedChar,
    UnterminatedString,
    InvalidNumber,
    InvalidEscape,

    // Syntactic
    UnexpectedToken,
    ExpectedIdentifier,
    ExpectedExpression,
    MismatchedBrackets,
    UnexpectedEof,

    // Semantic (static)
    UndefinedSymbol,
    DuplicateSymbol,
    DuplicateSoundId,
    UndefinedSound,
    InvalidSoundKind,
    InvalidTrackRole,
    BadMeterDenominator,
    NonPositiveDuration,
    CcOutOfRange,
    LetAtModuleScope,

    // Module
    ModuleNotFound,
    CircularImport,
    ExportNotFound,
    TopLevelExecutionInImport,

    // Evaluation
    DivisionByZero,
    TypeMismatch,
    NotCallable,
    NotIndexable,
    IndexOutOfBounds,
    UseBeforeInit,
    RecursionLimitExceeded,
    ForBoundsNotConst,

    // Domain
    PitchOutOfRange,
    MeterNotAtBarStart,
    BeatOutOfRange,
    MainNotFound,
    MainReturnedNonScore,
}

impl DiagnosticCode {
    /// Stable numeric id used to build the `E00NN` code string.
    fn number(self) -> u32 {
        use DiagnosticCode::*;
        match self {
            UnexpectedChar => 1,
            UnterminatedString => 2,
            InvalidNumber => 3,
            InvalidEscape => 4,
            UnexpectedToken => 10,
            ExpectedIdentifier => 11,
            ExpectedExpression => 12,
            MismatchedBrackets => 13,
            UnexpectedEof => 14,
            UndefinedSymbol => 20,
            DuplicateSymbol => 21,
            DuplicateSoundId => 22,
            UndefinedSound => 23,
            InvalidSoundKind => 24,
            InvalidTrackRole => 25,
            BadMeterDenominator => 26,
            NonPositiveDuration => 27,
            CcOutOfRange => 28,
            LetAtModuleScope => 29,
            ModuleNotFound => 40,
            CircularImport => 41,
            ExportNotFound => 42,
            TopLevelExecutionInImport => 43,
            DivisionByZero => 50,
            TypeMismatch => 51,
            NotCallable => 52,
            NotIndexable => 53,
            IndexOutOfBounds => 54,
            UseBeforeInit => 55,
            RecursionLimitExceeded => 56,
            ForBoundsNotConst => 57,
            PitchOutOfRange => 70,
            MeterNotAtBarStart => 71,
            BeatOutOfRange => 72,
            MainNotFound => 73,
            MainReturnedNonScore => 74,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.number())
    }
}

/// A secondary span attached to a diagnostic, e.g. "previously declared here".
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
    pub label: Option<String>,
    pub related: Vec<RelatedSpan>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            span,
            label: None,
            related: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
        }
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, code, message, span)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Warning, code, message, span)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related.push(RelatedSpan { span, label: label.into() });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Renders diagnostics as Rust-style terminal output: a header line, a `-->`
/// file:line:col, a source snippet with a caret-underline, then related
/// spans. Caches file contents by [`FileId`] for snippet retrieval (§4.I).
pub struct Reporter<'a> {
    sources: &'a SourceMap,
}

impl<'a> Reporter<'a> {
    pub fn new(sources: &'a SourceMap) -> Self {
        Self { sources }
    }

    pub fn render(&self, diagnostics: &[Diagnostic]) -> String {
        let mut out = String::new();
        for d in diagnostics {
            out.push_str(&self.render_one(d));
            out.push('\n');
        }
        out
    }

    fn render_one(&self, d: &Diagnostic) -> String {
        let file = self.sources.file(d.span.file);
        let mut out = String::new();
        out.push_str(&format!("{}[{}]: {}\n", d.severity, d.code, d.message));
        out.push_str(&format!(
            "  --> {}:{}:{}\n",
            file.path, d.span.start.line, d.span.start.column
        ));

        let line_no = d.span.start.line;
        let line_text = file.line_text(line_no);
        let gutter = format!("{line_no}");
        out.push_str(&format!("{:>width$} |\n", "", width = gutter.len()));
        out.push_str(&format!("{gutter} | {line_text}\n"));

        let caret_start = d.span.start.column.saturating_sub(1) as usize;
        let caret_len = if d.span.end.line == d.span.start.line {
            (d.span.end.column.saturating_sub(d.span.start.column)).max(1) as usize
        } else {
            1
        };
        let mut caret_line = " ".repeat(caret_start);
        caret_line.push_str(&"^".repeat(caret_len));
        if let Some(label) = &d.label {
            caret_line.push(' ');
            caret_line.push_str(label);
        }
        out.push_str(&format!("{:>width$} | {caret_line}\n", "", width = gutter.len()));

        for related in &d.related {
            let rfile = self.sources.file(related.span.file);
            out.push_str(&format!(
                "  note: {} --> {}:{}:{}\n",
                related.label, rfile.path, related.span.start.line, related.span.start.column
            ));
        }
        for note in &d.notes {
            out.push_str(&format!("  note: {note}\n"));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  suggestion: {suggestion}\n"));
        }
        out
    }
}

/// True iff any diagnostic in the list has `Severity::Error` — the predicate
/// `compile`/`check` use to decide success (§6.4, §7, §8 invariant 7).
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

pub fn dummy_span(file: FileId) -> Span {
    use crate::source::Position;
    let pos = Position { line: 1, column: 1, byte_offset: 0 };
    Span::point(pos, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_renders_as_e_prefixed_number() {
        assert_eq!(DiagnosticCode::DivisionByZero.to_string(), "E0050");
    }

    #[test]
    fn has_errors_false_when_only_warnings() {
        let mut sources = SourceMap::new();
        let file = sources.add_file("a.mfs", "x");
        let d = Diagnostic::warning(DiagnosticCode::MeterNotAtBarStart, "msg", dummy_span(file));
        assert!(!has_errors(&[d]));
    }

    #[test]
    fn render_includes_caret_line() {
        let mut sources = SourceMap::new();
        let file = sources.add_file("a.mfs", "const x = 1;\n");
        let d = Diagnostic::error(DiagnosticCode::UndefinedSymbol, "undefined symbol `y`", dummy_span(file));
        let reporter = Reporter::new(&sources);
        let rendered = reporter.render(&[d]);
        assert!(rendered.contains("error[E0020]"));
        assert!(rendered.contains("^"));
    }
}
