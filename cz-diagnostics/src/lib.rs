//! Structured diagnostics for the CZ compiler pipeline.
//!
//! A `Diagnostic` is `{severity, filename, line, id, message, source_path?}`
//! where `id` is drawn from the closed [`DiagnosticKind`] taxonomy. The
//! canonical wire format (`to_line`) is
//! `<severity> <source_path>:<line>: [<id>] <message>`, optionally followed
//! by a two-space-indented quoted source snippet. `format_pretty` renders
//! the same information with colors and a caret-underlined snippet, for
//! interactive terminal use.

use colored::Colorize;
use std::fmt;

pub mod span_map;
pub use span_map::SpanMap;

/// Source code location.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

impl Span {
    pub fn new(file: String, line: usize, column: usize, length: usize) -> Self {
        Self {
            file,
            line,
            column,
            length,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// The closed error/warning taxonomy from the error-handling design (kinds,
/// not type names — several historical kinds share one code path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexical,
    Parse,
    DuplicateDeclaration,
    UndeclaredIdentifier,
    UndefinedFunction,
    UndefinedStruct,
    FieldNotFound,
    TypeMismatch,
    PointerArithmeticForbidden,
    DivisionByZero,
    ArrayIndexOutOfBounds,
    MutabilityViolation,
    ConstQualifierDiscarded,
    ReturnStackReference,
    MissingReturn,
    VoidFunctionReturnsValue,
    MissingMainFunction,
    InvalidMainSignature,
    InvalidModuleName,
    InvalidStructName,
    MissingField,
    MissingMethod,
    MismatchedSignature,
    UseAfterFree,
    StackOverflow,
    AmbiguousOrUnmatchedOverload,
    // Warnings
    UnsafeCFunction,
    UnusedImport,
    EnumValueNotUppercase,
    StackWarning,
    MissingModuleDeclaration,
    UselessInterface,
    DuplicateAlias,
}

impl DiagnosticKind {
    pub fn id(self) -> &'static str {
        match self {
            DiagnosticKind::Lexical => "Lexical",
            DiagnosticKind::Parse => "Parse",
            DiagnosticKind::DuplicateDeclaration => "DuplicateDeclaration",
            DiagnosticKind::UndeclaredIdentifier => "UndeclaredIdentifier",
            DiagnosticKind::UndefinedFunction => "UndefinedFunction",
            DiagnosticKind::UndefinedStruct => "UndefinedStruct",
            DiagnosticKind::FieldNotFound => "FieldNotFound",
            DiagnosticKind::TypeMismatch => "TypeMismatch",
            DiagnosticKind::PointerArithmeticForbidden => "PointerArithmeticForbidden",
            DiagnosticKind::DivisionByZero => "DivisionByZero",
            DiagnosticKind::ArrayIndexOutOfBounds => "ArrayIndexOutOfBounds",
            DiagnosticKind::MutabilityViolation => "MutabilityViolation",
            DiagnosticKind::ConstQualifierDiscarded => "ConstQualifierDiscarded",
            DiagnosticKind::ReturnStackReference => "ReturnStackReference",
            DiagnosticKind::MissingReturn => "MissingReturn",
            DiagnosticKind::VoidFunctionReturnsValue => "VoidFunctionReturnsValue",
            DiagnosticKind::MissingMainFunction => "MissingMainFunction",
            DiagnosticKind::InvalidMainSignature => "InvalidMainSignature",
            DiagnosticKind::InvalidModuleName => "InvalidModuleName",
            DiagnosticKind::InvalidStructName => "InvalidStructName",
            DiagnosticKind::MissingField => "MissingField",
            DiagnosticKind::MissingMethod => "MissingMethod",
            DiagnosticKind::MismatchedSignature => "MismatchedSignature",
            DiagnosticKind::UseAfterFree => "UseAfterFree",
            DiagnosticKind::StackOverflow => "StackOverflow",
            DiagnosticKind::AmbiguousOrUnmatchedOverload => "AmbiguousOrUnmatchedOverload",
            DiagnosticKind::UnsafeCFunction => "UnsafeCFunction",
            DiagnosticKind::UnusedImport => "UnusedImport",
            DiagnosticKind::EnumValueNotUppercase => "EnumValueNotUppercase",
            DiagnosticKind::StackWarning => "StackWarning",
            DiagnosticKind::MissingModuleDeclaration => "MissingModuleDeclaration",
            DiagnosticKind::UselessInterface => "UselessInterface",
            DiagnosticKind::DuplicateAlias => "DuplicateAlias",
        }
    }

    /// Whether this kind is, by taxonomy, a non-fatal warning.
    pub fn is_warning(self) -> bool {
        matches!(
            self,
            DiagnosticKind::UnsafeCFunction
                | DiagnosticKind::UnusedImport
                | DiagnosticKind::EnumValueNotUppercase
                | DiagnosticKind::StackWarning
                | DiagnosticKind::MissingModuleDeclaration
                | DiagnosticKind::UselessInterface
        )
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
    pub source_snippet: Option<String>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: Span) -> Self {
        let severity = if kind.is_warning() {
            Severity::Warning
        } else {
            Severity::Error
        };
        Self {
            severity,
            kind,
            message: message.into(),
            span,
            source_snippet: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.source_snippet = Some(snippet.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// The canonical wire format: `<severity> <source_path>:<line>: [<id>] <message>`,
    /// optionally followed by a two-space-indented quoted source snippet line.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {}:{}: [{}] {}",
            self.severity,
            self.span.file,
            self.span.line,
            self.kind.id(),
            self.message
        );
        if let Some(snippet) = &self.source_snippet {
            line.push('\n');
            line.push_str(&format!("  \"{}\"", snippet));
        }
        line
    }

    /// Rust-style pretty rendering with a caret-underlined source line, for
    /// interactive terminal use.
    pub fn format_pretty(&self, source_code: &str) -> String {
        let mut output = String::new();
        let sev = match self.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
        };
        output.push_str(&format!(
            "{}[{}]: {}\n",
            sev,
            self.kind.id(),
            self.message.bold()
        ));
        output.push_str(&format!(
            " {} {}:{}:{}\n",
            "-->".cyan().bold(),
            self.span.file,
            self.span.line,
            self.span.column
        ));

        if let Some(snippet) = self.source_line(source_code) {
            output.push_str(&snippet);
        }
        for note in &self.notes {
            output.push_str(&format!(" {} {}\n", "=".cyan().bold(), note.cyan()));
        }
        if let Some(help) = &self.help {
            output.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }
        output
    }

    fn source_line(&self, source_code: &str) -> Option<String> {
        let lines: Vec<&str> = source_code.lines().collect();
        if self.span.line == 0 || self.span.line > lines.len() {
            return None;
        }
        let line = lines[self.span.line - 1];
        let width = self.span.line.to_string().len().max(2);
        let mut out = String::new();
        out.push_str(&format!(" {}\n", " ".repeat(width + 1).cyan()));
        out.push_str(&format!(
            " {} {} {}\n",
            format!("{:>width$}", self.span.line, width = width)
                .cyan()
                .bold(),
            "|".cyan().bold(),
            line
        ));
        let padding = " ".repeat(width + 3 + self.span.column.saturating_sub(1));
        let underline = "^".repeat(self.span.length.max(1));
        out.push_str(&format!(
            " {} {}{}\n",
            " ".repeat(width + 1).cyan(),
            padding,
            underline.red().bold()
        ));
        Some(out)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

/// Accumulates diagnostics for one pipeline phase. A phase "completes" by
/// draining its diagnostics; the pipeline halts if any were errors.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain this phase's diagnostics so the next phase starts clean; the
    /// caller decides whether to abort based on `has_errors`.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn print_all(&self) {
        for diag in &self.diagnostics {
            eprintln!("{}", diag.to_line());
        }
    }

    pub fn print_summary(&self) {
        let errors = self.error_count();
        let warnings = self.warning_count();
        if errors > 0 {
            eprintln!(
                "{}: {} error{} emitted",
                "error".red().bold(),
                errors,
                if errors == 1 { "" } else { "s" }
            );
        }
        if warnings > 0 {
            eprintln!(
                "{}: {} warning{} emitted",
                "warning".yellow().bold(),
                warnings,
                if warnings == 1 { "" } else { "s" }
            );
        }
    }
}

/// Fuzzy matching for "did you mean?" suggestions on undeclared identifiers.
pub mod fuzzy {
    use strsim::jaro_winkler;

    pub fn find_similar_names(target: &str, candidates: &[String], max_suggestions: usize) -> Vec<String> {
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|candidate| (candidate.clone(), jaro_winkler(target, candidate)))
            .filter(|(_, score)| *score > 0.7)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(max_suggestions).map(|(name, _)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_matches_spec() {
        let span = Span::new("main.cz".to_string(), 12, 3, 1);
        let diag = Diagnostic::new(DiagnosticKind::UseAfterFree, "use of freed value `p`", span);
        assert_eq!(
            diag.to_line(),
            "error main.cz:12: [UseAfterFree] use of freed value `p`"
        );
    }

    #[test]
    fn warnings_do_not_use_error_severity() {
        let span = Span::unknown();
        let diag = Diagnostic::new(DiagnosticKind::UnusedImport, "unused import `cz.io`", span);
        assert_eq!(diag.severity, Severity::Warning);
        assert!(diag.to_line().starts_with("warning"));
    }

    #[test]
    fn snippet_is_indented_two_spaces() {
        let span = Span::new("x.cz".to_string(), 1, 1, 1);
        let diag = Diagnostic::new(DiagnosticKind::Parse, "unexpected token", span)
            .with_snippet("let x = ;");
        assert!(diag.to_line().contains("\n  \"let x = ;\""));
    }
}
