//! Shared diagnostic machinery for all pipeline stages.
//!
//! Every error produced by the lexer, parser, semantic analyser or evaluator
//! is routed through [`Diagnostic`], which carries a stable error code, a
//! severity, a source position and optional expected/received/suggestion
//! payloads. Rendering follows the single-line format
//! `[CODE] Category: message. Line: L, Column: C`.

use std::fmt::Display;

use colored::Colorize;

use crate::lexer::Span;

/// Closed catalogue of error codes. Syntax errors occupy 001-009, execution
/// errors 101-110 and semantic errors 201-208. `Unknown` renders as
/// `ZYLO_ERR_000` and is reserved for codes outside the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    Unknown,
    // Syntax: 001-009
    UnexpectedToken,
    UnexpectedEof,
    UnterminatedString,
    UnterminatedComment,
    InvalidEscape,
    InvalidNumber,
    MissingInitializer,
    InvalidOperator,
    MalformedDeclaration,
    // Execution: 101-110
    DivisionByZero,
    UndefinedVariable,
    ConstantReassignment,
    IndexOutOfRange,
    InvalidCast,
    NotCallable,
    StackOverflow,
    UncaughtThrow,
    InvalidIteration,
    AwaitError,
    // Semantic: 201-208
    TypeMismatch,
    UndefinedSymbol,
    RedefinedConstant,
    InvalidOperandTypes,
    BreakOutsideLoop,
    ReturnTypeMismatch,
    UnknownModule,
    InvalidCondition,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "ZYLO_ERR_000",
            ErrorCode::UnexpectedToken => "ZYLO_ERR_001",
            ErrorCode::UnexpectedEof => "ZYLO_ERR_002",
            ErrorCode::UnterminatedString => "ZYLO_ERR_003",
            ErrorCode::UnterminatedComment => "ZYLO_ERR_004",
            ErrorCode::InvalidEscape => "ZYLO_ERR_005",
            ErrorCode::InvalidNumber => "ZYLO_ERR_006",
            ErrorCode::MissingInitializer => "ZYLO_ERR_007",
            ErrorCode::InvalidOperator => "ZYLO_ERR_008",
            ErrorCode::MalformedDeclaration => "ZYLO_ERR_009",
            ErrorCode::DivisionByZero => "ZYLO_ERR_101",
            ErrorCode::UndefinedVariable => "ZYLO_ERR_102",
            ErrorCode::ConstantReassignment => "ZYLO_ERR_103",
            ErrorCode::IndexOutOfRange => "ZYLO_ERR_104",
            ErrorCode::InvalidCast => "ZYLO_ERR_105",
            ErrorCode::NotCallable => "ZYLO_ERR_106",
            ErrorCode::StackOverflow => "ZYLO_ERR_107",
            ErrorCode::UncaughtThrow => "ZYLO_ERR_108",
            ErrorCode::InvalidIteration => "ZYLO_ERR_109",
            ErrorCode::AwaitError => "ZYLO_ERR_110",
            ErrorCode::TypeMismatch => "ZYLO_ERR_201",
            ErrorCode::UndefinedSymbol => "ZYLO_ERR_202",
            ErrorCode::RedefinedConstant => "ZYLO_ERR_203",
            ErrorCode::InvalidOperandTypes => "ZYLO_ERR_204",
            ErrorCode::BreakOutsideLoop => "ZYLO_ERR_205",
            ErrorCode::ReturnTypeMismatch => "ZYLO_ERR_206",
            ErrorCode::UnknownModule => "ZYLO_ERR_207",
            ErrorCode::InvalidCondition => "ZYLO_ERR_208",
        }
    }

    /// The category name used when rendering the diagnostic.
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "Error",
            ErrorCode::UnexpectedToken
            | ErrorCode::UnexpectedEof
            | ErrorCode::UnterminatedString
            | ErrorCode::UnterminatedComment
            | ErrorCode::InvalidEscape
            | ErrorCode::InvalidNumber
            | ErrorCode::MissingInitializer
            | ErrorCode::InvalidOperator
            | ErrorCode::MalformedDeclaration => "Syntax Error",
            ErrorCode::DivisionByZero
            | ErrorCode::UndefinedVariable
            | ErrorCode::ConstantReassignment
            | ErrorCode::IndexOutOfRange
            | ErrorCode::InvalidCast
            | ErrorCode::NotCallable
            | ErrorCode::StackOverflow
            | ErrorCode::UncaughtThrow
            | ErrorCode::InvalidIteration
            | ErrorCode::AwaitError => "Execution Error",
            ErrorCode::TypeMismatch
            | ErrorCode::UndefinedSymbol
            | ErrorCode::RedefinedConstant
            | ErrorCode::InvalidOperandTypes
            | ErrorCode::BreakOutsideLoop
            | ErrorCode::ReturnTypeMismatch
            | ErrorCode::UnknownModule
            | ErrorCode::InvalidCondition => "Semantic Error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single positioned diagnostic. Construction goes through the builder
/// methods so every stage produces records of the same shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
    pub expected: Option<String>,
    pub received: Option<String>,
    pub suggestion: Option<String>,
    pub context: Option<String>,
}

impl Diagnostic {
    pub fn error(code: ErrorCode, message: impl Into<String>, span: &Span) -> Self {
        Diagnostic {
            code,
            severity: Severity::Error,
            message: message.into(),
            file: None,
            line: span.start.0.max(1),
            column: span.start.1.max(1),
            expected: None,
            received: None,
            suggestion: None,
            context: None,
        }
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>, span: &Span) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(code, message, span)
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_received(mut self, received: impl Into<String>) -> Self {
        self.received = Some(received.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Render without colour, e.g. for tests and log files.
    pub fn render_plain(&self) -> String {
        let mut out = format!(
            "[{}] {}: {}. Line: {}, Column: {}",
            self.code.code(),
            self.code.category(),
            self.message,
            self.line,
            self.column
        );
        if let Some(expected) = &self.expected {
            out.push_str(&format!("\n    Expected: {expected}"));
        }
        if let Some(received) = &self.received {
            out.push_str(&format!("\n    Received: {received}"));
        }
        if let Some(suggestion) = &self.suggestion {
            out.push_str(&format!("\n    Suggestion: {suggestion}"));
        }
        if let Some(context) = &self.context {
            out.push_str(&format!("\n    Context: {context}"));
        }
        out
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header = format!("[{}]", self.code.code());
        let header = match self.severity {
            Severity::Error => header.red().bold().to_string(),
            Severity::Warning => header.yellow().bold().to_string(),
            Severity::Info => header.blue().to_string(),
        };
        write!(
            f,
            "{} {}: {}. Line: {}, Column: {}",
            header,
            self.code.category(),
            self.message,
            self.line,
            self.column
        )?;
        if let Some(expected) = &self.expected {
            write!(f, "\n    Expected: {expected}")?;
        }
        if let Some(received) = &self.received {
            write!(f, "\n    Received: {received}")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n    Suggestion: {suggestion}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\n    Context: {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_ranges() {
        assert_eq!(ErrorCode::UnexpectedToken.code(), "ZYLO_ERR_001");
        assert_eq!(ErrorCode::DivisionByZero.code(), "ZYLO_ERR_101");
        assert_eq!(ErrorCode::TypeMismatch.code(), "ZYLO_ERR_201");
        assert_eq!(ErrorCode::Unknown.code(), "ZYLO_ERR_000");
    }

    #[test]
    fn test_render_format() {
        let span = Span::new((3, 7), (3, 12));
        let diag = Diagnostic::error(ErrorCode::TypeMismatch, "incompatible assignment", &span)
            .with_expected("int")
            .with_received("string");

        assert_eq!(
            diag.render_plain(),
            "[ZYLO_ERR_201] Semantic Error: incompatible assignment. Line: 3, Column: 7\n    Expected: int\n    Received: string"
        );
    }

    #[test]
    fn test_positions_are_at_least_one() {
        let diag = Diagnostic::error(ErrorCode::Unknown, "boom", &Span::default());
        assert!(diag.line >= 1);
        assert!(diag.column >= 1);
    }
}
