// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used by parsing, binding, assembly and
// emission. Stable codes live in `codes`.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0300`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related spans.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    pub fn error(span: Span, code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message).with_code(code)
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }

    /// Render with a `line:col` prefix resolved against `source`.
    pub fn render(&self, file: &str, source: &str) -> String {
        let (line, col) = line_col(source, self.span.start);
        let mut out = format!("{file}:{line}:{col}: {self}");
        for related in &self.related_spans {
            let (line, col) = line_col(source, related.span.start);
            out.push_str(&format!("\n  {file}:{line}:{col}: note: {}", related.label));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let prefix = &source[..offset.min(source.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = prefix.rfind('\n').map_or(prefix.len(), |nl| prefix.len() - nl - 1) + 1;
    (line, col)
}

// ── Codes ────────────────────────────────────────────────────────────────

/// Stable diagnostic codes.
///
/// E00xx: syntax. E01xx: binding. E02xx: chain assembly. E03xx: emission.
/// W0xxx: warnings.
pub mod codes {
    use super::DiagCode;

    pub const E0001: DiagCode = DiagCode("E0001"); // lex error
    pub const E0002: DiagCode = DiagCode("E0002"); // parse error

    pub const E0100: DiagCode = DiagCode("E0100"); // unknown name
    pub const E0101: DiagCode = DiagCode("E0101"); // unknown source or method
    pub const E0102: DiagCode = DiagCode("E0102"); // wrong number of arguments
    pub const E0103: DiagCode = DiagCode("E0103"); // type error
    pub const E0104: DiagCode = DiagCode("E0104"); // missing type argument
    pub const E0105: DiagCode = DiagCode("E0105"); // duplicate chain or parameter
    pub const E0106: DiagCode = DiagCode("E0106"); // unknown type
    pub const E0107: DiagCode = DiagCode("E0107"); // lambda where a value is expected, or vice versa
    pub const E0108: DiagCode = DiagCode("E0108"); // unsupported chain shape

    pub const E0200: DiagCode = DiagCode("E0200"); // source with a receiver
    pub const E0201: DiagCode = DiagCode("E0201"); // operation or evaluation without receiver
    pub const E0202: DiagCode = DiagCode("E0202"); // evaluation not at tip
    pub const E0203: DiagCode = DiagCode("E0203"); // malformed captures
    pub const E0204: DiagCode = DiagCode("E0204"); // missing type information
    pub const E0205: DiagCode = DiagCode("E0205"); // element type mismatch
    pub const E0206: DiagCode = DiagCode("E0206"); // random access required

    pub const E0300: DiagCode = DiagCode("E0300"); // descriptor serialization

    pub const W0001: DiagCode = DiagCode("W0001"); // unused chain parameter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 0..1)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, dummy_span(), "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::new(DiagLevel::Warning, dummy_span(), "unused parameter")
            .with_code(DiagCode("W0001"));
        assert_eq!(format!("{d}"), "warning[W0001]: unused parameter");
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::new(DiagLevel::Error, dummy_span(), "type mismatch")
            .with_code(DiagCode("E0200"))
            .with_hint("insert a Select")
            .with_related(dummy_span(), "receiver produces long");

        assert_eq!(d.code, Some(DiagCode("E0200")));
        assert_eq!(d.hint.as_deref(), Some("insert a Select"));
        assert_eq!(d.related_spans.len(), 1);
    }

    #[test]
    fn render_line_col() {
        use chumsky::span::Span as _;
        let source = "chain a = x\nchain b = y";
        let d = Diagnostic::error(Span::new((), 22..23), codes::E0100, "unknown name `y`");
        assert_eq!(
            d.render("t.lfc", source),
            "t.lfc:2:11: error[E0100]: unknown name `y`"
        );
    }

    #[test]
    fn line_col_at_start() {
        assert_eq!(line_col("abc", 0), (1, 1));
        assert_eq!(line_col("a\nb", 2), (2, 1));
    }
}
