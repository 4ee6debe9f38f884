// Lexer for lfc chain definition files (.lfc).
//
// Uses the `logos` crate for DFA-based lexing. Whitespace, newlines and `#`
// comments are insignificant: a definition runs from `chain` to the next
// `chain`/`pub` keyword, so method chains may be split across lines.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters and out-of-range literals produce
//   `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// lfc token types.
///
/// Identifiers carry no value; use the span to retrieve the text from the
/// source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|#[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("pub")]
    Pub,
    #[token("chain")]
    Chain,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ── Symbols ──
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("=>")]
    FatArrow,
    #[token("=")]
    Equals,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    // ── Literals ──
    //
    // Long and double regexes are longer matches than the bare integer, so
    // `42L` and `4.5` never split into two tokens.
    /// 64-bit integer literal with `L` suffix (e.g. `42L`).
    #[regex(r"[0-9]+L", parse_long)]
    Long(i64),

    /// Double literal (e.g. `0.5`, `1e3`, `2.5e-1`).
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+", parse_double)]
    Double(f64),

    /// 32-bit integer literal.
    #[regex(r"[0-9]+", parse_int)]
    Int(i32),

    /// String literal with `\"`, `\\` and `\n` escapes.
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    StringLit(String),

    // ── Identifier ──
    //
    // Placed after keywords: logos prioritises fixed `#[token]` matches
    // over regex for the same length, so `chain` matches Chain, not Ident.
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Pub => write!(f, "pub"),
            Token::Chain => write!(f, "chain"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Dot => write!(f, "."),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::FatArrow => write!(f, "=>"),
            Token::Equals => write!(f, "="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Long(v) => write!(f, "{v}L"),
            Token::Double(v) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i32> {
    lex.slice().parse().ok()
}

fn parse_long(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    let slice = lex.slice();
    slice[..slice.len() - 1].parse().ok()
}

fn parse_double(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1]; // strip quotes
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                '"' => result.push('"'),
                '\\' => result.push('\\'),
                'n' => result.push('\n'),
                _ => return None,
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

// ── Public API ──

/// Lex an lfc source string into tokens.
///
/// Returns all successfully parsed tokens together with any errors for
/// unrecognised characters. Lexing is non-fatal: errors are collected and
/// the lexer continues past bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected input: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: lex and assert no errors, return token list.
    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords() {
        assert_eq!(
            lex_ok("pub chain true false"),
            vec![Token::Pub, Token::Chain, Token::True, Token::False]
        );
    }

    #[test]
    fn keyword_vs_ident() {
        assert_eq!(lex_ok("chains"), vec![Token::Ident]);
        assert_eq!(lex_ok("public"), vec![Token::Ident]);
    }

    #[test]
    fn operators_longest_match() {
        assert_eq!(
            lex_ok("=> = == != <= < >= > && || !"),
            vec![
                Token::FatArrow,
                Token::Equals,
                Token::EqEq,
                Token::NotEq,
                Token::LtEq,
                Token::Lt,
                Token::GtEq,
                Token::Gt,
                Token::AndAnd,
                Token::OrOr,
                Token::Bang,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            lex_ok("42 42L 4.5 1e3"),
            vec![
                Token::Int(42),
                Token::Long(42),
                Token::Double(4.5),
                Token::Double(1000.0),
            ]
        );
    }

    #[test]
    fn int_overflow_is_error() {
        let result = lex("99999999999");
        assert_eq!(result.errors.len(), 1);
        assert!(result.tokens.is_empty());
    }

    #[test]
    fn member_call_on_int_is_not_double() {
        assert_eq!(
            lex_ok("Range(0, 3).Sum()"),
            vec![
                Token::Ident,
                Token::LParen,
                Token::Int(0),
                Token::Comma,
                Token::Int(3),
                Token::RParen,
                Token::Dot,
                Token::Ident,
                Token::LParen,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            lex_ok(r#""a\"b\\c\n""#),
            vec![Token::StringLit("a\"b\\c\n".into())]
        );
        assert_eq!(lex(r#""\q""#).errors.len(), 1);
    }

    #[test]
    fn comments_and_newlines_skipped() {
        assert_eq!(
            lex_ok("# header\nchain # trailing\n  x"),
            vec![Token::Chain, Token::Ident]
        );
    }

    #[test]
    fn spans_correct() {
        let result = lex("chain ab");
        assert_eq!(result.tokens[0].1, Span { start: 0, end: 5 });
        assert_eq!(result.tokens[1].1, Span { start: 6, end: 8 });
    }

    #[test]
    fn bad_character_continues() {
        let result = lex("a $ b");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.tokens.len(), 2);
        assert_eq!(result.errors[0].span, Span { start: 2, end: 3 });
    }
}
