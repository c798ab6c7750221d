//! Hand-rolled lexer (C3, first half).
//!
//! Scans a source buffer into a flat `Vec<Token>` up front; the parser
//! then works purely over that token stream by cursor position, the same
//! split the teacher's own `parser::tokenize` makes (`seq-compiler::parser`),
//! just with richer token kinds than whitespace-splitting needs.

use crate::diag::{DiagCode, DiagnosticBag};
use parus_core::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // literals / identifiers
    Ident,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    CharLiteral,

    // keywords
    KwLet,
    KwSet,
    KwMut,
    KwStatic,
    KwFn,
    KwType,
    KwActs,
    KwFor,
    KwOperator,
    KwSelf,
    KwIf,
    KwElse,
    KwWhile,
    KwDo,
    KwLoop,
    KwIn,
    KwBreak,
    KwContinue,
    KwReturn,
    KwSwitch,
    KwCase,
    KwExtern,
    KwExport,
    KwTrue,
    KwFalse,
    KwNull,
    KwAs,

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    ColonColon,
    Semicolon,
    Dot,
    DotDot,
    Arrow,
    FatArrow,
    Question,
    QuestionQuestion,

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Bang,
    PlusPlus,

    Eof,
    Error,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

fn keyword(text: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match text {
        "let" => KwLet,
        "set" => KwSet,
        "mut" => KwMut,
        "static" => KwStatic,
        "fn" => KwFn,
        "type" => KwType,
        "acts" => KwActs,
        "for" => KwFor,
        "operator" => KwOperator,
        "self" => KwSelf,
        "if" => KwIf,
        "else" => KwElse,
        "while" => KwWhile,
        "do" => KwDo,
        "loop" => KwLoop,
        "in" => KwIn,
        "break" => KwBreak,
        "continue" => KwContinue,
        "return" => KwReturn,
        "switch" => KwSwitch,
        "case" => KwCase,
        "extern" => KwExtern,
        "export" => KwExport,
        "true" => KwTrue,
        "false" => KwFalse,
        "null" => KwNull,
        "as" => KwAs,
        _ => return None,
    })
}

/// Scans `src` into a token stream, reporting `InvalidUtf8`/lexical
/// errors into `diags` and always terminating with a single `Eof` token
/// so the parser never has to special-case running off the end.
pub fn lex(src: &str, diags: &mut DiagnosticBag) -> Vec<Token> {
    let bytes = src.as_bytes();
    let mut pos = 0usize;
    let mut out = Vec::new();

    macro_rules! push {
        ($kind:expr, $start:expr, $end:expr) => {
            out.push(Token {
                kind: $kind,
                span: Span::new($start as u32, $end as u32),
                text: src[$start..$end].to_string(),
            })
        };
    }

    while pos < bytes.len() {
        let c = bytes[pos] as char;

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c == '/' && bytes.get(pos + 1) == Some(&b'/') {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }

        if c == '/' && bytes.get(pos + 1) == Some(&b'*') {
            let start = pos;
            pos += 2;
            while pos < bytes.len() && !(bytes[pos] == b'*' && bytes.get(pos + 1) == Some(&b'/')) {
                pos += 1;
            }
            if pos >= bytes.len() {
                diags.error(DiagCode::UnexpectedEof, Span::new(start as u32, pos as u32), vec![]);
                break;
            }
            pos += 2;
            continue;
        }

        if c.is_ascii_digit() {
            let start = pos;
            let mut is_float = false;
            while pos < bytes.len() && (bytes[pos] as char).is_ascii_digit() {
                pos += 1;
            }
            if bytes.get(pos) == Some(&b'.') && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) {
                is_float = true;
                pos += 1;
                while pos < bytes.len() && (bytes[pos] as char).is_ascii_digit() {
                    pos += 1;
                }
            }
            push!(if is_float { TokenKind::FloatLiteral } else { TokenKind::IntLiteral }, start, pos);
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < bytes.len() && ((bytes[pos] as char).is_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            let text = &src[start..pos];
            let kind = keyword(text).unwrap_or(TokenKind::Ident);
            push!(kind, start, pos);
            continue;
        }

        if c == '"' {
            let start = pos;
            pos += 1;
            while pos < bytes.len() && bytes[pos] != b'"' {
                if bytes[pos] == b'\\' {
                    pos += 1;
                }
                pos += 1;
            }
            if pos >= bytes.len() {
                diags.error(DiagCode::UnexpectedEof, Span::new(start as u32, pos as u32), vec![]);
                break;
            }
            pos += 1;
            push!(TokenKind::StringLiteral, start, pos);
            continue;
        }

        if c == '\'' {
            let start = pos;
            pos += 1;
            while pos < bytes.len() && bytes[pos] != b'\'' {
                if bytes[pos] == b'\\' {
                    pos += 1;
                }
                pos += 1;
            }
            if pos >= bytes.len() {
                diags.error(DiagCode::UnexpectedEof, Span::new(start as u32, pos as u32), vec![]);
                break;
            }
            pos += 1;
            push!(TokenKind::CharLiteral, start, pos);
            continue;
        }

        let start = pos;
        let two = bytes.get(pos + 1).copied();
        let (kind, len) = match (c, two.map(|b| b as char)) {
            ('-', Some('>')) => (TokenKind::Arrow, 2),
            ('=', Some('>')) => (TokenKind::FatArrow, 2),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::LtEq, 2),
            ('>', Some('=')) => (TokenKind::GtEq, 2),
            ('&', Some('&')) => (TokenKind::AmpAmp, 2),
            ('|', Some('|')) => (TokenKind::PipePipe, 2),
            ('?', Some('?')) => (TokenKind::QuestionQuestion, 2),
            (':', Some(':')) => (TokenKind::ColonColon, 2),
            ('.', Some('.')) => (TokenKind::DotDot, 2),
            ('+', Some('+')) => (TokenKind::PlusPlus, 2),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('?', _) => (TokenKind::Question, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('=', _) => (TokenKind::Eq, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('&', _) => (TokenKind::Amp, 1),
            ('|', _) => (TokenKind::Pipe, 1),
            ('!', _) => (TokenKind::Bang, 1),
            _ => (TokenKind::Error, c.len_utf8()),
        };
        if kind == TokenKind::Error {
            diags.error(
                DiagCode::UnexpectedToken,
                Span::new(start as u32, (start + len) as u32),
                vec![c.to_string()],
            );
        }
        pos = start + len;
        push!(kind, start, pos);
    }

    out.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(bytes.len() as u32, bytes.len() as u32),
        text: String::new(),
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut diags = DiagnosticBag::new();
        lex(src, &mut diags).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_and_idents() {
        assert_eq!(
            kinds("let mut x"),
            vec![TokenKind::KwLet, TokenKind::KwMut, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn distinguishes_amp_chain_tokens() {
        assert_eq!(
            kinds("&&&i32"),
            vec![TokenKind::AmpAmp, TokenKind::Amp, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn lexes_int_and_float_literals() {
        assert_eq!(
            kinds("300 3.14"),
            vec![TokenKind::IntLiteral, TokenKind::FloatLiteral, TokenKind::Eof]
        );
    }

    #[test]
    fn skips_line_and_block_comments() {
        assert_eq!(kinds("// hi\n/* block */ x"), vec![TokenKind::Ident, TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_reports_eof() {
        let mut diags = DiagnosticBag::new();
        lex("\"abc", &mut diags);
        assert!(!diags.is_empty());
    }
}
