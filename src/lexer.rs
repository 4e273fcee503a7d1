//! Tokenizer for the supported PHP subset.
//!
//! Keywords are not distinguished here; they arrive as [`TokenKind::Name`] and the
//! parser classifies them case-insensitively.

use logos::Logos;

use crate::ast::SourceLocation;
use crate::validate::{CompilerError, CompilerResult, ErrorKind};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken<'s> {
    #[token("<?php", logos::skip)]
    OpenTag,

    #[token("?>")]
    CloseTag,

    #[regex(r"//[^\n]*", logos::skip)]
    #[regex(r"#[^\n]*", logos::skip)]
    LineComment,

    #[token("/*", lex_block_comment)]
    BlockComment,

    #[token("<<<")]
    Heredoc,

    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_]*", |lex| &lex.slice()[1..])]
    Variable(&'s str),

    #[regex(r"\\?[a-zA-Z_][a-zA-Z0-9_]*(\\[a-zA-Z_][a-zA-Z0-9_]*)*", |lex| lex.slice())]
    Name(&'s str),

    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    #[regex(r"[0-9]*\.[0-9]+([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", parse_float)]
    Float(f64),

    #[regex(r"'([^'\\]|\\(.|\n))*'", |lex| lex.slice())]
    SingleQuoted(&'s str),

    #[regex(r#""([^"\\]|\\(.|\n))*""#, |lex| lex.slice())]
    DoubleQuoted(&'s str),

    #[regex(
        r"\*\*=|\.\.\.|<<=|>>=|===|!==|\?\?=|\+\+|--|\+=|-=|\*=|/=|\.=|%=|&=|\|=|\^=|\*\*|==|!=|<>|<=|>=|&&|\|\||\?\?|<<|>>|->|=>|::|[-+*/%.=<>!&|^~?:;,(){}\[\]@$]",
        |lex| lex.slice()
    )]
    Punct(&'s str),
}

fn lex_block_comment<'s>(lex: &mut logos::Lexer<'s, RawToken<'s>>) -> logos::Skip {
    let remainder = lex.remainder();
    match remainder.find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(remainder.len()),
    }
    logos::Skip
}

fn parse_hex<'s>(lex: &mut logos::Lexer<'s, RawToken<'s>>) -> Option<i64> {
    i64::from_str_radix(&lex.slice()[2..], 16).ok()
}

fn parse_int<'s>(lex: &mut logos::Lexer<'s, RawToken<'s>>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_float<'s>(lex: &mut logos::Lexer<'s, RawToken<'s>>) -> Option<f64> {
    lex.slice().parse().ok()
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `$name`, stored without the sigil.
    Variable(String),
    /// Identifier, keyword or (qualified) name, backslashes preserved.
    Name(String),
    Int(i64),
    Float(f64),
    /// Decoded string literal.
    Str(String),
    Punct(String),
    Heredoc,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLocation,
}

impl Token {
    pub fn is_punct(&self, symbol: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(p) if p == symbol)
    }

    /// Case-insensitive keyword test.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Name(n) if n.eq_ignore_ascii_case(keyword))
    }
}

/// Maps byte offsets to 1-based line/column positions.
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    pub fn locate(&self, offset: usize) -> SourceLocation {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let column = offset - self.line_starts[line];
        SourceLocation::new(line as u32 + 1, column as u32 + 1)
    }
}

pub fn tokenize(source: &str) -> CompilerResult<Vec<Token>> {
    let index = LineIndex::new(source);
    let mut lexer = RawToken::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let loc = index.locate(lexer.span().start);
        let raw = result.map_err(|_| {
            let found = source[lexer.span().start..].chars().next().unwrap_or('\0');
            CompilerError::new(ErrorKind::Parse, format!("unexpected character '{}'", found)).at(loc)
        })?;
        let kind = match raw {
            RawToken::CloseTag => break,
            RawToken::OpenTag | RawToken::LineComment | RawToken::BlockComment => continue,
            RawToken::Heredoc => TokenKind::Heredoc,
            RawToken::Variable(name) => TokenKind::Variable(name.to_string()),
            RawToken::Name(name) => TokenKind::Name(name.to_string()),
            RawToken::Int(value) => TokenKind::Int(value),
            RawToken::Float(value) => TokenKind::Float(value),
            RawToken::SingleQuoted(raw) => TokenKind::Str(decode_single_quoted(raw)),
            RawToken::DoubleQuoted(raw) => TokenKind::Str(decode_double_quoted(raw, loc)?),
            RawToken::Punct(p) => TokenKind::Punct(p.to_string()),
        };
        tokens.push(Token { kind, loc });
    }

    let end = index.locate(source.len());
    tokens.push(Token {
        kind: TokenKind::Eof,
        loc: end,
    });
    Ok(tokens)
}

fn decode_single_quoted(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('\'') | Some('\\') => {
                    out.extend(chars.next());
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

fn decode_double_quoted(raw: &str, loc: SourceLocation) -> CompilerResult<String> {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('$') => out.push('$'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '$' if matches!(chars.peek(), Some(n) if n.is_ascii_alphabetic() || *n == '_' || *n == '{') => {
                return Err(CompilerError::unsupported(
                    "string interpolation is not supported",
                    loc,
                )
                .with_hint("use the concatenation operator instead"));
            }
            '{' if chars.peek() == Some(&'$') => {
                return Err(CompilerError::unsupported(
                    "string interpolation is not supported",
                    loc,
                ));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_variables_names_and_operators() {
        assert_eq!(
            kinds("<?php $a .= \\Foo\\Bar::X;"),
            vec![
                TokenKind::Variable("a".into()),
                TokenKind::Punct(".=".into()),
                TokenKind::Name("\\Foo\\Bar".into()),
                TokenKind::Punct("::".into()),
                TokenKind::Name("X".into()),
                TokenKind::Punct(";".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        let toks = kinds("<?php // one\n# two\n/* three */ 1.5");
        assert_eq!(toks, vec![TokenKind::Float(1.5), TokenKind::Eof]);
    }

    #[test]
    fn decodes_strings() {
        assert_eq!(
            kinds(r#"'it\'s' "a\tb\$""#),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::Str("a\tb$".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn rejects_interpolation() {
        let err = tokenize("<?php \"hello $name\";").unwrap_err();
        assert!(err.is(ErrorKind::Unsupported));
    }

    #[test]
    fn tracks_lines() {
        let toks = tokenize("<?php\n\n  $x").unwrap();
        assert_eq!(toks[0].loc, SourceLocation::new(3, 3));
    }
}
