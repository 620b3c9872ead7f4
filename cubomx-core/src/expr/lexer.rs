//! Tokenizer for attribute expressions.

use crate::error::{Error, Result};

/// Multi-character punctuators, longest first.
const PUNCTS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=",
];

const SINGLE: &str = "+-*/%<>!=?:.,;()[]{}";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    String(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
}

pub(crate) struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    idx: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            idx: 0,
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            out.push(token);
            if done {
                return Ok(out);
            }
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> Error {
        Error::Parse {
            source_text: self.source.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn peek(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.idx + n).copied()
    }

    fn next_token(&mut self) -> Result<Token> {
        while self.peek(0).is_some_and(|b| b.is_ascii_whitespace()) {
            self.idx += 1;
        }
        let offset = self.idx;
        let Some(b) = self.peek(0) else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset,
            });
        };

        let kind = if b.is_ascii_digit() || (b == b'.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) {
            self.lex_number()?
        } else if b == b'"' || b == b'\'' {
            self.lex_string(b)?
        } else if is_ident_start(b) {
            let start = self.idx;
            while self.peek(0).is_some_and(is_ident_continue) {
                self.idx += 1;
            }
            TokenKind::Ident(self.source[start..self.idx].to_string())
        } else if let Some(punct) = PUNCTS.iter().find(|p| self.source[self.idx..].starts_with(**p)) {
            self.idx += punct.len();
            TokenKind::Punct(*punct)
        } else if let Some(pos) = SINGLE.find(char::from(b)) {
            self.idx += 1;
            TokenKind::Punct(&SINGLE[pos..pos + 1])
        } else {
            let ch = self.source[self.idx..].chars().next().unwrap_or('?');
            return Err(self.error(offset, format!("unexpected character `{ch}`")));
        };
        Ok(Token { kind, offset })
    }

    fn lex_number(&mut self) -> Result<TokenKind> {
        let start = self.idx;
        while self.peek(0).is_some_and(|b| b.is_ascii_digit() || b == b'.') {
            self.idx += 1;
        }
        if matches!(self.peek(0), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek(1), Some(b'+' | b'-')));
            if self.peek(1 + sign).is_some_and(|b| b.is_ascii_digit()) {
                self.idx += 1 + sign;
                while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
                    self.idx += 1;
                }
            }
        }
        let text = &self.source[start..self.idx];
        text.parse()
            .map(TokenKind::Number)
            .map_err(|_| self.error(start, format!("invalid number `{text}`")))
    }

    fn lex_string(&mut self, quote: u8) -> Result<TokenKind> {
        let start = self.idx;
        self.idx += 1;
        let mut out = String::new();
        loop {
            let Some(ch) = self.source[self.idx..].chars().next() else {
                return Err(self.error(start, "unterminated string"));
            };
            self.idx += ch.len_utf8();
            match ch {
                c if c == char::from(quote) => return Ok(TokenKind::String(out)),
                '\\' => {
                    let Some(escaped) = self.source[self.idx..].chars().next() else {
                        return Err(self.error(start, "unterminated string"));
                    };
                    self.idx += escaped.len_utf8();
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}
