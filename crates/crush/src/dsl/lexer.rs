//! Tokenizer for the CRUSH DSL (§4.1).
//!
//! Comments start with `#` and run to end of line; whitespace is
//! insignificant outside of token boundaries. Every token carries the
//! 1-based line/column of its first character, used to anchor parse errors.

use crate::error::{CrushError, Result, SourceLocation};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    LBrace,
    RBrace,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
    pub text: String,
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_byte() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(b) = self.peek_byte() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn current_line_text(&self, line: usize) -> String {
        self.source
            .lines()
            .nth(line - 1)
            .unwrap_or("")
            .to_string()
    }

    fn error_at(&self, line: usize, col: usize, fragment: impl Into<String>) -> CrushError {
        CrushError::Parse {
            location: SourceLocation { line, column: col },
            fragment: fragment.into(),
            line_text: self.current_line_text(line),
        }
    }

    /// Scan and return the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let line = self.line;
        let col = self.col;

        let Some(b) = self.peek_byte() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                location: SourceLocation { line, column: col },
                text: String::new(),
            });
        };

        match b {
            b'{' => {
                self.advance();
                Ok(Token {
                    kind: TokenKind::LBrace,
                    location: SourceLocation { line, column: col },
                    text: "{".into(),
                })
            }
            b'}' => {
                self.advance();
                Ok(Token {
                    kind: TokenKind::RBrace,
                    location: SourceLocation { line, column: col },
                    text: "}".into(),
                })
            }
            b'-' | b'+' | b'0'..=b'9' => self.scan_number(line, col),
            b if b.is_ascii_alphabetic() || b == b'_' => self.scan_ident(line, col),
            other => Err(self.error_at(
                line,
                col,
                format!("unexpected character '{}'", other as char),
            )),
        }
    }

    fn scan_number(&mut self, line: usize, col: usize) -> Result<Token> {
        let start = self.pos;
        if matches!(self.peek_byte(), Some(b'-') | Some(b'+')) {
            self.advance();
        }
        let mut is_float = false;
        while let Some(b) = self.peek_byte() {
            match b {
                b'0'..=b'9' => {
                    self.advance();
                }
                b'.' if !is_float => {
                    is_float = true;
                    self.advance();
                }
                _ => break,
            }
        }
        let text = &self.source[start..self.pos];
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error_at(line, col, format!("invalid float literal '{text}'")))?;
            Ok(Token {
                kind: TokenKind::Float(value),
                location: SourceLocation { line, column: col },
                text: text.to_string(),
            })
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.error_at(line, col, format!("invalid integer literal '{text}'")))?;
            Ok(Token {
                kind: TokenKind::Int(value),
                location: SourceLocation { line, column: col },
                text: text.to_string(),
            })
        }
    }

    fn scan_ident(&mut self, line: usize, col: usize) -> Result<Token> {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
                self.advance();
            } else {
                break;
            }
        }
        let text = self.source[start..self.pos].to_string();
        Ok(Token {
            kind: TokenKind::Ident(text.clone()),
            location: SourceLocation { line, column: col },
            text,
        })
    }

    /// Tokenize the entire source, including a trailing `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_device_line() {
        let tokens = Lexer::new("device 0 osd0 offload 0.5").tokenize().unwrap();
        assert_eq!(tokens.len(), 6); // 5 tokens + eof
        assert_eq!(tokens[0].kind, TokenKind::Ident("device".into()));
        assert_eq!(tokens[1].kind, TokenKind::Int(0));
        assert_eq!(tokens[2].kind, TokenKind::Ident("osd0".into()));
        assert_eq!(tokens[4].kind, TokenKind::Float(0.5));
    }

    #[test]
    fn skips_comments() {
        let tokens = Lexer::new("# a comment\ndevice 0 osd0").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("device".into()));
        assert_eq!(tokens[0].location.line, 2);
    }

    #[test]
    fn tracks_negative_integers_for_bucket_ids() {
        let tokens = Lexer::new("id -3").tokenize().unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Int(-3));
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = Lexer::new("device 0 osd0 $").tokenize().unwrap_err();
        assert!(matches!(err, CrushError::Parse { .. }));
    }
}
