//! Source text to tokens.
//!
//! The scanner works on bytes. Every token boundary it produces falls on an
//! ASCII byte, so slicing the source between two boundaries is always valid
//! UTF-8.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{ParseError, ParseResult};
use crate::token::{Span, Token, TokenKind, PUNCTUATORS};

/// Split `source` into tokens, ending with a single `TokenKind::End`.
pub fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    let mut scanner = Scanner {
        src: source,
        at: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();

    loop {
        let newline_before = scanner.skip_trivia()?;
        let mark = scanner.mark();
        let kind = scanner.scan(mark)?;
        let done = kind == TokenKind::End;
        tokens.push(Token {
            kind,
            span: mark.span_to(scanner.at),
            newline_before,
        });
        if done {
            return Ok(tokens);
        }
    }
}

/// Start of the token being scanned. Errors point here.
#[derive(Clone, Copy)]
struct Mark {
    at: usize,
    line: usize,
    column: usize,
}

impl Mark {
    fn fail(self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column)
    }

    fn span_to(self, end: usize) -> Span {
        Span {
            start: self.at,
            end,
            line: self.line,
            column: self.column,
        }
    }
}

struct Scanner<'s> {
    src: &'s str,
    at: usize,
    line: usize,
    /// Counted in characters, not bytes.
    column: usize,
}

impl<'s> Scanner<'s> {
    fn mark(&self) -> Mark {
        Mark {
            at: self.at,
            line: self.line,
            column: self.column,
        }
    }

    fn rest(&self) -> &'s [u8] {
        let src: &'s str = self.src;
        &src.as_bytes()[self.at..]
    }

    /// Byte `ahead` positions on, or NUL past the end.
    fn byte(&self, ahead: usize) -> u8 {
        self.rest().get(ahead).copied().unwrap_or(0)
    }

    fn bump(&mut self, count: usize) {
        let src = self.src.as_bytes();
        let end = (self.at + count).min(src.len());
        for &b in &src[self.at..end] {
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if b & 0xC0 != 0x80 {
                self.column += 1;
            }
        }
        self.at = end;
    }

    /// Consume ASCII bytes matching `keep` and return them.
    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &'s str {
        let len = self.rest().iter().take_while(|&&b| keep(b)).count();
        let start = self.at;
        self.bump(len);
        &self.src[start..start + len]
    }

    /// Skip blanks and comments. Returns whether a line break was crossed.
    fn skip_trivia(&mut self) -> ParseResult<bool> {
        let first_line = self.line;
        loop {
            match (self.byte(0), self.byte(1)) {
                (b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C, _) => self.bump(1),
                (b'/', b'/') => {
                    let rest = self.rest();
                    let len = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
                    self.bump(len);
                }
                (b'/', b'*') => {
                    let open = self.mark();
                    match self.rest()[2..].windows(2).position(|w| w == b"*/") {
                        Some(body) => self.bump(body + 4),
                        None => return Err(open.fail("Unterminated comment")),
                    }
                }
                _ => return Ok(self.line != first_line),
            }
        }
    }

    fn scan(&mut self, mark: Mark) -> ParseResult<TokenKind> {
        if self.at >= self.src.len() {
            return Ok(TokenKind::End);
        }

        let first = self.byte(0);
        if first.is_ascii_digit() || (first == b'.' && self.byte(1).is_ascii_digit()) {
            return self.number(mark);
        }
        if first == b'"' || first == b'\'' {
            return self.string(first, mark);
        }
        if starts_ident(first) {
            let word = self.take_while(continues_ident);
            return Ok(TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Ident(String::from(word))));
        }

        let rest = self.rest();
        let (spelling, kind) = PUNCTUATORS
            .iter()
            .find(|(spelling, _)| rest.starts_with(spelling.as_bytes()))
            .ok_or_else(|| {
                let ch = self.src[self.at..].chars().next().unwrap_or('\0');
                mark.fail(format!("Unexpected character '{}'", ch))
            })?;
        self.bump(spelling.len());
        Ok(kind.clone())
    }

    fn number(&mut self, mark: Mark) -> ParseResult<TokenKind> {
        let invalid = || mark.fail("Invalid number literal");

        let radix = match (self.byte(0), self.byte(1) | 0x20) {
            (b'0', b'x') => 16,
            (b'0', b'o') => 8,
            (b'0', b'b') => 2,
            _ => 10,
        };

        let value = if radix == 10 {
            let start = self.at;
            self.take_while(|b| b.is_ascii_digit());
            if self.byte(0) == b'.' {
                self.bump(1);
                self.take_while(|b| b.is_ascii_digit());
            }
            if (self.byte(0) | 0x20) == b'e' {
                self.bump(1);
                if matches!(self.byte(0), b'+' | b'-') {
                    self.bump(1);
                }
                if self.take_while(|b| b.is_ascii_digit()).is_empty() {
                    return Err(invalid());
                }
            }
            self.src[start..self.at].parse::<f64>().map_err(|_| invalid())?
        } else {
            self.bump(2);
            let digits = self.take_while(|b| char::from(b).is_digit(radix));
            u64::from_str_radix(digits, radix).map_err(|_| invalid())? as f64
        };

        if starts_ident(self.byte(0)) {
            return Err(mark.fail("Identifier starts immediately after numeric literal"));
        }
        Ok(TokenKind::Num(value))
    }

    fn string(&mut self, quote: u8, mark: Mark) -> ParseResult<TokenKind> {
        self.bump(1);
        let mut out = Vec::new();

        loop {
            let rest = self.rest();
            match rest.first().copied() {
                None | Some(b'\n') => return Err(mark.fail("Unterminated string literal")),
                Some(b) if b == quote => {
                    self.bump(1);
                    break;
                }
                Some(b'\\') => {
                    self.bump(1);
                    self.escape(&mut out, mark)?;
                }
                Some(_) => {
                    let run = rest
                        .iter()
                        .position(|&b| b == quote || b == b'\\' || b == b'\n')
                        .unwrap_or(rest.len());
                    out.extend_from_slice(&rest[..run]);
                    self.bump(run);
                }
            }
        }

        String::from_utf8(out)
            .map(TokenKind::Str)
            .map_err(|_| mark.fail("Invalid string literal"))
    }

    /// Decode the escape after a backslash.
    fn escape(&mut self, out: &mut Vec<u8>, mark: Mark) -> ParseResult<()> {
        let byte = match self.byte(0) {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'b' => 0x08,
            b'f' => 0x0C,
            b'v' => 0x0B,
            b'0' => 0,
            // Line continuation.
            b'\n' => {
                self.bump(1);
                return Ok(());
            }
            b'x' => {
                self.bump(1);
                return self.hex_escape(2, out, mark);
            }
            b'u' if self.byte(1) == b'{' => {
                self.bump(2);
                let digits = self.take_while(|b| b != b'}');
                if self.byte(0) != b'}' {
                    return Err(mark.fail("Invalid unicode escape"));
                }
                self.bump(1);
                let code = u32::from_str_radix(digits, 16)
                    .map_err(|_| mark.fail("Invalid unicode escape"))?;
                push_code_point(out, code);
                return Ok(());
            }
            b'u' => {
                self.bump(1);
                return self.hex_escape(4, out, mark);
            }
            _ => {
                let len = self.src[self.at..].chars().next().map_or(0, char::len_utf8);
                out.extend_from_slice(&self.rest()[..len]);
                self.bump(len);
                return Ok(());
            }
        };
        out.push(byte);
        self.bump(1);
        Ok(())
    }

    fn hex_escape(&mut self, count: usize, out: &mut Vec<u8>, mark: Mark) -> ParseResult<()> {
        let digits = self
            .rest()
            .get(..count)
            .filter(|digits| digits.iter().all(u8::is_ascii_hexdigit))
            .ok_or_else(|| mark.fail("Invalid hex escape"))?;
        let code = digits
            .iter()
            .filter_map(|&d| char::from(d).to_digit(16))
            .fold(0, |acc, d| acc * 16 + d);
        self.bump(count);
        push_code_point(out, code);
        Ok(())
    }
}

/// UTF-8 for `code`, or U+FFFD when it is not a scalar value.
fn push_code_point(out: &mut Vec<u8>, code: u32) {
    let ch = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
    let mut buf = [0u8; 4];
    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
}

fn starts_ident(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn continues_ident(b: u8) -> bool {
    starts_ident(b) || b.is_ascii_digit()
}
