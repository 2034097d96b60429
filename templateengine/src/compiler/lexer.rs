use std::borrow::Cow;

use crate::compiler::tokens::ExprToken;
use crate::error::{Error, ErrorKind};
use crate::utils::unescape;

#[cfg(feature = "unicode")]
fn lex_identifier(s: &str) -> usize {
    s.chars()
        .enumerate()
        .map_while(|(idx, c)| {
            let cont = if c == '_' {
                true
            } else if idx == 0 {
                unicode_ident::is_xid_start(c)
            } else {
                unicode_ident::is_xid_continue(c)
            };
            cont.then(|| c.len_utf8())
        })
        .sum::<usize>()
}

#[cfg(not(feature = "unicode"))]
fn lex_identifier(s: &str) -> usize {
    s.as_bytes()
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| {
            if c == b'_' {
                true
            } else if idx == 0 {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            }
        })
        .count()
}

/// Tokenizes the body of a single directive.
///
/// Offsets are byte offsets into the directive body.
pub struct Tokenizer<'s> {
    source: &'s str,
    rest: &'s str,
}

impl<'s> Tokenizer<'s> {
    /// Creates a new tokenizer over an expression or statement body.
    pub fn new(source: &'s str) -> Tokenizer<'s> {
        Tokenizer {
            source,
            rest: source,
        }
    }

    /// Byte offset of the next unread character.
    pub fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    /// Produces the next token and its start offset.
    pub fn next_token(&mut self) -> Result<Option<(ExprToken<'s>, usize)>, Error> {
        self.skip_whitespace();
        if self.rest.is_empty() {
            return Ok(None);
        }
        let offset = self.offset();

        // augmented assignment
        for op in ["//", "+", "-", "*", "/", "%"] {
            if let Some(rest) = self.rest.strip_prefix(op) {
                if rest.starts_with('=') && !rest.starts_with("==") {
                    let op = self.advance(op.len());
                    self.advance(1);
                    return Ok(Some((ExprToken::AugAssign(op), offset)));
                }
            }
        }

        // two character operators
        let op = match self.rest.as_bytes().get(..2) {
            Some(b"//") => Some(ExprToken::FloorDiv),
            Some(b"**") => Some(ExprToken::Pow),
            Some(b"==") => Some(ExprToken::Eq),
            Some(b"!=") => Some(ExprToken::Ne),
            Some(b">=") => Some(ExprToken::Gte),
            Some(b"<=") => Some(ExprToken::Lte),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(2);
            return Ok(Some((op, offset)));
        }

        // single character operators (and strings)
        let op = match self.rest.as_bytes().first() {
            Some(b'+') => Some(ExprToken::Plus),
            Some(b'-') => Some(ExprToken::Minus),
            Some(b'*') => Some(ExprToken::Mul),
            Some(b'/') => Some(ExprToken::Div),
            Some(b'%') => Some(ExprToken::Mod),
            Some(b'.') if !self.rest[1..].starts_with(|c: char| c.is_ascii_digit()) => {
                Some(ExprToken::Dot)
            }
            Some(b',') => Some(ExprToken::Comma),
            Some(b':') => Some(ExprToken::Colon),
            Some(b';') => Some(ExprToken::Semicolon),
            Some(b'=') => Some(ExprToken::Assign),
            Some(b'>') => Some(ExprToken::Gt),
            Some(b'<') => Some(ExprToken::Lt),
            Some(b'(') => Some(ExprToken::ParenOpen),
            Some(b')') => Some(ExprToken::ParenClose),
            Some(b'[') => Some(ExprToken::BracketOpen),
            Some(b']') => Some(ExprToken::BracketClose),
            Some(b'{') => Some(ExprToken::BraceOpen),
            Some(b'}') => Some(ExprToken::BraceClose),
            Some(b'\'') => return self.eat_string(b'\'').map(|tok| Some((tok, offset))),
            Some(b'"') => return self.eat_string(b'"').map(|tok| Some((tok, offset))),
            Some(c) if c.is_ascii_digit() || *c == b'.' => {
                return self.eat_number().map(|tok| Some((tok, offset)))
            }
            _ => None,
        };
        if let Some(op) = op {
            self.advance(1);
            Ok(Some((op, offset)))
        } else {
            self.eat_identifier().map(|tok| Some((tok, offset)))
        }
    }

    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        self.rest = new_rest;
        skipped
    }

    fn syntax_error(&self, msg: &'static str) -> Error {
        Error::new(ErrorKind::SyntaxError, msg)
    }

    fn skip_whitespace(&mut self) {
        let skipped = self
            .rest
            .chars()
            .map_while(|c| c.is_whitespace().then(|| c.len_utf8()))
            .sum();
        if skipped > 0 {
            self.advance(skipped);
        }
    }

    fn eat_number(&mut self) -> Result<ExprToken<'s>, Error> {
        #[derive(Copy, Clone)]
        enum State {
            RadixInteger, // 0x10
            Integer,      // 123
            Fraction,     // .123
            Exponent,     // E | e
            ExponentSign, // +|-
        }

        let radix = match self.rest.as_bytes().get(..2) {
            Some(b"0b" | b"0B") => 2,
            Some(b"0o" | b"0O") => 8,
            Some(b"0x" | b"0X") => 16,
            _ => 10,
        };

        let mut state = if radix == 10 {
            State::Integer
        } else {
            self.advance(2);
            State::RadixInteger
        };

        let mut num_len = 0;
        let mut has_underscore = false;
        for c in self.rest.bytes() {
            state = match (c, state) {
                (b'.', State::Integer) => State::Fraction,
                (b'E' | b'e', State::Integer | State::Fraction) => State::Exponent,
                (b'+' | b'-', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', state) => state,
                (b'a'..=b'f' | b'A'..=b'F', State::RadixInteger) if radix == 16 => state,
                (b'_', _) => {
                    has_underscore = true;
                    state
                }
                _ => break,
            };
            num_len += 1;
        }
        let is_float = !matches!(state, State::Integer | State::RadixInteger);

        let mut num = Cow::Borrowed(self.advance(num_len));
        if has_underscore {
            if num.ends_with('_') {
                return Err(self.syntax_error("'_' may not occur at end of number"));
            }
            num = Cow::Owned(num.replace('_', ""));
        }

        if is_float {
            num.parse()
                .map(ExprToken::Float)
                .map_err(|_| self.syntax_error("invalid float"))
        } else {
            i64::from_str_radix(&num, radix)
                .map(ExprToken::Int)
                .map_err(|_| self.syntax_error("invalid integer"))
        }
    }

    fn eat_identifier(&mut self) -> Result<ExprToken<'s>, Error> {
        let ident_len = lex_identifier(self.rest);
        if ident_len > 0 {
            Ok(ExprToken::Ident(self.advance(ident_len)))
        } else {
            let c = self.rest.chars().next().unwrap_or(' ');
            Err(Error::new(
                ErrorKind::SyntaxError,
                format!("unexpected character {c:?}"),
            ))
        }
    }

    fn eat_string(&mut self, delim: u8) -> Result<ExprToken<'s>, Error> {
        let mut escaped = false;
        let mut has_escapes = false;
        let str_len = self
            .rest
            .as_bytes()
            .iter()
            .skip(1)
            .take_while(|&&c| match (escaped, c) {
                (true, _) => {
                    escaped = false;
                    true
                }
                (_, b'\\') => {
                    escaped = true;
                    has_escapes = true;
                    true
                }
                (_, c) if c == delim => false,
                _ => true,
            })
            .count();
        if escaped || self.rest.as_bytes().get(str_len + 1) != Some(&delim) {
            return Err(self.syntax_error("unexpected end of string"));
        }
        let s = self.advance(str_len + 2);
        let body = &s[1..s.len() - 1];
        Ok(ExprToken::Str(if has_escapes {
            ok!(unescape(body))
        } else {
            body.to_string()
        }))
    }
}

/// Utility function to quickly tokenize a directive body.
#[cfg(any(test, feature = "unstable_machinery"))]
pub fn tokenize(input: &str) -> impl Iterator<Item = Result<(ExprToken<'_>, usize), Error>> {
    let mut tokenizer = Tokenizer::new(input);
    std::iter::from_fn(move || tokenizer.next_token().transpose())
}
