use std::iter::Peekable;

use crate::{
    stream::TokenStream,
    token::{Span, Token, TokenKind, KEYWORDS},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid character {0:?}")]
    InvalidCharacter(char),
}

/// The Kaleidoscope lexer.
///
/// Recognizer rules are tried in a fixed order against the peeked character;
/// no character is consumed before it is known to belong to the token being
/// built. The cursor only ever moves forward.
pub struct Lexer<'src> {
    src: &'src str,
    iter: Peekable<std::str::Chars<'src>>,
    cursor: usize,
    current_lo: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
        }
    }

    /// Scans the next token.
    ///
    /// Returns `Ok(None)` once the input is exhausted; further calls keep
    /// returning `Ok(None)`. An unrecognized character fails with
    /// [`Error::InvalidCharacter`] and is left unconsumed.
    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.skip_trivia();
        self.mark();
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let kind = match c {
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
            c if c.is_ascii_digit() => self.number(),
            '+' => self.advance_with(TokenKind::Plus),
            '-' => self.advance_with(TokenKind::Minus),
            '*' => self.advance_with(TokenKind::Star),
            '/' => self.advance_with(TokenKind::Slash),
            '%' => self.advance_with(TokenKind::Percent),
            '(' => self.advance_with(TokenKind::LParen),
            ')' => self.advance_with(TokenKind::RParen),
            ',' => self.advance_with(TokenKind::Comma),
            ';' => self.advance_with(TokenKind::SemiColon),
            c => return Err(Error::InvalidCharacter(c)),
        };
        Ok(Some(self.produce(kind)))
    }

    /// Consumes whitespace and `#` line comments. Never produces a token.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.advance();
                }
                Some('#') => {
                    while !matches!(self.peek(), Some('\n') | None) {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let valid_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';

        self.advance();
        while self.peek().is_some_and(valid_suffix) {
            self.advance();
        }
        match KEYWORDS.get(self.substr()).cloned() {
            Some(keyword) => keyword,
            None => TokenKind::Identifier(self.substr().to_string()),
        }
    }

    fn number(&mut self) -> TokenKind {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        // The dot is only part of this token if a digit follows it; `10.`
        // lexes as the number `10` and leaves the dot behind.
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let value = self
            .substr()
            .parse()
            .expect("scanned numeric literal is a valid f64");
        TokenKind::Number(value)
    }
}

impl Lexer<'_> {
    /// Starts a new token "mark" at the current cursor.
    fn mark(&mut self) {
        self.current_lo = self.cursor;
    }

    /// Returns the next character and advances the cursor.
    fn advance(&mut self) -> Option<char> {
        self.iter.next().inspect(|c| self.cursor += c.len_utf8())
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next character without advancing the cursor.
    fn peek(&mut self) -> Option<char> {
        self.iter.peek().copied()
    }

    /// Returns the character after the next one, also without advancing.
    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.cursor..].chars();
        chars.next();
        chars.next()
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &str {
        &self.src[self.current_lo..self.cursor]
    }

    /// Produces a token using the marked bounds.
    fn produce(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.span())
    }
}

impl TokenStream for Lexer<'_> {
    fn next_token(&mut self) -> Result<Option<Token>, Error> {
        Lexer::next_token(self)
    }
}
