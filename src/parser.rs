use crate::{
    ast::{BinaryOperator, Expr, Function, Program, Prototype},
    lexer,
    stream::TokenStream,
    token::{Token, TokenKind},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// `None` means the input ended where another token was required.
    #[error(
        "unexpected {}",
        .0.as_ref().map_or_else(|| "end of input".to_owned(), ToString::to_string)
    )]
    UnexpectedToken(Option<Token>),
    #[error(transparent)]
    Lexer(#[from] lexer::Error),
}

/// Parses an entire token stream into one [`Program`].
///
/// The first error aborts the parse; there is no recovery. A caller that
/// wants to retry must start over with a fresh stream.
pub fn parse_program<S: TokenStream>(stream: S) -> Result<Program> {
    Parser::new(stream)?.parse_program()
}

struct Parser<S> {
    stream: S,
    /// One-slot lookahead buffer; `None` once the stream is exhausted.
    current: Option<Token>,
}

impl<S: TokenStream> Parser<S> {
    fn new(stream: S) -> Result<Parser<S>> {
        let mut parser = Parser {
            stream,
            current: None,
        };
        parser.bump()?;
        Ok(parser)
    }

    fn parse_program(&mut self) -> Result<Program> {
        let mut program = Program::default();
        while self.current.is_some() {
            // Stray separators between top-level items carry no meaning.
            if self.take(&TokenKind::SemiColon)? {
                continue;
            }
            if self.is(&TokenKind::Extern) {
                program.externs.push(self.parse_extern()?);
            } else if self.is(&TokenKind::Def) {
                program.functions.push(self.parse_definition()?);
            } else {
                program.top_level.push(self.parse_expr()?);
            }
        }
        Ok(program)
    }

    fn parse_extern(&mut self) -> Result<Prototype> {
        self.consume(&TokenKind::Extern)?;
        let prototype = self.parse_prototype()?;
        self.consume(&TokenKind::SemiColon)?;
        Ok(prototype)
    }

    fn parse_definition(&mut self) -> Result<Function> {
        self.consume(&TokenKind::Def)?;
        let prototype = self.parse_prototype()?;
        let body = self.parse_expr()?;
        self.consume(&TokenKind::SemiColon)?;
        Ok(Function { prototype, body })
    }

    fn parse_prototype(&mut self) -> Result<Prototype> {
        let name = self.parse_ident()?;
        self.consume(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.take(&TokenKind::RParen)? {
            loop {
                params.push(self.parse_ident()?);
                if self.take(&TokenKind::Comma)? {
                    continue;
                }
                self.consume(&TokenKind::RParen)?;
                break;
            }
        }
        Ok(Prototype { name, params })
    }

    // TODO: operator precedence. Every operator binds alike, so a chain
    // nests to the right: `a + b * c` is `a + (b * c)`, and `a * b + c`
    // is `a * (b + c)`.
    fn parse_expr(&mut self) -> Result<Expr> {
        let lhs = self.parse_primary()?;
        let Some(op) = self.peek_operator() else {
            return Ok(lhs);
        };
        self.bump()?;
        let rhs = self.parse_expr()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn peek_operator(&self) -> Option<BinaryOperator> {
        match self.current.as_ref()?.kind {
            TokenKind::Plus => Some(BinaryOperator::Add),
            TokenKind::Minus => Some(BinaryOperator::Sub),
            TokenKind::Star => Some(BinaryOperator::Mul),
            TokenKind::Slash => Some(BinaryOperator::Div),
            TokenKind::Percent => Some(BinaryOperator::Rem),
            _ => None,
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let Some(token) = self.bump()? else {
            return Err(Error::UnexpectedToken(None));
        };
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            // An identifier immediately followed by `(` is a call; anything
            // else makes it a plain variable reference.
            TokenKind::Identifier(name) => {
                if self.is(&TokenKind::LParen) {
                    self.parse_call(name)
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.consume(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::If => self.parse_conditional(),
            _ => Err(Error::UnexpectedToken(Some(token))),
        }
    }

    fn parse_call(&mut self, callee: String) -> Result<Expr> {
        self.consume(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.take(&TokenKind::RParen)? {
            loop {
                args.push(self.parse_expr()?);
                if self.take(&TokenKind::Comma)? {
                    continue;
                }
                self.consume(&TokenKind::RParen)?;
                break;
            }
        }
        Ok(Expr::Call { callee, args })
    }

    /// Parses `expr then expr else expr`; the leading `if` has already been
    /// consumed. Both arms are mandatory.
    fn parse_conditional(&mut self) -> Result<Expr> {
        let predicate = self.parse_expr()?;
        self.consume(&TokenKind::Then)?;
        let then_arm = self.parse_expr()?;
        self.consume(&TokenKind::Else)?;
        let else_arm = self.parse_expr()?;
        Ok(Expr::Conditional {
            predicate: Box::new(predicate),
            then_arm: Box::new(then_arm),
            else_arm: Box::new(else_arm),
        })
    }

    fn parse_ident(&mut self) -> Result<String> {
        match self.bump()? {
            Some(token) => match token.kind {
                TokenKind::Identifier(name) => Ok(name),
                _ => Err(Error::UnexpectedToken(Some(token))),
            },
            None => Err(Error::UnexpectedToken(None)),
        }
    }
}

impl<S: TokenStream> Parser<S> {
    /// Returns the current token and pulls the next one into the buffer.
    fn bump(&mut self) -> Result<Option<Token>> {
        let next = self.stream.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: &TokenKind) -> bool {
        self.current.as_ref().is_some_and(|t| t.kind == *expect)
    }

    /// Advances if the current token matches the provided one, returning
    /// true. If not, returns false and doesn't advance.
    fn take(&mut self, expect: &TokenKind) -> Result<bool> {
        if self.is(expect) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Advances if the current token matches the provided one. If not, fails
    /// with the offending token.
    fn consume(&mut self, expect: &TokenKind) -> Result<()> {
        if self.is(expect) {
            self.bump()?;
            Ok(())
        } else {
            Err(Error::UnexpectedToken(self.current.take()))
        }
    }
}
