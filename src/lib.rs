/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser consumes a token stream, mapping it into an AST.
pub mod parser;

/// The code generator walks the AST, lowering it into an IR module that an
/// external backend verifies and executes.
pub mod codegen;

pub mod ast;
pub mod ir;
pub mod stream;
pub mod token;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] parser::Error),
    #[error(transparent)]
    Codegen(#[from] codegen::Error),
}

/// Compiles one source unit into an IR module.
///
/// Three sequential passes (lex, parse, generate); the first failure aborts
/// the whole run. Each call builds its pipeline from scratch, so independent
/// compilations share no state.
pub fn compile(src: &str) -> Result<ir::Module, Error> {
    let program = parser::parse_program(lexer::Lexer::new(src))?;
    let module = codegen::generate(&program)?;
    Ok(module)
}
