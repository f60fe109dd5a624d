mod error;
mod lexer;

#[cfg(test)]
mod token_test;

pub use error::{ParseError, Position, Span};
pub use lexer::{Token, Tokenizer};
