pub mod lexer;

pub use lexer::{Lexer, LexerError};
