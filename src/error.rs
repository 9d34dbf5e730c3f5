use thiserror::Error;

use crate::bytecode::{ImageError, ResolveError};
use crate::frontend::LexerError;
use crate::runtime::RuntimeError;

/// Any failure the toolkit can report, from lexing to execution.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
