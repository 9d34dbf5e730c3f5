//! tstk: a toolkit for a small stack-based language.
//!
//! Source text is tokenized by [`frontend::Lexer`], labels are turned into
//! addresses by [`bytecode::resolve`], and the resulting [`Program`] is
//! either executed by [`runtime::Machine`] or lowered to C by
//! [`codegen::c::generate`].

pub mod bytecode;
pub mod codegen;
pub mod debugger;
pub mod error;
pub mod frontend;
pub mod repl;
pub mod runtime;
pub mod token;

pub use bytecode::{Address, Instruction, Opcode, Program};
pub use error::{Error, Result};
pub use runtime::{Machine, MachineConfig};

/// Tokenizes and resolves one source text, starting at address 0.
pub fn assemble(file: &str, source: &str) -> Result<Program> {
    let tokens = frontend::Lexer::new(file, source).tokenize()?;
    Ok(bytecode::resolve(&tokens, 0)?)
}
