pub mod disasm;
pub mod ir;
pub mod op;
pub mod resolve;
pub mod resolve_error;

pub use ir::{Address, ImageError, Program};
pub use op::{Instruction, Opcode};
pub use resolve::resolve;
pub use resolve_error::ResolveError;
